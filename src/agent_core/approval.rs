//! Approval gate — obtains a decision before a gated tool runs.
//!
//! The dispatcher only sees the [`ApprovalGate`] trait. Decision sources:
//! - [`StaticGate`]: approve or reject everything
//! - [`PolicyGate`]: a boolean closure over the request
//! - [`InteractiveGate`]: asks a [`ReplySource`] (a human, usually) and maps the
//!   free-text reply to a decision through a [`ReplyInterpreter`]
//!
//! Interpretation is total: every reply yields exactly one outcome, and
//! anything unclear, failed or timed out becomes a rejection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::agent_core::tokens::truncate_utf8;
use crate::inference::endpoint::ModelEndpoint;
use crate::inference::types::{Message, ModelRequest};

use super::config::ApprovalConfig;
use super::types::{ApprovalDecision, ApprovalOutcome, ApprovalRequest};

// ─── Gate Trait ─────────────────────────────────────────────────────────────

/// Decides whether one gated tool call may run.
///
/// Called once per gated request, sequentially in request order. Decisions
/// are never retried.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn decide(&self, request: &ApprovalRequest) -> ApprovalDecision;
}

// ─── Static / Policy Gates ──────────────────────────────────────────────────

/// Approves or rejects every request.
#[derive(Debug, Clone, Copy)]
pub struct StaticGate {
    approve: bool,
}

impl StaticGate {
    pub fn approve_all() -> Self {
        Self { approve: true }
    }

    pub fn reject_all() -> Self {
        Self { approve: false }
    }
}

#[async_trait]
impl ApprovalGate for StaticGate {
    async fn decide(&self, request: &ApprovalRequest) -> ApprovalDecision {
        if self.approve {
            ApprovalDecision::approved(&request.tool_call_id)
        } else {
            ApprovalDecision::rejected(&request.tool_call_id, Some("rejected by policy".into()))
        }
    }
}

/// Decides with a caller-supplied predicate.
pub struct PolicyGate<F> {
    policy: F,
}

impl<F> PolicyGate<F>
where
    F: Fn(&ApprovalRequest) -> bool + Send + Sync,
{
    pub fn new(policy: F) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl<F> ApprovalGate for PolicyGate<F>
where
    F: Fn(&ApprovalRequest) -> bool + Send + Sync,
{
    async fn decide(&self, request: &ApprovalRequest) -> ApprovalDecision {
        if (self.policy)(request) {
            ApprovalDecision::approved(&request.tool_call_id)
        } else {
            ApprovalDecision::rejected(&request.tool_call_id, Some("rejected by policy".into()))
        }
    }
}

// ─── Reply Sources ──────────────────────────────────────────────────────────

/// Where an interactive gate gets its free-text answer from.
#[async_trait]
pub trait ReplySource: Send + Sync {
    async fn ask(&self, request: &ApprovalRequest) -> anyhow::Result<String>;
}

/// A host's answer to one approval prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalReply {
    /// The `tool_call_id` of the prompt being answered.
    pub tool_call_id: String,
    pub text: String,
}

impl ApprovalReply {
    pub fn new(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            text: text.into(),
        }
    }
}

/// Forwards requests over one channel and reads replies from another.
///
/// The host wires the other ends to whatever prompts the user. Replies carry
/// the id of the call they answer; a reply for any other call (one that
/// arrived after its prompt timed out, say) is discarded.
pub struct ChannelReplySource {
    prompt_tx: mpsc::Sender<ApprovalRequest>,
    reply_rx: Mutex<mpsc::Receiver<ApprovalReply>>,
}

impl ChannelReplySource {
    /// Returns the source plus the host's ends: a receiver of prompts and a
    /// sender for replies.
    pub fn new(
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ApprovalRequest>, mpsc::Sender<ApprovalReply>) {
        let (prompt_tx, prompt_rx) = mpsc::channel(capacity);
        let (reply_tx, reply_rx) = mpsc::channel(capacity);
        (
            Self {
                prompt_tx,
                reply_rx: Mutex::new(reply_rx),
            },
            prompt_rx,
            reply_tx,
        )
    }
}

#[async_trait]
impl ReplySource for ChannelReplySource {
    async fn ask(&self, request: &ApprovalRequest) -> anyhow::Result<String> {
        // Hold the receiver across send + recv so concurrent askers cannot
        // pick up each other's replies.
        let mut reply_rx = self.reply_rx.lock().await;
        while let Ok(stale) = reply_rx.try_recv() {
            tracing::debug!(answered = %stale.tool_call_id, "discarding late approval reply");
        }

        self.prompt_tx
            .send(request.clone())
            .await
            .map_err(|_| anyhow::anyhow!("approval prompt channel closed"))?;

        loop {
            let reply = reply_rx
                .recv()
                .await
                .ok_or_else(|| anyhow::anyhow!("approval reply channel closed"))?;
            if reply.tool_call_id == request.tool_call_id {
                return Ok(reply.text);
            }
            tracing::warn!(
                expected = %request.tool_call_id,
                answered = %reply.tool_call_id,
                "discarding approval reply for another call"
            );
        }
    }
}

// ─── Reply Interpreters ─────────────────────────────────────────────────────

/// Maps free text to approved / rejected. Must be total.
#[async_trait]
pub trait ReplyInterpreter: Send + Sync {
    async fn interpret(&self, reply: &str) -> ApprovalOutcome;
}

const NO_PHRASES: &[&str] = &[
    "no", "n", "nope", "don't", "dont", "do not", "stop", "cancel", "nevermind", "never mind",
    "reject", "not",
];

const YES_PHRASES: &[&str] = &[
    "yes", "y", "yep", "yeah", "ok", "okay", "sure", "go ahead", "do it", "proceed",
    "please proceed", "approve", "approved",
];

/// Deterministic phrase matcher. Any "no" phrase wins over any "yes" phrase.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordInterpreter;

impl KeywordInterpreter {
    pub fn classify(reply: &str) -> ApprovalOutcome {
        let normalized = normalize_reply(reply);
        let padded = format!(" {normalized} ");
        let has = |phrase: &&str| padded.contains(&format!(" {phrase} "));

        if NO_PHRASES.iter().any(has) {
            ApprovalOutcome::Rejected
        } else if YES_PHRASES.iter().any(has) {
            ApprovalOutcome::Approved
        } else {
            ApprovalOutcome::Rejected
        }
    }
}

#[async_trait]
impl ReplyInterpreter for KeywordInterpreter {
    async fn interpret(&self, reply: &str) -> ApprovalOutcome {
        Self::classify(reply)
    }
}

/// Lowercase, punctuation (apostrophes aside) to spaces, whitespace collapsed.
fn normalize_reply(reply: &str) -> String {
    let cleaned: String = reply
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

const INTERPRETER_SYSTEM_PROMPT: &str = "\
You are an approval interpreter. The user is responding to an approval request.
Determine if their response means \"yes\" (approved) or \"no\" (rejected).

Examples of YES: yes, ok, sure, go ahead, do it, please proceed, yep, yeah, approve
Examples of NO: no, don't, stop, cancel, nevermind, nope, reject

Respond with ONLY \"APPROVED\" or \"REJECTED\".";

/// Asks a model to classify the reply (`APPROVED` / `REJECTED` protocol).
pub struct ModelInterpreter {
    endpoint: Arc<dyn ModelEndpoint>,
    model: String,
}

impl ModelInterpreter {
    pub fn new(endpoint: Arc<dyn ModelEndpoint>, model: impl Into<String>) -> Self {
        Self {
            endpoint,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ReplyInterpreter for ModelInterpreter {
    async fn interpret(&self, reply: &str) -> ApprovalOutcome {
        let request = ModelRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(INTERPRETER_SYSTEM_PROMPT),
                Message::user(reply),
            ],
            tools: Vec::new(),
        };

        match self.endpoint.complete(request).await {
            Ok(response) => {
                let verdict = response.text().unwrap_or_default().trim().to_uppercase();
                if verdict.contains("REJECT") || verdict.contains("NOT APPROVED") {
                    ApprovalOutcome::Rejected
                } else if verdict.contains("APPROVED") {
                    ApprovalOutcome::Approved
                } else {
                    tracing::warn!(verdict = %verdict, "unclear approval verdict, treating as rejected");
                    ApprovalOutcome::Rejected
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "approval interpreter failed, treating as rejected");
                ApprovalOutcome::Rejected
            }
        }
    }
}

// ─── Interactive Gate ───────────────────────────────────────────────────────

/// Asks a reply source and interprets the answer.
///
/// Waits indefinitely unless a timeout is configured; a timeout rejects.
pub struct InteractiveGate {
    source: Arc<dyn ReplySource>,
    interpreter: Arc<dyn ReplyInterpreter>,
    timeout: Option<Duration>,
}

impl InteractiveGate {
    pub fn new(source: Arc<dyn ReplySource>, interpreter: Arc<dyn ReplyInterpreter>) -> Self {
        Self {
            source,
            interpreter,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply the `approval` section of the agent config.
    pub fn with_config(self, config: &ApprovalConfig) -> Self {
        self.with_timeout(config.timeout())
    }
}

#[async_trait]
impl ApprovalGate for InteractiveGate {
    async fn decide(&self, request: &ApprovalRequest) -> ApprovalDecision {
        let asked = self.source.ask(request);
        let reply = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, asked).await {
                Ok(reply) => reply,
                Err(_) => Err(anyhow::anyhow!("no reply within {}s", limit.as_secs_f32())),
            },
            None => asked.await,
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    tool = %request.tool_name,
                    error = %e,
                    "approval not obtained, rejecting"
                );
                return ApprovalDecision::rejected(&request.tool_call_id, Some(e.to_string()));
            }
        };

        match self.interpreter.interpret(&reply).await {
            ApprovalOutcome::Approved => ApprovalDecision::approved(&request.tool_call_id),
            ApprovalOutcome::Rejected => ApprovalDecision::rejected(
                &request.tool_call_id,
                Some(format!("user replied: {}", reply.trim())),
            ),
        }
    }
}

// ─── Previews ───────────────────────────────────────────────────────────────

/// Human-readable one-liner describing what a gated call will do.
pub fn generate_preview(tool_name: &str, arguments: &serde_json::Value) -> String {
    let field = |key: &str| {
        arguments
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown>")
            .to_string()
    };

    match tool_name {
        "send_email" => format!("Send email to: {}", field("to")),
        "generate_image" => format!("Generate image: {}", field("prompt")),
        _ => {
            let args_preview = serde_json::to_string(arguments).unwrap_or_default();
            let truncated = if args_preview.len() > 100 {
                format!("{}...", truncate_utf8(&args_preview, 100))
            } else {
                args_preview
            };
            format!("Execute {tool_name}: {truncated}")
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::test_support::ScriptedEndpoint;
    use crate::inference::types::ModelResponse;
    use serde_json::json;

    fn request(tool: &str) -> ApprovalRequest {
        request_for("call_1", tool)
    }

    fn request_for(id: &str, tool: &str) -> ApprovalRequest {
        let arguments = json!({"to": "a@b.com", "subject": "Hi"});
        ApprovalRequest {
            tool_call_id: id.into(),
            tool_name: tool.into(),
            preview: generate_preview(tool, &arguments),
            arguments,
        }
    }

    #[test]
    fn test_keyword_yes_set_approves() {
        for reply in ["yes", "Sure!", "go ahead", "Go ahead.", "OK", "yep", "yeah", "do it", "please proceed", "approve", "y"] {
            assert_eq!(KeywordInterpreter::classify(reply), ApprovalOutcome::Approved, "{reply}");
        }
    }

    #[test]
    fn test_keyword_no_set_rejects() {
        for reply in ["no", "NO!", "cancel", "stop", "nope", "don't", "Don't do it", "never mind", "nevermind", "reject"] {
            assert_eq!(KeywordInterpreter::classify(reply), ApprovalOutcome::Rejected, "{reply}");
        }
    }

    #[test]
    fn test_keyword_ambiguous_rejects() {
        for reply in ["", "   ", "maybe", "hmm, what does it do?", "not sure", "yes... actually no", "okapi"] {
            assert_eq!(KeywordInterpreter::classify(reply), ApprovalOutcome::Rejected, "{reply}");
        }
    }

    #[tokio::test]
    async fn test_static_gates() {
        let req = request("send_email");
        assert!(StaticGate::approve_all().decide(&req).await.is_approved());
        let rejected = StaticGate::reject_all().decide(&req).await;
        assert!(!rejected.is_approved());
        assert_eq!(rejected.tool_call_id, "call_1");
    }

    #[tokio::test]
    async fn test_policy_gate_uses_closure() {
        let gate = PolicyGate::new(|req: &ApprovalRequest| req.arguments["to"] == "a@b.com");
        assert!(gate.decide(&request("send_email")).await.is_approved());

        let gate = PolicyGate::new(|req: &ApprovalRequest| req.tool_name != "send_email");
        assert!(!gate.decide(&request("send_email")).await.is_approved());
    }

    #[tokio::test]
    async fn test_interactive_gate_over_channel() {
        let (source, mut prompts, replies) = ChannelReplySource::new(4);
        let gate = InteractiveGate::new(Arc::new(source), Arc::new(KeywordInterpreter));

        let host = tokio::spawn(async move {
            let prompt = prompts.recv().await.unwrap();
            assert_eq!(prompt.preview, "Send email to: a@b.com");
            replies
                .send(ApprovalReply::new(&prompt.tool_call_id, "Sure, go ahead"))
                .await
                .unwrap();
            let second = prompts.recv().await.unwrap();
            replies
                .send(ApprovalReply::new(&second.tool_call_id, "no thanks"))
                .await
                .unwrap();
        });

        assert!(gate.decide(&request("send_email")).await.is_approved());
        let second = gate.decide(&request("send_email")).await;
        assert!(!second.is_approved());
        assert_eq!(second.rationale.as_deref(), Some("user replied: no thanks"));
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_interactive_gate_timeout_rejects() {
        let (source, _prompts, _replies) = ChannelReplySource::new(4);
        let gate = InteractiveGate::new(Arc::new(source), Arc::new(KeywordInterpreter))
            .with_timeout(Some(Duration::from_millis(30)));
        let decision = gate.decide(&request("send_email")).await;
        assert!(!decision.is_approved());
        assert!(decision.rationale.unwrap().contains("no reply"));
    }

    #[tokio::test]
    async fn test_late_reply_never_answers_the_next_call() {
        let (source, mut prompts, replies) = ChannelReplySource::new(4);
        let source: Arc<dyn ReplySource> = Arc::new(source);
        let impatient = InteractiveGate::new(source.clone(), Arc::new(KeywordInterpreter))
            .with_timeout(Some(Duration::from_millis(30)));
        let gate = InteractiveGate::new(source, Arc::new(KeywordInterpreter));

        let first = impatient.decide(&request_for("c1", "send_email")).await;
        assert!(!first.is_approved());
        let prompt = prompts.recv().await.unwrap();
        assert_eq!(prompt.tool_call_id, "c1");
        replies.send(ApprovalReply::new("c1", "yes")).await.unwrap();

        let host = tokio::spawn(async move {
            let prompt = prompts.recv().await.unwrap();
            assert_eq!(prompt.tool_call_id, "c2");
            replies.send(ApprovalReply::new("c1", "yes, send it")).await.unwrap();
            replies.send(ApprovalReply::new("c2", "no")).await.unwrap();
        });

        let second = gate.decide(&request_for("c2", "send_email")).await;
        assert_eq!(second.tool_call_id, "c2");
        assert_eq!(second.outcome, ApprovalOutcome::Rejected);
        assert_eq!(second.rationale.as_deref(), Some("user replied: no"));
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_interactive_gate_takes_timeout_from_config() {
        let (source, _prompts, _replies) = ChannelReplySource::new(4);
        let gate = InteractiveGate::new(Arc::new(source), Arc::new(KeywordInterpreter))
            .with_config(&ApprovalConfig {
                timeout_secs: Some(1),
            });
        let started = std::time::Instant::now();
        let decision = gate.decide(&request("send_email")).await;
        assert!(!decision.is_approved());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_interactive_gate_closed_channel_rejects() {
        let (source, prompts, replies) = ChannelReplySource::new(4);
        drop(prompts);
        drop(replies);
        let gate = InteractiveGate::new(Arc::new(source), Arc::new(KeywordInterpreter));
        assert!(!gate.decide(&request("send_email")).await.is_approved());
    }

    #[tokio::test]
    async fn test_model_interpreter_protocol() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![
            ModelResponse::final_answer("APPROVED"),
            ModelResponse::final_answer("not approved"),
            ModelResponse::final_answer("REJECTED"),
            ModelResponse::final_answer("I am not sure"),
        ]));
        let interpreter = ModelInterpreter::new(endpoint.clone(), "gpt-4o-mini");

        assert_eq!(interpreter.interpret("sure").await, ApprovalOutcome::Approved);
        assert_eq!(interpreter.interpret("eh").await, ApprovalOutcome::Rejected);
        assert_eq!(interpreter.interpret("no").await, ApprovalOutcome::Rejected);
        assert_eq!(interpreter.interpret("??").await, ApprovalOutcome::Rejected);
        // Script exhausted: endpoint error.
        assert_eq!(interpreter.interpret("yes").await, ApprovalOutcome::Rejected);

        let requests = endpoint.requests();
        assert_eq!(requests[0].messages[1].content_str(), "sure");
        assert!(requests[0].tools.is_empty());
    }

    #[test]
    fn test_generate_preview() {
        assert_eq!(
            generate_preview("send_email", &json!({"to": "a@b.com"})),
            "Send email to: a@b.com"
        );
        assert_eq!(
            generate_preview("send_email", &json!({})),
            "Send email to: <unknown>"
        );
        let long = json!({"text": "x".repeat(300)});
        let preview = generate_preview("post_tweet", &long);
        assert!(preview.starts_with("Execute post_tweet: {\"text\":"));
        assert!(preview.ends_with("..."));
    }
}
