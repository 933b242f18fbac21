//! Context compaction — derive a bounded view of the conversation for the
//! next model call without touching stored history.
//!
//! Policies:
//! - **Window**: every system message plus the last `max_messages` others.
//! - **TokenBudget**: every system message plus as many recent messages as
//!   fit under the budget, picked back-to-front, stopping at the first one
//!   that would overflow.
//! - **Summarize**: once the non-system count exceeds the window, the old
//!   prefix is replaced by one synthesized system message carrying its
//!   summary.
//! - **Hierarchical**: pinned long-term facts, a summary of the old prefix,
//!   then the recent window verbatim.
//!
//! Summaries are cached on a SHA-256 of the transcript they were built from,
//! so re-compacting an unchanged prefix never calls the summarizer twice. A
//! failing (or missing) summarizer degrades to window slicing.
//!
//! A cut never separates a tool request from its results: when the window
//! boundary lands on tool results, it moves back to the assistant message
//! that requested them, so the whole group stays visible.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::inference::summarizer::Summarizer;
use crate::inference::types::{Message, Role};

use super::config::{CompactionConfig, CompactionStrategy};
use super::errors::AgentError;
use super::tokens::{self, CostFn};

/// Prefix of the synthesized summary message.
pub const SUMMARY_PREFIX: &str = "Previous conversation summary:";

/// Prefix of the pinned-facts message used by the hierarchical policy.
pub const FACTS_PREFIX: &str = "Long-term facts:";

// ─── Policy ─────────────────────────────────────────────────────────────────

/// How a conversation's history is bounded before each model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionPolicy {
    Window { max_messages: usize },
    TokenBudget { budget: u32 },
    Summarize { window: usize },
    Hierarchical { window: usize },
}

impl CompactionPolicy {
    pub fn from_config(config: &CompactionConfig) -> Self {
        match config.strategy {
            CompactionStrategy::Window => CompactionPolicy::Window {
                max_messages: config.max_messages,
            },
            CompactionStrategy::TokenBudget => CompactionPolicy::TokenBudget {
                budget: config.token_budget,
            },
            CompactionStrategy::Summarize => CompactionPolicy::Summarize {
                window: config.summary_window,
            },
            CompactionStrategy::Hierarchical => CompactionPolicy::Hierarchical {
                window: config.summary_window,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompactionPolicy::Window { .. } => "window",
            CompactionPolicy::TokenBudget { .. } => "token_budget",
            CompactionPolicy::Summarize { .. } => "summarize",
            CompactionPolicy::Hierarchical { .. } => "hierarchical",
        }
    }
}

// ─── State ──────────────────────────────────────────────────────────────────

/// Per-conversation working memory of the compactor.
#[derive(Debug, Clone, Default)]
pub struct CompactionState {
    /// `sha256(transcript) → summary`.
    summaries: HashMap<String, String>,
    /// Summary used by the most recent compaction, if any.
    last_summary: Option<String>,
    /// Facts pinned for the hierarchical policy.
    facts: Vec<String>,
}

impl CompactionState {
    pub fn last_summary(&self) -> Option<&str> {
        self.last_summary.as_deref()
    }

    pub fn facts(&self) -> &[String] {
        &self.facts
    }

    pub fn cached_summaries(&self) -> usize {
        self.summaries.len()
    }
}

// ─── ContextCompactor ───────────────────────────────────────────────────────

/// Applies one [`CompactionPolicy`] for one conversation.
pub struct ContextCompactor {
    policy: CompactionPolicy,
    cost_fn: CostFn,
    summarizer: Option<Arc<dyn Summarizer>>,
    state: CompactionState,
}

impl ContextCompactor {
    pub fn new(policy: CompactionPolicy) -> Self {
        Self {
            policy,
            cost_fn: tokens::default_cost_fn(),
            summarizer: None,
            state: CompactionState::default(),
        }
    }

    /// Use `summarizer` for the summarize and hierarchical policies.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Replace the token estimator used by the token-budget policy.
    pub fn with_cost_fn(mut self, cost_fn: CostFn) -> Self {
        self.cost_fn = cost_fn;
        self
    }

    pub fn policy(&self) -> CompactionPolicy {
        self.policy
    }

    pub fn state(&self) -> &CompactionState {
        &self.state
    }

    /// Pin a long-term fact (hierarchical policy). Duplicates are ignored.
    pub fn pin_fact(&mut self, fact: impl Into<String>) {
        let fact = fact.into();
        if !self.state.facts.contains(&fact) {
            self.state.facts.push(fact);
        }
    }

    /// Forget cached summaries and the last summary. Pinned facts stay.
    pub fn reset(&mut self) {
        self.state.summaries.clear();
        self.state.last_summary = None;
    }

    /// Produce the bounded view for the next model call.
    pub async fn compact(&mut self, messages: &[Message]) -> Vec<Message> {
        let view = match self.policy {
            CompactionPolicy::Window { max_messages } => window_slice(messages, max_messages),
            CompactionPolicy::TokenBudget { budget } => {
                token_budget_slice(messages, budget, &self.cost_fn)
            }
            CompactionPolicy::Summarize { window } => self.summarize(messages, window).await,
            CompactionPolicy::Hierarchical { window } => {
                self.hierarchical(messages, window).await
            }
        };

        if view.len() != messages.len() {
            tracing::debug!(
                policy = self.policy.name(),
                before = messages.len(),
                after = view.len(),
                "history compacted"
            );
        }
        view
    }

    async fn summarize(&mut self, messages: &[Message], window: usize) -> Vec<Message> {
        let (system, rest) = partition_system(messages);
        if rest.len() <= window {
            return messages.to_vec();
        }

        // The summary message takes one slot, so at least two messages must
        // be folded for the view to shrink.
        let split = (rest.len() - window).max(2).min(rest.len());
        let (old, recent) = split_clean(&rest, split);
        if old.len() < 2 {
            tracing::debug!(window, "every cut splits the current tool round, not summarizing");
            return messages.to_vec();
        }

        match self.summary_for(&old).await {
            Ok(summary) => {
                let mut view = system;
                view.push(summary_message(&summary));
                view.extend(recent);
                view
            }
            Err(e) => {
                tracing::warn!(error = %e, window, "summarization failed, falling back to window slicing");
                window_slice(messages, window)
            }
        }
    }

    async fn hierarchical(&mut self, messages: &[Message], window: usize) -> Vec<Message> {
        let (mut view, rest) = partition_system(messages);
        if !self.state.facts.is_empty() {
            let lines: Vec<String> = self.state.facts.iter().map(|f| format!("- {f}")).collect();
            view.push(Message::system(format!("{FACTS_PREFIX}\n{}", lines.join("\n"))));
        }

        if rest.len() <= window {
            view.extend(rest);
            return view;
        }

        let (old, recent) = split_clean(&rest, rest.len() - window);
        if old.is_empty() {
            view.extend(recent);
            return view;
        }
        match self.summary_for(&old).await {
            Ok(summary) => view.push(summary_message(&summary)),
            Err(e) => {
                tracing::warn!(error = %e, window, "summarization failed, keeping recent window only");
            }
        }
        view.extend(recent);
        view
    }

    /// Summary of `old`, from cache when the same prefix was seen before.
    async fn summary_for(&mut self, old: &[Message]) -> Result<String, AgentError> {
        let summarizer = self
            .summarizer
            .clone()
            .ok_or_else(|| AgentError::SummarizationFailed {
                reason: "no summarizer configured".into(),
            })?;

        let transcript = transcript_of(old);
        let key = format!("{:x}", Sha256::digest(transcript.as_bytes()));

        if let Some(cached) = self.state.summaries.get(&key) {
            tracing::debug!(messages = old.len(), "summary cache hit");
            self.state.last_summary = Some(cached.clone());
            return Ok(cached.clone());
        }

        let summary = summarizer
            .summarize(&transcript)
            .await
            .map_err(|e| AgentError::SummarizationFailed {
                reason: format!("{e:#}"),
            })?;

        tracing::info!(
            messages = old.len(),
            summary_chars = summary.len(),
            "old history summarized"
        );
        self.state.summaries.insert(key, summary.clone());
        self.state.last_summary = Some(summary.clone());
        Ok(summary)
    }
}

// ─── Stateless Policies ─────────────────────────────────────────────────────

/// Every system message plus the last `max_messages` non-system messages.
///
/// When the boundary falls inside a tool round, the window grows back to the
/// requesting assistant message.
pub fn window_slice(messages: &[Message], max_messages: usize) -> Vec<Message> {
    let (mut view, rest) = partition_system(messages);
    if rest.len() <= max_messages {
        return messages.to_vec();
    }
    let cut = align_cut(&rest, rest.len() - max_messages);
    view.extend_from_slice(&rest[cut..]);
    view
}

/// Every system message plus the longest recent suffix whose total cost
/// stays within `budget`.
///
/// Selection runs back-to-front and stops at the first message that would
/// overflow. A tool round (request plus results) is taken whole or not at
/// all. If the system messages alone exceed the budget, only they are
/// returned.
pub fn token_budget_slice(messages: &[Message], budget: u32, cost: &CostFn) -> Vec<Message> {
    let (mut view, rest) = partition_system(messages);
    let system_cost = tokens::sequence_cost(&view, cost);
    if system_cost > budget {
        tracing::warn!(system_cost, budget, "system messages alone exceed the token budget");
        return view;
    }

    let mut total = system_cost;
    let mut start = rest.len();
    while start > 0 {
        let mut from = start - 1;
        if rest[from].role == Role::Tool {
            match request_of(&rest, from) {
                Some(request) => from = request,
                None => break,
            }
        }
        match total.checked_add(tokens::sequence_cost(&rest[from..start], cost)) {
            Some(next) if next <= budget => total = next,
            _ => break,
        }
        start = from;
    }

    view.extend_from_slice(&rest[start..]);
    view
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Split into (system messages, everything else), both in order.
fn partition_system(messages: &[Message]) -> (Vec<Message>, Vec<Message>) {
    messages.iter().cloned().partition(Message::is_system)
}

/// Index of the assistant message that requested the tool result at `i`.
fn request_of(rest: &[Message], i: usize) -> Option<usize> {
    let j = rest[..i].iter().rposition(|m| m.role != Role::Tool)?;
    (!rest[j].requested_calls().is_empty()).then_some(j)
}

/// Move a cut that lands on tool results back to their request. Results
/// with no request in sight are orphans and get skipped instead.
fn align_cut(rest: &[Message], at: usize) -> usize {
    if rest.get(at).map_or(true, |m| m.role != Role::Tool) {
        return at;
    }
    match request_of(rest, at) {
        Some(request) => request,
        None => at + rest[at..].iter().take_while(|m| m.role == Role::Tool).count(),
    }
}

/// Split into (old, recent) at `at`, keeping tool rounds in the recent part.
fn split_clean(rest: &[Message], at: usize) -> (Vec<Message>, Vec<Message>) {
    let at = align_cut(rest, at);
    (rest[..at].to_vec(), rest[at..].to_vec())
}

fn summary_message(summary: &str) -> Message {
    Message::system(format!("{SUMMARY_PREFIX}\n{summary}"))
}

/// Render messages as `role: content` blocks for the summarizer.
fn transcript_of(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let calls = m.requested_calls();
            if m.content.is_none() && !calls.is_empty() {
                let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
                format!("{}: [tool calls: {}]", m.role.as_str(), names.join(", "))
            } else {
                format!("{}: {}", m.role.as_str(), m.content_str())
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ─── Tests ──────────────────────────────────────────────────────────────────
