//! ToolRouter — turns one assistant turn's tool requests into tool results.
//!
//! For every request, in order:
//! 1. Resolve the tool in the registry
//! 2. Parse the raw argument text and validate it against the schema
//! 3. For gated tools, ask the approval gate
//! 4. Execute (panics and timeouts caught)
//!
//! Every failure along the way becomes a structured error result for the
//! model to react to; nothing here aborts the turn. Approvals are requested
//! sequentially in request order. Approved executions of one round run
//! concurrently when `parallel` is on, and results always come back in
//! request order.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use futures::FutureExt;

use crate::inference::tool_call_parser::parse_arguments;
use crate::inference::types::{Message, ToolCallRequest};

use super::approval::{generate_preview, ApprovalGate};
use super::config::DispatchConfig;
use super::errors::AgentError;
use super::registry::{ToolRegistry, ToolSpec};
use super::tokens::truncate_utf8;
use super::types::{ApprovalRequest, AuditEntry, AuditStatus};

/// Error text carried by every rejected call's result.
pub const REJECTION_MARKER: &str = "Action not approved by user";

// ─── Results ────────────────────────────────────────────────────────────────

/// The outcome of one dispatched tool request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Parsed arguments (`null` when parsing failed).
    pub arguments: serde_json::Value,
    pub status: AuditStatus,
    /// Serialized result, error or rejection, as the model will see it.
    pub content: String,
    /// An approval decision was obtained and was positive.
    pub user_confirmed: bool,
    pub execution_time_ms: u64,
}

impl ToolCallResult {
    /// The tool-result message answering this request.
    pub fn to_message(&self) -> Message {
        Message::tool_result(&self.tool_call_id, &self.content)
    }

    pub fn to_audit_entry(&self, conversation_id: &str) -> AuditEntry {
        AuditEntry {
            conversation_id: conversation_id.to_string(),
            tool_call_id: self.tool_call_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            tool_name: self.tool_name.clone(),
            arguments: self.arguments.clone(),
            result_status: self.status,
            user_confirmed: self.user_confirmed,
            execution_time_ms: self.execution_time_ms,
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.status == AuditStatus::RejectedByUser
    }
}

/// A request that cleared validation and approval.
struct Approved<'a> {
    call: &'a ToolCallRequest,
    spec: &'a ToolSpec,
    arguments: serde_json::Value,
    user_confirmed: bool,
    started: Instant,
}

/// Per-request slot, filled in request order.
enum Slot<'a> {
    Done(ToolCallResult),
    Pending(Approved<'a>),
}

// ─── ToolRouter ─────────────────────────────────────────────────────────────

/// Dispatches tool requests against a frozen registry.
pub struct ToolRouter {
    registry: Arc<ToolRegistry>,
    gate: Arc<dyn ApprovalGate>,
    config: DispatchConfig,
}

impl ToolRouter {
    pub fn new(
        registry: Arc<ToolRegistry>,
        gate: Arc<dyn ApprovalGate>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            gate,
            config,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Dispatch one round of tool requests. One result per request, in
    /// request order.
    pub async fn dispatch(&self, calls: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        let mut slots = Vec::with_capacity(calls.len());

        for call in calls {
            let slot = self.prepare(call).await;
            let slot = match slot {
                Slot::Pending(approved) if !self.config.parallel => {
                    Slot::Done(self.run(approved).await)
                }
                other => other,
            };
            slots.push(slot);
        }

        let pending = slots.iter().filter(|s| matches!(s, Slot::Pending(_))).count();
        if pending > 1 {
            tracing::debug!(count = pending, "executing tool calls concurrently");
        }

        join_all(slots.into_iter().map(|slot| async move {
            match slot {
                Slot::Done(result) => result,
                Slot::Pending(approved) => self.run(approved).await,
            }
        }))
        .await
    }

    /// Resolve, parse, validate and (if gated) approve one request.
    async fn prepare<'a>(&'a self, call: &'a ToolCallRequest) -> Slot<'a> {
        let started = Instant::now();

        let spec = match self.registry.resolve(&call.name) {
            Ok(spec) => spec,
            Err(e) => return Slot::Done(self.failed(call, serde_json::Value::Null, &e, started)),
        };

        let arguments = match parse_arguments(&call.arguments, self.config.repair_arguments) {
            Ok(v) => v,
            Err(e) => {
                let err = AgentError::InvalidArguments {
                    tool: call.name.clone(),
                    reason: e.to_string(),
                };
                return Slot::Done(self.failed(call, serde_json::Value::Null, &err, started));
            }
        };

        if let Err(e) = self.registry.validate_arguments(&call.name, &arguments) {
            return Slot::Done(self.failed(call, arguments, &e, started));
        }

        let mut user_confirmed = false;
        if self.registry.requires_approval(&spec.name) {
            let request = ApprovalRequest {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                preview: generate_preview(&call.name, &arguments),
                arguments: arguments.clone(),
            };
            let decision = self.gate.decide(&request).await;
            tracing::info!(
                tool = %call.name,
                tool_call_id = %call.id,
                outcome = ?decision.outcome,
                "approval decided"
            );

            if !decision.is_approved() {
                let content = serde_json::json!({
                    "error": REJECTION_MARKER,
                    "status": "rejected",
                    "rationale": decision.rationale,
                })
                .to_string();
                return Slot::Done(self.finish(
                    call,
                    arguments,
                    AuditStatus::RejectedByUser,
                    content,
                    false,
                    started,
                ));
            }
            user_confirmed = true;
        }

        Slot::Pending(Approved {
            call,
            spec,
            arguments,
            user_confirmed,
            started,
        })
    }

    /// Execute an approved request.
    async fn run(&self, approved: Approved<'_>) -> ToolCallResult {
        let Approved {
            call,
            spec,
            arguments,
            user_confirmed,
            started,
        } = approved;

        let execution = AssertUnwindSafe(spec.executor.execute(arguments.clone())).catch_unwind();
        let outcome = match self.config.tool_timeout() {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let err = AgentError::ToolExecution {
                        tool: call.name.clone(),
                        reason: format!("timed out after {}s", limit.as_secs()),
                    };
                    return self.failed(call, arguments, &err, started);
                }
            },
            None => execution.await,
        };

        match outcome {
            Ok(Ok(value)) => {
                let content = match value {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                self.finish(call, arguments, AuditStatus::Success, content, user_confirmed, started)
            }
            Ok(Err(e)) => {
                let err = AgentError::ToolExecution {
                    tool: call.name.clone(),
                    reason: format!("{e:#}"),
                };
                self.failed(call, arguments, &err, started)
            }
            Err(payload) => {
                let err = AgentError::ToolExecution {
                    tool: call.name.clone(),
                    reason: format!("executor panicked: {}", panic_message(payload.as_ref())),
                };
                self.failed(call, arguments, &err, started)
            }
        }
    }

    // ─── Result Builders ────────────────────────────────────────────────

    fn failed(
        &self,
        call: &ToolCallRequest,
        arguments: serde_json::Value,
        error: &AgentError,
        started: Instant,
    ) -> ToolCallResult {
        let content = serde_json::json!({ "error": error.to_string() }).to_string();
        self.finish(call, arguments, AuditStatus::Error, content, false, started)
    }

    fn finish(
        &self,
        call: &ToolCallRequest,
        arguments: serde_json::Value,
        status: AuditStatus,
        content: String,
        user_confirmed: bool,
        started: Instant,
    ) -> ToolCallResult {
        let execution_time_ms = started.elapsed().as_millis() as u64;
        let content = self.truncate_result(content);

        match status {
            AuditStatus::Error => tracing::warn!(
                tool = %call.name,
                tool_call_id = %call.id,
                elapsed_ms = execution_time_ms,
                content = %content,
                "tool call failed"
            ),
            _ => tracing::info!(
                tool = %call.name,
                tool_call_id = %call.id,
                status = status.as_str(),
                elapsed_ms = execution_time_ms,
                "tool call dispatched"
            ),
        }

        ToolCallResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments,
            status,
            content,
            user_confirmed,
            execution_time_ms,
        }
    }

    /// Cut oversized results on a char boundary, with a note for the model.
    fn truncate_result(&self, content: String) -> String {
        let limit = self.config.max_result_chars;
        if content.len() <= limit {
            return content;
        }
        let kept = truncate_utf8(&content, limit);
        format!(
            "{kept}\n[truncated: showing {} of {} bytes]",
            kept.len(),
            content.len()
        )
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use crate::agent_core::approval::{PolicyGate, StaticGate};
    use crate::agent_core::registry::executor_fn;
    use crate::agent_core::test_support::{demo_registry, CountingExecutor, PanickingExecutor};

    fn call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    fn router(registry: ToolRegistry, gate: Arc<dyn ApprovalGate>) -> ToolRouter {
        ToolRouter::new(Arc::new(registry), gate, DispatchConfig::default())
    }

    fn error_of(result: &ToolCallResult) -> String {
        let v: serde_json::Value = serde_json::from_str(&result.content).unwrap();
        v["error"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_weather_call_succeeds() {
        let (registry, tools) = demo_registry();
        let router = router(registry, Arc::new(StaticGate::reject_all()));
        let results = router
            .dispatch(&[call("c1", "get_weather", r#"{"location":"Tokyo"}"#)])
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, AuditStatus::Success);
        assert!(results[0].content.contains("sunny"));
        assert!(!results[0].user_confirmed);
        assert_eq!(tools.weather.calls(), 1);

        let msg = results[0].to_message();
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_result() {
        let (registry, _) = demo_registry();
        let router = router(registry, Arc::new(StaticGate::approve_all()));
        let results = router.dispatch(&[call("c1", "launch_rocket", "{}")]).await;
        assert_eq!(results[0].status, AuditStatus::Error);
        assert_eq!(error_of(&results[0]), "unknown tool: 'launch_rocket'");
    }

    #[tokio::test]
    async fn test_malformed_arguments_never_reach_executor() {
        let (registry, tools) = demo_registry();
        let router = router(registry, Arc::new(StaticGate::approve_all()));
        let results = router
            .dispatch(&[
                call("c1", "get_weather", r#"{"location": "Tokyo",}"#),
                call("c2", "get_weather", r#"{"city": "Tokyo"}"#),
                call("c3", "get_weather", r#"["Tokyo"]"#),
            ])
            .await;

        assert!(results.iter().all(|r| r.status == AuditStatus::Error));
        assert!(error_of(&results[0]).starts_with("invalid arguments for 'get_weather'"));
        assert!(error_of(&results[1]).contains("missing required field: 'location'"));
        assert!(results[0].arguments.is_null());
        assert_eq!(tools.weather.calls(), 0);
    }

    #[tokio::test]
    async fn test_repair_when_enabled() {
        let (registry, tools) = demo_registry();
        let config = DispatchConfig {
            repair_arguments: true,
            ..DispatchConfig::default()
        };
        let router = ToolRouter::new(Arc::new(registry), Arc::new(StaticGate::approve_all()), config);
        let results = router
            .dispatch(&[call("c1", "get_weather", r#"{"location": "Tokyo",}"#)])
            .await;
        assert_eq!(results[0].status, AuditStatus::Success);
        assert_eq!(tools.weather.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_call_never_executes() {
        let (registry, tools) = demo_registry();
        let router = router(registry, Arc::new(StaticGate::reject_all()));
        let results = router
            .dispatch(&[call("c1", "send_email", r#"{"to":"a@b.com"}"#)])
            .await;

        assert!(results[0].is_rejected());
        assert_eq!(error_of(&results[0]), REJECTION_MARKER);
        assert!(results[0].content.contains("\"status\":\"rejected\""));
        assert!(!results[0].user_confirmed);
        assert_eq!(tools.email.calls(), 0);
    }

    #[tokio::test]
    async fn test_rejection_does_not_short_circuit_later_calls() {
        let (registry, tools) = demo_registry();
        let gate = PolicyGate::new(|req: &ApprovalRequest| req.arguments["to"] == "ok@b.com");
        let router = router(registry, Arc::new(gate));
        let results = router
            .dispatch(&[
                call("c1", "send_email", r#"{"to":"no@b.com"}"#),
                call("c2", "send_email", r#"{"to":"ok@b.com"}"#),
            ])
            .await;

        assert!(results[0].is_rejected());
        assert_eq!(results[1].status, AuditStatus::Success);
        assert!(results[1].user_confirmed);
        assert_eq!(tools.email.calls(), 1);
    }

    #[tokio::test]
    async fn test_executor_failure_and_panic_are_contained() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec::new("flaky", "fails", json!({"type": "object"}), CountingExecutor::failing("disk full")))
            .unwrap();
        registry
            .register(ToolSpec::new("boom", "panics", json!({"type": "object"}), Arc::new(PanickingExecutor)))
            .unwrap();
        let router = router(registry, Arc::new(StaticGate::approve_all()));

        let results = router
            .dispatch(&[call("c1", "flaky", "{}"), call("c2", "boom", "")])
            .await;
        assert_eq!(error_of(&results[0]), "tool 'flaky' failed: disk full");
        assert_eq!(error_of(&results[1]), "tool 'boom' failed: executor panicked: executor blew up");
    }

    #[tokio::test]
    async fn test_timeout_becomes_error_result() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec::new(
                "slow",
                "sleeps",
                json!({"type": "object"}),
                executor_fn(|_| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!("late"))
                }),
            ))
            .unwrap();
        let config = DispatchConfig {
            tool_timeout_secs: Some(1),
            ..DispatchConfig::default()
        };
        let router = ToolRouter::new(Arc::new(registry), Arc::new(StaticGate::approve_all()), config);
        let results = router.dispatch(&[call("c1", "slow", "{}")]).await;
        assert_eq!(error_of(&results[0]), "tool 'slow' failed: timed out after 1s");
    }

    #[tokio::test]
    async fn test_parallel_runs_concurrently_and_keeps_order() {
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let mut registry = ToolRegistry::new();
        for (name, delay) in [("first", 40u64), ("second", 0u64)] {
            let barrier = barrier.clone();
            registry
                .register(ToolSpec::new(
                    name,
                    name,
                    json!({"type": "object"}),
                    executor_fn(move |_| {
                        let barrier = barrier.clone();
                        async move {
                            barrier.wait().await;
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                            Ok(json!(name))
                        }
                    }),
                ))
                .unwrap();
        }
        let router = router(registry, Arc::new(StaticGate::approve_all()));

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            router.dispatch(&[call("a", "first", "{}"), call("b", "second", "{}")]),
        )
        .await
        .expect("executions should overlap");

        let ids: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(results[0].content, "first");
        assert_eq!(results[1].content, "second");
    }

    #[tokio::test]
    async fn test_approval_order_sequential_vs_parallel() {
        async fn events_for(parallel: bool) -> Vec<String> {
            let events = Arc::new(Mutex::new(Vec::new()));
            let mut registry = ToolRegistry::new();
            let exec_events = events.clone();
            registry
                .register(
                    ToolSpec::new(
                        "send_email",
                        "Send",
                        json!({"type": "object"}),
                        executor_fn(move |args: serde_json::Value| {
                            let events = exec_events.clone();
                            async move {
                                events.lock().unwrap().push(format!("exec:{}", args["to"].as_str().unwrap()));
                                Ok(json!({"status": "sent"}))
                            }
                        }),
                    )
                    .requires_approval(),
                )
                .unwrap();
            let gate_events = events.clone();
            let gate = PolicyGate::new(move |req: &ApprovalRequest| {
                gate_events
                    .lock()
                    .unwrap()
                    .push(format!("approve:{}", req.arguments["to"].as_str().unwrap()));
                true
            });
            let config = DispatchConfig {
                parallel,
                ..DispatchConfig::default()
            };
            let router = ToolRouter::new(Arc::new(registry), Arc::new(gate), config);
            router
                .dispatch(&[
                    call("c1", "send_email", r#"{"to":"x"}"#),
                    call("c2", "send_email", r#"{"to":"y"}"#),
                ])
                .await;
            let recorded = events.lock().unwrap().clone();
            recorded
        }

        assert_eq!(events_for(false).await, vec!["approve:x", "exec:x", "approve:y", "exec:y"]);
        let parallel = events_for(true).await;
        assert_eq!(&parallel[..2], &["approve:x", "approve:y"]);
        assert_eq!(parallel.len(), 4);
    }

    #[tokio::test]
    async fn test_large_results_are_truncated() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec::new(
                "dump",
                "big",
                json!({"type": "object"}),
                CountingExecutor::returning(json!("é".repeat(100))),
            ))
            .unwrap();
        let config = DispatchConfig {
            max_result_chars: 51,
            ..DispatchConfig::default()
        };
        let router = ToolRouter::new(Arc::new(registry), Arc::new(StaticGate::approve_all()), config);
        let results = router.dispatch(&[call("c1", "dump", "{}")]).await;
        assert!(results[0].content.starts_with(&"é".repeat(25)));
        assert!(results[0].content.ends_with("[truncated: showing 50 of 200 bytes]"));
    }

    #[tokio::test]
    async fn test_audit_entry_mirrors_result() {
        let (registry, _) = demo_registry();
        let router = router(registry, Arc::new(StaticGate::approve_all()));
        let results = router
            .dispatch(&[call("c1", "send_email", r#"{"to":"a@b.com"}"#)])
            .await;
        let entry = results[0].to_audit_entry("conv-1");
        assert_eq!(entry.conversation_id, "conv-1");
        assert_eq!(entry.tool_name, "send_email");
        assert_eq!(entry.result_status, AuditStatus::Success);
        assert!(entry.user_confirmed);
        assert_eq!(entry.arguments["to"], "a@b.com");
    }
}
