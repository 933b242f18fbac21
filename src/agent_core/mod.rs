//! Agent Core — the tool-using conversation runtime.
//!
//! Submodules:
//! - `conversation`: Append-only message store with tool-link validation
//! - `registry`: Tool registry (schema, risk tier, executor)
//! - `compaction`: Window / token-budget / summarizing history views
//! - `approval`: Approval gates, reply sources and reply interpreters
//! - `tool_router`: Validates, gates and executes model tool requests
//! - `orchestrator`: Per-conversation turn state machine
//! - `evaluation`: Tool-selection eval harness
//! - `tokens`: Token estimation for budgets
//! - `config`: YAML configuration with env interpolation
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod approval;
pub mod compaction;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod evaluation;
pub mod orchestrator;
pub mod registry;
pub mod tokens;
pub mod tool_router;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use approval::{
    ApprovalGate, ApprovalReply, ChannelReplySource, InteractiveGate, KeywordInterpreter,
    ModelInterpreter, PolicyGate, ReplyInterpreter, ReplySource, StaticGate,
};
pub use compaction::{CompactionPolicy, ContextCompactor};
pub use config::{AgentConfig, LoggingConfig};
pub use conversation::MessageStore;
pub use errors::AgentError;
pub use evaluation::{run_experiment, EvalCase, EvalResult, ExperimentReport};
pub use orchestrator::{CancelHandle, Orchestrator};
pub use registry::{executor_fn, RiskTier, ToolExecutor, ToolRegistry, ToolSpec};
pub use tool_router::{ToolCallResult, ToolRouter, REJECTION_MARKER};
pub use types::{
    ApprovalDecision, ApprovalOutcome, ApprovalRequest, AuditEntry, AuditStatus, TurnOutcome,
    TurnState,
};
