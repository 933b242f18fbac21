//! Agent Core error types.
//!
//! Per-call problems (`UnknownTool`, `InvalidArguments`, `ToolExecution`) are
//! normally turned into tool-result messages by the dispatcher and fed back
//! to the model. They only surface as `Err` from the registry's own API.
//! Turn-fatal conditions carry the conversation id so a caller can diagnose
//! them without access to internal state.

use thiserror::Error;

use crate::inference::errors::InferenceError;

/// Errors that can occur during agent core operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A tool with this name is already registered.
    #[error("tool '{name}' is already registered")]
    DuplicateTool { name: String },

    /// The model asked for a tool the registry does not know.
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    /// Arguments could not be parsed or did not match the tool's schema.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The executor failed (error, panic or timeout).
    #[error("tool '{tool}' failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    /// The model kept requesting tools past the configured round limit.
    #[error(
        "conversation {conversation_id}: model still requesting tools after {rounds} rounds (last: {})",
        last_tools.join(", ")
    )]
    RunawayToolLoop {
        conversation_id: String,
        rounds: usize,
        last_tools: Vec<String>,
    },

    /// The summarizer failed; compaction recovers by window slicing.
    #[error("summarization failed: {reason}")]
    SummarizationFailed { reason: String },

    /// The model endpoint returned an error. Not retried by the runtime.
    #[error("conversation {conversation_id}: model endpoint error: {source}")]
    ModelEndpoint {
        conversation_id: String,
        #[source]
        source: InferenceError,
    },

    /// A tool result did not answer an open request.
    #[error("tool result '{tool_call_id}' does not answer an open tool call")]
    OrphanToolResult { tool_call_id: String },

    /// A tool call id was reused within the conversation.
    #[error("tool call id '{tool_call_id}' is already used in this conversation")]
    DuplicateCallId { tool_call_id: String },

    /// A message was appended while tool calls were still unanswered.
    #[error("turn incomplete: {} tool call(s) unanswered ({})", open.len(), open.join(", "))]
    IncompleteTurn { open: Vec<String> },

    /// The turn was cancelled between suspension points; nothing was persisted.
    #[error("conversation {conversation_id}: turn cancelled")]
    Cancelled { conversation_id: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl AgentError {
    /// Whether this error aborts the whole turn (as opposed to a per-call
    /// problem that the dispatcher reports back to the model).
    pub fn is_turn_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::RunawayToolLoop { .. }
                | AgentError::ModelEndpoint { .. }
                | AgentError::Cancelled { .. }
                | AgentError::OrphanToolResult { .. }
                | AgentError::DuplicateCallId { .. }
                | AgentError::IncompleteTurn { .. }
                | AgentError::ConfigError { .. }
        )
    }
}

impl From<serde_yaml::Error> for AgentError {
    fn from(e: serde_yaml::Error) -> Self {
        AgentError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        }
    }
}
