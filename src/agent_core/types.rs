//! Shared types for the agent core.
//!
//! Approval requests and decisions, audit entries, and the orchestrator's
//! turn state, used across the ToolRouter, ApprovalGate and Orchestrator.

use serde::{Deserialize, Serialize};

// ─── Approval ───────────────────────────────────────────────────────────────

/// What the approval gate is asked to decide on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// The request being gated.
    pub tool_call_id: String,
    /// The tool being called.
    pub tool_name: String,
    /// Validated arguments.
    pub arguments: serde_json::Value,
    /// Human-readable preview of what will happen.
    pub preview: String,
}

/// Outcome of an approval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved,
    Rejected,
}

/// One decision per gated tool call. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub tool_call_id: String,
    pub outcome: ApprovalOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl ApprovalDecision {
    pub fn approved(tool_call_id: &str) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            outcome: ApprovalOutcome::Approved,
            rationale: None,
        }
    }

    pub fn rejected(tool_call_id: &str, rationale: Option<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            outcome: ApprovalOutcome::Rejected,
            rationale,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.outcome == ApprovalOutcome::Approved
    }
}

// ─── Audit Log ──────────────────────────────────────────────────────────────

/// A single entry in the tool execution audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Conversation this entry belongs to.
    pub conversation_id: String,
    /// The request this entry records.
    pub tool_call_id: String,
    /// ISO 8601 timestamp.
    pub timestamp: String,
    /// The tool that was requested.
    pub tool_name: String,
    /// Parsed arguments (`null` when they failed to parse).
    pub arguments: serde_json::Value,
    /// Execution status.
    pub result_status: AuditStatus,
    /// Whether an approval decision was obtained and was positive.
    pub user_confirmed: bool,
    /// How long dispatch took (ms), approval wait included.
    pub execution_time_ms: u64,
}

/// Status of a tool call in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Executor returned a result.
    Success,
    /// Unknown tool, invalid arguments, or executor failure.
    Error,
    /// The approval gate rejected the call.
    RejectedByUser,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Error => "error",
            AuditStatus::RejectedByUser => "rejected_by_user",
        }
    }
}

// ─── Orchestrator State ─────────────────────────────────────────────────────

/// Where the orchestrator is in the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    AwaitingInput,
    ModelCall,
    DispatchingTools,
    Finished,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::AwaitingInput => "awaiting_input",
            TurnState::ModelCall => "model_call",
            TurnState::DispatchingTools => "dispatching_tools",
            TurnState::Finished => "finished",
        }
    }
}

/// What a completed turn hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The final assistant answer.
    pub answer: String,
    /// Number of tool rounds the turn went through.
    pub tool_rounds: usize,
    /// Names of every tool requested during the turn, in request order.
    pub tools_called: Vec<String>,
}

// ─── Tests ──────────────────────────────────────────────────────────────────
