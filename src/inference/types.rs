//! Shared types for the model endpoint contract.
//!
//! These mirror the OpenAI Chat Completions shapes: the runtime sends an
//! ordered message sequence plus tool schemas, and gets back either a final
//! answer or a list of requested tool invocations with raw argument text.

use serde::{Deserialize, Serialize};

// ─── Messages ───────────────────────────────────────────────────────────────

/// A single message in the conversation.
///
/// Serialization notes for OpenAI-compatible endpoints:
/// - `content` is emitted as `""` (not `null`) for assistant messages that
///   only carry tool calls. Many local runtimes mishandle `null` content.
/// - `tool_call_id` and `tool_calls` are skipped when `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Assistant messages may request tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// Tool results link back to the request they answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Custom serializer for `content`: emit `""` instead of `null` when `None`.
fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

impl Message {
    /// A system instruction.
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    /// A user request.
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    /// A final assistant answer (no tool requests).
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// An assistant message carrying tool requests. Empty content becomes `None`.
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.filter(|c| !c.is_empty()),
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// A tool result answering the request with id `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Tool requests carried by this message (empty for anything but
    /// tool-requesting assistant messages).
    pub fn requested_calls(&self) -> &[ToolCallRequest] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    /// Content as `&str`, empty when absent.
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model, as stored in history.
///
/// `arguments` is the raw text the model produced. It is parsed and
/// validated by the dispatcher, never trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique within the conversation.
    pub id: String,
    pub name: String,
    pub arguments: String,
}

// ─── Tool Schemas ───────────────────────────────────────────────────────────

/// Tool definition sent in the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition within a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

// ─── Endpoint Request / Response ────────────────────────────────────────────

/// One call to the language model endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// What the endpoint answered.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    /// No tool requests: the turn is done.
    FinalAnswer { content: String },
    /// One or more tool invocations, in the order the model wants them run.
    ToolCalls {
        content: Option<String>,
        calls: Vec<RawToolCall>,
    },
}

impl ModelResponse {
    pub fn final_answer(content: impl Into<String>) -> Self {
        ModelResponse::FinalAnswer {
            content: content.into(),
        }
    }

    /// Text carried by the response, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            ModelResponse::FinalAnswer { content } => Some(content),
            ModelResponse::ToolCalls { content, .. } => content.as_deref(),
        }
    }
}

/// A tool call exactly as the endpoint returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToolCall {
    /// Some endpoints omit ids; the orchestrator assigns one.
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

impl RawToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
