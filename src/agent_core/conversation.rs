//! MessageStore — the ordered, append-only conversation log.
//!
//! Responsibilities:
//! - Preserve insertion order; never edit or delete prior entries
//! - Enforce the tool-link invariant on append: every tool result answers
//!   exactly one open request, and no other message lands while requests
//!   are still unanswered
//! - Expose read-only views for the compactor and orchestrator
//!
//! Compaction never touches the store. It derives a bounded view, so the
//! full log stays available for audit even when the model sees less.

use std::collections::HashSet;

use crate::inference::types::{Message, Role, ToolCallRequest};

use super::errors::AgentError;
use super::tokens;

// ─── MessageStore ───────────────────────────────────────────────────────────

/// Append-only conversation history for one conversation.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    /// Every message, in insertion order.
    messages: Vec<Message>,
    /// Requests that have not been answered yet, in request order.
    open_calls: Vec<String>,
    /// Every request id ever appended (ids are unique per conversation).
    seen_call_ids: HashSet<String>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a system prompt.
    pub fn with_system_prompt(prompt: &str) -> Self {
        let mut store = Self::new();
        store.messages.push(Message::system(prompt));
        store
    }

    /// Build a store by appending `messages` in order, validating each one.
    pub fn from_messages(messages: Vec<Message>) -> Result<Self, AgentError> {
        let mut store = Self::new();
        for msg in messages {
            store.append(msg)?;
        }
        Ok(store)
    }

    // ─── Append ─────────────────────────────────────────────────────────

    /// Append a message, enforcing the tool-link invariant.
    pub fn append(&mut self, message: Message) -> Result<(), AgentError> {
        match message.role {
            Role::Tool => {
                let id = message.tool_call_id.as_deref().unwrap_or_default();
                let pos = self
                    .open_calls
                    .iter()
                    .position(|open| open == id)
                    .ok_or_else(|| AgentError::OrphanToolResult {
                        tool_call_id: id.to_string(),
                    })?;
                self.open_calls.remove(pos);
            }
            _ => {
                if !self.open_calls.is_empty() {
                    return Err(AgentError::IncompleteTurn {
                        open: self.open_calls.clone(),
                    });
                }
                let calls = message.requested_calls();
                let mut batch: HashSet<&str> = HashSet::new();
                for call in calls {
                    if self.seen_call_ids.contains(&call.id) || !batch.insert(call.id.as_str()) {
                        return Err(AgentError::DuplicateCallId {
                            tool_call_id: call.id.clone(),
                        });
                    }
                }
                for call in calls {
                    self.seen_call_ids.insert(call.id.clone());
                    self.open_calls.push(call.id.clone());
                }
            }
        }

        self.messages.push(message);
        Ok(())
    }

    // ─── Views ──────────────────────────────────────────────────────────

    /// The full ordered history.
    pub fn view(&self) -> &[Message] {
        &self.messages
    }

    /// An owned copy of the history.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Ids of requests that still lack a result, in request order.
    pub fn open_tool_calls(&self) -> &[String] {
        &self.open_calls
    }

    /// Whether every request has a matching result.
    pub fn is_settled(&self) -> bool {
        self.open_calls.is_empty()
    }

    /// Whether `id` has already been used by a request in this conversation.
    pub fn contains_call_id(&self, id: &str) -> bool {
        self.seen_call_ids.contains(id)
    }

    /// Every tool request in the history, in order.
    pub fn tool_requests(&self) -> impl Iterator<Item = &ToolCallRequest> {
        self.messages.iter().flat_map(|m| m.requested_calls().iter())
    }

    /// The most recent final assistant answer, if any.
    pub fn last_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.tool_calls.is_none())
            .and_then(|m| m.content.as_deref())
    }

    /// Estimated token cost of the full history.
    pub fn estimated_tokens(&self) -> u32 {
        self.messages.iter().map(tokens::estimate_message_tokens).sum()
    }

    /// A fresh store that keeps only the system messages of this one.
    pub fn system_only(&self) -> Self {
        Self {
            messages: self
                .messages
                .iter()
                .filter(|m| m.is_system())
                .cloned()
                .collect(),
            open_calls: Vec::new(),
            seen_call_ids: HashSet::new(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
