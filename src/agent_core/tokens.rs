//! Token estimation for context budgets.
//!
//! Uses character-based heuristics calibrated for LLM tokenizers:
//! - English prose: ~3.2 chars/token (conservative; overestimate is safer)
//! - JSON/structured content: ~2.8 chars/token (denser due to punctuation, short keys)
//!
//! The token-budget compaction policy accepts any cost function; these
//! estimators are the default one.

use std::sync::Arc;

use crate::inference::types::{Message, Role};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Average characters per token for English prose.
const CHARS_PER_TOKEN: f64 = 3.2;

/// Average characters per token for JSON/structured content.
const JSON_CHARS_PER_TOKEN: f64 = 2.8;

/// Per-message overhead (role label, formatting tokens).
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Overhead for tool call JSON structure (per call).
const TOOL_CALL_OVERHEAD_TOKENS: u32 = 10;

/// Caller-supplied estimate of what a message costs in tokens.
pub type CostFn = Arc<dyn Fn(&Message) -> u32 + Send + Sync>;

/// The default [`CostFn`], backed by [`estimate_message_tokens`].
pub fn default_cost_fn() -> CostFn {
    Arc::new(estimate_message_tokens)
}

// ─── UTF-8 Safe Truncation ──────────────────────────────────────────────────

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Public API ─────────────────────────────────────────────────────────────

/// Estimate the token count for a string of natural language text.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.len() as f64;
    (chars / CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for JSON/structured content.
pub fn estimate_json_tokens(json_text: &str) -> u32 {
    let chars = json_text.len() as f64;
    (chars / JSON_CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for a `Message`.
///
/// Tool results and tool-call arguments use the JSON estimator, everything
/// else the prose estimator.
pub fn estimate_message_tokens(message: &Message) -> u32 {
    let mut total = MESSAGE_OVERHEAD_TOKENS;

    if let Some(ref content) = message.content {
        total += match message.role {
            Role::Tool => estimate_json_tokens(content),
            _ => estimate_tokens(content),
        };
    }

    for call in message.requested_calls() {
        total += TOOL_CALL_OVERHEAD_TOKENS;
        total += estimate_tokens(&call.name);
        total += estimate_json_tokens(&call.arguments);
    }

    if let Some(ref id) = message.tool_call_id {
        total += estimate_tokens(id);
    }

    total
}

/// Total estimated cost of a message sequence under `cost`, saturating at
/// `u32::MAX`.
pub fn sequence_cost(messages: &[Message], cost: &CostFn) -> u32 {
    messages.iter().fold(0u32, |total, m| total.saturating_add(cost(m)))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::ToolCallRequest;

    #[test]
    fn test_estimate_tokens_empty() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_estimate_tokens_short() {
        // "hello" = 5 chars → ceil(5/3.2) = 2
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn test_estimate_tokens_longer() {
        // 100 chars → ceil(100/3.2) = 32
        let text = "a".repeat(100);
        assert_eq!(estimate_tokens(&text), 32);
    }

    #[test]
    fn test_estimate_json_tokens() {
        // 16 chars → ceil(16/2.8) = 6
        let json = r#"{"path": "/tmp"}"#;
        assert_eq!(estimate_json_tokens(json), 6);
    }

    #[test]
    fn test_estimate_message_tokens_content_only() {
        // 4 overhead + ceil(13/3.2) = 5 → 9
        let msg = Message::user("Hello, world!");
        assert_eq!(estimate_message_tokens(&msg), 9);
    }

    #[test]
    fn test_estimate_message_tokens_with_tool_calls() {
        let msg = Message::assistant_tool_calls(
            None,
            vec![ToolCallRequest {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                arguments: r#"{"location": "Tokyo"}"#.to_string(),
            }],
        );
        assert!(estimate_message_tokens(&msg) > MESSAGE_OVERHEAD_TOKENS + TOOL_CALL_OVERHEAD_TOKENS);
    }

    #[test]
    fn test_sequence_cost_uses_supplied_fn() {
        let unit: CostFn = Arc::new(|_| 1);
        let msgs = vec![Message::user("a"), Message::assistant("b")];
        assert_eq!(sequence_cost(&msgs, &unit), 2);
    }

    #[test]
    fn test_sequence_cost_saturates() {
        let huge: CostFn = Arc::new(|_| u32::MAX);
        let msgs = vec![Message::user("a"), Message::user("b")];
        assert_eq!(sequence_cost(&msgs, &huge), u32::MAX);
    }

    #[test]
    fn test_truncate_utf8_ascii() {
        assert_eq!(truncate_utf8("hello world", 5), "hello");
    }

    #[test]
    fn test_truncate_utf8_within_multibyte() {
        // '═' is 3 bytes; cutting at byte 4 lands inside the second one.
        let text = "═══";
        assert_eq!(truncate_utf8(text, 4), "═");
        assert_eq!(truncate_utf8(text, 6), "══");
    }

    #[test]
    fn test_truncate_utf8_no_truncation_needed() {
        assert_eq!(truncate_utf8("short", 100), "short");
    }
}
