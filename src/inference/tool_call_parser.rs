//! Tool call argument parsing.
//!
//! The model produces tool arguments as text. This module turns that text
//! into a JSON object, or a [`InferenceError::ToolCallParseError`] that the
//! dispatcher reports back to the model as a per-call error result.
//!
//! An opt-in repair pass handles the malformations local models commonly
//! produce (trailing commas, missing closing braces, stray control
//! characters). It is off by default: malformed text is an error.

use uuid::Uuid;

use super::errors::InferenceError;

// ─── Argument Parsing ────────────────────────────────────────────────────────

/// Parse raw argument text into a JSON object.
///
/// Blank text is treated as `{}`: several endpoints send an empty string for
/// tools without parameters.
pub fn parse_arguments(raw: &str, repair: bool) -> Result<serde_json::Value, InferenceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }

    let value = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(v) => v,
        Err(e) => {
            let repaired = if repair {
                repair_malformed_tool_call_json(trimmed)
            } else {
                None
            };
            match repaired {
                Some(v) => {
                    tracing::debug!(raw = %trimmed, "repaired malformed tool call arguments");
                    v
                }
                None => {
                    return Err(InferenceError::ToolCallParseError {
                        raw_response: raw.to_string(),
                        reason: format!("invalid JSON arguments: {e}"),
                    })
                }
            }
        }
    };

    if !value.is_object() {
        return Err(InferenceError::ToolCallParseError {
            raw_response: raw.to_string(),
            reason: "arguments must be a JSON object".into(),
        });
    }

    Ok(value)
}

/// Use the model's call id when present, otherwise mint one.
pub fn assign_call_id(id: Option<&str>) -> String {
    match id {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => format!("call_{}", Uuid::new_v4()),
    }
}

// ─── JSON Repair ─────────────────────────────────────────────────────────────

/// Attempt to repair malformed JSON arguments from a model tool call.
///
/// Returns `Some(value)` if repair succeeds, `None` if irreparable.
pub fn repair_malformed_tool_call_json(raw: &str) -> Option<serde_json::Value> {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(raw) {
        return Some(v);
    }

    let mut repaired = repair_trailing_commas(raw);
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&repaired) {
        return Some(v);
    }

    repaired = repair_unbalanced_braces(&repaired);
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&repaired) {
        return Some(v);
    }

    // A trailing comma may only become visible once the brace is closed.
    repaired = repair_trailing_commas(&repaired);
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&repaired) {
        return Some(v);
    }

    repaired = repair_control_characters(&repaired);
    serde_json::from_str::<serde_json::Value>(&repaired).ok()
}

/// Remove trailing commas before `}` or `]`.
fn repair_trailing_commas(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        result.push(chars[i]);
        i += 1;
    }

    result
}

/// Append closing braces to balance unmatched opening braces.
fn repair_unbalanced_braces(input: &str) -> String {
    let mut brace_depth: i32 = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if !in_string {
            match ch {
                '{' => brace_depth += 1,
                '}' => brace_depth -= 1,
                _ => {}
            }
        }
    }

    let mut result = input.to_string();
    for _ in 0..brace_depth.max(0) {
        result.push('}');
    }
    result
}

/// Remove non-printable control characters that break JSON parsing.
/// Preserves `\n`, `\r`, `\t`.
fn repair_control_characters(input: &str) -> String {
    input
        .chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\r' || c == '\t')
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
