//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors raised by the model endpoint collaborator or while interpreting
/// what it returned.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The endpoint could not be reached.
    #[error("model endpoint unavailable ({endpoint}): {reason}")]
    Unavailable {
        endpoint: String,
        reason: String,
    },

    /// The endpoint did not respond within its own timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout {
        duration_secs: u64,
    },

    /// Non-2xx response from the endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// Raw tool-call argument text could not be turned into a JSON object.
    #[error("tool call parse error: {reason}")]
    ToolCallParseError {
        raw_response: String,
        reason: String,
    },
}
