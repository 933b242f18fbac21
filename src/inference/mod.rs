//! Inference — the contract between the runtime and its model-backed
//! collaborators.
//!
//! This module owns:
//! - The message / tool-schema / response types exchanged with the endpoint
//! - The [`ModelEndpoint`] trait (transport lives in its implementations)
//! - The [`Summarizer`] trait and a model-backed implementation
//! - Parsing of raw tool-call argument text
//!
//! The runtime never talks HTTP itself. Swapping providers means swapping
//! the `ModelEndpoint` handed to the orchestrator.

pub mod endpoint;
pub mod errors;
pub mod summarizer;
pub mod tool_call_parser;
pub mod types;

// Re-exports for convenience
pub use endpoint::ModelEndpoint;
pub use errors::InferenceError;
pub use summarizer::{ModelSummarizer, Summarizer};
pub use types::{
    Message, ModelRequest, ModelResponse, RawToolCall, Role, ToolCallRequest, ToolDefinition,
};
