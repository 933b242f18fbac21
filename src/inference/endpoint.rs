//! The language model endpoint contract.
//!
//! Transport, authentication and retry policy belong to implementations of
//! [`ModelEndpoint`]. The runtime only ever sees a [`ModelRequest`] going out
//! and a [`ModelResponse`] (or an [`InferenceError`]) coming back.

use async_trait::async_trait;

use super::errors::InferenceError;
use super::types::{ModelRequest, ModelResponse};

/// A chat-completions style model endpoint.
///
/// Implementations must be shareable across conversations; the orchestrator
/// holds them behind `Arc<dyn ModelEndpoint>`.
#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, InferenceError>;
}
