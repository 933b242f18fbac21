//! Summarizer collaborator used by the context compactor.
//!
//! Input is a plain-text transcript, output is a plain-text summary. No
//! schema is enforced on either side.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use super::endpoint::ModelEndpoint;
use super::types::{Message, ModelRequest, ModelResponse};

/// Compresses a transcript into a shorter text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> anyhow::Result<String>;
}

/// System prompt for the model-backed summarizer.
const SUMMARIZER_SYSTEM_PROMPT: &str = "\
You are a conversation summarizer. Create a concise summary of the conversation \
that preserves:
1. Key topics discussed
2. Important facts shared
3. User preferences or context

Keep the summary brief but informative.";

/// A [`Summarizer`] that asks a model endpoint for the summary.
pub struct ModelSummarizer {
    endpoint: Arc<dyn ModelEndpoint>,
    model: String,
}

impl ModelSummarizer {
    pub fn new(endpoint: Arc<dyn ModelEndpoint>, model: impl Into<String>) -> Self {
        Self {
            endpoint,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(&self, transcript: &str) -> anyhow::Result<String> {
        let request = ModelRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(SUMMARIZER_SYSTEM_PROMPT),
                Message::user(format!("Summarize this conversation:\n\n{transcript}")),
            ],
            tools: Vec::new(),
        };

        let response = self
            .endpoint
            .complete(request)
            .await
            .context("summarizer model call failed")?;

        match response {
            ModelResponse::FinalAnswer { content } if !content.trim().is_empty() => {
                Ok(content.trim().to_string())
            }
            ModelResponse::FinalAnswer { .. } => anyhow::bail!("summarizer returned empty text"),
            ModelResponse::ToolCalls { .. } => {
                anyhow::bail!("summarizer requested tools instead of answering")
            }
        }
    }
}
