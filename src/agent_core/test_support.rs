//! Test doubles shared by the agent core tests.
//!
//! - `ScriptedEndpoint` replays canned model responses and records requests
//! - `ReactiveEndpoint` answers from a closure over the request
//! - `CountingExecutor` is a call-count spy for tools
//! - `RecordingSummarizer` / `FailingSummarizer` stand in for the summarizer

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::inference::endpoint::ModelEndpoint;
use crate::inference::errors::InferenceError;
use crate::inference::summarizer::Summarizer;
use crate::inference::types::{ModelRequest, ModelResponse, RawToolCall};

use super::registry::{ToolExecutor, ToolRegistry, ToolSpec};

// ─── Model Endpoints ────────────────────────────────────────────────────────

/// Replays responses in order. Errors with `Unavailable` once exhausted.
#[derive(Default)]
pub struct ScriptedEndpoint {
    script: Mutex<VecDeque<Result<ModelResponse, InferenceError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedEndpoint {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ModelResponse, InferenceError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelEndpoint for ScriptedEndpoint {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, InferenceError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(InferenceError::Unavailable {
                    endpoint: "scripted".into(),
                    reason: "script exhausted".into(),
                })
            })
    }
}

/// Answers every request through a closure.
pub struct ReactiveEndpoint<F> {
    respond: F,
    calls: AtomicUsize,
}

impl<F> ReactiveEndpoint<F>
where
    F: Fn(&ModelRequest) -> ModelResponse + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> ModelEndpoint for ReactiveEndpoint<F>
where
    F: Fn(&ModelRequest) -> ModelResponse + Send + Sync,
{
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.respond)(&request))
    }
}

/// A response requesting a single tool.
pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ModelResponse {
    ModelResponse::ToolCalls {
        content: None,
        calls: vec![RawToolCall::new(id, name, arguments.to_string())],
    }
}

/// The text of the last user message in a request.
pub fn last_user_text(request: &ModelRequest) -> String {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == crate::inference::types::Role::User)
        .map(|m| m.content_str().to_string())
        .unwrap_or_default()
}

// ─── Executors ──────────────────────────────────────────────────────────────

/// Counts invocations and returns a fixed result (or a fixed failure).
pub struct CountingExecutor {
    calls: AtomicUsize,
    outcome: Result<serde_json::Value, String>,
}

impl CountingExecutor {
    pub fn returning(value: serde_json::Value) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Ok(value),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Err(message.to_string()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolExecutor for CountingExecutor {
    async fn execute(&self, _arguments: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(value) => Ok(value.clone()),
            Err(message) => Err(anyhow::anyhow!("{message}")),
        }
    }
}

/// Panics on every call.
pub struct PanickingExecutor;

#[async_trait]
impl ToolExecutor for PanickingExecutor {
    async fn execute(&self, _arguments: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        panic!("executor blew up");
    }
}

// ─── Summarizers ────────────────────────────────────────────────────────────

/// Records every transcript and returns a fixed summary.
pub struct RecordingSummarizer {
    reply: String,
    transcripts: Mutex<Vec<String>>,
}

impl RecordingSummarizer {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            transcripts: Mutex::new(Vec::new()),
        })
    }

    pub fn transcripts(&self) -> Vec<String> {
        self.transcripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Summarizer for RecordingSummarizer {
    async fn summarize(&self, transcript: &str) -> anyhow::Result<String> {
        self.transcripts.lock().unwrap().push(transcript.to_string());
        Ok(self.reply.clone())
    }
}

/// Always fails.
pub struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _transcript: &str) -> anyhow::Result<String> {
        anyhow::bail!("summarizer offline")
    }
}

// ─── Registries ─────────────────────────────────────────────────────────────

/// Executors behind the demo registry, exposed so tests can count calls.
pub struct DemoTools {
    pub weather: Arc<CountingExecutor>,
    pub search: Arc<CountingExecutor>,
    pub email: Arc<CountingExecutor>,
}

/// `get_weather` and `web_search` (tier none) plus `send_email` (gated).
pub fn demo_registry() -> (ToolRegistry, DemoTools) {
    let tools = DemoTools {
        weather: CountingExecutor::returning(json!({
            "location": "Tokyo", "temperature": 22, "condition": "sunny"
        })),
        search: CountingExecutor::returning(json!({"results": ["Rust 2024 edition"]})),
        email: CountingExecutor::returning(json!({"status": "sent"})),
    };

    let mut registry = ToolRegistry::new();
    registry
        .register_all(vec![
            ToolSpec::new(
                "get_weather",
                "Get the current weather for a location",
                json!({
                    "type": "object",
                    "properties": {"location": {"type": "string"}},
                    "required": ["location"]
                }),
                tools.weather.clone(),
            ),
            ToolSpec::new(
                "web_search",
                "Search the web",
                json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                }),
                tools.search.clone(),
            ),
            ToolSpec::new(
                "send_email",
                "Send an email",
                json!({
                    "type": "object",
                    "properties": {
                        "to": {"type": "string"},
                        "subject": {"type": "string"},
                        "body": {"type": "string"}
                    },
                    "required": ["to"]
                }),
                tools.email.clone(),
            )
            .requires_approval(),
        ])
        .unwrap();

    (registry, tools)
}
