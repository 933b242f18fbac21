//! Tool registry — maps tool name to schema, risk tier and executor.
//!
//! Provides:
//! - Registration with duplicate detection
//! - Lookup by name
//! - Validation of parsed arguments against the registered JSON schema
//! - Serialization of every tool into the schema list sent to the model
//!
//! Registration happens once at startup. The orchestrator holds the registry
//! behind an `Arc`, so it is frozen for the lifetime of every conversation and
//! the model sees the same tool list on every call.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::inference::types::ToolDefinition;

use super::errors::AgentError;

// ─── Executors ──────────────────────────────────────────────────────────────

/// A side-effecting tool implementation.
///
/// Receives arguments already validated against the tool's schema. Returns a
/// JSON-serializable result or an error; the router turns either one into a
/// tool-result message.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, arguments: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

/// Adapter that lets an async closure act as a [`ToolExecutor`].
pub struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> ToolExecutor for FnExecutor<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send,
{
    async fn execute(&self, arguments: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        (self.0)(arguments).await
    }
}

/// Wrap an async closure as a shareable executor.
pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn ToolExecutor>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    Arc::new(FnExecutor(f))
}

// ─── Tool Specs ─────────────────────────────────────────────────────────────

/// Whether a tool may run without asking first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Runs immediately.
    #[default]
    None,
    /// Needs an approval decision before every execution.
    RequiresApproval,
}

/// Everything the runtime knows about one tool.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object.
    pub parameters: serde_json::Value,
    pub risk_tier: RiskTier,
    pub executor: Arc<dyn ToolExecutor>,
}

impl ToolSpec {
    /// A tool with risk tier `none`.
    pub fn new(
        name: &str,
        description: &str,
        parameters: serde_json::Value,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
            risk_tier: RiskTier::None,
            executor,
        }
    }

    /// Mark this tool as requiring approval.
    pub fn requires_approval(mut self) -> Self {
        self.risk_tier = RiskTier::RequiresApproval;
        self
    }

    /// The schema entry sent to the model.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.name.clone(),
            self.description.clone(),
            self.parameters.clone(),
        )
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("risk_tier", &self.risk_tier)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

// ─── ToolRegistry ───────────────────────────────────────────────────────────

/// Name-keyed tool registry. Iteration follows registration order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
    /// `tool_name → index into tools`.
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is taken or the schema is not an object.
    pub fn register(&mut self, spec: ToolSpec) -> Result<(), AgentError> {
        if self.index.contains_key(&spec.name) {
            return Err(AgentError::DuplicateTool { name: spec.name });
        }
        if spec.name.trim().is_empty() {
            return Err(AgentError::ConfigError {
                reason: "tool name must not be empty".into(),
            });
        }
        if !spec.parameters.is_object() {
            return Err(AgentError::ConfigError {
                reason: format!("parameter schema for '{}' must be a JSON object", spec.name),
            });
        }

        tracing::debug!(tool = %spec.name, risk_tier = ?spec.risk_tier, "tool registered");
        self.index.insert(spec.name.clone(), self.tools.len());
        self.tools.push(spec);
        Ok(())
    }

    /// Register several tools, stopping at the first failure.
    pub fn register_all(
        &mut self,
        specs: impl IntoIterator<Item = ToolSpec>,
    ) -> Result<(), AgentError> {
        specs.into_iter().try_for_each(|spec| self.register(spec))
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&ToolSpec, AgentError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| AgentError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// The parameter schema registered for `name`.
    pub fn schema_for(&self, name: &str) -> Result<&serde_json::Value, AgentError> {
        self.resolve(name).map(|spec| &spec.parameters)
    }

    /// Whether `name` needs an approval decision. Unknown tools count as gated.
    pub fn requires_approval(&self, name: &str) -> bool {
        self.resolve(name)
            .map(|spec| spec.risk_tier == RiskTier::RequiresApproval)
            .unwrap_or(true)
    }

    /// Validate parsed arguments against the tool's schema.
    pub fn validate_arguments(
        &self,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<(), AgentError> {
        let schema = self.schema_for(name)?;
        validate_against_schema(schema, arguments).map_err(|reason| {
            AgentError::InvalidArguments {
                tool: name.to_string(),
                reason,
            }
        })
    }

    /// Schema list for the model, in registration order.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolSpec::to_definition).collect()
    }

    /// All registered tool names, in registration order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ─── Schema Validation ──────────────────────────────────────────────────────

/// Check an arguments object against the subset of JSON schema tools use:
/// `required`, per-property `type` (string or list), `enum`, and
/// `additionalProperties: false`.
fn validate_against_schema(
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> Result<(), String> {
    let args = arguments
        .as_object()
        .ok_or_else(|| "arguments must be a JSON object".to_string())?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !args.contains_key(field) {
                return Err(format!("missing required field: '{field}'"));
            }
        }
    }

    let properties = schema.get("properties").and_then(|p| p.as_object());

    for (key, value) in args {
        let Some(prop) = properties.and_then(|p| p.get(key)) else {
            if schema.get("additionalProperties") == Some(&serde_json::Value::Bool(false)) {
                return Err(format!("unexpected field: '{key}'"));
            }
            continue;
        };

        if let Some(expected) = prop.get("type") {
            let allowed: Vec<&str> = match expected {
                serde_json::Value::String(t) => vec![t.as_str()],
                serde_json::Value::Array(ts) => ts.iter().filter_map(|t| t.as_str()).collect(),
                _ => Vec::new(),
            };
            if !allowed.is_empty() && !allowed.iter().any(|t| json_type_matches(t, value)) {
                return Err(format!(
                    "field '{key}' should be {}, got {}",
                    allowed.join(" or "),
                    json_type_name(value)
                ));
            }
        }

        if let Some(options) = prop.get("enum").and_then(|e| e.as_array()) {
            if !options.contains(value) {
                return Err(format!("field '{key}' must be one of {}", serde_json::Value::from(options.clone())));
            }
        }
    }

    Ok(())
}

fn json_type_matches(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown type keywords are not ours to enforce.
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
