//! Agent configuration loading and validation.
//!
//! Reads `toolgate.yaml` (or the file named by `TOOLGATE_CONFIG`) and
//! resolves environment variables. Every field has a default, so an empty
//! file is a valid config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::AgentError;

/// File name searched for by [`find_config_path`].
pub const CONFIG_FILE_NAME: &str = "toolgate.yaml";

/// Env var that points straight at a config file.
pub const CONFIG_ENV_VAR: &str = "TOOLGATE_CONFIG";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level runtime configuration (mirrors `toolgate.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Seeded as the first message of every new conversation.
    pub system_prompt: Option<String>,
    /// Tool rounds allowed per turn before the turn fails.
    pub max_tool_rounds: usize,
    pub compaction: CompactionConfig,
    pub dispatch: DispatchConfig,
    pub approval: ApprovalConfig,
    pub logging: LoggingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            system_prompt: None,
            max_tool_rounds: 10,
            compaction: CompactionConfig::default(),
            dispatch: DispatchConfig::default(),
            approval: ApprovalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which compaction policy a conversation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionStrategy {
    #[default]
    Window,
    TokenBudget,
    Summarize,
    Hierarchical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    pub strategy: CompactionStrategy,
    /// Non-system messages kept by window slicing.
    pub max_messages: usize,
    /// Estimated tokens allowed by the token-budget policy.
    pub token_budget: u32,
    /// Recent messages kept verbatim by the summarizing policies.
    pub summary_window: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            strategy: CompactionStrategy::Window,
            max_messages: 10,
            token_budget: 4096,
            summary_window: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Run approved calls of one round concurrently.
    pub parallel: bool,
    /// Per-call executor timeout. `None` waits forever.
    pub tool_timeout_secs: Option<u64>,
    /// Tool result content longer than this is truncated.
    pub max_result_chars: usize,
    /// Try to repair malformed argument JSON before rejecting it.
    pub repair_arguments: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            tool_timeout_secs: None,
            max_result_chars: 6000,
            repair_arguments: false,
        }
    }
}

impl DispatchConfig {
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// How long an interactive gate waits for a reply. `None` waits forever.
    pub timeout_secs: Option<u64>,
}

impl ApprovalConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Write `agent.log` here instead of stderr.
    pub log_dir: Option<PathBuf>,
    /// Rotated log files kept (`agent.log.1` … `agent.log.N`).
    pub keep_rotated: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "toolgate=info,warn".into(),
            log_dir: None,
            keep_rotated: 3,
        }
    }
}

impl AgentConfig {
    /// Reject settings the runtime cannot honour.
    pub fn validate(&self) -> Result<(), AgentError> {
        let invalid = |reason: &str| {
            Err(AgentError::ConfigError {
                reason: reason.to_string(),
            })
        };

        if self.model.trim().is_empty() {
            return invalid("model must not be empty");
        }
        if self.max_tool_rounds == 0 {
            return invalid("max_tool_rounds must be at least 1");
        }
        if self.compaction.max_messages == 0 {
            return invalid("compaction.max_messages must be at least 1");
        }
        if self.compaction.summary_window == 0 {
            return invalid("compaction.summary_window must be at least 1");
        }
        if self.compaction.token_budget == 0 {
            return invalid("compaction.token_budget must be at least 1");
        }
        if self.dispatch.max_result_chars == 0 {
            return invalid("dispatch.max_result_chars must be at least 1");
        }
        if self.dispatch.tool_timeout_secs == Some(0) {
            return invalid("dispatch.tool_timeout_secs must be at least 1 when set");
        }
        if self.approval.timeout_secs == Some(0) {
            return invalid("approval.timeout_secs must be at least 1 when set");
        }
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// `TOOLGATE_CONFIG` wins when it names an existing file; otherwise searches
/// upward from `start` for `toolgate.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, AgentError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.is_file() {
            return Ok(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV_VAR} does not name a file, searching upward");
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(AgentError::ConfigError {
        reason: format!("could not find {CONFIG_FILE_NAME}"),
    })
}

/// Load, interpolate, parse and validate a config file.
///
/// String values may use `${VAR_NAME}` or `${VAR_NAME:-default}`.
pub fn load_config(path: &Path) -> Result<AgentConfig, AgentError> {
    let raw = std::fs::read_to_string(path).map_err(|e| AgentError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    let config = parse_config(&raw)?;
    tracing::info!(
        path = %path.display(),
        model = %config.model,
        strategy = ?config.compaction.strategy,
        "config loaded"
    );
    Ok(config)
}

/// Parse and validate config text. An empty document yields the defaults.
pub fn parse_config(raw: &str) -> Result<AgentConfig, AgentError> {
    let interpolated = interpolate_env_vars(raw);
    let config: AgentConfig = if interpolated.trim().is_empty() {
        AgentConfig::default()
    } else {
        serde_yaml::from_str(&interpolated)?
    };
    config.validate()?;
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Unset without default resolves to "".
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
