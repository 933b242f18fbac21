//! Toolgate — a tool-using conversational agent runtime.
//!
//! A turn runs user text through the model, dispatches the tools it asks
//! for under a risk-tiered approval policy, keeps history inside a context
//! budget and ends with a final answer. See [`agent_core::Orchestrator`].

pub mod agent_core;
pub mod inference;

use std::path::{Path, PathBuf};

use agent_core::config::LoggingConfig;

pub use agent_core::{AgentConfig, AgentError, Orchestrator};
pub use inference::{InferenceError, ModelEndpoint, Summarizer};

/// Return the platform-standard data directory for Toolgate.
///
/// - macOS: `~/Library/Application Support/toolgate/`
/// - Windows: `{FOLDERID_RoamingAppData}\toolgate\`
/// - Linux: `$XDG_DATA_HOME/toolgate/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.toolgate/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("toolgate");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".toolgate")
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter. With a `log_dir`, existing
/// logs are rotated (`agent.log → .1 → … → .keep_rotated`) and a fresh
/// `agent.log` is written through a line-flushing writer; otherwise logs go
/// to stderr. Calling this twice is harmless: the second call is a no-op.
pub fn init_tracing(config: &LoggingConfig) -> std::io::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    // Rotating under an installed subscriber would move its open file away.
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let Some(log_dir) = config.log_dir.as_deref() else {
        let _ = fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
        return Ok(());
    };

    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join("agent.log");
    rotate_log_file(&log_path, config.keep_rotated);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let installed = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            log_file = %log_path.display(),
            pid = std::process::id(),
            "=== toolgate logging started ==="
        );
    }
    Ok(())
}

/// Rotate log files: `agent.log` → `agent.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are
/// skipped. With `keep == 0` the current log is simply removed.
fn rotate_log_file(base_path: &Path, keep: usize) {
    if keep == 0 {
        let _ = std::fs::remove_file(base_path);
        return;
    }

    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write, so a
/// crash never loses buffered log lines.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
