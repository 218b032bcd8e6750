//! Structured logging setup.
//!
//! Thin wrapper over `tracing-subscriber`: pretty output for interactive
//! use, JSON lines for collection, optional file target. The level comes
//! from the config but `RUST_LOG` always wins.

use std::path::PathBuf;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

static LOGGING_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-friendly output.
    #[default]
    Pretty,
    /// Machine-parseable JSON lines.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level filter (trace, debug, info, warn, error); `RUST_LOG` overrides.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Optional log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Initialize global logging once. Later calls are no-ops, so tests and
/// embedding hosts can both call it safely.
pub fn init_logging(config: &LogConfig) -> std::io::Result<()> {
    let mut initialized = false;
    LOGGING_INITIALIZED.get_or_init(|| {
        initialized = true;
        true
    });
    if !initialized {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match (&config.file, config.format) {
        (Some(path), format) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let builder = fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Arc::new(file))
                .with_ansi(false);
            match format {
                LogFormat::Json => builder.json().init(),
                LogFormat::Pretty => builder.init(),
            }
        }
        (None, LogFormat::Json) => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        (None, LogFormat::Pretty) => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
