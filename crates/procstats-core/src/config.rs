//! Tracker configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logging::LogConfig;

/// How often the aggregate is flushed to disk, absent explicit writes.
pub const DEFAULT_WRITE_PERIOD_MS: u64 = 30 * 60 * 1000;

/// Name of the persisted blob within the base directory.
pub const DATA_FILE_NAME: &str = "current.bin";

/// Configuration for a [`ProcessTracker`](crate::tracker::ProcessTracker).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Directory holding the persisted blob.
    pub base_dir: PathBuf,

    /// Periodic write threshold for `should_write_now`.
    pub write_period_ms: u64,

    /// Logging configuration (used by hosts that call `init_logging`).
    pub log: LogConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            write_period_ms: DEFAULT_WRITE_PERIOD_MS,
            log: LogConfig::default(),
        }
    }
}
