//! procstats-core: per-process runtime statistics for an app-hosting system.
//!
//! Records how long every user-visible process spends in each coarse
//! lifecycle state, broken down by device-wide memory pressure and screen
//! state; samples process PSS per state; counts excessive-behavior kills;
//! tracks per-service started/bound/executing time; and persists the whole
//! aggregate as one versioned binary blob with atomic replacement.
//!
//! # Architecture
//!
//! ```text
//! host events ─→ ProcessTracker ─→ ProcessStats ─→ records ─→ LongPool
//!                      │                (arena + registries)
//!                      └─→ codec ─→ Persistor ─→ <base_dir>/current.bin
//! ```
//!
//! # Modules
//!
//! - `states`: the 80-bucket composite state space and its encodings
//! - `long_pool`: packed-offset addressed pool of 64-bit counters
//! - `state_table`: sparse sorted per-record tables over the pool
//! - `process` / `service` / `registry`: the record types
//! - `stats`: the single-writer data model (`ProcessStats`)
//! - `codec`: the versioned binary blob format
//! - `persist` / `tracker`: atomic persistence and orchestration
//! - `dump`: text / checkin / CSV renderings and the dump flag grammar
//! - `config` / `logging` / `clock`: ambient plumbing
//!
//! # Concurrency
//!
//! The data model is single-writer: the host serializes all calls through
//! its own lock. The only internal thread is the background disk commit,
//! which operates on an already-serialized snapshot.

#![forbid(unsafe_code)]

pub mod clock;
pub mod codec;
pub mod config;
pub mod dump;
pub mod error;
pub mod logging;
pub mod long_pool;
pub mod persist;
pub mod process;
pub mod registry;
pub mod service;
pub mod state_table;
pub mod states;
pub mod stats;
pub mod tracker;

pub use error::{Error, ParseError, Result};
pub use process::ProcId;
pub use registry::PackageList;
pub use service::SvcId;
pub use stats::ProcessStats;
pub use tracker::ProcessTracker;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
