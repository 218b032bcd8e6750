//! Millisecond clock helpers.
//!
//! The data model never reads a clock; every operation takes `now`
//! explicitly. These helpers are for hosts (and the CLI) that need a
//! monotonic source for `now` and a wall-clock source for the time-period
//! window.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Monotonic milliseconds since this process first asked for the time.
#[must_use]
pub fn uptime_ms() -> u64 {
    let origin = *ORIGIN.get_or_init(Instant::now);
    origin.elapsed().as_millis() as u64
}

/// Wall-clock milliseconds since the Unix epoch.
#[must_use]
pub fn wall_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
