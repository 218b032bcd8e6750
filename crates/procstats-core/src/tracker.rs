//! Tracker orchestration: the data model wired to its persistence.
//!
//! `ProcessTracker` is the host-facing object. It is single-writer by
//! contract: the host serializes all calls through its own lock, and nothing
//! here re-enters that lock. The only concurrency is the background commit
//! thread inside [`Persistor`], which never touches the data model — the
//! blob it writes was fully serialized before `write_state_async` returned.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock;
use crate::codec;
use crate::config::{TrackerConfig, DATA_FILE_NAME};
use crate::error::Result;
use crate::persist::Persistor;
use crate::stats::ProcessStats;

/// The aggregate tracker: stats model + persistence + write policy.
pub struct ProcessTracker {
    stats: ProcessStats,
    persistor: Arc<Persistor>,
    config: TrackerConfig,
    last_write_time: u64,
    shutting_down: bool,
}

impl ProcessTracker {
    /// Open a tracker rooted at `config.base_dir`, creating the directory.
    /// The in-memory state starts fresh; call [`read_from_disk`](Self::read_from_disk)
    /// to restore a previous window.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let persistor = Arc::new(Persistor::new(&config.base_dir, DATA_FILE_NAME)?);
        Ok(Self {
            stats: ProcessStats::new(clock::wall_ms()),
            persistor,
            config,
            last_write_time: 0,
            shutting_down: false,
        })
    }

    #[must_use]
    pub fn stats(&self) -> &ProcessStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut ProcessStats {
        &mut self.stats
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Restore state from the persisted blob.
    ///
    /// A missing file keeps the fresh state. A structurally invalid blob is
    /// logged and the in-memory state reset; the file itself is left intact
    /// for postmortems until the next successful write replaces it.
    pub fn read_from_disk(&mut self) {
        let data = match self.persistor.read() {
            Ok(Some(data)) => data,
            Ok(None) => return,
            Err(err) => {
                warn!("error reading process statistics: {err}");
                return;
            }
        };
        match codec::read_stats(&mut data.as_slice()) {
            Ok(stats) => self.stats = stats,
            Err(err) => {
                warn!("ignoring existing stats: {err}");
                self.stats.reset(clock::wall_ms());
            }
        }
    }

    /// True once the periodic write threshold has elapsed.
    #[must_use]
    pub fn should_write_now(&self, now: u64) -> bool {
        now > self.last_write_time + self.config.write_period_ms
    }

    /// Serialize now, commit from a background thread.
    pub fn write_state_async(&mut self, now: u64) {
        self.write_state(now, false);
    }

    /// Serialize and commit inline.
    pub fn write_state_sync(&mut self, now: u64) {
        self.write_state(now, true);
    }

    fn write_state(&mut self, now: u64, sync: bool) {
        if self.shutting_down {
            return;
        }
        self.stats.time_period_end = clock::wall_ms();
        let mut blob = Vec::new();
        if let Err(err) = codec::write_stats(&mut self.stats, &mut blob, now) {
            warn!("error serializing process statistics: {err}");
            return;
        }
        self.last_write_time = now;
        info!(bytes = blob.len(), sync, "prepared stats write");
        self.persistor.schedule(blob, sync);
    }

    /// Final sync write; all subsequent writes become no-ops.
    pub fn shutdown(&mut self, now: u64) {
        warn!("writing process stats before shutdown");
        self.write_state_sync(now);
        self.shutting_down = true;
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PackageList;
    use crate::states::{ADJ_MEM_FACTOR_NORMAL, STATE_TOP};
    use tempfile::TempDir;

    fn tracker_in(dir: &TempDir) -> ProcessTracker {
        ProcessTracker::new(TrackerConfig {
            base_dir: dir.path().to_path_buf(),
            ..TrackerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn write_then_read_restores_durations() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker_in(&dir);

        let id = tracker.stats_mut().get_process("com.x", 1000, "com.x", 0);
        let mut pkgs: PackageList = vec![("com.x".into(), id)];
        tracker
            .stats_mut()
            .set_process_state(id, STATE_TOP, ADJ_MEM_FACTOR_NORMAL, 0, &mut pkgs);
        tracker.write_state_sync(700);

        let mut fresh = tracker_in(&dir);
        fresh.read_from_disk();
        let rid = fresh.stats().process_index()[&("com.x".to_string(), 1000)];
        assert_eq!(
            fresh.stats().process(rid).duration(STATE_TOP, 0, fresh.stats().pool()),
            700
        );
    }

    #[test]
    fn missing_file_keeps_fresh_state() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker_in(&dir);
        tracker.read_from_disk();
        assert!(tracker.stats().process_index().is_empty());
    }

    #[test]
    fn corrupt_file_resets_and_leaves_file_intact() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker_in(&dir);
        let id = tracker.stats_mut().get_process("com.x", 1000, "com.x", 0);
        let mut pkgs: PackageList = vec![("com.x".into(), id)];
        tracker
            .stats_mut()
            .set_process_state(id, STATE_TOP, ADJ_MEM_FACTOR_NORMAL, 0, &mut pkgs);
        tracker.write_state_sync(100);

        let path = dir.path().join(DATA_FILE_NAME);
        let mut data = std::fs::read(&path).unwrap();
        data[0] ^= 0xff;
        std::fs::write(&path, &data).unwrap();

        let mut fresh = tracker_in(&dir);
        fresh.read_from_disk();
        assert!(fresh.stats().process_index().is_empty());
        assert!(fresh.stats().packages().is_empty());
        // The corrupt file is untouched.
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn should_write_now_uses_the_configured_period() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker_in(&dir);
        assert!(tracker.should_write_now(tracker.config().write_period_ms + 1));
        tracker.write_state_sync(5_000);
        assert!(!tracker.should_write_now(5_000 + 10));
        assert!(tracker.should_write_now(5_000 + tracker.config().write_period_ms + 1));
    }

    #[test]
    fn writes_after_shutdown_are_noops() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker_in(&dir);
        tracker.shutdown(100);
        let written = std::fs::metadata(dir.path().join(DATA_FILE_NAME)).unwrap();

        let id = tracker.stats_mut().get_process("com.x", 1000, "com.x", 200);
        let mut pkgs: PackageList = vec![("com.x".into(), id)];
        tracker
            .stats_mut()
            .set_process_state(id, STATE_TOP, ADJ_MEM_FACTOR_NORMAL, 200, &mut pkgs);
        tracker.write_state_sync(900);

        let after = std::fs::metadata(dir.path().join(DATA_FILE_NAME)).unwrap();
        assert_eq!(written.len(), after.len());
        assert!(tracker.is_shutting_down());
    }
}
