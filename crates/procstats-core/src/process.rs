//! Per-process lifecycle accumulator.
//!
//! A [`ProcessRecord`] integrates point-in-time state transitions into
//! total-time-in-state sums over the 80-bucket composite state space, and
//! folds PSS samples into per-bucket `{count, min, avg, max}` tuples. Records
//! live in an arena owned by [`ProcessStats`](crate::stats::ProcessStats) and
//! reference each other by [`ProcId`]; the canonical ("common") record for a
//! (name, uid) pair points at itself.

use crate::long_pool::LongPool;
use crate::state_table::SparseStateTable;
use crate::states::{PSS_AVERAGE, PSS_COUNT, PSS_MAXIMUM, PSS_MINIMUM, PSS_SAMPLE_COUNT,
    STATE_NOTHING};

/// Minimum wall time between two unforced PSS samples in the same state.
pub const PSS_SAMPLE_THROTTLE_MS: u64 = 30 * 1000;

/// Arena handle for a [`ProcessRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcId(pub(crate) usize);

/// Statistics for one process, either the canonical copy shared by every
/// package hosting it or a per-package split.
#[derive(Debug)]
pub struct ProcessRecord {
    /// Package the record belongs to. For a common record this is the package
    /// that first looked the process up.
    pub(crate) package: String,
    pub(crate) uid: i32,
    pub(crate) name: String,
    /// The canonical record for this (name, uid); self for the common copy.
    pub(crate) common: ProcId,
    /// True on a common record once a second package shares the process.
    pub(crate) multi_package: bool,

    pub(crate) durations: SparseStateTable,
    pub(crate) cur_state: i32,
    pub(crate) start_time: u64,

    pub(crate) pss: SparseStateTable,
    pub(crate) last_pss_state: i32,
    pub(crate) last_pss_time: u64,

    pub(crate) excessive_wake: i32,
    pub(crate) excessive_cpu: i32,
}

impl ProcessRecord {
    /// A fresh common record. The initial state is not running.
    pub(crate) fn new_common(id: ProcId, pkg: &str, uid: i32, name: &str) -> Self {
        Self {
            package: pkg.to_string(),
            uid,
            name: name.to_string(),
            common: id,
            multi_package: false,
            durations: SparseStateTable::new(),
            cur_state: STATE_NOTHING,
            start_time: 0,
            pss: SparseStateTable::new(),
            last_pss_state: STATE_NOTHING,
            last_pss_time: 0,
            excessive_wake: 0,
            excessive_cpu: 0,
        }
    }

    /// A fresh per-package record for an existing common record. Inherits the
    /// live running state, marked as started at `now`; all tables start
    /// empty.
    pub(crate) fn new_per_package(
        common: ProcId,
        common_state: i32,
        pkg: &str,
        uid: i32,
        name: &str,
        now: u64,
    ) -> Self {
        Self {
            cur_state: common_state,
            start_time: now,
            ..Self::new_common(common, pkg, uid, name)
        }
    }

    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    #[must_use]
    pub fn uid(&self) -> i32 {
        self.uid
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn common(&self) -> ProcId {
        self.common
    }

    #[must_use]
    pub fn multi_package(&self) -> bool {
        self.multi_package
    }

    #[must_use]
    pub fn cur_state(&self) -> i32 {
        self.cur_state
    }

    #[must_use]
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    #[must_use]
    pub fn excessive_wake(&self) -> i32 {
        self.excessive_wake
    }

    #[must_use]
    pub fn excessive_cpu(&self) -> i32 {
        self.excessive_cpu
    }

    #[must_use]
    pub fn duration_entry_count(&self) -> usize {
        self.durations.len()
    }

    #[must_use]
    pub fn pss_entry_count(&self) -> usize {
        self.pss.len()
    }

    /// The sparse duration table (one slot per visited bucket).
    #[must_use]
    pub fn durations_table(&self) -> &SparseStateTable {
        &self.durations
    }

    /// The sparse PSS table (four slots per sampled bucket).
    #[must_use]
    pub fn pss_table(&self) -> &SparseStateTable {
        &self.pss
    }

    /// Move this record to `state` (already composed with the memory factor,
    /// or [`STATE_NOTHING`]), committing time spent in the previous state.
    pub(crate) fn apply_state(&mut self, state: i32, now: u64, pool: &mut LongPool) {
        if self.cur_state != state {
            self.commit_state_time(now, pool);
            self.cur_state = state;
        }
    }

    /// Fold the running interval into the current state's duration slot and
    /// restart the interval at `now`. The sole point at which process
    /// durations accumulate.
    pub(crate) fn commit_state_time(&mut self, now: u64, pool: &mut LongPool) {
        if self.cur_state != STATE_NOTHING {
            let dur = now.saturating_sub(self.start_time) as i64;
            let off = self
                .durations
                .get_or_insert(self.cur_state as u8, 1, pool);
            pool.add(off, 0, dur);
        }
        self.start_time = now;
    }

    /// Fold a PSS sample into the current state's tuple.
    ///
    /// Unforced samples are discarded while the record sits in the same state
    /// it was last sampled in within [`PSS_SAMPLE_THROTTLE_MS`]. The running
    /// average is computed in IEEE-754 double and truncated toward zero.
    pub(crate) fn fold_pss(&mut self, pss: i64, force: bool, now: u64, pool: &mut LongPool) {
        if !force
            && self.last_pss_state == self.cur_state
            && now < self.last_pss_time + PSS_SAMPLE_THROTTLE_MS
        {
            return;
        }
        self.last_pss_state = self.cur_state;
        self.last_pss_time = now;
        if self.cur_state == STATE_NOTHING {
            return;
        }
        let off = self
            .pss
            .get_or_insert(self.cur_state as u8, PSS_COUNT, pool);
        let count = pool.get(off, PSS_SAMPLE_COUNT);
        if count == 0 {
            pool.set(off, PSS_SAMPLE_COUNT, 1);
            pool.set(off, PSS_MINIMUM, pss);
            pool.set(off, PSS_AVERAGE, pss);
            pool.set(off, PSS_MAXIMUM, pss);
        } else {
            pool.set(off, PSS_SAMPLE_COUNT, count + 1);
            if pool.get(off, PSS_MINIMUM) > pss {
                pool.set(off, PSS_MINIMUM, pss);
            }
            let avg = pool.get(off, PSS_AVERAGE);
            let folded = ((avg as f64 * count as f64) + pss as f64) / (count + 1) as f64;
            pool.set(off, PSS_AVERAGE, folded as i64);
            if pool.get(off, PSS_MAXIMUM) < pss {
                pool.set(off, PSS_MAXIMUM, pss);
            }
        }
    }

    /// Total time recorded in `bucket`, including the running interval when
    /// the record currently sits in that bucket.
    #[must_use]
    pub fn duration(&self, bucket: i32, now: u64, pool: &LongPool) -> i64 {
        let mut time = if bucket >= 0 {
            self.durations
                .get(bucket as u8)
                .map_or(0, |off| pool.get(off, 0))
        } else {
            0
        };
        if self.cur_state == bucket {
            time += now.saturating_sub(self.start_time) as i64;
        }
        time
    }

    #[must_use]
    pub fn pss_sample_count(&self, bucket: i32, pool: &LongPool) -> i64 {
        self.pss_slot(bucket, PSS_SAMPLE_COUNT, pool)
    }

    #[must_use]
    pub fn pss_minimum(&self, bucket: i32, pool: &LongPool) -> i64 {
        self.pss_slot(bucket, PSS_MINIMUM, pool)
    }

    #[must_use]
    pub fn pss_average(&self, bucket: i32, pool: &LongPool) -> i64 {
        self.pss_slot(bucket, PSS_AVERAGE, pool)
    }

    #[must_use]
    pub fn pss_maximum(&self, bucket: i32, pool: &LongPool) -> i64 {
        self.pss_slot(bucket, PSS_MAXIMUM, pool)
    }

    fn pss_slot(&self, bucket: i32, slot: usize, pool: &LongPool) -> i64 {
        if bucket < 0 {
            return 0;
        }
        self.pss
            .get(bucket as u8)
            .map_or(0, |off| pool.get(off, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::{compose_bucket, STATE_CACHED, STATE_TOP};

    fn common() -> ProcessRecord {
        ProcessRecord::new_common(ProcId(0), "com.example", 1000, "com.example")
    }

    // ========================================================================
    // State time accumulation
    // ========================================================================

    #[test]
    fn durations_accumulate_only_on_transition_or_commit() {
        let mut pool = LongPool::new();
        let mut rec = common();

        rec.apply_state(compose_bucket(0, STATE_TOP), 100, &mut pool);
        assert_eq!(rec.duration(compose_bucket(0, STATE_TOP), 100, &pool), 0);

        rec.apply_state(compose_bucket(0, STATE_CACHED), 1100, &mut pool);
        assert_eq!(rec.duration(compose_bucket(0, STATE_TOP), 1100, &pool), 1000);
        // Running interval counts toward the current bucket.
        assert_eq!(rec.duration(compose_bucket(0, STATE_CACHED), 1200, &pool), 100);
    }

    #[test]
    fn reapplying_the_same_state_is_a_noop() {
        let mut pool = LongPool::new();
        let mut rec = common();
        rec.apply_state(5, 100, &mut pool);
        rec.apply_state(5, 900, &mut pool);
        // No table entry until the state is left or committed.
        assert_eq!(rec.duration_entry_count(), 0);
        assert_eq!(rec.start_time(), 100);
    }

    #[test]
    fn commit_folds_running_interval_and_restarts() {
        let mut pool = LongPool::new();
        let mut rec = common();
        rec.apply_state(3, 0, &mut pool);
        rec.commit_state_time(250, &mut pool);
        assert_eq!(rec.start_time(), 250);
        assert_eq!(rec.duration(3, 250, &pool), 250);
        rec.commit_state_time(400, &mut pool);
        assert_eq!(rec.duration(3, 400, &pool), 400);
    }

    #[test]
    fn leaving_to_nothing_stops_the_clock() {
        let mut pool = LongPool::new();
        let mut rec = common();
        rec.apply_state(3, 0, &mut pool);
        rec.apply_state(STATE_NOTHING, 500, &mut pool);
        assert_eq!(rec.duration(3, 9000, &pool), 500);
    }

    // ========================================================================
    // PSS folding
    // ========================================================================

    #[test]
    fn pss_running_mean_truncates_like_the_double_formula() {
        let mut pool = LongPool::new();
        let mut rec = common();
        rec.apply_state(1, 0, &mut pool);
        for (i, pss) in [100i64, 400, 100].into_iter().enumerate() {
            rec.fold_pss(pss, true, i as u64, &mut pool);
        }
        assert_eq!(rec.pss_sample_count(1, &pool), 3);
        assert_eq!(rec.pss_minimum(1, &pool), 100);
        assert_eq!(rec.pss_maximum(1, &pool), 400);
        // ((100*1 + 400)/2)=250, (250*2 + 100)/3 = 200
        assert_eq!(rec.pss_average(1, &pool), 200);
    }

    #[test]
    fn unforced_samples_throttle_within_window() {
        let mut pool = LongPool::new();
        let mut rec = common();
        rec.apply_state(1, 0, &mut pool);
        rec.fold_pss(100, false, 1000, &mut pool);
        rec.fold_pss(500, false, 1000 + PSS_SAMPLE_THROTTLE_MS - 1, &mut pool);
        assert_eq!(rec.pss_sample_count(1, &pool), 1);
        assert_eq!(rec.pss_maximum(1, &pool), 100);
        rec.fold_pss(500, false, 1000 + PSS_SAMPLE_THROTTLE_MS, &mut pool);
        assert_eq!(rec.pss_sample_count(1, &pool), 2);
    }

    #[test]
    fn state_change_defeats_the_throttle() {
        let mut pool = LongPool::new();
        let mut rec = common();
        rec.apply_state(1, 0, &mut pool);
        rec.fold_pss(100, false, 1000, &mut pool);
        rec.apply_state(2, 1001, &mut pool);
        rec.fold_pss(200, false, 1002, &mut pool);
        assert_eq!(rec.pss_sample_count(2, &pool), 1);
    }

    #[test]
    fn samples_in_nothing_state_update_throttle_but_record_nothing() {
        let mut pool = LongPool::new();
        let mut rec = common();
        rec.fold_pss(100, true, 1000, &mut pool);
        assert_eq!(rec.pss_entry_count(), 0);
        assert_eq!(rec.last_pss_time, 1000);
    }
}
