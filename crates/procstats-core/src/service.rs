//! Per-service time accumulators.
//!
//! A declared service is tracked in three orthogonal modes: started, bound,
//! and executing. Each mode is a tiny state machine over the eight composite
//! memory-factor states (the process lifecycle dimension is unused here), so
//! the durations live in a dense fixed-size array rather than the sparse
//! pool-backed tables used for processes.

use crate::states::{ADJ_COUNT, STATE_NOTHING};

/// Arena handle for a [`ServiceRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SvcId(pub(crate) usize);

/// One service mode: dense per-mem-factor durations, an operation counter,
/// and the live interval.
#[derive(Debug, Default)]
pub struct ServiceTime {
    pub(crate) durations: [i64; ADJ_COUNT as usize],
    pub(crate) op_count: i32,
    pub(crate) cur_state: i32,
    pub(crate) start_time: u64,
}

impl ServiceTime {
    fn new() -> Self {
        Self {
            cur_state: STATE_NOTHING,
            ..Self::default()
        }
    }

    /// Turn the mode on (accumulating under `mem_factor`) or off.
    ///
    /// Re-invoking with a different factor while active commits the old
    /// bucket and starts accumulating in the new one; that is how the tracker
    /// re-arms active services on a device memory-factor flip. The op counter
    /// increments only on the off-to-on edge.
    pub(crate) fn set_active(&mut self, active: bool, mem_factor: i32, now: u64) {
        let state = if active { mem_factor } else { STATE_NOTHING };
        if self.cur_state != state {
            if self.cur_state != STATE_NOTHING {
                self.durations[self.cur_state as usize] +=
                    now.saturating_sub(self.start_time) as i64;
            } else if active {
                self.op_count += 1;
            }
            self.cur_state = state;
            self.start_time = now;
        }
    }

    /// Fold the running interval into its bucket and restart it at `now`.
    /// Used before serialization and dumping.
    pub(crate) fn commit(&mut self, now: u64) {
        if self.cur_state != STATE_NOTHING {
            self.durations[self.cur_state as usize] +=
                now.saturating_sub(self.start_time) as i64;
            self.start_time = now;
        }
    }

    /// Time accumulated under composite factor `state`, including the running
    /// interval when the mode is currently active in that factor.
    #[must_use]
    pub fn duration(&self, state: i32, now: u64) -> i64 {
        let mut time = self.durations[state as usize];
        if self.cur_state == state {
            time += now.saturating_sub(self.start_time) as i64;
        }
        time
    }

    #[must_use]
    pub fn op_count(&self) -> i32 {
        self.op_count
    }

    #[must_use]
    pub fn cur_state(&self) -> i32 {
        self.cur_state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cur_state != STATE_NOTHING
    }
}

/// Statistics for one declared service within a package.
#[derive(Debug)]
pub struct ServiceRecord {
    pub(crate) started: ServiceTime,
    pub(crate) bound: ServiceTime,
    pub(crate) executing: ServiceTime,
}

impl ServiceRecord {
    pub(crate) fn new() -> Self {
        Self {
            started: ServiceTime::new(),
            bound: ServiceTime::new(),
            executing: ServiceTime::new(),
        }
    }

    #[must_use]
    pub fn started(&self) -> &ServiceTime {
        &self.started
    }

    #[must_use]
    pub fn bound(&self) -> &ServiceTime {
        &self.bound
    }

    #[must_use]
    pub fn executing(&self) -> &ServiceTime {
        &self.executing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::{compose_mem_factor, ADJ_MEM_FACTOR_LOW, ADJ_MEM_FACTOR_NORMAL};

    #[test]
    fn op_count_increments_only_on_activation_edge() {
        let mut st = ServiceTime::new();
        st.set_active(true, 0, 100);
        st.set_active(true, 0, 200); // no-op, same state
        st.set_active(false, 0, 300);
        st.set_active(true, 2, 400);
        assert_eq!(st.op_count(), 2);
    }

    #[test]
    fn durations_accrue_to_the_bucket_being_left() {
        let mut st = ServiceTime::new();
        st.set_active(true, 0, 0);
        st.set_active(true, 6, 1000); // factor flip while active
        assert_eq!(st.durations[0], 1000);
        assert_eq!(st.cur_state(), 6);
        st.set_active(false, 0, 1500);
        assert_eq!(st.durations[6], 500);
        assert_eq!(st.op_count(), 1);
    }

    #[test]
    fn factor_flip_while_bound_matches_rearm_contract() {
        // set_bound(true, NORMAL, 0), then a device flip to LOW/screen-on at
        // t=1000 re-arms the mode under the new composite factor.
        let mut st = ServiceTime::new();
        st.set_active(true, compose_mem_factor(ADJ_MEM_FACTOR_NORMAL, false), 0);
        assert_eq!(st.duration(0, 0), 0);

        let new_factor = compose_mem_factor(ADJ_MEM_FACTOR_LOW, true);
        st.set_active(true, new_factor, 1000);
        assert_eq!(st.durations[0], 1000);
        assert_eq!(st.cur_state(), new_factor);
    }

    #[test]
    fn running_interval_counts_toward_current_bucket() {
        let mut st = ServiceTime::new();
        st.set_active(true, 3, 100);
        assert_eq!(st.duration(3, 600), 500);
        assert_eq!(st.duration(2, 600), 0);
    }

    #[test]
    fn commit_folds_and_restarts() {
        let mut st = ServiceTime::new();
        st.set_active(true, 1, 0);
        st.commit(400);
        assert_eq!(st.durations[1], 400);
        assert_eq!(st.duration(1, 500), 500);
    }

    #[test]
    fn deactivating_an_inactive_mode_is_a_noop() {
        let mut st = ServiceTime::new();
        st.set_active(false, 0, 100);
        assert_eq!(st.op_count(), 0);
        assert!(!st.is_active());
        assert_eq!(st.start_time, 0);
    }
}
