//! Global accumulator state: the pool, the record arenas, both registries,
//! and the device-wide memory factor.
//!
//! `ProcessStats` is the single-writer data model. Every mutation is expected
//! to run under one outer lock owned by the host; nothing here locks. Records
//! are arena-allocated and addressed by [`ProcId`]/[`SvcId`] handles, which
//! is how the "common process points at itself, clones point back at it"
//! ownership cycle is expressed without reference cycles.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::long_pool::LongPool;
use crate::process::{ProcId, ProcessRecord};
use crate::registry::{PackageList, PackageProcess, PackageRecord};
use crate::service::{ServiceRecord, SvcId};
use crate::states::{compose_bucket, compose_mem_factor, ADJ_COUNT, STATE_NOTHING};

/// The aggregate runtime-behavior state for one time-period window.
#[derive(Debug)]
pub struct ProcessStats {
    pub(crate) pool: LongPool,
    pub(crate) procs: Vec<ProcessRecord>,
    pub(crate) svcs: Vec<ServiceRecord>,
    /// Canonical (common) process records, keyed by (process name, uid).
    pub(crate) process_index: BTreeMap<(String, i32), ProcId>,
    /// Package records, keyed by (package name, uid).
    pub(crate) packages: BTreeMap<(String, i32), PackageRecord>,

    pub(crate) mem_factor: i32,
    pub(crate) mem_factor_start: u64,
    pub(crate) mem_factor_durations: [i64; ADJ_COUNT as usize],

    /// Wall-clock bounds of the current window.
    pub(crate) time_period_start: u64,
    pub(crate) time_period_end: u64,
}

impl ProcessStats {
    /// A freshly reset state with the time window opening at `wall_now`
    /// (wall-clock milliseconds).
    #[must_use]
    pub fn new(wall_now: u64) -> Self {
        Self {
            pool: LongPool::new(),
            procs: Vec::new(),
            svcs: Vec::new(),
            process_index: BTreeMap::new(),
            packages: BTreeMap::new(),
            mem_factor: STATE_NOTHING,
            mem_factor_start: 0,
            mem_factor_durations: [0; ADJ_COUNT as usize],
            time_period_start: wall_now,
            time_period_end: wall_now,
        }
    }

    /// Drop all records, clear the pool, and restart the time window.
    pub fn reset(&mut self, wall_now: u64) {
        debug!("resetting process stats");
        *self = Self::new(wall_now);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn pool(&self) -> &LongPool {
        &self.pool
    }

    #[must_use]
    pub fn process(&self, id: ProcId) -> &ProcessRecord {
        &self.procs[id.0]
    }

    #[must_use]
    pub fn service(&self, id: SvcId) -> &ServiceRecord {
        &self.svcs[id.0]
    }

    /// Common process records, keyed by (process name, uid).
    #[must_use]
    pub fn process_index(&self) -> &BTreeMap<(String, i32), ProcId> {
        &self.process_index
    }

    /// Package records, keyed by (package name, uid).
    #[must_use]
    pub fn packages(&self) -> &BTreeMap<(String, i32), PackageRecord> {
        &self.packages
    }

    /// Current composite memory factor, defaulting to normal/screen-off when
    /// nothing has been reported yet.
    #[must_use]
    pub fn mem_factor(&self) -> i32 {
        if self.mem_factor != STATE_NOTHING {
            self.mem_factor
        } else {
            0
        }
    }

    #[must_use]
    pub fn mem_factor_durations(&self) -> &[i64; ADJ_COUNT as usize] {
        &self.mem_factor_durations
    }

    #[must_use]
    pub fn mem_factor_raw(&self) -> i32 {
        self.mem_factor
    }

    #[must_use]
    pub fn mem_factor_start(&self) -> u64 {
        self.mem_factor_start
    }

    #[must_use]
    pub fn time_period_start(&self) -> u64 {
        self.time_period_start
    }

    #[must_use]
    pub fn time_period_end(&self) -> u64 {
        self.time_period_end
    }

    // ========================================================================
    // Record lookup / creation
    // ========================================================================

    /// The per-package process record for (`pkg`, `uid`, `name`), creating
    /// whatever is missing.
    ///
    /// While a single package hosts the process, its package map entry
    /// aliases the common record. The first lookup from a *second* package
    /// flips the common record to multi-package: the original owner receives
    /// a deep clone (durations and excessive counters; PSS starts empty) and
    /// the caller a fresh per-package record inheriting the live state.
    pub fn get_process(&mut self, pkg: &str, uid: i32, name: &str, now: u64) -> ProcId {
        self.ensure_package(pkg, uid);
        let pkg_key = (pkg.to_string(), uid);
        if let Some(entry) = self.packages[&pkg_key].processes.get(name) {
            return entry.id();
        }

        let proc_key = (name.to_string(), uid);
        let common = match self.process_index.get(&proc_key) {
            Some(&id) => id,
            None => {
                let id = ProcId(self.procs.len());
                self.procs.push(ProcessRecord::new_common(id, pkg, uid, name));
                self.process_index.insert(proc_key, id);
                id
            }
        };

        let entry = if !self.procs[common.0].multi_package {
            if self.procs[common.0].package == pkg {
                // Sole owner: the package entry points straight at the
                // common record.
                PackageProcess::Alias(common)
            } else {
                // A second package is sharing the process: split.
                debug!(process = name, uid, "process went multi-package");
                self.procs[common.0].multi_package = true;
                let orig_pkg = self.procs[common.0].package.clone();
                let orig_clone = self.clone_record(common, &orig_pkg, now);
                self.ensure_package(&orig_pkg, uid);
                self.packages
                    .get_mut(&(orig_pkg, uid))
                    .expect("original owner package record")
                    .processes
                    .insert(name.to_string(), PackageProcess::Own(orig_clone));
                PackageProcess::Own(self.new_per_package(common, pkg, now))
            }
        } else {
            PackageProcess::Own(self.new_per_package(common, pkg, now))
        };

        self.packages
            .get_mut(&pkg_key)
            .expect("caller package record")
            .processes
            .insert(name.to_string(), entry);
        entry.id()
    }

    /// The service record for (`pkg`, `uid`, `name`), created on first use.
    pub fn get_service(&mut self, pkg: &str, uid: i32, name: &str) -> SvcId {
        let next = SvcId(self.svcs.len());
        let pkg_rec = self
            .packages
            .entry((pkg.to_string(), uid))
            .or_insert_with(|| PackageRecord::new(uid));
        if let Some(&id) = pkg_rec.services.get(name) {
            return id;
        }
        pkg_rec.services.insert(name.to_string(), next);
        self.svcs.push(ServiceRecord::new());
        next
    }

    fn ensure_package(&mut self, pkg: &str, uid: i32) {
        self.packages
            .entry((pkg.to_string(), uid))
            .or_insert_with(|| PackageRecord::new(uid));
    }

    /// Deep clone of `src` for `new_pkg`: duration slots are copied into
    /// freshly allocated pool entries, excessive counters are carried over,
    /// PSS starts empty, and the live state is inherited with
    /// `start_time = now`.
    fn clone_record(&mut self, src: ProcId, new_pkg: &str, now: u64) -> ProcId {
        let (uid, name, cur_state, wake, cpu) = {
            let s = &self.procs[src.0];
            (
                s.uid,
                s.name.clone(),
                s.cur_state,
                s.excessive_wake,
                s.excessive_cpu,
            )
        };
        let entries: Vec<(u8, i64)> = self.procs[src.0]
            .durations
            .iter()
            .map(|off| (off.tag(), self.pool.get(off, 0)))
            .collect();

        let mut rec = ProcessRecord::new_per_package(src, cur_state, new_pkg, uid, &name, now);
        for (tag, value) in entries {
            let off = rec.durations.get_or_insert(tag, 1, &mut self.pool);
            self.pool.set(off, 0, value);
        }
        rec.excessive_wake = wake;
        rec.excessive_cpu = cpu;

        let id = ProcId(self.procs.len());
        self.procs.push(rec);
        id
    }

    /// A fresh per-package record inheriting the common record's live state.
    fn new_per_package(&mut self, common: ProcId, pkg: &str, now: u64) -> ProcId {
        let (uid, name, cur_state) = {
            let c = &self.procs[common.0];
            (c.uid, c.name.clone(), c.cur_state)
        };
        let id = ProcId(self.procs.len());
        self.procs.push(ProcessRecord::new_per_package(
            common, cur_state, pkg, uid, &name, now,
        ));
        id
    }

    // ========================================================================
    // Event routing
    // ========================================================================

    /// Move a process to `proc_state` under `mem_factor` (or out of tracking
    /// with [`STATE_NOTHING`]).
    ///
    /// The transition always applies to the common record; when the process
    /// is multi-package it also fans out to every per-package record in
    /// `pkg_list`, upgrading stale entries in place.
    pub fn set_process_state(
        &mut self,
        id: ProcId,
        proc_state: i32,
        mem_factor: i32,
        now: u64,
        pkg_list: &mut PackageList,
    ) {
        let state = if proc_state == STATE_NOTHING {
            STATE_NOTHING
        } else {
            compose_bucket(mem_factor, proc_state)
        };

        let common = self.procs[id.0].common;
        let rec = &mut self.procs[common.0];
        rec.apply_state(state, now, &mut self.pool);
        if !self.procs[common.0].multi_package {
            return;
        }
        for i in (0..pkg_list.len()).rev() {
            let fixed = self.pull_fixed(pkg_list, i);
            let rec = &mut self.procs[fixed.0];
            rec.apply_state(state, now, &mut self.pool);
        }
    }

    /// Fold a PSS sample into the record's current bucket. `force` bypasses
    /// the 30-second same-state throttle.
    pub fn add_pss(&mut self, id: ProcId, pss: i64, force: bool, now: u64) {
        let rec = &mut self.procs[id.0];
        rec.fold_pss(pss, force, now, &mut self.pool);
    }

    /// Count a kill for excessive wake locks.
    pub fn report_excessive_wake(&mut self, id: ProcId, pkg_list: &mut PackageList) {
        let common = self.procs[id.0].common;
        self.procs[common.0].excessive_wake += 1;
        if !self.procs[common.0].multi_package {
            return;
        }
        for i in (0..pkg_list.len()).rev() {
            let fixed = self.pull_fixed(pkg_list, i);
            self.procs[fixed.0].excessive_wake += 1;
        }
    }

    /// Count a kill for excessive CPU use.
    pub fn report_excessive_cpu(&mut self, id: ProcId, pkg_list: &mut PackageList) {
        let common = self.procs[id.0].common;
        self.procs[common.0].excessive_cpu += 1;
        if !self.procs[common.0].multi_package {
            return;
        }
        for i in (0..pkg_list.len()).rev() {
            let fixed = self.pull_fixed(pkg_list, i);
            self.procs[fixed.0].excessive_cpu += 1;
        }
    }

    /// Upgrade a fan-out entry still pointing at a common record that has
    /// since gone multi-package.
    ///
    /// # Panics
    ///
    /// If the per-package record does not exist. `get_process` creates it on
    /// the multi-package transition, so a miss is an invariant violation.
    fn pull_fixed(&mut self, pkg_list: &mut PackageList, i: usize) -> ProcId {
        let id = pkg_list[i].1;
        let rec = &self.procs[id.0];
        if !(rec.multi_package && rec.common == id) {
            return id;
        }
        let pkg_key = (pkg_list[i].0.clone(), rec.uid);
        let name = rec.name.clone();
        let fixed = self
            .packages
            .get(&pkg_key)
            .and_then(|p| p.processes.get(&name))
            .map(|e| e.id())
            .unwrap_or_else(|| {
                panic!(
                    "per-package process record missing: {} in {}/{}",
                    name, pkg_key.0, pkg_key.1
                )
            });
        pkg_list[i].1 = fixed;
        fixed
    }

    /// Report the device memory factor (and screen state). Returns true when
    /// the composite factor actually changed.
    ///
    /// On a change, services currently active in started or bound mode are
    /// re-armed under the new factor so their time starts accruing to the new
    /// bucket. Process records are not refreshed here; callers reissue
    /// `set_process_state` per process.
    pub fn set_mem_factor(&mut self, mem_level: i32, screen_on: bool, now: u64) -> bool {
        let factor = compose_mem_factor(mem_level, screen_on);
        if factor == self.mem_factor {
            return false;
        }
        if self.mem_factor != STATE_NOTHING {
            self.mem_factor_durations[self.mem_factor as usize] +=
                now.saturating_sub(self.mem_factor_start) as i64;
        }
        self.mem_factor = factor;
        self.mem_factor_start = now;
        for svc in &mut self.svcs {
            if svc.started.is_active() {
                svc.started.set_active(true, factor, now);
            }
            if svc.bound.is_active() {
                svc.bound.set_active(true, factor, now);
            }
        }
        true
    }

    /// Service mode transitions.
    pub fn set_service_started(&mut self, id: SvcId, active: bool, mem_factor: i32, now: u64) {
        self.svcs[id.0].started.set_active(active, mem_factor, now);
    }

    pub fn set_service_bound(&mut self, id: SvcId, active: bool, mem_factor: i32, now: u64) {
        self.svcs[id.0].bound.set_active(active, mem_factor, now);
    }

    pub fn set_service_executing(&mut self, id: SvcId, active: bool, mem_factor: i32, now: u64) {
        self.svcs[id.0].executing.set_active(active, mem_factor, now);
    }

    // ========================================================================
    // Snapshot support
    // ========================================================================

    /// Fold every running interval (process states, service modes, the memory
    /// factor) into its bucket and restart the intervals at `now`. Called
    /// before serialization so the blob reflects time up to the call moment.
    pub(crate) fn commit_running(&mut self, now: u64) {
        for rec in &mut self.procs {
            rec.commit_state_time(now, &mut self.pool);
        }
        for svc in &mut self.svcs {
            svc.started.commit(now);
            svc.bound.commit(now);
            svc.executing.commit(now);
        }
        if self.mem_factor != STATE_NOTHING {
            self.mem_factor_durations[self.mem_factor as usize] +=
                now.saturating_sub(self.mem_factor_start) as i64;
            self.mem_factor_start = now;
        }
    }

    // ========================================================================
    // Dump-side collection
    // ========================================================================

    /// Total time `id` spent in the cross-product of the given screen, mem,
    /// and process-state sets.
    #[must_use]
    pub fn compute_process_time(
        &self,
        id: ProcId,
        screens: &[i32],
        mems: &[i32],
        proc_states: &[i32],
        now: u64,
    ) -> i64 {
        let rec = &self.procs[id.0];
        let mut total = 0;
        for &screen in screens {
            for &mem in mems {
                for &state in proc_states {
                    total += rec.duration(compose_bucket(screen + mem, state), now, &self.pool);
                }
            }
        }
        total
    }

    /// Common processes with nonzero time in the given state cross-product,
    /// optionally filtered by package, sorted ascending by that time.
    #[must_use]
    pub fn collect_processes(
        &self,
        screens: &[i32],
        mems: &[i32],
        proc_states: &[i32],
        now: u64,
        req_package: Option<&str>,
    ) -> Vec<ProcId> {
        let mut found: BTreeSet<ProcId> = BTreeSet::new();
        for ((pkg_name, _uid), pkg) in &self.packages {
            if req_package.is_some_and(|req| req != pkg_name.as_str()) {
                continue;
            }
            for entry in pkg.processes.values() {
                found.insert(self.procs[entry.id().0].common);
            }
        }
        let mut out: Vec<(ProcId, i64)> = found
            .into_iter()
            .filter_map(|id| {
                let total = self.compute_process_time(id, screens, mems, proc_states, now);
                (total > 0).then_some((id, total))
            })
            .collect();
        out.sort_by_key(|&(_, total)| total);
        out.into_iter().map(|(id, _)| id).collect()
    }
}
