//! Package-side record registry types.
//!
//! A [`PackageRecord`] indexes the processes and services declared by one
//! (package, uid). Its process entries are a tagged variant: while only one
//! package hosts a process the entry *aliases* the common record; once a
//! second package shows up every hosting package gets its *own* per-package
//! record and the alias disappears.

use std::collections::BTreeMap;

use crate::process::ProcId;
use crate::service::SvcId;

/// A package's view of one process: shared with the registry, or split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageProcess {
    /// The package map entry points at the common record itself.
    Alias(ProcId),
    /// The package holds its own per-package record.
    Own(ProcId),
}

impl PackageProcess {
    /// The record the entry resolves to, either way.
    #[must_use]
    pub fn id(self) -> ProcId {
        match self {
            Self::Alias(id) | Self::Own(id) => id,
        }
    }

    #[must_use]
    pub fn is_alias(self) -> bool {
        matches!(self, Self::Alias(_))
    }
}

/// Process and service records declared by one (package, uid).
#[derive(Debug)]
pub struct PackageRecord {
    pub(crate) uid: i32,
    pub(crate) processes: BTreeMap<String, PackageProcess>,
    pub(crate) services: BTreeMap<String, SvcId>,
}

impl PackageRecord {
    pub(crate) fn new(uid: i32) -> Self {
        Self {
            uid,
            processes: BTreeMap::new(),
            services: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn uid(&self) -> i32 {
        self.uid
    }

    #[must_use]
    pub fn processes(&self) -> &BTreeMap<String, PackageProcess> {
        &self.processes
    }

    #[must_use]
    pub fn services(&self) -> &BTreeMap<String, SvcId> {
        &self.services
    }
}

/// Caller-held fan-out list: the per-package process records currently
/// hosting one process, keyed by package name.
///
/// Entries may briefly point at a common record that has since gone
/// multi-package; state updates fix them up in place (see
/// [`ProcessStats::set_process_state`](crate::stats::ProcessStats::set_process_state)).
pub type PackageList = Vec<(String, ProcId)>;
