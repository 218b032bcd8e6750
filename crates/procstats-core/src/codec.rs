//! Binary codec for the persisted stats blob.
//!
//! Layout (all integers little-endian, strings length-prefixed UTF-8):
//!
//! ```text
//! magic, version, STATE_COUNT, ADJ_COUNT, PSS_COUNT, LONGS_SIZE   (i32 each)
//! time_period_start, time_period_end                              (i64)
//! n_longs_arrays, next_long_in_last                               (i32)
//! full pool arrays, then the tail array prefix                    (i64)
//! mem_factor_durations[ADJ_COUNT]                                 (i64)
//! process registry: name -> uid -> (owning package, process body)
//! package registry: name -> uid -> processes (alias flag or body)
//!                                  + services (service bodies)
//! ```
//!
//! Reading is defensive: the preamble constants, every count, every string,
//! and every packed offset are validated, and a table whose tags are not
//! strictly ascending is rejected. Any failure aborts the whole parse; the
//! caller falls back to a reset state and the on-disk file stays untouched.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::error::ParseError;
use crate::long_pool::{LongPool, PackedOffset, LONGS_SIZE};
use crate::process::{ProcId, ProcessRecord};
use crate::registry::{PackageProcess, PackageRecord};
use crate::service::{ServiceRecord, ServiceTime, SvcId};
use crate::state_table::SparseStateTable;
use crate::states::{ADJ_COUNT, PSS_COUNT, STATE_COUNT, STATE_NOTHING};
use crate::stats::ProcessStats;

/// Blob magic number ("STSP" little-endian).
pub const MAGIC: u32 = 0x5053_5453;

/// Current blob format version.
pub const FORMAT_VERSION: i32 = 1;

/// Upper bound on a declared string length; anything larger is corruption.
const MAX_STRING_LEN: i32 = 1 << 20;

// =============================================================================
// Wire primitives
// =============================================================================

fn write_i32(w: &mut impl Write, v: i32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u32(w: &mut impl Write, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_i64(w: &mut impl Write, v: i64) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_str(w: &mut impl Write, s: &str) -> std::io::Result<()> {
    write_i32(w, s.len() as i32)?;
    w.write_all(s.as_bytes())
}

fn read_i32(r: &mut impl Read) -> Result<i32, ParseError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u32(r: &mut impl Read) -> Result<u32, ParseError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i64(r: &mut impl Read) -> Result<i64, ParseError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_str(r: &mut impl Read, what: &'static str) -> Result<String, ParseError> {
    let len = read_i32(r)?;
    if !(0..=MAX_STRING_LEN).contains(&len) {
        return Err(ParseError::BadString { what });
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| ParseError::BadString { what })
}

fn expect_i32(
    r: &mut impl Read,
    expected: i32,
    what: &'static str,
) -> Result<(), ParseError> {
    let got = read_i32(r)?;
    if got != expected {
        return Err(ParseError::BadConstant {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

fn read_count(r: &mut impl Read, what: &'static str) -> Result<i32, ParseError> {
    let got = read_i32(r)?;
    if got < 0 {
        return Err(ParseError::BadCount { what, got });
    }
    Ok(got)
}

// =============================================================================
// Writing
// =============================================================================

/// Serialize the full state. Running intervals are folded in (with
/// `start_time = now`) so the blob reflects time committed up to the call
/// moment; `stats` therefore takes `&mut`.
pub fn write_stats(
    stats: &mut ProcessStats,
    w: &mut impl Write,
    now: u64,
) -> std::io::Result<()> {
    stats.commit_running(now);

    write_i32(w, MAGIC as i32)?;
    write_i32(w, FORMAT_VERSION)?;
    write_i32(w, STATE_COUNT)?;
    write_i32(w, ADJ_COUNT)?;
    write_i32(w, PSS_COUNT as i32)?;
    write_i32(w, LONGS_SIZE as i32)?;

    write_i64(w, stats.time_period_start as i64)?;
    write_i64(w, stats.time_period_end as i64)?;

    let n_arrays = stats.pool.array_count();
    write_i32(w, n_arrays as i32)?;
    write_i32(w, stats.pool.next_index() as i32)?;
    for which in 0..n_arrays - 1 {
        for &v in stats.pool.array(which).iter() {
            write_i64(w, v)?;
        }
    }
    let tail = stats.pool.array(n_arrays - 1);
    for &v in &tail[..stats.pool.next_index()] {
        write_i64(w, v)?;
    }

    for &v in &stats.mem_factor_durations {
        write_i64(w, v)?;
    }

    // Common process registry, grouped by process name.
    let proc_groups = grouped(&stats.process_index);
    write_i32(w, proc_groups.len() as i32)?;
    for (name, uids) in proc_groups {
        write_str(w, &name)?;
        write_i32(w, uids.len() as i32)?;
        for (uid, id) in uids {
            write_i32(w, uid)?;
            let rec = &stats.procs[id.0];
            write_str(w, &rec.package)?;
            write_process_body(w, rec)?;
        }
    }

    // Package registry, grouped by package name.
    let pkg_keys: Vec<(String, i32)> = stats.packages.keys().cloned().collect();
    let pkg_groups = grouped_keys(&pkg_keys);
    write_i32(w, pkg_groups.len() as i32)?;
    for (name, uids) in pkg_groups {
        write_str(w, &name)?;
        write_i32(w, uids.len() as i32)?;
        for uid in uids {
            write_i32(w, uid)?;
            let pkg = &stats.packages[&(name.clone(), uid)];
            write_i32(w, pkg.processes.len() as i32)?;
            for (proc_name, entry) in &pkg.processes {
                write_str(w, proc_name)?;
                match entry {
                    PackageProcess::Alias(_) => write_i32(w, 0)?,
                    PackageProcess::Own(id) => {
                        write_i32(w, 1)?;
                        write_process_body(w, &stats.procs[id.0])?;
                    }
                }
            }
            write_i32(w, pkg.services.len() as i32)?;
            for (svc_name, &id) in &pkg.services {
                write_str(w, svc_name)?;
                write_service_body(w, &stats.svcs[id.0])?;
            }
        }
    }

    Ok(())
}

fn write_process_body(w: &mut impl Write, rec: &ProcessRecord) -> std::io::Result<()> {
    write_i32(w, i32::from(rec.multi_package))?;
    write_i32(w, rec.durations.len() as i32)?;
    for off in rec.durations.iter() {
        write_u32(w, off.raw())?;
    }
    write_i32(w, rec.pss.len() as i32)?;
    for off in rec.pss.iter() {
        write_u32(w, off.raw())?;
    }
    write_i32(w, rec.excessive_wake)?;
    write_i32(w, rec.excessive_cpu)
}

fn write_service_body(w: &mut impl Write, svc: &ServiceRecord) -> std::io::Result<()> {
    for mode in [&svc.started, &svc.bound, &svc.executing] {
        for &v in &mode.durations {
            write_i64(w, v)?;
        }
        write_i32(w, mode.op_count)?;
    }
    Ok(())
}

/// Group a (name, uid)-keyed map into per-name runs, preserving the map's
/// sorted order so one serialization run is stable.
fn grouped<V: Copy>(map: &BTreeMap<(String, i32), V>) -> Vec<(String, Vec<(i32, V)>)> {
    let mut out: Vec<(String, Vec<(i32, V)>)> = Vec::new();
    for ((name, uid), v) in map {
        match out.last_mut() {
            Some((last, list)) if last == name => list.push((*uid, *v)),
            _ => out.push((name.clone(), vec![(*uid, *v)])),
        }
    }
    out
}

fn grouped_keys(keys: &[(String, i32)]) -> Vec<(String, Vec<i32>)> {
    let mut out: Vec<(String, Vec<i32>)> = Vec::new();
    for (name, uid) in keys {
        match out.last_mut() {
            Some((last, list)) if last == name => list.push(*uid),
            _ => out.push((name.clone(), vec![*uid])),
        }
    }
    out
}

// =============================================================================
// Reading
// =============================================================================

/// Parse a stats blob into a fresh state.
///
/// On any structural error the partially decoded state is discarded and the
/// error returned; nothing half-parsed ever becomes visible.
pub fn read_stats(r: &mut impl Read) -> Result<ProcessStats, ParseError> {
    let magic = read_u32(r)?;
    if magic != MAGIC {
        return Err(ParseError::BadMagic { got: magic });
    }
    let version = read_i32(r)?;
    if version != FORMAT_VERSION {
        return Err(ParseError::BadVersion { got: version });
    }
    expect_i32(r, STATE_COUNT, "state count")?;
    expect_i32(r, ADJ_COUNT, "adj count")?;
    expect_i32(r, PSS_COUNT as i32, "pss count")?;
    expect_i32(r, LONGS_SIZE as i32, "longs size")?;

    let time_period_start = read_i64(r)? as u64;
    let time_period_end = read_i64(r)? as u64;

    let n_arrays = read_i32(r)?;
    if n_arrays < 1 {
        return Err(ParseError::BadCount {
            what: "longs array",
            got: n_arrays,
        });
    }
    let next = read_i32(r)?;
    if !(0..=LONGS_SIZE as i32).contains(&next) {
        return Err(ParseError::BadCount {
            what: "next long",
            got: next,
        });
    }
    let mut arrays = Vec::with_capacity(n_arrays as usize);
    for _ in 0..n_arrays - 1 {
        let mut array = vec![0i64; LONGS_SIZE];
        for slot in array.iter_mut() {
            *slot = read_i64(r)?;
        }
        arrays.push(boxed_array(array));
    }
    let mut tail = vec![0i64; LONGS_SIZE];
    for slot in tail.iter_mut().take(next as usize) {
        *slot = read_i64(r)?;
    }
    arrays.push(boxed_array(tail));
    let pool = LongPool::restore(arrays, next as usize);

    let mut mem_factor_durations = [0i64; ADJ_COUNT as usize];
    for slot in &mut mem_factor_durations {
        *slot = read_i64(r)?;
    }

    let mut stats = ProcessStats::new(0);
    stats.pool = pool;
    stats.time_period_start = time_period_start;
    stats.time_period_end = time_period_end;
    stats.mem_factor_durations = mem_factor_durations;

    // Common process registry.
    let n_proc_names = read_count(r, "process")?;
    for _ in 0..n_proc_names {
        let proc_name = read_str(r, "process name")?;
        let n_uids = read_count(r, "process uid")?;
        for _ in 0..n_uids {
            let uid = read_i32(r)?;
            if uid < 0 {
                return Err(ParseError::BadCount {
                    what: "uid",
                    got: uid,
                });
            }
            let pkg_name = read_str(r, "process package name")?;
            let id = ProcId(stats.procs.len());
            let mut rec = ProcessRecord::new_common(id, &pkg_name, uid, &proc_name);
            read_process_body(r, &mut rec, &stats.pool)?;
            stats.procs.push(rec);
            stats.process_index.insert((proc_name.clone(), uid), id);
        }
    }

    // Package registry.
    let n_pkg_names = read_count(r, "package")?;
    for _ in 0..n_pkg_names {
        let pkg_name = read_str(r, "package name")?;
        let n_uids = read_count(r, "package uid")?;
        for _ in 0..n_uids {
            let uid = read_i32(r)?;
            if uid < 0 {
                return Err(ParseError::BadCount {
                    what: "uid",
                    got: uid,
                });
            }
            let mut pkg = PackageRecord::new(uid);
            let n_procs = read_count(r, "package process")?;
            for _ in 0..n_procs {
                let proc_name = read_str(r, "package process name")?;
                let common = stats
                    .process_index
                    .get(&(proc_name.clone(), uid))
                    .copied()
                    .ok_or_else(|| ParseError::MissingCommonProcess {
                        name: proc_name.clone(),
                    })?;
                let has_own_body = read_i32(r)?;
                let entry = if has_own_body != 0 {
                    let id = ProcId(stats.procs.len());
                    let mut rec = ProcessRecord::new_per_package(
                        common,
                        STATE_NOTHING,
                        &pkg_name,
                        uid,
                        &proc_name,
                        0,
                    );
                    read_process_body(r, &mut rec, &stats.pool)?;
                    stats.procs.push(rec);
                    PackageProcess::Own(id)
                } else {
                    PackageProcess::Alias(common)
                };
                pkg.processes.insert(proc_name, entry);
            }
            let n_svcs = read_count(r, "package service")?;
            for _ in 0..n_svcs {
                let svc_name = read_str(r, "service name")?;
                let id = SvcId(stats.svcs.len());
                stats.svcs.push(read_service_body(r)?);
                pkg.services.insert(svc_name, id);
            }
            stats.packages.insert((pkg_name.clone(), uid), pkg);
        }
    }

    Ok(stats)
}

fn read_process_body(
    r: &mut impl Read,
    rec: &mut ProcessRecord,
    pool: &LongPool,
) -> Result<(), ParseError> {
    rec.multi_package = read_i32(r)? != 0;
    rec.durations = read_table(r, "durations", pool)?;
    rec.pss = read_table(r, "pss", pool)?;
    rec.excessive_wake = read_i32(r)?;
    rec.excessive_cpu = read_i32(r)?;
    Ok(())
}

fn read_table(
    r: &mut impl Read,
    what: &'static str,
    pool: &LongPool,
) -> Result<SparseStateTable, ParseError> {
    let size = read_count(r, what)?;
    let mut entries = Vec::with_capacity(size.min(256) as usize);
    let mut last_tag: i32 = -1;
    for _ in 0..size {
        let raw = read_u32(r)?;
        let off = PackedOffset::from_raw(raw);
        if !pool.validate(off) {
            return Err(ParseError::BadOffset { what, raw });
        }
        if i32::from(off.tag()) <= last_tag {
            return Err(ParseError::UnsortedTable { what });
        }
        last_tag = i32::from(off.tag());
        entries.push(off);
    }
    Ok(SparseStateTable::from_entries(entries))
}

fn read_service_body(r: &mut impl Read) -> Result<ServiceRecord, ParseError> {
    let mut svc = ServiceRecord::new();
    for mode in [&mut svc.started, &mut svc.bound, &mut svc.executing] {
        read_service_time(r, mode)?;
    }
    Ok(svc)
}

fn read_service_time(r: &mut impl Read, mode: &mut ServiceTime) -> Result<(), ParseError> {
    for slot in &mut mode.durations {
        *slot = read_i64(r)?;
    }
    mode.op_count = read_i32(r)?;
    Ok(())
}

fn boxed_array(array: Vec<i64>) -> Box<[i64; LONGS_SIZE]> {
    array
        .into_boxed_slice()
        .try_into()
        .expect("array of LONGS_SIZE")
}
