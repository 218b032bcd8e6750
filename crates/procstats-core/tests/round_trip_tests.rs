//! Serialization round-trip and corrupt-input tests.
//!
//! A write followed by a fresh read must yield equal semantic state: same
//! durations, PSS tuples, counters, registries, and mem-factor durations.
//! The checkin dump covers all of those, so equality of checkin output at
//! the write timestamp (plus targeted field checks) is the round-trip
//! criterion. Corrupt input must leave a reader indistinguishable from a
//! fresh reset.

use proptest::prelude::*;

use procstats_core::codec::{read_stats, write_stats};
use procstats_core::dump::dump_checkin;
use procstats_core::registry::PackageList;
use procstats_core::states::{ADJ_MEM_FACTOR_LOW, ADJ_MEM_FACTOR_NORMAL, STATE_COUNT,
    STATE_NOTHING};
use procstats_core::{ProcessStats, SvcId};

fn checkin(stats: &ProcessStats, now: u64) -> String {
    let mut buf = Vec::new();
    dump_checkin(stats, &mut buf, None, now).unwrap();
    String::from_utf8(buf).unwrap()
}

fn write_to_vec(stats: &mut ProcessStats, now: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    write_stats(stats, &mut buf, now).unwrap();
    buf
}

// ────────────────────────────────────────────────────────────────────
// Hand-built scenarios
// ────────────────────────────────────────────────────────────────────

#[test]
fn used_state_round_trips_through_mem_factor_changes() {
    let mut stats = ProcessStats::new(10_000);

    let id = stats.get_process("com.a", 1000, "com.a", 0);
    let mut pkgs: PackageList = vec![("com.a".into(), id)];
    let svc = stats.get_service("com.a", 1000, "com.a.Service");

    stats.set_mem_factor(ADJ_MEM_FACTOR_NORMAL, false, 0);
    stats.set_process_state(id, 1, stats.mem_factor(), 0, &mut pkgs);
    stats.set_service_started(svc, true, stats.mem_factor(), 50);

    stats.set_mem_factor(ADJ_MEM_FACTOR_LOW, false, 400);
    stats.set_process_state(id, 1, stats.mem_factor(), 400, &mut pkgs);

    stats.set_mem_factor(ADJ_MEM_FACTOR_LOW, true, 900);
    stats.set_mem_factor(ADJ_MEM_FACTOR_NORMAL, true, 1_300);

    let now = 2_000;
    let blob = write_to_vec(&mut stats, now);
    let restored = read_stats(&mut blob.as_slice()).unwrap();

    // Mem-factor durations round-trip element-wise. The original array was
    // committed by the write itself.
    assert_eq!(restored.mem_factor_durations(), stats.mem_factor_durations());
    assert_eq!(restored.mem_factor_durations()[0], 400); // normal/screen-off
    assert_eq!(restored.mem_factor_durations()[2], 500); // low/screen-off
    assert_eq!(restored.mem_factor_durations()[6], 400); // low/screen-on
    assert_eq!(restored.mem_factor_durations()[4], 700); // normal/screen-on, running until write

    assert_eq!(restored.time_period_start(), 10_000);
    assert_eq!(checkin(&restored, now), checkin(&stats, now));
}

#[test]
fn multi_package_split_round_trips() {
    let mut stats = ProcessStats::new(0);
    let common = stats.get_process("p1", 1000, "com.x", 0);
    let mut pkgs: PackageList = vec![("p1".into(), common)];
    stats.set_process_state(common, 1, 0, 0, &mut pkgs);
    stats.get_process("p2", 1000, "com.x", 300);
    stats.report_excessive_wake(common, &mut pkgs);
    stats.set_process_state(common, STATE_NOTHING, 0, 700, &mut pkgs);

    let blob = write_to_vec(&mut stats, 1_000);
    let restored = read_stats(&mut blob.as_slice()).unwrap();

    let rid = restored.process_index()[&("com.x".to_string(), 1000)];
    assert!(restored.process(rid).multi_package());

    // Both packages hold their own (non-alias) records after the split.
    for pkg in ["p1", "p2"] {
        let entry = restored.packages()[&(pkg.to_string(), 1000)].processes()["com.x"];
        assert!(!entry.is_alias(), "{pkg} should own its record");
        assert_ne!(entry.id(), rid);
    }
    assert_eq!(checkin(&restored, 1_000), checkin(&stats, 1_000));
}

#[test]
fn corrupt_magic_reads_as_fresh_reset() {
    let mut stats = ProcessStats::new(0);
    let id = stats.get_process("com.a", 1000, "com.a", 0);
    let mut pkgs: PackageList = vec![("com.a".into(), id)];
    stats.set_process_state(id, 1, 0, 0, &mut pkgs);

    let mut blob = write_to_vec(&mut stats, 500);
    blob[2] ^= 0x40;

    assert!(read_stats(&mut blob.as_slice()).is_err());
}

#[test]
fn truncation_anywhere_is_rejected() {
    let mut stats = ProcessStats::new(0);
    let id = stats.get_process("com.a", 1000, "com.a", 0);
    let svc = stats.get_service("com.a", 1000, "com.a.Service");
    let mut pkgs: PackageList = vec![("com.a".into(), id)];
    stats.set_process_state(id, 1, 0, 0, &mut pkgs);
    stats.set_service_started(svc, true, 0, 0);

    let blob = write_to_vec(&mut stats, 500);
    for cut in [1, blob.len() / 4, blob.len() / 2, blob.len() - 1] {
        assert!(
            read_stats(&mut blob[..cut].as_ref()).is_err(),
            "truncation at {cut} accepted"
        );
    }
}

// ────────────────────────────────────────────────────────────────────
// Randomized round-trip
// ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    GetProcess(u8, u8),
    SetState(u8, i32, i32, u64),
    AddPss(u8, i64, u64),
    Excessive(u8, bool),
    Service(u8, u8, u8, bool, u64),
    MemFactor(i32, bool, u64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..3, 0u8..3).prop_map(|(pk, pr)| Op::GetProcess(pk, pr)),
        (0u8..3, -1i32..STATE_COUNT, 0i32..4, 0u64..60_000)
            .prop_map(|(pr, s, m, dt)| Op::SetState(pr, s, m, dt)),
        (0u8..3, 1i64..500_000, 0u64..60_000).prop_map(|(pr, v, dt)| Op::AddPss(pr, v, dt)),
        (0u8..3, any::<bool>()).prop_map(|(pr, wake)| Op::Excessive(pr, wake)),
        (0u8..3, 0u8..2, 0u8..3, any::<bool>(), 0u64..60_000)
            .prop_map(|(pk, sv, mode, on, dt)| Op::Service(pk, sv, mode, on, dt)),
        (0i32..4, any::<bool>(), 0u64..60_000).prop_map(|(m, s, dt)| Op::MemFactor(m, s, dt)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(80))]

    /// Any reachable state survives a write/read cycle semantically intact.
    #[test]
    fn prop_round_trip_preserves_semantics(ops in prop::collection::vec(arb_op(), 1..60)) {
        let packages = ["p0", "p1", "p2"];
        let proc_names = ["proc0", "proc1", "proc2"];
        let svc_names = ["Svc0", "Svc1"];

        let mut stats = ProcessStats::new(123);
        let mut now = 0u64;
        // One fan-out list per process name, as a host would keep.
        let mut lists: Vec<PackageList> = vec![Vec::new(), Vec::new(), Vec::new()];
        let mut handles: Vec<Option<procstats_core::ProcId>> = vec![None; 3];

        for op in &ops {
            match op {
                Op::GetProcess(pk, pr) => {
                    let pkg = packages[*pk as usize];
                    let name = proc_names[*pr as usize];
                    let id = stats.get_process(pkg, 1000, name, now);
                    handles[*pr as usize].get_or_insert(id);
                    let list = &mut lists[*pr as usize];
                    if !list.iter().any(|(p, _)| p == pkg) {
                        list.push((pkg.to_string(), id));
                    }
                }
                Op::SetState(pr, s, m, dt) => {
                    now += dt;
                    if let Some(id) = handles[*pr as usize] {
                        let list = &mut lists[*pr as usize];
                        stats.set_process_state(id, *s, *m, now, list);
                    }
                }
                Op::AddPss(pr, v, dt) => {
                    now += dt;
                    if let Some(id) = handles[*pr as usize] {
                        stats.add_pss(id, *v, true, now);
                    }
                }
                Op::Excessive(pr, wake) => {
                    if let Some(id) = handles[*pr as usize] {
                        let list = &mut lists[*pr as usize];
                        if *wake {
                            stats.report_excessive_wake(id, list);
                        } else {
                            stats.report_excessive_cpu(id, list);
                        }
                    }
                }
                Op::Service(pk, sv, mode, on, dt) => {
                    now += dt;
                    let id: SvcId = stats.get_service(
                        packages[*pk as usize],
                        1000,
                        svc_names[*sv as usize],
                    );
                    let factor = stats.mem_factor();
                    match mode % 3 {
                        0 => stats.set_service_started(id, *on, factor, now),
                        1 => stats.set_service_bound(id, *on, factor, now),
                        _ => stats.set_service_executing(id, *on, factor, now),
                    }
                }
                Op::MemFactor(m, s, dt) => {
                    now += dt;
                    stats.set_mem_factor(*m, *s, now);
                }
            }
        }
        now += 500;

        let mut blob = Vec::new();
        write_stats(&mut stats, &mut blob, now).unwrap();
        let restored = read_stats(&mut blob.as_slice()).unwrap();

        prop_assert_eq!(checkin(&restored, now), checkin(&stats, now));
        prop_assert_eq!(restored.mem_factor_durations(), stats.mem_factor_durations());
        prop_assert_eq!(restored.time_period_start(), stats.time_period_start());
        prop_assert_eq!(restored.process_index().len(), stats.process_index().len());
        prop_assert_eq!(restored.packages().len(), stats.packages().len());

        // A second write of the restored state produces the identical blob.
        let mut restored = restored;
        let mut blob2 = Vec::new();
        write_stats(&mut restored, &mut blob2, now).unwrap();
        let mut blob3 = Vec::new();
        let mut reread = read_stats(&mut blob2.as_slice()).unwrap();
        write_stats(&mut reread, &mut blob3, now).unwrap();
        prop_assert_eq!(blob2, blob3);
    }
}
