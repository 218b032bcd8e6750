//! Text, checkin, and CSV renderings of the aggregate state.
//!
//! Three output contracts over one data model:
//!
//! - the human dump: grouped per package, then process/service, with a
//!   mem-factor run-time block at the end;
//! - the checkin dump: line-oriented `kind,key,...` records with tagged
//!   `tag:value` pairs for automated collection;
//! - the CSV dump: tab-separated columns generated from the cross-product of
//!   the selected screen/mem/proc states, each dimension either broken out
//!   or summed.
//!
//! The argument parser for the dump surface lives here too, so hosts and the
//! CLI share one flag grammar.

use std::io::{self, Write};

use crate::process::ProcId;
use crate::service::ServiceTime;
use crate::states::{
    compose_bucket, push_adj_tag, push_proc_state_tag, ADJ_COUNT, ADJ_MEM_FACTOR_COUNT,
    ADJ_MEM_FACTOR_CRITICAL, ADJ_MEM_FACTOR_LOW, ADJ_MEM_FACTOR_MODERATE,
    ADJ_MEM_FACTOR_NORMAL, ADJ_MEM_NAMES_CSV, ADJ_SCREEN_MOD, ADJ_SCREEN_NAMES_CSV,
    ADJ_SCREEN_OFF, ADJ_SCREEN_ON, ALL_MEM_ADJ, ALL_PROC_STATES, ALL_SCREEN_ADJ, STATE_COUNT,
    STATE_NAMES, STATE_NAMES_CSV, STATE_NOTHING,
};
use crate::stats::ProcessStats;

const CSV_SEP: char = '\t';

/// Process states shown in the filtered "running while <mem>" sections
/// (everything except cached).
const FILTER_PROC_STATES: [i32; (STATE_COUNT - 1) as usize] = [
    ALL_PROC_STATES[0],
    ALL_PROC_STATES[1],
    ALL_PROC_STATES[2],
    ALL_PROC_STATES[3],
    ALL_PROC_STATES[4],
    ALL_PROC_STATES[5],
    ALL_PROC_STATES[6],
    ALL_PROC_STATES[7],
    ALL_PROC_STATES[8],
];

// =============================================================================
// Dump arguments
// =============================================================================

/// CSV dimension selection: which states, and whether the dimension gets its
/// own columns or is summed into one.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub sep_screen: bool,
    pub screens: Vec<i32>,
    pub sep_mem: bool,
    pub mems: Vec<i32>,
    pub sep_proc: bool,
    pub proc_states: Vec<i32>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            sep_screen: false,
            screens: vec![ADJ_SCREEN_OFF, ADJ_SCREEN_ON],
            sep_mem: false,
            mems: vec![ADJ_MEM_FACTOR_CRITICAL],
            sep_proc: true,
            proc_states: ALL_PROC_STATES.to_vec(),
        }
    }
}

/// What the dump surface was asked to do.
#[derive(Debug, Clone)]
pub enum DumpCommand {
    /// Human-readable dump; `dump_all` appends internal state.
    Text { dump_all: bool },
    /// Checkin-report format.
    Checkin,
    /// Spreadsheet-friendly CSV.
    Csv(CsvOptions),
    /// Reset the stats, clearing all current data.
    Reset,
    /// Flush current in-memory stats to disk.
    Write,
    /// Print the help text.
    Help,
}

/// Parsed dump arguments.
#[derive(Debug, Clone)]
pub struct DumpArgs {
    pub command: DumpCommand,
    /// Optional package-name filter.
    pub package: Option<String>,
}

/// Parse the dump flag grammar. Errors carry a message for the caller to
/// print alongside [`dump_help`].
pub fn parse_args(args: &[String]) -> Result<DumpArgs, String> {
    let mut is_checkin = false;
    let mut is_csv = false;
    let mut dump_all = false;
    let mut package = None;
    let mut csv = CsvOptions::default();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--checkin" => is_checkin = true,
            "--csv" => is_csv = true,
            "--csv-screen" => {
                let value = iter
                    .next()
                    .ok_or("argument required for --csv-screen")?;
                let (states, sep) =
                    parse_state_list(&ADJ_SCREEN_NAMES_CSV, ADJ_SCREEN_MOD, value)
                        .map_err(|e| format!("error in \"{value}\": {e}"))?;
                csv.screens = states;
                csv.sep_screen = sep;
            }
            "--csv-mem" => {
                let value = iter.next().ok_or("argument required for --csv-mem")?;
                let (states, sep) = parse_state_list(&ADJ_MEM_NAMES_CSV, 1, value)
                    .map_err(|e| format!("error in \"{value}\": {e}"))?;
                csv.mems = states;
                csv.sep_mem = sep;
            }
            "--csv-proc" => {
                let value = iter.next().ok_or("argument required for --csv-proc")?;
                let (states, sep) = parse_state_list(&STATE_NAMES_CSV, 1, value)
                    .map_err(|e| format!("error in \"{value}\": {e}"))?;
                csv.proc_states = states;
                csv.sep_proc = sep;
            }
            "--reset" => {
                return Ok(DumpArgs {
                    command: DumpCommand::Reset,
                    package,
                })
            }
            "--write" => {
                return Ok(DumpArgs {
                    command: DumpCommand::Write,
                    package,
                })
            }
            "-h" => {
                return Ok(DumpArgs {
                    command: DumpCommand::Help,
                    package,
                })
            }
            "-a" => dump_all = true,
            other if other.starts_with('-') => {
                return Err(format!("unknown option: {other}"));
            }
            other => package = Some(other.to_string()),
        }
    }

    let command = if is_csv {
        DumpCommand::Csv(csv)
    } else if is_checkin {
        DumpCommand::Checkin
    } else {
        DumpCommand::Text { dump_all }
    };
    Ok(DumpArgs { command, package })
}

/// Parse a state-list word like `off,on` or `norm+mod`. Returns the selected
/// states (scaled by `mult`) and whether the dimension is broken out (`,`)
/// rather than summed (`+`). Mixing both separators is an error.
pub fn parse_state_list(
    names: &[&str],
    mult: i32,
    arg: &str,
) -> Result<(Vec<i32>, bool), String> {
    let bytes = arg.as_bytes();
    let mut res = Vec::new();
    let mut sep = false;
    let mut last_pos = 0usize;
    for i in 0..=bytes.len() {
        let c = if i < bytes.len() { bytes[i] as char } else { '\0' };
        if c != ',' && c != '+' && c != ' ' && c != '\0' {
            continue;
        }
        let is_sep = c == ',';
        if last_pos == 0 {
            sep = is_sep;
        } else if c != '\0' && sep != is_sep {
            return Err("inconsistent separators (can't mix ',' with '+')".to_string());
        }
        if last_pos < i {
            let word = &arg[last_pos..i];
            match names.iter().position(|n| *n == word) {
                Some(j) => res.push(j as i32 * mult),
                None => return Err(format!("invalid word \"{word}\"")),
            }
        }
        last_pos = i + 1;
    }
    Ok((res, sep))
}

/// The dump help text.
pub fn dump_help(w: &mut impl Write) -> io::Result<()> {
    writeln!(w, "Process stats (procstats) dump options:")?;
    writeln!(w, "    [--checkin|--csv] [csv-screen] [csv-proc] [csv-mem]")?;
    writeln!(w, "    [--reset] [--write] [-a] [-h] [<package.name>]")?;
    writeln!(w, "  --checkin: format output for a checkin report.")?;
    writeln!(w, "  --csv: output data suitable for putting in a spreadsheet.")?;
    writeln!(w, "  --csv-screen: on, off.")?;
    writeln!(w, "  --csv-mem: norm, mod, low, crit.")?;
    writeln!(w, "  --csv-proc: pers, top, fore, vis, percept, backup,")?;
    writeln!(w, "    service, home, prev, cached")?;
    writeln!(w, "  --reset: reset the stats, clearing all current data.")?;
    writeln!(w, "  --write: write current in-memory stats to disk.")?;
    writeln!(w, "  -a: print everything.")?;
    writeln!(w, "  -h: print this help text.")?;
    writeln!(
        w,
        "  <package.name>: optional name of package to filter output by."
    )
}

// =============================================================================
// Duration formatting
// =============================================================================

/// Compact duration rendering: `+1d2h3m4s5ms`, leading zero units elided.
#[must_use]
pub fn format_duration(ms: i64) -> String {
    if ms == 0 {
        return "0".to_string();
    }
    let mut out = String::new();
    out.push(if ms < 0 { '-' } else { '+' });
    let total = ms.unsigned_abs();

    let days = total / 86_400_000;
    let hours = total / 3_600_000 % 24;
    let minutes = total / 60_000 % 60;
    let seconds = total / 1_000 % 60;
    let millis = total % 1_000;

    let mut printing = false;
    for (value, unit) in [
        (days, "d"),
        (hours, "h"),
        (minutes, "m"),
        (seconds, "s"),
        (millis, "ms"),
    ] {
        if printing || value != 0 {
            out.push_str(&value.to_string());
            out.push_str(unit);
            printing = true;
        }
    }
    out
}

// =============================================================================
// Label helpers
// =============================================================================

fn screen_label(offset: i32) -> &'static str {
    match offset {
        STATE_NOTHING => "             ",
        ADJ_SCREEN_OFF => "Screen Off / ",
        ADJ_SCREEN_ON => "Screen On  / ",
        _ => "?????????? / ",
    }
}

fn screen_label_csv(offset: i32) -> &'static str {
    match offset {
        ADJ_SCREEN_OFF => ADJ_SCREEN_NAMES_CSV[0],
        ADJ_SCREEN_ON => ADJ_SCREEN_NAMES_CSV[1],
        STATE_NOTHING => "",
        _ => "???",
    }
}

fn mem_label(offset: i32) -> &'static str {
    match offset {
        STATE_NOTHING => "       ",
        ADJ_MEM_FACTOR_NORMAL => "Norm / ",
        ADJ_MEM_FACTOR_MODERATE => "Mod  / ",
        ADJ_MEM_FACTOR_LOW => "Low  / ",
        ADJ_MEM_FACTOR_CRITICAL => "Crit / ",
        _ => "???? / ",
    }
}

fn mem_label_csv(offset: i32) -> &'static str {
    if (ADJ_MEM_FACTOR_NORMAL..=ADJ_MEM_FACTOR_CRITICAL).contains(&offset) {
        ADJ_MEM_NAMES_CSV[offset as usize]
    } else if offset == STATE_NOTHING {
        ""
    } else {
        "???"
    }
}

// =============================================================================
// Human dump
// =============================================================================

/// Render the human-readable dump.
pub fn dump_text(
    stats: &ProcessStats,
    w: &mut impl Write,
    req_package: Option<&str>,
    dump_all: bool,
    now: u64,
) -> io::Result<()> {
    let mut printed_header = false;
    for ((pkg_name, uid), pkg) in stats.packages() {
        if req_package.is_some_and(|req| req != pkg_name.as_str()) {
            continue;
        }
        if pkg.processes().is_empty() && pkg.services().is_empty() {
            continue;
        }
        if !printed_header {
            writeln!(w, "Per-Package Process Stats:")?;
            printed_header = true;
        }
        writeln!(w, "  * {pkg_name} / {uid}:")?;
        for (proc_name, entry) in pkg.processes() {
            let rec = stats.process(entry.id());
            writeln!(
                w,
                "      Process {proc_name} ({} entries):",
                rec.duration_entry_count()
            )?;
            dump_process_durations(
                stats,
                w,
                "        ",
                entry.id(),
                &ALL_SCREEN_ADJ,
                &ALL_MEM_ADJ,
                &ALL_PROC_STATES,
                now,
            )?;
            dump_process_pss(
                stats,
                w,
                "        ",
                entry.id(),
                &ALL_SCREEN_ADJ,
                &ALL_MEM_ADJ,
                &ALL_PROC_STATES,
            )?;
        }
        for (svc_name, &svc_id) in pkg.services() {
            writeln!(w, "      Service {svc_name}:")?;
            let svc = stats.service(svc_id);
            for (label, mode) in [
                ("Started", svc.started()),
                ("Bound", svc.bound()),
                ("Executing", svc.executing()),
            ] {
                if mode.op_count() != 0 {
                    writeln!(w, "        {label} op count {}:", mode.op_count())?;
                    dump_single_time(w, "          ", mode, now)?;
                }
            }
        }
    }

    for (header, mems) in [
        ("Processes running while critical mem:", [ADJ_MEM_FACTOR_CRITICAL]),
        ("Processes running while low mem:", [ADJ_MEM_FACTOR_LOW]),
        ("Processes running while moderate mem:", [ADJ_MEM_FACTOR_MODERATE]),
        ("Processes running while normal mem:", [ADJ_MEM_FACTOR_NORMAL]),
    ] {
        dump_filtered_processes(
            stats,
            w,
            header,
            "  ",
            &ALL_SCREEN_ADJ,
            &mems,
            &FILTER_PROC_STATES,
            now,
            req_package,
        )?;
    }

    writeln!(w)?;
    writeln!(w, "Run time Stats:")?;
    dump_mem_factor_times(stats, w, "  ", now)?;

    if dump_all {
        writeln!(w)?;
        writeln!(w, "Internal state:")?;
        writeln!(w, "  Num long arrays: {}", stats.pool().array_count())?;
        writeln!(w, "  Next long entry: {}", stats.pool().next_index())?;
    }
    Ok(())
}

/// One mode's (or the mem factor's) per-adj durations with screen/mem labels
/// and a total.
fn dump_single_adj_times(
    w: &mut impl Write,
    prefix: &str,
    duration_of: impl Fn(i32) -> i64,
) -> io::Result<()> {
    let mut total_time = 0;
    let mut printed_screen = STATE_NOTHING;
    for iscreen in (0..ADJ_COUNT).step_by(ADJ_SCREEN_MOD as usize) {
        let mut printed_mem = STATE_NOTHING;
        for imem in 0..ADJ_MEM_FACTOR_COUNT {
            let state = imem + iscreen;
            let time = duration_of(state);
            if time != 0 {
                write!(w, "{prefix}")?;
                write!(
                    w,
                    "{}",
                    screen_label(if printed_screen != iscreen {
                        iscreen
                    } else {
                        STATE_NOTHING
                    })
                )?;
                printed_screen = iscreen;
                write!(
                    w,
                    "{}",
                    mem_label(if printed_mem != imem { imem } else { STATE_NOTHING })
                )?;
                printed_mem = imem;
                writeln!(w, "{}", format_duration(time))?;
                total_time += time;
            }
        }
    }
    if total_time != 0 {
        writeln!(
            w,
            "{prefix}{}TOTAL: {}",
            screen_label(STATE_NOTHING),
            format_duration(total_time)
        )?;
    }
    Ok(())
}

fn dump_single_time(w: &mut impl Write, prefix: &str, mode: &ServiceTime, now: u64) -> io::Result<()> {
    dump_single_adj_times(w, prefix, |state| mode.duration(state, now))
}

fn dump_mem_factor_times(stats: &ProcessStats, w: &mut impl Write, prefix: &str, now: u64) -> io::Result<()> {
    let durations = stats.mem_factor_durations();
    let cur = stats.mem_factor_raw();
    let start = stats.mem_factor_start();
    dump_single_adj_times(w, prefix, |state| {
        let mut time = durations[state as usize];
        if cur == state {
            time += now.saturating_sub(start) as i64;
        }
        time
    })
}

#[allow(clippy::too_many_arguments)]
fn dump_process_durations(
    stats: &ProcessStats,
    w: &mut impl Write,
    prefix: &str,
    id: ProcId,
    screens: &[i32],
    mems: &[i32],
    proc_states: &[i32],
    now: u64,
) -> io::Result<()> {
    let rec = stats.process(id);
    let mut total_time = 0;
    let mut printed_screen = STATE_NOTHING;
    for &iscreen in screens {
        let mut printed_mem = STATE_NOTHING;
        for &imem in mems {
            for &istate in proc_states {
                let bucket = compose_bucket(iscreen + imem, istate);
                let time = rec.duration(bucket, now, stats.pool());
                let running = if rec.cur_state() == bucket {
                    " (running)"
                } else {
                    ""
                };
                if time != 0 {
                    write!(w, "{prefix}")?;
                    if screens.len() > 1 {
                        write!(
                            w,
                            "{}",
                            screen_label(if printed_screen != iscreen {
                                iscreen
                            } else {
                                STATE_NOTHING
                            })
                        )?;
                        printed_screen = iscreen;
                    }
                    if mems.len() > 1 {
                        write!(
                            w,
                            "{}",
                            mem_label(if printed_mem != imem { imem } else { STATE_NOTHING })
                        )?;
                        printed_mem = imem;
                    }
                    writeln!(
                        w,
                        "{}: {}{running}",
                        STATE_NAMES[istate as usize],
                        format_duration(time)
                    )?;
                    total_time += time;
                }
            }
        }
    }
    if total_time != 0 {
        write!(w, "{prefix}")?;
        if screens.len() > 1 {
            write!(w, "{}", screen_label(STATE_NOTHING))?;
        }
        if mems.len() > 1 {
            write!(w, "{}", mem_label(STATE_NOTHING))?;
        }
        writeln!(w, "TOTAL      : {}", format_duration(total_time))?;
    }
    Ok(())
}

fn dump_process_pss(
    stats: &ProcessStats,
    w: &mut impl Write,
    prefix: &str,
    id: ProcId,
    screens: &[i32],
    mems: &[i32],
    proc_states: &[i32],
) -> io::Result<()> {
    let rec = stats.process(id);
    let mut printed_header = false;
    let mut printed_screen = STATE_NOTHING;
    for &iscreen in screens {
        let mut printed_mem = STATE_NOTHING;
        for &imem in mems {
            for &istate in proc_states {
                let bucket = compose_bucket(iscreen + imem, istate);
                let count = rec.pss_sample_count(bucket, stats.pool());
                if count > 0 {
                    if !printed_header {
                        writeln!(w, "{prefix}PSS ({} entries):", rec.pss_entry_count())?;
                        printed_header = true;
                    }
                    write!(w, "{prefix}  ")?;
                    if screens.len() > 1 {
                        write!(
                            w,
                            "{}",
                            screen_label(if printed_screen != iscreen {
                                iscreen
                            } else {
                                STATE_NOTHING
                            })
                        )?;
                        printed_screen = iscreen;
                    }
                    if mems.len() > 1 {
                        write!(
                            w,
                            "{}",
                            mem_label(if printed_mem != imem { imem } else { STATE_NOTHING })
                        )?;
                        printed_mem = imem;
                    }
                    writeln!(
                        w,
                        "{}: {count} samples {}kB {}kB {}kB",
                        STATE_NAMES[istate as usize],
                        rec.pss_minimum(bucket, stats.pool()),
                        rec.pss_average(bucket, stats.pool()),
                        rec.pss_maximum(bucket, stats.pool())
                    )?;
                }
            }
        }
    }
    if rec.excessive_wake() != 0 {
        writeln!(
            w,
            "{prefix}Killed for excessive wake locks: {} times",
            rec.excessive_wake()
        )?;
    }
    if rec.excessive_cpu() != 0 {
        writeln!(
            w,
            "{prefix}Killed for excessive CPU use: {} times",
            rec.excessive_cpu()
        )?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn dump_filtered_processes(
    stats: &ProcessStats,
    w: &mut impl Write,
    header: &str,
    prefix: &str,
    screens: &[i32],
    mems: &[i32],
    proc_states: &[i32],
    now: u64,
    req_package: Option<&str>,
) -> io::Result<()> {
    let procs = stats.collect_processes(screens, mems, proc_states, now, req_package);
    if procs.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    writeln!(w, "{header}")?;
    let inner = format!("{prefix}  ");
    for &id in procs.iter().rev() {
        let rec = stats.process(id);
        writeln!(
            w,
            "{prefix}{} / {} ({} entries):",
            rec.name(),
            rec.uid(),
            rec.duration_entry_count()
        )?;
        dump_process_durations(stats, w, &inner, id, screens, mems, proc_states, now)?;
        if rec.pss_entry_count() > 0 {
            dump_process_pss(stats, w, &inner, id, screens, mems, proc_states)?;
        }
    }
    Ok(())
}

// =============================================================================
// Checkin dump
// =============================================================================

/// Render the checkin-report format.
pub fn dump_checkin(
    stats: &ProcessStats,
    w: &mut impl Write,
    req_package: Option<&str>,
    now: u64,
) -> io::Result<()> {
    writeln!(w, "vers,1")?;
    for ((pkg_name, uid), pkg) in stats.packages() {
        if req_package.is_some_and(|req| req != pkg_name.as_str()) {
            continue;
        }
        for (proc_name, entry) in pkg.processes() {
            let rec = stats.process(entry.id());
            write!(w, "pkgproc,{pkg_name},{uid},{proc_name}")?;
            dump_proc_state_checkin(stats, w, entry.id(), now)?;
            writeln!(w)?;
            if rec.pss_entry_count() > 0 {
                write!(w, "pkgpss,{pkg_name},{uid},{proc_name}")?;
                dump_proc_pss_checkin(stats, w, entry.id())?;
                writeln!(w)?;
            }
            if rec.excessive_wake() > 0 || rec.excessive_cpu() > 0 {
                writeln!(
                    w,
                    "pkgkills,{pkg_name},{uid},{proc_name},{},{}",
                    rec.excessive_wake(),
                    rec.excessive_cpu()
                )?;
            }
        }
        for (svc_name, &svc_id) in pkg.services() {
            let svc = stats.service(svc_id);
            for (label, mode) in [
                ("pkgsvc-start", svc.started()),
                ("pkgsvc-bound", svc.bound()),
                ("pkgsvc-exec", svc.executing()),
            ] {
                dump_service_time_checkin(w, label, pkg_name, *uid, svc_name, mode, now)?;
            }
        }
    }

    for ((proc_name, uid), &id) in stats.process_index() {
        let rec = stats.process(id);
        if rec.duration_entry_count() > 0 {
            write!(w, "proc,{proc_name},{uid}")?;
            dump_proc_state_checkin(stats, w, id, now)?;
            writeln!(w)?;
        }
        if rec.pss_entry_count() > 0 {
            write!(w, "pss,{proc_name},{uid}")?;
            dump_proc_pss_checkin(stats, w, id)?;
            writeln!(w)?;
        }
        if rec.excessive_wake() > 0 || rec.excessive_cpu() > 0 {
            writeln!(
                w,
                "kills,{proc_name},{uid},{},{}",
                rec.excessive_wake(),
                rec.excessive_cpu()
            )?;
        }
    }

    write!(w, "total")?;
    let durations = stats.mem_factor_durations();
    let cur = stats.mem_factor_raw();
    let start = stats.mem_factor_start();
    for iscreen in (0..ADJ_COUNT).step_by(ADJ_SCREEN_MOD as usize) {
        for imem in 0..ADJ_MEM_FACTOR_COUNT {
            let state = imem + iscreen;
            let mut time = durations[state as usize];
            if cur == state {
                time += now.saturating_sub(start) as i64;
            }
            if time != 0 {
                let mut tag = String::new();
                push_adj_tag(&mut tag, state);
                write!(w, ",{tag}:{time}")?;
            }
        }
    }
    writeln!(w)
}

fn dump_proc_state_checkin(
    stats: &ProcessStats,
    w: &mut impl Write,
    id: ProcId,
    now: u64,
) -> io::Result<()> {
    let rec = stats.process(id);
    let mut did_cur_state = false;
    for off in rec.durations_table().iter() {
        let bucket = i32::from(off.tag());
        let mut time = stats.pool().get(off, 0);
        if rec.cur_state() == bucket {
            did_cur_state = true;
            time += now.saturating_sub(rec.start_time()) as i64;
        }
        let mut tag = String::new();
        push_proc_state_tag(&mut tag, bucket);
        write!(w, ",{tag}:{time}")?;
    }
    if !did_cur_state && rec.cur_state() != STATE_NOTHING {
        let mut tag = String::new();
        push_proc_state_tag(&mut tag, rec.cur_state());
        write!(w, ",{tag}:{}", now.saturating_sub(rec.start_time()))?;
    }
    Ok(())
}

fn dump_proc_pss_checkin(stats: &ProcessStats, w: &mut impl Write, id: ProcId) -> io::Result<()> {
    let rec = stats.process(id);
    for off in rec.pss_table().iter() {
        let bucket = i32::from(off.tag());
        let mut tag = String::new();
        push_proc_state_tag(&mut tag, bucket);
        write!(
            w,
            ",{tag}:{}:{}:{}:{}",
            stats.pool().get(off, crate::states::PSS_SAMPLE_COUNT),
            stats.pool().get(off, crate::states::PSS_MINIMUM),
            stats.pool().get(off, crate::states::PSS_AVERAGE),
            stats.pool().get(off, crate::states::PSS_MAXIMUM)
        )?;
    }
    Ok(())
}

fn dump_service_time_checkin(
    w: &mut impl Write,
    label: &str,
    pkg_name: &str,
    uid: i32,
    svc_name: &str,
    mode: &ServiceTime,
    now: u64,
) -> io::Result<()> {
    if mode.op_count() <= 0 {
        return Ok(());
    }
    write!(w, "{label},{pkg_name},{uid},{svc_name},{}", mode.op_count())?;
    for iscreen in (0..ADJ_COUNT).step_by(ADJ_SCREEN_MOD as usize) {
        for imem in 0..ADJ_MEM_FACTOR_COUNT {
            let state = imem + iscreen;
            let time = mode.duration(state, now);
            if time != 0 {
                let mut tag = String::new();
                push_adj_tag(&mut tag, state);
                write!(w, ",{tag}:{time}")?;
            }
        }
    }
    writeln!(w)
}

// =============================================================================
// CSV dump
// =============================================================================

/// Render the CSV dump.
pub fn dump_csv(
    stats: &ProcessStats,
    w: &mut impl Write,
    options: &CsvOptions,
    req_package: Option<&str>,
    now: u64,
) -> io::Result<()> {
    write!(w, "Processes running summed over")?;
    if !options.sep_screen {
        for &screen in &options.screens {
            write!(w, " {}", screen_label_csv(screen))?;
        }
    }
    if !options.sep_mem {
        for &mem in &options.mems {
            write!(w, " {}", mem_label_csv(mem))?;
        }
    }
    if !options.sep_proc {
        for &state in &options.proc_states {
            write!(w, " {}", STATE_NAMES_CSV[state as usize])?;
        }
    }
    writeln!(w)?;

    let procs = stats.collect_processes(
        &options.screens,
        &options.mems,
        &options.proc_states,
        now,
        req_package,
    );
    if procs.is_empty() {
        return Ok(());
    }

    write!(w, "process{CSV_SEP}uid")?;
    dump_state_headers_csv(w, options)?;
    writeln!(w)?;
    for &id in procs.iter().rev() {
        let rec = stats.process(id);
        write!(w, "{}{CSV_SEP}{}", rec.name(), rec.uid())?;
        dump_process_csv(stats, w, id, options, now)?;
        writeln!(w)?;
    }
    Ok(())
}

fn dump_state_headers_csv(w: &mut impl Write, options: &CsvOptions) -> io::Result<()> {
    let ns = if options.sep_screen { options.screens.len() } else { 1 };
    let nm = if options.sep_mem { options.mems.len() } else { 1 };
    let np = if options.sep_proc { options.proc_states.len() } else { 1 };
    for is in 0..ns {
        for im in 0..nm {
            for ip in 0..np {
                write!(w, "{CSV_SEP}")?;
                let mut printed = false;
                if options.sep_screen && options.screens.len() > 1 {
                    write!(w, "{}", screen_label_csv(options.screens[is]))?;
                    printed = true;
                }
                if options.sep_mem && options.mems.len() > 1 {
                    if printed {
                        write!(w, "-")?;
                    }
                    write!(w, "{}", mem_label_csv(options.mems[im]))?;
                    printed = true;
                }
                if options.sep_proc && options.proc_states.len() > 1 {
                    if printed {
                        write!(w, "-")?;
                    }
                    write!(w, "{}", STATE_NAMES_CSV[options.proc_states[ip] as usize])?;
                }
            }
        }
    }
    Ok(())
}

/// One process row: every broken-out cell sums the summed-over dimensions.
fn dump_process_csv(
    stats: &ProcessStats,
    w: &mut impl Write,
    id: ProcId,
    options: &CsvOptions,
    now: u64,
) -> io::Result<()> {
    let rec = stats.process(id);
    let nss = if options.sep_screen { options.screens.len() } else { 1 };
    let nms = if options.sep_mem { options.mems.len() } else { 1 };
    let nps = if options.sep_proc { options.proc_states.len() } else { 1 };
    for iss in 0..nss {
        for ims in 0..nms {
            for ips in 0..nps {
                let vs_screen = if options.sep_screen { options.screens[iss] } else { 0 };
                let vs_mem = if options.sep_mem { options.mems[ims] } else { 0 };
                let vs_proc = if options.sep_proc { options.proc_states[ips] } else { 0 };
                let nsa = if options.sep_screen { 1 } else { options.screens.len() };
                let nma = if options.sep_mem { 1 } else { options.mems.len() };
                let npa = if options.sep_proc { 1 } else { options.proc_states.len() };
                let mut total_time = 0;
                for isa in 0..nsa {
                    for ima in 0..nma {
                        for ipa in 0..npa {
                            let va_screen =
                                if options.sep_screen { 0 } else { options.screens[isa] };
                            let va_mem = if options.sep_mem { 0 } else { options.mems[ima] };
                            let va_proc =
                                if options.sep_proc { 0 } else { options.proc_states[ipa] };
                            let bucket = compose_bucket(
                                vs_screen + va_screen + vs_mem + va_mem,
                                vs_proc + va_proc,
                            );
                            total_time += rec.duration(bucket, now, stats.pool());
                        }
                    }
                }
                write!(w, "{CSV_SEP}{total_time}")?;
            }
        }
    }
    Ok(())
}
