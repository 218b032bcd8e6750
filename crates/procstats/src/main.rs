//! procstats: dump, reset, and rewrite persisted process statistics.
//!
//! Operates on the stats directory written by a `procstats-core` host:
//!
//! ```text
//! procstats [--dir <path>] [--config <file>] [dump options]
//! ```
//!
//! Everything after the tool flags is the shared dump grammar (`--checkin`,
//! `--csv`, `--reset`, `--write`, `-a`, `-h`, optional package filter).

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use procstats_core::config::TrackerConfig;
use procstats_core::dump::{self, DumpCommand};
use procstats_core::logging::init_logging;
use procstats_core::{clock, ProcessTracker};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("procstats: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let (mut config, dump_args) = split_args(std::env::args().skip(1).collect())?;

    if let Some(path) = config.config_file.take() {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut loaded: TrackerConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        // --dir wins over the config file.
        if let Some(dir) = &config.dir {
            loaded.base_dir = dir.clone();
        }
        config.tracker = loaded;
    } else if let Some(dir) = &config.dir {
        config.tracker.base_dir = dir.clone();
    }

    init_logging(&config.tracker.log).context("initializing logging")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let parsed = match dump::parse_args(&dump_args) {
        Ok(parsed) => parsed,
        Err(message) => {
            writeln!(out, "Error: {message}")?;
            dump::dump_help(&mut out)?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut tracker =
        ProcessTracker::new(config.tracker.clone()).context("opening stats directory")?;
    tracker.read_from_disk();

    match parsed.command {
        DumpCommand::Help => dump::dump_help(&mut out)?,
        DumpCommand::Text { dump_all } => {
            dump::dump_text(tracker.stats(), &mut out, parsed.package.as_deref(), dump_all, 0)?;
        }
        DumpCommand::Checkin => {
            dump::dump_checkin(tracker.stats(), &mut out, parsed.package.as_deref(), 0)?;
        }
        DumpCommand::Csv(options) => {
            dump::dump_csv(tracker.stats(), &mut out, &options, parsed.package.as_deref(), 0)?;
        }
        DumpCommand::Reset => {
            tracker.stats_mut().reset(clock::wall_ms());
            tracker.write_state_sync(clock::uptime_ms());
            writeln!(out, "Process stats reset.")?;
        }
        DumpCommand::Write => {
            tracker.write_state_sync(clock::uptime_ms());
            writeln!(out, "Process stats written.")?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

struct CliConfig {
    tracker: TrackerConfig,
    dir: Option<PathBuf>,
    config_file: Option<PathBuf>,
}

/// Peel off the tool flags (`--dir`, `--config`); everything else goes to the
/// dump grammar.
fn split_args(args: Vec<String>) -> Result<(CliConfig, Vec<String>)> {
    let mut config = CliConfig {
        tracker: TrackerConfig::default(),
        dir: None,
        config_file: None,
    };
    let mut rest = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dir" => {
                let value = iter.next().context("argument required for --dir")?;
                config.dir = Some(PathBuf::from(value));
            }
            "--config" => {
                let value = iter.next().context("argument required for --config")?;
                config.config_file = Some(PathBuf::from(value));
            }
            _ => rest.push(arg),
        }
    }
    Ok((config, rest))
}
