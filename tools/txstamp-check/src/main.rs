// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! txstamp-check - offline timestamp report checker
//!
//! Replays a recorded trace bundle through the reconciliation engine, or
//! measures the offset between two local clocks.
//!
//! Exit status: 0 on success, 1 when the trace fails reconciliation, 2 on
//! any other error (unreadable file, malformed records, bad configuration,
//! clock failure).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use log::debug;
use txstamp::{compute_offset, ClockId, LocalClock, ReconcileConfig, TraceBundle};

/// Timestamp report reconciliation tool
#[derive(Parser, Debug)]
#[command(name = "txstamp-check")]
#[command(version)]
#[command(about = "Check TX timestamp reports against captured traffic")]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Reconcile a recorded trace bundle
    Check {
        /// Trace bundle (JSON)
        bundle: PathBuf,

        /// Timestamp tolerance in milliseconds (default: TXSTAMP_TOLERANCE_MS or 500)
        #[arg(short, long)]
        tolerance_ms: Option<u64>,

        /// Connection may still be open (no FIN required)
        #[arg(long)]
        allow_open: bool,

        /// Fail if more DROPPED reports are seen
        #[arg(long)]
        max_drops: Option<u64>,

        /// Output JSON verdict
        #[arg(long)]
        json: bool,
    },
    /// Print clock(a) - clock(b) in milliseconds
    Offset {
        /// First clock: realtime, monotonic, tai or /dev/ptpN
        #[arg(short, long, default_value = "realtime")]
        a: ClockId,

        /// Second clock: realtime, monotonic, tai or /dev/ptpN
        #[arg(short, long, default_value = "tai")]
        b: ClockId,
    },
}

fn main() {
    // Initialize logger for RUST_LOG-based debug output
    env_logger::init();

    let args = Args::parse();

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            std::process::exit(2);
        }
    }
}

/// Returns `Ok(false)` when the trace was checked and rejected.
fn run(args: &Args) -> anyhow::Result<bool> {
    match &args.mode {
        Mode::Check {
            bundle,
            tolerance_ms,
            allow_open,
            max_drops,
            json,
        } => run_check(bundle, *tolerance_ms, *allow_open, *max_drops, *json),
        Mode::Offset { a, b } => run_offset(a, b),
    }
}

fn run_check(
    path: &Path,
    tolerance_ms: Option<u64>,
    allow_open: bool,
    max_drops: Option<u64>,
    json: bool,
) -> anyhow::Result<bool> {
    let bundle = TraceBundle::load(path)
        .with_context(|| format!("failed to load bundle {}", path.display()))?;

    let mut config = ReconcileConfig::from_env();
    if let Some(ms) = tolerance_ms {
        config = config.with_tolerance(Duration::from_millis(ms));
    }
    if allow_open {
        config = config.with_require_fin(false);
    }
    debug!("check {} with {:?}", path.display(), config);

    let verdict = match bundle.reconcile(&config) {
        Err(e) if e.is_operational() => {
            return Err(anyhow::Error::new(e)
                .context(format!("cannot reconcile {}", path.display())));
        }
        other => other,
    };

    let drop_limit_hit = match (&verdict, max_drops) {
        (Ok(v), Some(limit)) if v.drop_count() > limit => Some(limit),
        _ => None,
    };

    if json {
        let out = match &verdict {
            Ok(v) => serde_json::json!({
                "ok": drop_limit_hit.is_none(),
                "stats": v,
                "max_drops": max_drops,
            }),
            Err(e) => serde_json::json!({
                "ok": false,
                "error": e.to_string(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        match &verdict {
            Ok(v) => {
                println!("{} {}", "PASS".green().bold(), v);
                if let Some(limit) = drop_limit_hit {
                    println!(
                        "{} {} dropped reports exceed the limit of {}",
                        "FAIL".red().bold(),
                        v.drop_count(),
                        limit
                    );
                }
            }
            Err(e) => println!("{} {}", "FAIL".red().bold(), e),
        }
    }

    Ok(verdict.is_ok() && drop_limit_hit.is_none())
}

fn run_offset(a: &ClockId, b: &ClockId) -> anyhow::Result<bool> {
    let clock_a = LocalClock::new(a.clone()).with_context(|| format!("cannot open clock {a}"))?;
    let clock_b = LocalClock::new(b.clone()).with_context(|| format!("cannot open clock {b}"))?;

    let offset = compute_offset(&clock_a, &clock_b)?;
    println!("{} - {} = {}", a, b, offset.to_string().bold());
    Ok(true)
}
