//! sentineld - cat sentinel daemon
//!
//! Watches the configured camera, captures a burst for every cat (or person)
//! visit, and hands it to the analysis worker. Stops cleanly on Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cat_sentinel::{Sentinel, SentinelConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect cats with prey on a network camera")]
struct Args {
    /// JSON options file (defaults to /data/options.json when present).
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Append log output to this file instead of stderr.
    #[arg(long, env = "SENTINEL_LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_ref())?;

    let cfg = match &args.config {
        Some(path) => SentinelConfig::load_from(Some(path.as_path())),
        None => SentinelConfig::load(),
    }
    .context("invalid configuration")?;

    log::info!(
        "sentineld {} starting: camera={} burst={}x{:.1}s save_images={}",
        env!("CARGO_PKG_VERSION"),
        cfg.camera.address,
        cfg.burst.count,
        cfg.burst.interval.as_secs_f64(),
        cfg.evidence.save_images
    );

    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = stop.clone();
    ctrlc::set_handler(move || {
        stop_signal.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let sentinel = Sentinel::from_config(&cfg)?;
    let summary = sentinel.run(&stop)?;
    log::info!(
        "sentineld stopped: bursts={} completed={} failed={}{}",
        summary.bursts_captured,
        summary.worker.sessions_completed,
        summary.worker.sessions_failed,
        if summary.worker_drained {
            ""
        } else {
            " (worker still busy at exit)"
        }
    );
    Ok(())
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}
