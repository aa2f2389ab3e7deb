//! vocored: the storage core's minimal server entrypoint.
//!
//! Mirrors the teacher's hand-rolled argv parsing in `bin/rfdb_server.rs`
//! (`--help`/`--version`, no `clap`): open or create the database
//! directory, replay every collection's datafiles on startup, optionally
//! start the replication applier when `autoStart` is set, and wait for
//! SIGTERM/SIGINT to shut down cleanly. No Unix-socket wire protocol, AQL,
//! or HTTP surface — those are excluded external collaborators (§6.3).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vocore::config::ApplierConfig;
use vocore::replication::ReplicationApplier;
use vocore::ServerContext;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("vocored {VERSION}");
    eprintln!("usage: vocored <data-dir> [--help] [--version]");
}

/// Exit code classification (§6.3: "nonzero on startup failure with a
/// classification logged to stderr").
#[repr(i32)]
enum ExitCode {
    Ok = 0,
    BadArgs = 1,
    StartupFailure = 2,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        std::process::exit(ExitCode::Ok as i32);
    }
    if args.iter().any(|a| a == "--version" || a == "-v") {
        println!("vocored {VERSION}");
        std::process::exit(ExitCode::Ok as i32);
    }

    let data_dir = match args.iter().find(|a| !a.starts_with("--")) {
        Some(dir) => PathBuf::from(dir),
        None => {
            print_usage();
            std::process::exit(ExitCode::BadArgs as i32);
        }
    };

    let ctx = match ServerContext::open(&data_dir) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            eprintln!("startup failed: could not open database directory {}: {e}", data_dir.display());
            std::process::exit(ExitCode::StartupFailure as i32);
        }
    };
    tracing::info!(dir = %data_dir.display(), collections = ctx.list_collections().len(), "datafiles recovered");

    let applier_config = match ApplierConfig::load(&data_dir) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("startup failed: could not load replication applier config: {e}");
            std::process::exit(ExitCode::StartupFailure as i32);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut signals = match signal_hook::iterator::Signals::new([signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            eprintln!("startup failed: could not install signal handlers: {e}");
            std::process::exit(ExitCode::StartupFailure as i32);
        }
    };
    let shutdown_for_signal = shutdown.clone();
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            shutdown_for_signal.store(true, Ordering::Relaxed);
        }
    });

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("startup failed: could not start async runtime: {e}");
            std::process::exit(ExitCode::StartupFailure as i32);
        }
    };

    let applier = if applier_config.auto_start {
        let applier = Arc::new(ReplicationApplier::new(ctx.clone(), data_dir.clone(), applier_config));
        let handle = applier.clone();
        runtime.spawn(async move { handle.run().await });
        tracing::info!("replication applier started");
        Some(applier)
    } else {
        None
    };

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    tracing::info!("shutdown signal received, stopping");
    if let Some(applier) = applier {
        applier.request_stop();
    }
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    std::process::exit(ExitCode::Ok as i32);
}
