// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! SimBridge Runtime Binary
//!
//! Long-lived compute process. Spawned by the simulation host (see
//! `simbridge::ComputeProcess`), it waits for the startup message on the
//! iceoryx2 control channel and then runs the graph until told to stop.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use simbridge::core::simbridge_home::{ensure_simbridge_home, get_logs_dir, get_simbridge_home};
use simbridge::{init_logging, run_compute, Iceoryx2ControlReceiver, Iceoryx2Node, OpRegistry};
use tracing_appender::non_blocking::WorkerGuard;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "simbridge-runtime")]
#[command(author, version, about = "SimBridge compute process", long_about = None)]
struct Args {
    /// iceoryx2 service prefix shared with the simulation host
    #[arg(long, env = "SIMBRIDGE_SERVICE")]
    service: String,

    /// Log file (defaults to $SIMBRIDGE_HOME/logs/<run id>.log)
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Override the SimBridge home directory
    #[arg(long, value_name = "DIR", env = "SIMBRIDGE_HOME")]
    home: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn setup_logging(args: &Args, run_id: &str) -> Result<(PathBuf, Option<WorkerGuard>)> {
    let log_path = match &args.log_file {
        Some(path) => path.clone(),
        None => {
            let home = args.home.clone().unwrap_or_else(get_simbridge_home);
            let home = ensure_simbridge_home(&home)
                .with_context(|| format!("Failed to create {}", home.display()))?;
            get_logs_dir(&home).join(format!("{}.log", run_id))
        }
    };
    let guard = init_logging(Some(&log_path)).context("Failed to set up logging")?;
    Ok((log_path, guard))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let args = Args::parse();

    let run_id = format!("C{}", cuid2::create_id());
    let (log_path, _log_guard) = setup_logging(&args, &run_id)?;

    tracing::info!("Starting compute process {} for service '{}'", run_id, args.service);
    tracing::info!("Log file: {}", log_path.display());

    let node = Iceoryx2Node::new().context("Failed to create iceoryx2 node")?;
    let receiver = Iceoryx2ControlReceiver::open(&node, &args.service)
        .with_context(|| format!("Failed to open control channel '{}'", args.service))?;

    let summary = run_compute(receiver, OpRegistry::standard()).context("Compute bridge failed")?;

    tracing::info!(
        "Finished {} steps, update time {:?}, {} outputs in the last result",
        summary.steps,
        summary.update_time,
        summary.last_result.as_ref().map_or(0, Vec::len)
    );
    Ok(())
}
