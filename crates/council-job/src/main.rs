//! council-job: run a council of CLI agents as a background job
//!
//! # Usage
//!
//! ```bash
//! council-job start [--config path] [--chairman auto|claude|codex|...] [--jobs-dir path] [--json] "question"
//! council-job status [--json|--text|--checklist] [--verbose] <jobDir>
//! council-job wait [--cursor CURSOR] [--bucket auto|N] [--interval-ms N] [--timeout-ms N] <jobDir>
//! council-job results [--json] <jobDir>
//! council-job stop <jobDir>
//! council-job clean <jobDir>
//! ```
//!
//! Logs go to stderr, filtered by `COUNCIL_LOG` (then `RUST_LOG`, default
//! `warn`). Detached workers have no stderr; set `COUNCIL_WORKER_LOG` to a
//! file to collect their logs.

use clap::Parser;
use council::{CouncilError, StructuredError};
use council_job::{commands, Cli, Command};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const ENV_LOG: &str = "COUNCIL_LOG";
const ENV_WORKER_LOG: &str = "COUNCIL_WORKER_LOG";

fn env_filter() -> EnvFilter {
    std::env::var(ENV_LOG)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

fn init_tracing(is_worker: bool) {
    let worker_log = is_worker
        .then(|| std::env::var_os(ENV_WORKER_LOG))
        .flatten()
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    match worker_log {
        Some(file) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        None => builder.with_writer(std::io::stderr).init(),
    }
}

fn report_error(err: &anyhow::Error, as_json: bool) {
    let structured = match err.downcast_ref::<CouncilError>() {
        Some(council_err) => council_err.to_structured(),
        None => StructuredError::new(
            "INTERNAL_ERROR",
            format!("{err:#}"),
            "Re-run with COUNCIL_LOG=debug for details",
        ),
    };
    if as_json {
        match serde_json::to_string_pretty(&structured) {
            Ok(json) => eprintln!("{json}"),
            Err(_) => eprintln!("{structured}"),
        }
    } else {
        eprintln!("{structured}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Command::Worker(_)));

    let as_json = cli.wants_json();
    let mut stdout = std::io::stdout();
    match commands::run(cli, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "Command failed");
            report_error(&err, as_json);
            ExitCode::FAILURE
        }
    }
}
