//! Subcommand handlers
//!
//! Each handler writes its normal output to `out`; errors propagate to
//! `main`, which reports them on stderr.

use anyhow::Result;
use council::config::{
    detect_host_role, requested_chairman, resolve_config_path, resolve_jobs_dir, ConfigLoader,
    FileConfigLoader,
};
use council::wait::BucketSpec;
use council::{
    clean_job, collect_results, compute_status, run_worker, start, stop_job, wait_for_progress,
    JobDir, JobMeta, ProcessLauncher, PromptInput, StartOptions, TerminationSignals, UiLabels,
    WaitOptions, WaitReport, WorkerLauncher, WorkerSpec,
};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::cli::{
    Cli, Command, JobArgs, ResultsArgs, StartArgs, StatusArgs, WaitArgs, WorkerArgs,
};
use crate::render;

pub async fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    match cli.command {
        Command::Start(args) => {
            let launcher = ProcessLauncher::current_exe()?;
            start_job(args, &launcher, out)
        }
        Command::Status(args) => status(args, out),
        Command::Wait(args) => wait(args, out).await,
        Command::Results(args) => results(args, out),
        Command::Stop(args) => stop(args, out),
        Command::Clean(args) => clean(args, out),
        Command::Worker(args) => worker(args).await,
    }
}

fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartReport<'a> {
    job_dir: &'a Path,
    #[serde(flatten)]
    meta: &'a JobMeta,
}

/// Resolve config and overrides, create the job, launch its workers
pub fn start_job(args: StartArgs, launcher: &dyn WorkerLauncher, out: &mut dyn Write) -> Result<()> {
    let prompt = args.prompt.join(" ");
    let config_path = resolve_config_path(args.config.as_deref());
    let config = FileConfigLoader.load(&config_path)?;

    let options = StartOptions {
        chairman: requested_chairman(args.chairman.as_deref(), &config),
        jobs_dir: resolve_jobs_dir(args.jobs_dir.as_deref()),
        config_path,
        host_role: detect_host_role(),
        timeout_sec: args.timeout.map(|t| t.max(0) as u64),
        exclude_chairman: args.exclude_override(),
    };
    let started = start(&prompt, &config, &options, launcher)?;

    if args.json {
        write_json(
            out,
            &StartReport {
                job_dir: &started.job_dir,
                meta: &started.meta,
            },
        )
    } else {
        writeln!(out, "{}", started.job_dir.display())?;
        Ok(())
    }
}

fn status(args: StatusArgs, out: &mut dyn Write) -> Result<()> {
    let job = JobDir::resolve(&args.job_dir)?;
    let snapshot = compute_status(&job)?;
    if args.checklist && !args.json {
        out.write_all(render::status_checklist(&snapshot).as_bytes())?;
    } else if args.text && !args.json {
        out.write_all(render::status_text(&snapshot, args.verbose).as_bytes())?;
    } else {
        write_json(out, &snapshot)?;
    }
    Ok(())
}

async fn wait(args: WaitArgs, out: &mut dyn Write) -> Result<()> {
    let job = JobDir::resolve(&args.job_dir)?;
    let bucket = args
        .bucket
        .as_deref()
        .map(str::parse::<BucketSpec>)
        .transpose()?;
    let options = WaitOptions::from_millis(args.cursor, bucket, args.interval_ms, args.timeout_ms)?;
    let outcome = wait_for_progress(&job, &options).await?;
    write_json(out, &WaitReport::new(&outcome, &UiLabels::default()))
}

fn results(args: ResultsArgs, out: &mut dyn Write) -> Result<()> {
    let job = JobDir::resolve(&args.job_dir)?;
    let results = collect_results(&job)?;
    if args.json {
        write_json(out, &results)
    } else {
        out.write_all(render::results_text(&results).as_bytes())?;
        Ok(())
    }
}

fn stop(args: JobArgs, out: &mut dyn Write) -> Result<()> {
    let job = JobDir::resolve(&args.job_dir)?;
    let report = stop_job(&job)?;
    if report.any() {
        writeln!(out, "stop: sent SIGTERM to running members")?;
    } else {
        writeln!(out, "stop: no running members")?;
    }
    Ok(())
}

fn clean(args: JobArgs, out: &mut dyn Write) -> Result<()> {
    let job = JobDir::resolve(&args.job_dir)?;
    let report = clean_job(&job)?;
    writeln!(out, "cleaned: {}", report.job_dir.display())?;
    Ok(())
}

async fn worker(args: WorkerArgs) -> Result<()> {
    // Before anything else: a stop that lands early must still be observed.
    let mut signals = TerminationSignals::install()?;

    let job_dir = JobDir::resolve(&args.job_dir)?;
    let spec = WorkerSpec {
        job_dir,
        member: args.member,
        slug: args.safe_member,
        command: args.command,
        input: if args.stdin {
            PromptInput::Stdin
        } else {
            PromptInput::Argument
        },
        timeout: args.timeout.filter(|t| *t > 0).map(Duration::from_secs),
    };
    let status = run_worker(&spec, signals.recv()).await?;
    info!(member = %status.member, state = %status.state, "Worker exiting");
    Ok(())
}
