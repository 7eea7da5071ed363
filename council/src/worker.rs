//! Member worker
//!
//! One worker process runs one member's command against the job prompt and
//! is the only writer of that member's status file after dispatch. Outcomes:
//!
//! | situation                          | terminal state |
//! |------------------------------------|----------------|
//! | executable not on the host         | `missing_cli`  |
//! | exit code 0                        | `done`         |
//! | non-zero exit / killed externally  | `error`        |
//! | exceeded the timeout               | `timed_out`    |
//! | termination signal (see `stop`)    | `canceled`     |

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::dispatch::WorkerRequest;
use crate::error::CouncilResult;
use crate::store::layout::temp_path_for;
use crate::store::{write_atomic, JobDir, MemberState, MemberStatus, PromptInput};

/// How long a signalled child gets to exit before SIGKILL
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Inputs for one worker run
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub job_dir: JobDir,
    pub member: String,
    pub slug: String,
    pub command: String,
    pub input: PromptInput,
    pub timeout: Option<Duration>,
}

impl From<&WorkerRequest> for WorkerSpec {
    fn from(request: &WorkerRequest) -> Self {
        Self {
            job_dir: JobDir::new(&request.job_dir),
            member: request.member.clone(),
            slug: request.slug.clone(),
            command: request.command.clone(),
            input: request.input,
            timeout: request
                .timeout_sec
                .filter(|t| *t > 0)
                .map(Duration::from_secs),
        }
    }
}

/// Terminal outcome before it is written
#[derive(Debug, Clone, PartialEq, Eq)]
struct Outcome {
    state: MemberState,
    exit_code: Option<i32>,
    message: Option<String>,
}

impl Outcome {
    fn new(state: MemberState, exit_code: Option<i32>, message: Option<String>) -> Self {
        Self {
            state,
            exit_code,
            message,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self::new(MemberState::Error, None, Some(message.into()))
    }
}

/// Find `program` on the host: paths are checked directly, bare names are
/// searched on `PATH`. Only executable regular files count.
pub fn resolve_executable(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Resolves once SIGTERM, SIGINT, or SIGHUP is delivered.
///
/// Handlers are registered on construction, so create this before the
/// member is marked `running` or an early `stop` could kill the worker
/// before it records `canceled`.
pub struct TerminationSignals {
    term: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
    hup: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
            hup: signal(SignalKind::hangup())?,
        })
    }

    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.term.recv() => debug!("SIGTERM received"),
            _ = self.int.recv() => debug!("SIGINT received"),
            _ = self.hup.recv() => debug!("SIGHUP received"),
        }
    }
}

/// Run one member to a terminal state and record it.
///
/// `cancel` resolving before the child exits cancels the member. Returns the
/// final status as written. A member that is already terminal is left alone.
pub async fn run_worker<F>(spec: &WorkerSpec, cancel: F) -> CouncilResult<MemberStatus>
where
    F: Future<Output = ()>,
{
    let job = &spec.job_dir;
    let mut status = job
        .read_member_status(&spec.slug)?
        .unwrap_or_else(|| MemberStatus::queued(&spec.member, &spec.command));

    if status.state.is_terminal() {
        info!(member = %spec.member, state = %status.state, "Member already finished, nothing to do");
        return Ok(status);
    }

    // Written before any setup step that can fail; status probes this pid.
    status.start(std::process::id())?;
    job.write_member_status(&spec.slug, &status)?;

    let argv = shlex::split(&spec.command).unwrap_or_default();
    let Some((program, args)) = argv.split_first() else {
        let outcome = Outcome::new(
            MemberState::MissingCli,
            None,
            Some(format!("could not parse command: {:?}", spec.command)),
        );
        return record(job, &spec.slug, status, outcome);
    };

    let Some(executable) = resolve_executable(program) else {
        info!(member = %spec.member, program = %program, "Member CLI not found");
        let outcome = Outcome::new(
            MemberState::MissingCli,
            None,
            Some(format!("{program} not found on PATH; install it or fix the member command")),
        );
        return record(job, &spec.slug, status, outcome);
    };

    let prompt = match job.read_prompt() {
        Ok(prompt) => prompt,
        Err(e) => return record(job, &spec.slug, status, Outcome::failed(e.to_string())),
    };

    info!(member = %spec.member, executable = %executable.display(), "Member running");

    let outcome = execute(spec, &executable, args, prompt, cancel).await;
    record(job, &spec.slug, status, outcome)
}

fn record(
    job: &JobDir,
    slug: &str,
    mut status: MemberStatus,
    outcome: Outcome,
) -> CouncilResult<MemberStatus> {
    status.finish(outcome.state, outcome.exit_code, outcome.message)?;
    job.write_member_status(slug, &status)?;
    info!(
        member = %status.member,
        state = %status.state,
        exit_code = ?status.exit_code,
        "Member finished"
    );
    Ok(status)
}

/// Spawn the member's command and drive it to an outcome. Never fails:
/// every error becomes an `error` outcome so the status is always finalized.
async fn execute<F>(
    spec: &WorkerSpec,
    executable: &Path,
    args: &[String],
    prompt: String,
    cancel: F,
) -> Outcome
where
    F: Future<Output = ()>,
{
    let job = &spec.job_dir;
    let output_path = job.output_file(&spec.slug);
    let error_path = job.error_file(&spec.slug);
    let output_tmp = temp_path_for(&output_path);
    let error_tmp = temp_path_for(&error_path);

    let outcome = match spawn_member(spec, executable, args, &prompt, &output_tmp, &error_tmp) {
        Ok(mut child) => {
            if spec.input == PromptInput::Stdin {
                if let Some(mut stdin) = child.stdin.take() {
                    tokio::spawn(async move {
                        if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                            debug!(error = %e, "Member closed stdin early");
                        }
                    });
                }
            }
            supervise(&mut child, spec.timeout, cancel).await
        }
        Err(e) => Outcome::failed(format!("failed to start command: {e}")),
    };

    // Whatever the child managed to write is kept, even on timeout/cancel.
    publish(&output_tmp, &output_path);
    publish(&error_tmp, &error_path);
    outcome
}

fn spawn_member(
    spec: &WorkerSpec,
    executable: &Path,
    args: &[String],
    prompt: &str,
    output_tmp: &Path,
    error_tmp: &Path,
) -> std::io::Result<Child> {
    let stdout = std::fs::File::create(output_tmp)?;
    let stderr = std::fs::File::create(error_tmp)?;

    let mut cmd = Command::new(executable);
    cmd.args(args);
    match spec.input {
        PromptInput::Argument => {
            cmd.arg(prompt).stdin(Stdio::null());
        }
        PromptInput::Stdin => {
            cmd.stdin(Stdio::piped());
        }
    }
    cmd.stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);

    // Own process group so timeout/cancel can take down the whole tree the
    // member CLI spawns, not just its top process.
    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn()
}

async fn supervise<F>(child: &mut Child, timeout: Option<Duration>, cancel: F) -> Outcome
where
    F: Future<Output = ()>,
{
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let woke = tokio::select! {
        waited = child.wait() => Wake::Exited(waited),
        _ = deadline => Wake::Deadline,
        _ = cancel => Wake::Cancel,
    };

    match woke {
        Wake::Exited(Ok(exit)) => exit_outcome(exit),
        Wake::Exited(Err(e)) => Outcome::failed(format!("failed to wait for command: {e}")),
        Wake::Deadline => {
            let secs = timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
            warn!(timeout_secs = secs, "Member timed out, terminating");
            terminate(child).await;
            Outcome::new(
                MemberState::TimedOut,
                None,
                Some(format!("timed out after {secs}s")),
            )
        }
        Wake::Cancel => {
            info!("Member canceled, terminating");
            terminate(child).await;
            Outcome::new(
                MemberState::Canceled,
                None,
                Some("canceled by stop request".to_string()),
            )
        }
    }
}

enum Wake {
    Exited(std::io::Result<std::process::ExitStatus>),
    Deadline,
    Cancel,
}

fn exit_outcome(exit: std::process::ExitStatus) -> Outcome {
    if exit.success() {
        return Outcome::new(MemberState::Done, Some(0), None);
    }
    if let Some(code) = exit.code() {
        return Outcome::new(
            MemberState::Error,
            Some(code),
            Some(format!("exited with code {code}")),
        );
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = exit.signal() {
            return Outcome::failed(format!("terminated by signal {signal}"));
        }
    }
    Outcome::failed("exited abnormally")
}

/// SIGTERM the child's process group, then SIGKILL if it lingers
async fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let group = Pid::from_raw(pid as i32);
    if let Err(e) = killpg(group, Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM to member group failed");
    }
    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
        return;
    }
    warn!(pid, "Member ignored SIGTERM, sending SIGKILL");
    let _ = killpg(group, Signal::SIGKILL);
    let _ = child.kill().await;
}

/// Atomically move a captured stream into place
fn publish(tmp: &Path, dest: &Path) {
    if !tmp.exists() {
        return;
    }
    if let Err(e) = std::fs::rename(tmp, dest) {
        warn!(path = %dest.display(), error = %e, "Failed to publish member output");
        let _ = std::fs::remove_file(tmp);
        let _ = write_atomic(dest, "");
    }
}
