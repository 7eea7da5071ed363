//! Job creation and worker fan-out
//!
//! `start` writes the whole job (metadata, prompt, one `queued` status per
//! member) and then launches one detached worker process per member. It keeps
//! no process handles: once a worker is launched the filesystem is the only
//! link between it and everything else.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{info, warn};

use crate::config::{resolve_chairman_role, CouncilConfig, MemberConfig};
use crate::error::{CouncilError, CouncilResult};
use crate::store::{
    unique_slugs, JobDir, JobMember, JobMeta, JobSettings, MemberState, MemberStatus, PromptInput,
};

/// Caller-side overrides for one `start`
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Config file the `CouncilConfig` came from (recorded in job.json)
    pub config_path: PathBuf,
    /// Root directory holding job directories
    pub jobs_dir: PathBuf,
    /// Requested chairman role before `auto` resolution
    pub chairman: String,
    /// Role of the invoking host (`claude`, `codex`, `unknown`)
    pub host_role: String,
    /// Per-member timeout override in seconds
    pub timeout_sec: Option<u64>,
    /// `Some(true)` forces exclusion, `Some(false)` forces inclusion
    pub exclude_chairman: Option<bool>,
}

/// Everything a worker needs, passed on its command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
    pub job_dir: PathBuf,
    pub member: String,
    pub slug: String,
    pub command: String,
    pub input: PromptInput,
    pub timeout_sec: Option<u64>,
}

impl WorkerRequest {
    /// Flags understood by `council-job worker`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--job-dir".to_string(),
            self.job_dir.display().to_string(),
            "--member".to_string(),
            self.member.clone(),
            "--safe-member".to_string(),
            self.slug.clone(),
            "--command".to_string(),
            self.command.clone(),
        ];
        if self.input == PromptInput::Stdin {
            args.push("--stdin".to_string());
        }
        if let Some(timeout) = self.timeout_sec {
            args.push("--timeout".to_string());
            args.push(timeout.to_string());
        }
        args
    }
}

/// Starts a worker for one member without waiting on it
pub trait WorkerLauncher {
    fn launch(&self, request: &WorkerRequest) -> std::io::Result<()>;
}

/// Launches workers as detached OS processes: `<program> <leading args...>
/// <worker flags...>` in a new process group, with all stdio closed.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    leading_args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    /// Re-invoke the running executable's `worker` subcommand
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, vec!["worker".to_string()]))
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, request: &WorkerRequest) -> std::io::Result<()> {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(request.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group: a signal aimed at the caller's group (e.g. the
        // host tearing down its tool call) does not reach the worker.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn()?;
        info!(member = %request.member, pid = child.id(), "Worker launched");
        // Dropping the handle detaches; the worker reports only through its status file.
        drop(child);
        Ok(())
    }
}

/// Result of a successful `start`
#[derive(Debug, Clone)]
pub struct StartedJob {
    pub job_dir: PathBuf,
    pub meta: JobMeta,
}

/// Members that will actually run, in config order.
///
/// The chairman synthesizes the others' answers, so with exclusion on a
/// member whose name matches the chairman role is left out.
pub fn select_members<'a>(
    config: &'a CouncilConfig,
    chairman_role: &str,
    exclude_chairman: bool,
) -> Vec<&'a MemberConfig> {
    config
        .members
        .iter()
        .filter(|m| !m.name.trim().is_empty() && !m.command.trim().is_empty())
        .filter(|m| !(exclude_chairman && m.name.trim().to_lowercase() == chairman_role))
        .collect()
}

/// Lexically sortable job id: `council-YYYYMMDD-HHMMSS-<6 hex>`
pub fn generate_job_id() -> String {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("council-{}-{}", stamp, &suffix[..6])
}

/// Create a job and launch one worker per selected member.
///
/// Job metadata and the prompt are on disk before the first worker starts.
/// A member whose worker cannot be launched is recorded as `error`; the
/// remaining members still run.
pub fn start(
    prompt: &str,
    config: &CouncilConfig,
    options: &StartOptions,
    launcher: &dyn WorkerLauncher,
) -> CouncilResult<StartedJob> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(CouncilError::invalid_argument("start: missing prompt"));
    }

    let chairman_role = resolve_chairman_role(&options.chairman, &options.host_role);
    let exclude = options
        .exclude_chairman
        .unwrap_or(config.settings.exclude_chairman_from_members);
    let timeout_sec = options
        .timeout_sec
        .filter(|t| *t > 0)
        .or(config.settings.timeout_sec.filter(|t| *t > 0));

    let selected = select_members(config, &chairman_role, exclude);
    let slugs = unique_slugs(selected.iter().map(|m| m.name.as_str()));

    std::fs::create_dir_all(&options.jobs_dir)?;
    let jobs_dir = absolute(&options.jobs_dir)?;
    let id = generate_job_id();
    let job = JobDir::new(jobs_dir.join(&id));
    std::fs::create_dir(job.root())?;
    std::fs::create_dir(job.members_dir())?;

    let meta = JobMeta {
        id: id.clone(),
        created_at: Utc::now(),
        config_path: options.config_path.clone(),
        host_role: options.host_role.clone(),
        chairman_role: chairman_role.clone(),
        settings: JobSettings {
            exclude_chairman_from_members: exclude,
            timeout_sec,
        },
        members: selected
            .iter()
            .zip(&slugs)
            .map(|(m, slug)| JobMember {
                name: m.name.clone(),
                slug: slug.clone(),
                command: m.command.clone(),
                emoji: m.emoji.clone(),
                color: m.color.clone(),
                input: m.input,
            })
            .collect(),
    };

    job.write_prompt(prompt)?;
    job.write_job(&meta)?;
    info!(
        job_id = %id,
        chairman = %chairman_role,
        members = meta.members.len(),
        "Council job created"
    );

    for member in &meta.members {
        std::fs::create_dir(job.member_dir(&member.slug))?;
        let status = MemberStatus::queued(&member.name, &member.command);
        job.write_member_status(&member.slug, &status)?;

        let request = WorkerRequest {
            job_dir: job.root().to_path_buf(),
            member: member.name.clone(),
            slug: member.slug.clone(),
            command: member.command.clone(),
            input: member.input,
            timeout_sec,
        };
        if let Err(e) = launcher.launch(&request) {
            warn!(member = %member.name, error = %e, "Failed to launch worker");
            // No worker exists for this member, so the dispatcher is still its only writer.
            let mut failed = status;
            failed.finish(
                MemberState::Error,
                None,
                Some(format!("failed to launch worker: {e}")),
            )?;
            job.write_member_status(&member.slug, &failed)?;
        }
    }

    Ok(StartedJob {
        job_dir: job.root().to_path_buf(),
        meta,
    })
}

fn absolute(path: &Path) -> CouncilResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
