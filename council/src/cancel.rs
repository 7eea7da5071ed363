//! Stop running members and delete jobs
//!
//! `stop` only delivers signals. The worker that receives SIGTERM records
//! `canceled` itself, so a status read right after `stop` may still show
//! `running` for a moment.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::{CouncilError, CouncilResult};
use crate::store::{JobDir, MemberState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignaledMember {
    pub member: String,
    pub pid: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub signaled: Vec<SignaledMember>,
}

impl StopReport {
    pub fn any(&self) -> bool {
        !self.signaled.is_empty()
    }
}

/// SIGTERM the worker of every `running` member with a recorded pid.
/// Processes that are already gone are skipped silently.
pub fn stop_job(job: &JobDir) -> CouncilResult<StopReport> {
    let mut report = StopReport::default();
    for slug in job.member_slugs()? {
        let status = match job.read_member_status(&slug) {
            Ok(Some(status)) => status,
            Ok(None) => continue,
            Err(e) => {
                warn!(member = %slug, error = %e, "Unreadable member status, skipping");
                continue;
            }
        };
        let (MemberState::Running, Some(pid)) = (status.state, status.pid) else {
            continue;
        };
        let Ok(raw) = i32::try_from(pid) else {
            warn!(member = %status.member, pid, "Recorded pid out of range");
            continue;
        };
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => {
                info!(member = %status.member, pid, "Sent SIGTERM");
                report.signaled.push(SignaledMember {
                    member: status.member,
                    pid,
                });
            }
            Err(Errno::ESRCH) => {}
            Err(e) => warn!(member = %status.member, pid, error = %e, "Failed to signal worker"),
        }
    }
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanReport {
    pub job_dir: PathBuf,
    pub removed: bool,
}

/// Recursively delete the job directory, cursor included.
///
/// A missing directory is a no-op. A directory without `job.json` is refused
/// so a mistyped path cannot delete something that is not a job.
pub fn clean_job(job: &JobDir) -> CouncilResult<CleanReport> {
    let root = job.root().to_path_buf();
    if !root.exists() {
        return Ok(CleanReport {
            job_dir: root,
            removed: false,
        });
    }
    if !job.job_file().is_file() {
        return Err(CouncilError::invalid_argument(format!(
            "refusing to clean {}: no job.json found",
            root.display()
        )));
    }
    std::fs::remove_dir_all(&root)?;
    info!(job_dir = %root.display(), "Removed job");
    Ok(CleanReport {
        job_dir: root,
        removed: true,
    })
}
