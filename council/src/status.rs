//! Read-only job snapshots
//!
//! `compute_status` reads `job.json` once and each member's `status.json`
//! once. Every file it touches is replaced atomically by its single writer, so
//! no locking is needed and the call is safe while workers are running.

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::CouncilResult;
use crate::store::{JobDir, MemberState, MemberStatus};

/// Aggregate job state derived from the member states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallState {
    Queued,
    Running,
    Done,
}

impl OverallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for OverallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of members in each state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub error: usize,
    pub missing_cli: usize,
    pub timed_out: usize,
    pub canceled: usize,
}

impl StateCounts {
    fn record(&mut self, state: MemberState) {
        self.total += 1;
        match state {
            MemberState::Queued => self.queued += 1,
            MemberState::Running => self.running += 1,
            MemberState::Done => self.done += 1,
            MemberState::Error => self.error += 1,
            MemberState::MissingCli => self.missing_cli += 1,
            MemberState::TimedOut => self.timed_out += 1,
            MemberState::Canceled => self.canceled += 1,
        }
    }

    /// Members in any terminal state
    pub fn terminal(&self) -> usize {
        self.total - self.queued - self.running
    }

    pub fn overall(&self) -> OverallState {
        if self.queued == 0 && self.running == 0 {
            OverallState::Done
        } else if self.running > 0 {
            OverallState::Running
        } else {
            OverallState::Queued
        }
    }
}

/// One member as seen by a status read
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSnapshot {
    pub member: String,
    #[serde(skip)]
    pub slug: String,
    pub state: MemberState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
}

/// Point-in-time view of a whole job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub job_dir: PathBuf,
    pub id: String,
    pub chairman_role: String,
    pub overall_state: OverallState,
    pub counts: StateCounts,
    pub members: Vec<MemberSnapshot>,
}

impl StatusSnapshot {
    pub fn is_done(&self) -> bool {
        self.overall_state == OverallState::Done
    }
}

/// Snapshot the job; NotFound if the directory, `job.json`, or `members/`
/// is missing. Member files that cannot be read are skipped with a warning.
pub fn compute_status(job: &JobDir) -> CouncilResult<StatusSnapshot> {
    let meta = job.read_job()?;
    let slugs = job.member_slugs()?;

    let mut counts = StateCounts::default();
    let mut members = Vec::with_capacity(slugs.len());
    for slug in slugs {
        let status = match job.read_member_status(&slug) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(member = %slug, "Member has no status file, skipping");
                continue;
            }
            Err(e) => {
                warn!(member = %slug, error = %e, "Unreadable member status, skipping");
                continue;
            }
        };
        let status = reconcile_orphan(job, &slug, status);
        debug!(member = %status.member, state = %status.state, "Read member status");
        counts.record(status.state);
        members.push(MemberSnapshot {
            member: status.member,
            slug,
            state: status.state,
            started_at: status.started_at,
            finished_at: status.finished_at,
            exit_code: status.exit_code,
            message: status.message,
        });
    }
    members.sort_by(|a, b| a.member.cmp(&b.member).then_with(|| a.slug.cmp(&b.slug)));

    Ok(StatusSnapshot {
        job_dir: job.root().to_path_buf(),
        id: meta.id,
        chairman_role: meta.chairman_role,
        overall_state: counts.overall(),
        counts,
        members,
    })
}

/// Whether a process with this pid still exists
pub fn pid_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 probes without delivering anything; EPERM still means alive.
    !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH))
}

/// A `running` member whose worker is gone and never wrote a terminal state
/// is reported as `canceled`. The stored file is left untouched.
fn reconcile_orphan(job: &JobDir, slug: &str, status: MemberStatus) -> MemberStatus {
    let (MemberState::Running, Some(pid)) = (status.state, status.pid) else {
        return status;
    };
    if pid_alive(pid) {
        return status;
    }
    // The worker may have finished between the first read and the probe.
    let latest = match job.read_member_status(slug) {
        Ok(Some(latest)) => latest,
        _ => status,
    };
    if latest.state != MemberState::Running {
        return latest;
    }
    warn!(member = %latest.member, pid, "Worker exited without recording a result");
    MemberStatus {
        state: MemberState::Canceled,
        pid: None,
        message: Some(format!(
            "worker process {pid} exited without recording a result"
        )),
        ..latest
    }
}
