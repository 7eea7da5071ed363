//! Persisted job and member records
//!
//! Field names are camelCase on disk; `job.json` and every
//! `members/<slug>/status.json` are read by other tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CouncilError, CouncilResult};

/// Lifecycle state of one member.
///
/// States only move forward: `queued -> running -> <terminal>`, and a worker
/// may jump straight from `queued` to `missing_cli`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    Queued,
    Running,
    Done,
    Error,
    MissingCli,
    TimedOut,
    Canceled,
}

/// Why a member did not produce a usable answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberFailure {
    MissingExternalTool,
    ExecutionFailure,
    Timeout,
    Canceled,
}

impl MemberState {
    pub const ALL: [MemberState; 7] = [
        Self::Queued,
        Self::Running,
        Self::Done,
        Self::Error,
        Self::MissingCli,
        Self::TimedOut,
        Self::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::MissingCli => "missing_cli",
            Self::TimedOut => "timed_out",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }

    /// Position in the lifecycle; all terminal states share the last slot.
    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            _ => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotone.
    pub fn can_transition_to(&self, next: MemberState) -> bool {
        next.rank() > self.rank()
    }

    pub fn failure_kind(&self) -> Option<MemberFailure> {
        match self {
            Self::MissingCli => Some(MemberFailure::MissingExternalTool),
            Self::Error => Some(MemberFailure::ExecutionFailure),
            Self::TimedOut => Some(MemberFailure::Timeout),
            Self::Canceled => Some(MemberFailure::Canceled),
            Self::Queued | Self::Running | Self::Done => None,
        }
    }
}

impl std::fmt::Display for MemberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a member's command receives the prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptInput {
    /// Appended as the final argument
    #[default]
    Argument,
    /// Written to the child's stdin
    Stdin,
}

/// `members/<slug>/status.json`. Written only by the member's own worker
/// after the dispatcher creates the initial `queued` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatus {
    pub member: String,
    pub state: MemberState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub command: String,
}

impl MemberStatus {
    /// Initial record written at dispatch
    pub fn queued(member: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            state: MemberState::Queued,
            queued_at: Some(Utc::now()),
            started_at: None,
            finished_at: None,
            pid: None,
            exit_code: None,
            message: None,
            command: command.into(),
        }
    }

    fn advance(&mut self, next: MemberState) -> CouncilResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(CouncilError::InvalidTransition {
                member: self.member.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Move to `running`, recording the worker's pid
    pub fn start(&mut self, pid: u32) -> CouncilResult<()> {
        self.advance(MemberState::Running)?;
        self.started_at = Some(Utc::now());
        self.pid = Some(pid);
        Ok(())
    }

    /// Move to a terminal state
    pub fn finish(
        &mut self,
        state: MemberState,
        exit_code: Option<i32>,
        message: Option<String>,
    ) -> CouncilResult<()> {
        if !state.is_terminal() {
            return Err(CouncilError::InvalidTransition {
                member: self.member.clone(),
                from: self.state.to_string(),
                to: state.to_string(),
            });
        }
        self.advance(state)?;
        self.finished_at = Some(Utc::now());
        self.pid = None;
        self.exit_code = exit_code;
        self.message = message;
        Ok(())
    }
}

/// Settings frozen into the job at dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSettings {
    pub exclude_chairman_from_members: bool,
    pub timeout_sec: Option<u64>,
}

/// Snapshot of one dispatched member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMember {
    pub name: String,
    pub slug: String,
    pub command: String,
    pub emoji: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub input: PromptInput,
}

/// `job.json`, written once before any worker starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub config_path: PathBuf,
    pub host_role: String,
    pub chairman_role: String,
    pub settings: JobSettings,
    pub members: Vec<JobMember>,
}
