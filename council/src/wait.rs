//! Cursor-based long-poll over job progress
//!
//! Each `wait` call is independent. The caller hands back the cursor from the
//! previous call (or it is read from `.wait_cursor`) and the call sleeps until
//! the quantized progress differs from it. Progress is bucketed so a job
//! produces roughly five wake-ups no matter how many members it has, plus one
//! for dispatch and one for completion.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{CouncilError, CouncilResult};
use crate::status::{compute_status, OverallState, StateCounts, StatusSnapshot};
use crate::store::{JobDir, MemberState};
use crate::ui::{build_ui_payload, UiLabels, UiPayload};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Target number of done-bucket wake-ups per job
const TARGET_UPDATES: usize = 5;

/// Quantized progress position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitCursor {
    pub bucket_size: usize,
    pub dispatch_bucket: u8,
    pub done_bucket: usize,
    pub is_done: bool,
}

impl WaitCursor {
    /// Parse `v2:size:dispatch:done:isDone` or legacy `v1:size:done:isDone`.
    /// Anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<&str> = raw.trim().split(':').collect();
        let (bucket_size, dispatch_bucket, done_bucket, is_done) = match parts.as_slice() {
            ["v1", size, done, flag] => (*size, "0", *done, *flag),
            ["v2", size, dispatch, done, flag] => (*size, *dispatch, *done, *flag),
            _ => return None,
        };
        let bucket_size: usize = bucket_size.parse().ok().filter(|n| *n > 0)?;
        let dispatch_bucket: u8 = dispatch_bucket.parse().ok()?;
        let done_bucket: usize = done_bucket.parse().ok()?;
        Some(Self {
            bucket_size,
            dispatch_bucket: dispatch_bucket.min(1),
            done_bucket,
            is_done: is_done == "1",
        })
    }

    pub fn from_counts(counts: &StateCounts, overall: OverallState, bucket_size: usize) -> Self {
        let bucket_size = bucket_size.max(1);
        Self {
            bucket_size,
            dispatch_bucket: u8::from(counts.queued == 0 && counts.total > 0),
            done_bucket: counts.terminal() / bucket_size,
            is_done: overall == OverallState::Done,
        }
    }

    pub fn from_snapshot(snapshot: &StatusSnapshot, bucket_size: usize) -> Self {
        Self::from_counts(&snapshot.counts, snapshot.overall_state, bucket_size)
    }
}

impl fmt::Display for WaitCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v2:{}:{}:{}:{}",
            self.bucket_size,
            self.dispatch_bucket,
            self.done_bucket,
            u8::from(self.is_done)
        )
    }
}

/// `ceil(total / 5)`, at least 1
pub fn auto_bucket_size(total: usize) -> usize {
    total.div_ceil(TARGET_UPDATES).max(1)
}

/// `--bucket auto|N`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketSpec {
    Auto,
    Fixed(usize),
}

impl FromStr for BucketSpec {
    type Err = CouncilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Self::Fixed(n)),
            _ => Err(CouncilError::invalid_argument(format!(
                "wait: invalid --bucket: {s} (expected auto or a positive integer)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Previous cursor; `None` falls back to `.wait_cursor`
    pub cursor: Option<String>,
    /// `None` keeps the previous cursor's bucket size, else auto
    pub bucket: Option<BucketSpec>,
    pub interval: Duration,
    /// `None` waits until the cursor moves
    pub timeout: Option<Duration>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            cursor: None,
            bucket: None,
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl WaitOptions {
    /// Build from millisecond flags. `interval_ms` must be positive and is
    /// raised to the 50ms floor; `timeout_ms == 0` means no timeout.
    pub fn from_millis(
        cursor: Option<String>,
        bucket: Option<BucketSpec>,
        interval_ms: i64,
        timeout_ms: i64,
    ) -> CouncilResult<Self> {
        if interval_ms <= 0 {
            return Err(CouncilError::invalid_argument(format!(
                "wait: invalid --interval-ms: {interval_ms}"
            )));
        }
        if timeout_ms < 0 {
            return Err(CouncilError::invalid_argument(format!(
                "wait: invalid --timeout-ms: {timeout_ms}"
            )));
        }
        Ok(Self {
            cursor,
            bucket,
            interval: Duration::from_millis(interval_ms as u64),
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms as u64)),
        })
    }
}

/// Why a wait call returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// No usable previous cursor; returned without sleeping
    Initial,
    /// Cursor moved
    Progressed,
    /// Previous cursor already marked the job done
    AlreadyDone,
    /// Caller's timeout elapsed first
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct WaitOutcome {
    pub snapshot: StatusSnapshot,
    pub cursor: WaitCursor,
    pub reason: WakeReason,
}

/// Block until the job's cursor differs from the previous one.
///
/// The returned cursor is persisted to `.wait_cursor` before returning.
pub async fn wait_for_progress(job: &JobDir, options: &WaitOptions) -> CouncilResult<WaitOutcome> {
    let interval = options.interval.max(MIN_POLL_INTERVAL);
    let previous = match &options.cursor {
        Some(raw) => WaitCursor::parse(raw),
        None => job.read_cursor()?.as_deref().and_then(WaitCursor::parse),
    };

    let mut snapshot = compute_status(job)?;
    let bucket_size = match (options.bucket, previous) {
        (Some(BucketSpec::Fixed(n)), _) => n,
        (None, Some(prev)) => prev.bucket_size,
        _ => auto_bucket_size(snapshot.counts.total),
    };
    let mut cursor = WaitCursor::from_snapshot(&snapshot, bucket_size);

    let reason = match previous {
        None => WakeReason::Initial,
        Some(prev) if prev != cursor => WakeReason::Progressed,
        Some(prev) if prev.is_done && cursor.is_done => WakeReason::AlreadyDone,
        Some(prev) => {
            debug!(cursor = %prev, "Waiting for progress");
            let started = Instant::now();
            loop {
                // Never nap past the deadline; the state is re-read once there.
                let nap = match options.timeout {
                    Some(limit) => {
                        let left = limit.saturating_sub(started.elapsed());
                        if left.is_zero() {
                            break WakeReason::TimedOut;
                        }
                        interval.min(left)
                    }
                    None => interval,
                };
                tokio::time::sleep(nap).await;
                snapshot = compute_status(job)?;
                cursor = WaitCursor::from_snapshot(&snapshot, bucket_size);
                if cursor != prev {
                    break WakeReason::Progressed;
                }
            }
        }
    };

    job.write_cursor(&cursor.to_string())?;
    info!(job_id = %snapshot.id, cursor = %cursor, reason = ?reason, "Wait returned");
    Ok(WaitOutcome {
        snapshot,
        cursor,
        reason,
    })
}

/// Member entry in a wait report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitMember {
    pub member: String,
    pub state: MemberState,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
}

/// What `wait` prints: the status fields, the UI payload, and the new cursor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitReport {
    pub job_dir: PathBuf,
    pub id: String,
    pub chairman_role: String,
    pub overall_state: OverallState,
    pub counts: StateCounts,
    pub members: Vec<WaitMember>,
    pub ui: UiPayload,
    pub cursor: String,
}

impl WaitReport {
    pub fn new(outcome: &WaitOutcome, labels: &UiLabels) -> Self {
        let snapshot = &outcome.snapshot;
        Self {
            job_dir: snapshot.job_dir.clone(),
            id: snapshot.id.clone(),
            chairman_role: snapshot.chairman_role.clone(),
            overall_state: snapshot.overall_state,
            counts: snapshot.counts,
            members: snapshot
                .members
                .iter()
                .map(|m| WaitMember {
                    member: m.member.clone(),
                    state: m.state,
                    exit_code: m.exit_code,
                    message: m.message.clone(),
                })
                .collect(),
            ui: build_ui_payload(snapshot, labels),
            cursor: outcome.cursor.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JobMeta, JobSettings, MemberStatus};
    use chrono::Utc;
    use tempfile::{tempdir, TempDir};

    fn queued_job(names: &[&str]) -> (TempDir, JobDir) {
        let dir = tempdir().unwrap();
        let job = JobDir::new(dir.path());
        job.write_job(&JobMeta {
            id: "council-test".to_string(),
            created_at: Utc::now(),
            config_path: PathBuf::from("council.config.yaml"),
            host_role: "unknown".to_string(),
            chairman_role: "claude".to_string(),
            settings: JobSettings {
                exclude_chairman_from_members: true,
                timeout_sec: None,
            },
            members: Vec::new(),
        })
        .unwrap();
        for name in names {
            std::fs::create_dir_all(job.member_dir(name)).unwrap();
            job.write_member_status(name, &MemberStatus::queued(*name, "echo"))
                .unwrap();
        }
        (dir, job)
    }

    fn set_state(job: &JobDir, name: &str, state: MemberState) {
        let mut status = job.read_member_status(name).unwrap().unwrap();
        if status.state == MemberState::Queued {
            status.start(std::process::id()).unwrap();
        }
        if state.is_terminal() {
            status.finish(state, Some(0), None).unwrap();
        }
        job.write_member_status(name, &status).unwrap();
    }

    fn fast() -> WaitOptions {
        WaitOptions {
            interval: Duration::from_millis(50),
            ..WaitOptions::default()
        }
    }

    #[test]
    fn test_cursor_parse() {
        let v2 = WaitCursor::parse("v2:2:1:3:0").unwrap();
        assert_eq!(v2.bucket_size, 2);
        assert_eq!(v2.dispatch_bucket, 1);
        assert_eq!(v2.done_bucket, 3);
        assert!(!v2.is_done);
        assert_eq!(v2.to_string(), "v2:2:1:3:0");

        let v1 = WaitCursor::parse(" v1:1:4:1\n").unwrap();
        assert_eq!(v1.dispatch_bucket, 0);
        assert!(v1.is_done);
        assert_eq!(v1.to_string(), "v2:1:0:4:1");

        for bad in ["", "v2:0:0:0:0", "v3:1:0:0:0", "v2:1:0:x:0", "v1:1:0"] {
            assert!(WaitCursor::parse(bad).is_none(), "{bad}");
        }
    }

    #[test]
    fn test_auto_bucket_size() {
        assert_eq!(auto_bucket_size(0), 1);
        assert_eq!(auto_bucket_size(3), 1);
        assert_eq!(auto_bucket_size(5), 1);
        assert_eq!(auto_bucket_size(6), 2);
        assert_eq!(auto_bucket_size(23), 5);
    }

    #[test]
    fn test_bucket_spec() {
        assert_eq!("auto".parse::<BucketSpec>().unwrap(), BucketSpec::Auto);
        assert_eq!("3".parse::<BucketSpec>().unwrap(), BucketSpec::Fixed(3));
        assert!("0".parse::<BucketSpec>().is_err());
        assert!("-1".parse::<BucketSpec>().is_err());
        assert!("lots".parse::<BucketSpec>().is_err());
    }

    #[test]
    fn test_options_validation() {
        assert!(WaitOptions::from_millis(None, None, 0, 0).is_err());
        assert!(WaitOptions::from_millis(None, None, 250, -5).is_err());
        let opts = WaitOptions::from_millis(None, None, 10, 0).unwrap();
        assert_eq!(opts.timeout, None);
        let opts = WaitOptions::from_millis(None, None, 100, 1500).unwrap();
        assert_eq!(opts.timeout, Some(Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn test_first_call_returns_immediately_and_persists() {
        let (_dir, job) = queued_job(&["a", "b"]);
        let outcome = wait_for_progress(&job, &fast()).await.unwrap();
        assert_eq!(outcome.reason, WakeReason::Initial);
        assert_eq!(outcome.cursor.to_string(), "v2:1:0:0:0");
        assert_eq!(job.read_cursor().unwrap().as_deref(), Some("v2:1:0:0:0"));
    }

    #[tokio::test]
    async fn test_timeout_returns_unchanged_cursor() {
        let (_dir, job) = queued_job(&["a"]);
        wait_for_progress(&job, &fast()).await.unwrap();
        let opts = WaitOptions {
            timeout: Some(Duration::from_millis(120)),
            ..fast()
        };
        let outcome = wait_for_progress(&job, &opts).await.unwrap();
        assert_eq!(outcome.reason, WakeReason::TimedOut);
        assert_eq!(outcome.cursor.to_string(), "v2:1:0:0:0");
    }

    #[tokio::test]
    async fn test_timeout_shorter_than_interval() {
        let (_dir, job) = queued_job(&["a"]);
        wait_for_progress(&job, &fast()).await.unwrap();
        let opts = WaitOptions {
            interval: Duration::from_millis(3000),
            timeout: Some(Duration::from_millis(200)),
            ..WaitOptions::default()
        };
        let started = Instant::now();
        let outcome = wait_for_progress(&job, &opts).await.unwrap();
        let elapsed = started.elapsed();
        assert_eq!(outcome.reason, WakeReason::TimedOut);
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_progress_during_clipped_nap() {
        let (_dir, job) = queued_job(&["a"]);
        wait_for_progress(&job, &fast()).await.unwrap();

        let writer = job.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            set_state(&writer, "a", MemberState::Running);
        });
        let opts = WaitOptions {
            interval: Duration::from_millis(3000),
            timeout: Some(Duration::from_millis(200)),
            ..WaitOptions::default()
        };
        let started = Instant::now();
        let outcome = wait_for_progress(&job, &opts).await.unwrap();
        assert_eq!(outcome.reason, WakeReason::Progressed);
        assert_eq!(outcome.cursor.dispatch_bucket, 1);
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_wakes_on_progress() {
        let (_dir, job) = queued_job(&["a", "b"]);
        wait_for_progress(&job, &fast()).await.unwrap();

        let writer = job.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            set_state(&writer, "a", MemberState::Running);
            set_state(&writer, "b", MemberState::Running);
        });
        let outcome = wait_for_progress(&job, &fast()).await.unwrap();
        assert_eq!(outcome.reason, WakeReason::Progressed);
        assert_eq!(outcome.cursor.dispatch_bucket, 1);
        assert_eq!(job.read_cursor().unwrap().unwrap(), outcome.cursor.to_string());
    }

    #[tokio::test]
    async fn test_done_cursor_never_blocks() {
        let (_dir, job) = queued_job(&["a"]);
        set_state(&job, "a", MemberState::Done);
        let first = wait_for_progress(&job, &fast()).await.unwrap();
        assert!(first.cursor.is_done);

        let again = wait_for_progress(&job, &fast()).await.unwrap();
        assert_eq!(again.reason, WakeReason::AlreadyDone);
        assert_eq!(again.cursor, first.cursor);
    }

    #[tokio::test]
    async fn test_explicit_cursor_and_bucket() {
        let (_dir, job) = queued_job(&["a", "b", "c", "d", "e", "f"]);
        set_state(&job, "a", MemberState::Done);
        let opts = WaitOptions {
            cursor: Some("garbage".to_string()),
            bucket: Some(BucketSpec::Fixed(2)),
            ..fast()
        };
        let outcome = wait_for_progress(&job, &opts).await.unwrap();
        assert_eq!(outcome.reason, WakeReason::Initial);
        assert_eq!(outcome.cursor.to_string(), "v2:2:0:0:0");

        // Bucket size carries over from the supplied cursor: 1 of 6 done is
        // still bucket 0 at size 3.
        let opts = WaitOptions {
            cursor: Some("v2:3:0:0:0".to_string()),
            timeout: Some(Duration::from_millis(100)),
            ..fast()
        };
        let outcome = wait_for_progress(&job, &opts).await.unwrap();
        assert_eq!(outcome.reason, WakeReason::TimedOut);
        assert_eq!(outcome.cursor.bucket_size, 3);
    }

    #[tokio::test]
    async fn test_report_shape() {
        let (_dir, job) = queued_job(&["a"]);
        let outcome = wait_for_progress(&job, &fast()).await.unwrap();
        let report = WaitReport::new(&outcome, &UiLabels::default());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["cursor"], "v2:1:0:0:0");
        assert_eq!(value["members"][0]["state"], "queued");
        assert!(value["members"][0].get("startedAt").is_none());
        assert_eq!(value["ui"]["progress"]["total"], 1);
    }
}
