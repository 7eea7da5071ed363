//! Council job orchestration
//!
//! Fans one prompt out to several external CLI "members", each run by its own
//! detached worker process, and lets short-lived callers follow progress and
//! collect answers through the job directory alone.
//!
//! # Components
//!
//! - [`config`]: council definition (members, chairman, settings)
//! - [`store`]: directory-per-job persistence with atomic writes
//! - [`dispatch`]: job creation and worker fan-out
//! - [`worker`]: runs one member to a terminal state
//! - [`status`]: read-only job snapshots
//! - [`wait`]: bucketed long-poll cursor protocol
//! - [`results`]: prompt plus each member's output
//! - [`cancel`]: `stop` and `clean`
//! - [`ui`]: host planning-UI step lists
//!
//! # Usage
//!
//! ```bash
//! JOB=$(council-job start "Should we use library X?")
//! council-job wait "$JOB"      # returns at once with a cursor
//! council-job wait "$JOB"      # blocks until progress moves
//! council-job results "$JOB"
//! council-job clean "$JOB"
//! ```

pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod results;
pub mod status;
pub mod store;
pub mod ui;
pub mod wait;
pub mod worker;

// Re-export error types
pub use error::{CouncilError, CouncilResult, StructuredError};

// Re-export config types
pub use config::{
    ChairmanConfig, ConfigLoader, CouncilConfig, CouncilSettings, FileConfigLoader, MemberConfig,
};

// Re-export store types
pub use store::{
    JobDir, JobMember, JobMeta, JobSettings, MemberFailure, MemberState, MemberStatus, PromptInput,
};

// Re-export orchestration entry points
pub use cancel::{clean_job, stop_job, CleanReport, StopReport};
pub use dispatch::{start, ProcessLauncher, StartOptions, StartedJob, WorkerLauncher, WorkerRequest};
pub use results::{collect_results, JobResults, MemberResult};
pub use status::{compute_status, MemberSnapshot, OverallState, StateCounts, StatusSnapshot};
pub use ui::{build_ui_payload, UiLabels, UiPayload};
pub use wait::{wait_for_progress, BucketSpec, WaitCursor, WaitOptions, WaitOutcome, WaitReport};
pub use worker::{run_worker, TerminationSignals, WorkerSpec};
