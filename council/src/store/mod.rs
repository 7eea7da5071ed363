//! Directory-per-job persistence
//!
//! The job directory is the unit of truth. Every file has exactly one
//! writer and every write is an atomic replace, so no locks are needed:
//!
//! - `job.json` and `prompt.txt`: written once by the dispatcher
//! - `members/<slug>/status.json`: `queued` record from the dispatcher,
//!   every later version from that member's worker
//! - `members/<slug>/{output,error}.txt`: written once by the worker
//! - `.wait_cursor`: advisory, rewritten by the wait protocol

pub mod layout;
pub mod types;

pub use layout::{
    read_json_if_exists, read_text_if_exists, slugify, unique_slugs, write_atomic,
    write_json_atomic, JobDir,
};
pub use types::{
    JobMember, JobMeta, JobSettings, MemberFailure, MemberState, MemberStatus, PromptInput,
};

use crate::error::{CouncilError, CouncilResult};

impl JobDir {
    /// Load `job.json`; NotFound if the directory or the file is missing
    pub fn read_job(&self) -> CouncilResult<JobMeta> {
        self.ensure_exists()?;
        let path = self.job_file();
        read_json_if_exists(&path)?.ok_or_else(|| CouncilError::not_found("job.json", path))
    }

    pub fn write_job(&self, meta: &JobMeta) -> CouncilResult<()> {
        write_json_atomic(&self.job_file(), meta)
    }

    /// Load `prompt.txt`; NotFound if missing
    pub fn read_prompt(&self) -> CouncilResult<String> {
        let path = self.prompt_file();
        read_text_if_exists(&path)?.ok_or_else(|| CouncilError::not_found("prompt.txt", path))
    }

    pub fn write_prompt(&self, prompt: &str) -> CouncilResult<()> {
        write_atomic(&self.prompt_file(), prompt)
    }

    pub fn read_member_status(&self, slug: &str) -> CouncilResult<Option<MemberStatus>> {
        read_json_if_exists(&self.status_file(slug))
    }

    pub fn write_member_status(&self, slug: &str, status: &MemberStatus) -> CouncilResult<()> {
        write_json_atomic(&self.status_file(slug), status)
    }

    pub fn read_cursor(&self) -> CouncilResult<Option<String>> {
        Ok(read_text_if_exists(&self.cursor_file())?.map(|s| s.trim().to_string()))
    }

    pub fn write_cursor(&self, cursor: &str) -> CouncilResult<()> {
        write_atomic(&self.cursor_file(), cursor)
    }
}
