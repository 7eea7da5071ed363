//! Final answers per member
//!
//! Valid at any time: members that have not finished yet are returned with
//! their current state and whatever output exists so far (usually none).

use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

use crate::error::CouncilResult;
use crate::store::{read_text_if_exists, JobDir, MemberState};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResult {
    pub member: String,
    #[serde(skip)]
    pub slug: String,
    pub state: MemberState,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
    pub output: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResults {
    pub job_dir: PathBuf,
    pub id: String,
    pub prompt: String,
    pub members: Vec<MemberResult>,
}

/// Prompt plus every member's state and captured streams, sorted by member.
/// NotFound if the job, its prompt, or its members folder is missing.
pub fn collect_results(job: &JobDir) -> CouncilResult<JobResults> {
    let meta = job.read_job()?;
    let prompt = job.read_prompt()?;

    let mut members = Vec::new();
    for slug in job.member_slugs()? {
        let status = match job.read_member_status(&slug) {
            Ok(Some(status)) => status,
            Ok(None) => continue,
            Err(e) => {
                warn!(member = %slug, error = %e, "Unreadable member status, skipping");
                continue;
            }
        };
        let output = read_text_if_exists(&job.output_file(&slug))?.unwrap_or_default();
        let error = read_text_if_exists(&job.error_file(&slug))?.unwrap_or_default();
        members.push(MemberResult {
            member: status.member,
            slug,
            state: status.state,
            exit_code: status.exit_code,
            message: status.message,
            output,
            error,
        });
    }
    members.sort_by(|a, b| a.member.cmp(&b.member).then_with(|| a.slug.cmp(&b.slug)));

    Ok(JobResults {
        job_dir: job.root().to_path_buf(),
        id: meta.id,
        prompt,
        members,
    })
}
