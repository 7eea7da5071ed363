//! Council error types
//!
//! Structural failures (a job directory or one of its required files is
//! missing, a flag is malformed, a config file is unreadable) surface as
//! [`CouncilError`]. Per-member failures never do: they are recorded as
//! terminal [`MemberState`](crate::store::MemberState)s by the member's own
//! worker and reported through status and results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for council operations
pub type CouncilResult<T> = Result<T, CouncilError>;

// ============================================================================
// Structured Error Response (Agent-Friendly)
// ============================================================================

/// Structured error payload for callers that parse stderr.
///
/// # Example
/// ```json
/// {
///   "code": "NOT_FOUND",
///   "message": "job.json not found: /tmp/jobs/council-20250101-120000-a1b2c3/job.json",
///   "recovery_action": "Check the job directory printed by `council-job start`",
///   "context": { "path": "/tmp/jobs/council-20250101-120000-a1b2c3/job.json" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code (e.g., "NOT_FOUND", "INVALID_ARGUMENT")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// What the caller should do next
    pub recovery_action: String,

    /// Relevant context for debugging
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl StructuredError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: recovery_action.into(),
            context: HashMap::new(),
        }
    }

    /// Add context key-value pair
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}

/// Errors that can occur during council job operations
#[derive(Error, Debug)]
pub enum CouncilError {
    /// A job directory or one of its required components is missing
    #[error("{what} not found: {}", .path.display())]
    NotFound { what: String, path: PathBuf },

    /// Malformed flag or option value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration file could not be parsed
    #[error("Config error in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    /// A member status update would move backwards or leave a terminal state
    #[error("Invalid state transition for member '{member}' from {from} to {to}")]
    InvalidTransition {
        member: String,
        from: String,
        to: String,
    },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CouncilError {
    pub fn not_found(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this is a NotFound condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Convert to a structured error for machine-readable stderr output
    pub fn to_structured(&self) -> StructuredError {
        let message = self.to_string();
        match self {
            Self::NotFound { what, path } => StructuredError::new(
                "NOT_FOUND",
                message,
                "Check the job directory printed by `council-job start`; \
                 it may have been removed by `council-job clean`",
            )
            .with_context("what", what.clone())
            .with_context("path", path.display().to_string()),
            Self::InvalidArgument(_) => StructuredError::new(
                "INVALID_ARGUMENT",
                message,
                "Fix the flag value and retry; run with --help for accepted forms",
            ),
            Self::Config { path, .. } => StructuredError::new(
                "CONFIG_ERROR",
                message,
                "Fix the council config file or point --config / COUNCIL_CONFIG elsewhere",
            )
            .with_context("path", path.display().to_string()),
            Self::InvalidTransition { member, .. } => StructuredError::new(
                "INVALID_TRANSITION",
                message,
                "Member states only move forward; start a new job to rerun a member",
            )
            .with_context("member", member.clone()),
            Self::Io(e) => {
                let recovery = match e.kind() {
                    std::io::ErrorKind::PermissionDenied => {
                        "Permission denied. Check permissions on the jobs directory"
                    }
                    _ => "IO error occurred. Check disk space and file permissions",
                };
                StructuredError::new("IO_ERROR", message, recovery)
            }
            Self::Json(_) => StructuredError::new(
                "JSON_ERROR",
                message,
                "A job file is corrupted; start a new job",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_includes_path() {
        let err = CouncilError::not_found("job.json", "/tmp/x/job.json");
        assert_eq!(err.to_string(), "job.json not found: /tmp/x/job.json");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_structured_codes() {
        let err = CouncilError::invalid_argument("wait: invalid --bucket: 0");
        let s = err.to_structured();
        assert_eq!(s.code, "INVALID_ARGUMENT");
        assert!(s.message.contains("--bucket"));
        assert!(s.context.is_empty());

        let err = CouncilError::not_found("members folder", "/tmp/j/members");
        let s = err.to_structured();
        assert_eq!(s.code, "NOT_FOUND");
        assert_eq!(s.context["path"], "/tmp/j/members");
        assert_eq!(format!("{s}"), "[NOT_FOUND] members folder not found: /tmp/j/members");
    }

    #[test]
    fn test_structured_serializes_without_empty_context() {
        let s = StructuredError::new("IO_ERROR", "disk full", "free space");
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("context").is_none());
    }
}
