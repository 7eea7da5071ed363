//! On-disk layout of a job directory and the atomic file primitives
//! every writer goes through.
//!
//! ```text
//! <job>/job.json
//! <job>/prompt.txt
//! <job>/.wait_cursor
//! <job>/members/<slug>/status.json
//! <job>/members/<slug>/output.txt
//! <job>/members/<slug>/error.txt
//! ```

use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{CouncilError, CouncilResult};

pub const JOB_FILE: &str = "job.json";
pub const PROMPT_FILE: &str = "prompt.txt";
pub const CURSOR_FILE: &str = ".wait_cursor";
pub const MEMBERS_DIR: &str = "members";
pub const STATUS_FILE: &str = "status.json";
pub const OUTPUT_FILE: &str = "output.txt";
pub const ERROR_FILE: &str = "error.txt";

static UNSAFE_SLUG_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-z0-9_-]+").expect("valid slug regex")
});

/// Paths inside one job directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDir {
    root: PathBuf,
}

impl JobDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a user-supplied path to an absolute job directory
    pub fn resolve(path: impl AsRef<Path>) -> CouncilResult<Self> {
        let path = path.as_ref();
        let root = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_file(&self) -> PathBuf {
        self.root.join(JOB_FILE)
    }

    pub fn prompt_file(&self) -> PathBuf {
        self.root.join(PROMPT_FILE)
    }

    pub fn cursor_file(&self) -> PathBuf {
        self.root.join(CURSOR_FILE)
    }

    pub fn members_dir(&self) -> PathBuf {
        self.root.join(MEMBERS_DIR)
    }

    pub fn member_dir(&self, slug: &str) -> PathBuf {
        self.members_dir().join(slug)
    }

    pub fn status_file(&self, slug: &str) -> PathBuf {
        self.member_dir(slug).join(STATUS_FILE)
    }

    pub fn output_file(&self, slug: &str) -> PathBuf {
        self.member_dir(slug).join(OUTPUT_FILE)
    }

    pub fn error_file(&self, slug: &str) -> PathBuf {
        self.member_dir(slug).join(ERROR_FILE)
    }

    /// Fail with NotFound unless the job directory exists
    pub fn ensure_exists(&self) -> CouncilResult<()> {
        if !self.root.is_dir() {
            return Err(CouncilError::not_found("jobDir", &self.root));
        }
        Ok(())
    }

    /// Slugs of every member subdirectory, sorted
    pub fn member_slugs(&self) -> CouncilResult<Vec<String>> {
        let members_dir = self.members_dir();
        if !members_dir.is_dir() {
            return Err(CouncilError::not_found("members folder", members_dir));
        }
        let mut slugs = Vec::new();
        for entry in std::fs::read_dir(&members_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                slugs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        slugs.sort();
        Ok(slugs)
    }
}

/// Temp sibling for an atomic replace of `path`
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    path.with_file_name(format!(
        "{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        &nonce[..8]
    ))
}

/// Write to a temp sibling, then rename over `path`.
///
/// Readers see either the previous complete file or the new one.
pub fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> CouncilResult<()> {
    let temp_path = temp_path_for(path);
    if let Err(e) = std::fs::write(&temp_path, contents) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Pretty-printed JSON through [`write_atomic`]
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> CouncilResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    write_atomic(path, content)
}

/// `Ok(None)` when the file does not exist; parse failures are errors
pub fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> CouncilResult<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// `Ok(None)` when the file does not exist
pub fn read_text_if_exists(path: &Path) -> CouncilResult<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Filesystem-safe identifier for a member name
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let cleaned = UNSAFE_SLUG_CHARS.replace_all(&lowered, "-");
    if cleaned.is_empty() {
        "member".to_string()
    } else {
        cleaned.into_owned()
    }
}

/// Slugs for a member list, suffixing collisions with `-2`, `-3`, ...
pub fn unique_slugs<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();
    let mut slugs = Vec::new();
    for name in names {
        let base = slugify(name);
        let mut candidate = base.clone();
        let mut n = 2;
        while !taken.insert(candidate.clone()) {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        slugs.push(candidate);
    }
    slugs
}
