//! Council configuration
//!
//! The loader is a replaceable collaborator: anything implementing
//! [`ConfigLoader`] can hand the dispatcher a normalized [`CouncilConfig`].
//! [`FileConfigLoader`] reads YAML (or TOML, by `.toml` extension):
//!
//! ```yaml
//! council:
//!   chairman:
//!     role: auto            # auto | claude | codex | ...
//!   members:
//!     - name: claude
//!       command: claude -p
//!       emoji: "🧠"
//!       color: CYAN
//!     - name: gemini
//!       command: gemini
//!       input: stdin        # argument (default) | stdin
//!   settings:
//!     exclude_chairman_from_members: true
//!     timeout: 120          # seconds, 0 = none
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{CouncilError, CouncilResult};
use crate::store::PromptInput;

/// Overrides the config file path
pub const ENV_CONFIG: &str = "COUNCIL_CONFIG";
/// Overrides the job-store root
pub const ENV_JOBS_DIR: &str = "COUNCIL_JOBS_DIR";
/// Overrides the configured chairman role
pub const ENV_CHAIRMAN: &str = "COUNCIL_CHAIRMAN";
/// Overrides host-role detection
pub const ENV_HOST_ROLE: &str = "COUNCIL_HOST_ROLE";

pub const CONFIG_FILE_NAME: &str = "council.config.yaml";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// One configured member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfig {
    pub name: String,
    pub command: String,
    pub emoji: Option<String>,
    pub color: Option<String>,
    pub input: PromptInput,
}

impl MemberConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            emoji: None,
            color: None,
            input: PromptInput::default(),
        }
    }

    fn decorated(mut self, emoji: &str, color: &str) -> Self {
        self.emoji = Some(emoji.to_string());
        self.color = Some(color.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChairmanConfig {
    /// `auto` or an explicit role name
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouncilSettings {
    pub timeout_sec: Option<u64>,
    pub exclude_chairman_from_members: bool,
}

/// Normalized configuration consumed by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouncilConfig {
    pub members: Vec<MemberConfig>,
    pub chairman: ChairmanConfig,
    pub settings: CouncilSettings,
}

impl Default for CouncilConfig {
    /// Built-in council used when no usable config file exists
    fn default() -> Self {
        Self {
            members: vec![
                MemberConfig::new("claude", "claude -p").decorated("🧠", "CYAN"),
                MemberConfig::new("codex", "codex exec").decorated("🤖", "BLUE"),
                MemberConfig::new("gemini", "gemini").decorated("💎", "GREEN"),
            ],
            chairman: ChairmanConfig {
                role: "auto".to_string(),
            },
            settings: CouncilSettings {
                timeout_sec: Some(DEFAULT_TIMEOUT_SECS),
                exclude_chairman_from_members: true,
            },
        }
    }
}

/// Source of a normalized council configuration
pub trait ConfigLoader {
    fn load(&self, path: &Path) -> CouncilResult<CouncilConfig>;
}

/// Loads YAML or TOML council files, falling back to the built-in council
/// when the file is missing or declares no usable member.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileConfigLoader;

impl ConfigLoader for FileConfigLoader {
    fn load(&self, path: &Path) -> CouncilResult<CouncilConfig> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No council config, using built-in council");
                return Ok(CouncilConfig::default());
            }
            Err(e) => return Err(e.into()),
        };

        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let raw: RawConfigFile = if is_toml {
            toml::from_str(&content).map_err(|e| CouncilError::config(path, e.to_string()))?
        } else if content.trim().is_empty() {
            RawConfigFile::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| CouncilError::config(path, e.to_string()))?
        };

        match raw.council.and_then(RawCouncil::normalize) {
            Some(config) => Ok(config),
            None => {
                warn!(path = %path.display(), "Council config has no usable members, using built-in council");
                Ok(CouncilConfig::default())
            }
        }
    }
}

// ============================================================================
// Raw file shapes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawConfigFile {
    #[serde(default)]
    council: Option<RawCouncil>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCouncil {
    #[serde(default)]
    chairman: Option<RawChairman>,
    #[serde(default)]
    members: Vec<RawMember>,
    #[serde(default)]
    settings: Option<RawSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct RawChairman {
    role: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    name: Option<Scalar>,
    command: Option<String>,
    emoji: Option<String>,
    color: Option<String>,
    #[serde(default)]
    input: Option<PromptInput>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    exclude_chairman_from_members: Option<Scalar>,
    timeout: Option<Scalar>,
}

/// A scalar that may be written as bool, number, or string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn as_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            other => normalize_bool(&other.as_text()),
        }
    }

    /// Positive whole seconds; zero or negative means "no timeout"
    fn as_timeout_secs(&self) -> Option<u64> {
        let secs = match self {
            Self::Int(i) => *i as f64,
            Self::Float(f) => *f,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            Self::Bool(_) => return None,
        };
        (secs.is_finite() && secs > 0.0).then(|| secs.ceil() as u64)
    }
}

impl RawCouncil {
    fn normalize(self) -> Option<CouncilConfig> {
        let members: Vec<MemberConfig> = self
            .members
            .into_iter()
            .filter_map(|m| {
                let name = m.name.map(|n| n.as_text()).unwrap_or_default();
                let command = m.command.map(|c| c.trim().to_string()).unwrap_or_default();
                if name.is_empty() || command.is_empty() {
                    return None;
                }
                Some(MemberConfig {
                    name,
                    command,
                    emoji: m.emoji.filter(|e| !e.is_empty()),
                    color: m.color.filter(|c| !c.is_empty()),
                    input: m.input.unwrap_or_default(),
                })
            })
            .collect();
        if members.is_empty() {
            return None;
        }

        let role = self
            .chairman
            .and_then(|c| c.role.or(c.name))
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "auto".to_string());

        let settings = self.settings.unwrap_or_default();
        Some(CouncilConfig {
            members,
            chairman: ChairmanConfig { role },
            settings: CouncilSettings {
                timeout_sec: settings.timeout.as_ref().and_then(Scalar::as_timeout_secs),
                exclude_chairman_from_members: settings
                    .exclude_chairman_from_members
                    .as_ref()
                    .and_then(Scalar::as_bool)
                    .unwrap_or(true),
            },
        })
    }
}

// ============================================================================
// Resolution helpers
// ============================================================================

/// Lenient boolean parsing used for settings and environment values
pub fn normalize_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// `--config`, then `COUNCIL_CONFIG`, then `./council.config.yaml`, then
/// `council.config.yaml` next to the executable.
pub fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Some(path) = env_non_empty(ENV_CONFIG) {
        return PathBuf::from(path);
    }
    let cwd_candidate = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_candidate.exists() {
        return cwd_candidate;
    }
    if let Some(exe_candidate) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
    {
        if exe_candidate.exists() {
            return exe_candidate;
        }
    }
    cwd_candidate
}

/// `--jobs-dir`, then `COUNCIL_JOBS_DIR`, then `./.council/jobs`
pub fn resolve_jobs_dir(flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| env_non_empty(ENV_JOBS_DIR).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(".council").join("jobs"))
}

/// Role of the agent host invoking us: `claude`, `codex`, or `unknown`
pub fn detect_host_role() -> String {
    if let Some(role) = env_non_empty(ENV_HOST_ROLE) {
        return role.trim().to_lowercase();
    }
    std::env::current_exe()
        .map(|exe| host_role_from_path(&exe))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Infer the host from an install path under `~/.claude/` or `~/.codex/`
pub fn host_role_from_path(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    if normalized.contains("/.claude/") {
        "claude".to_string()
    } else if normalized.contains("/.codex/") {
        "codex".to_string()
    } else {
        "unknown".to_string()
    }
}

/// Resolve `auto` (or empty) to the host's own role, defaulting to `claude`
pub fn resolve_chairman_role(raw: &str, host_role: &str) -> String {
    let role = raw.trim().to_lowercase();
    if !role.is_empty() && role != "auto" {
        return role;
    }
    match host_role {
        "codex" => "codex".to_string(),
        _ => "claude".to_string(),
    }
}

/// Chairman request before `auto` resolution: flag, env, then config
pub fn requested_chairman(flag: Option<&str>, config: &CouncilConfig) -> String {
    flag.map(str::to_string)
        .or_else(|| env_non_empty(ENV_CHAIRMAN))
        .unwrap_or_else(|| config.chairman.role.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE_YAML: &str = r#"
council:
  chairman:
    role: codex
  members:
    - name: claude
      command: claude -p
      emoji: "🧠"
      color: CYAN
    - name: gemini
      command: gemini
      input: stdin
    - name: broken
  settings:
    exclude_chairman_from_members: "yes"
    timeout: "90"
"#;

    #[test]
    fn test_load_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("council.config.yaml");
        std::fs::write(&path, SAMPLE_YAML).unwrap();

        let config = FileConfigLoader.load(&path).unwrap();
        assert_eq!(config.members.len(), 2);
        assert_eq!(config.members[0].name, "claude");
        assert_eq!(config.members[0].emoji.as_deref(), Some("🧠"));
        assert_eq!(config.members[1].input, PromptInput::Stdin);
        assert_eq!(config.chairman.role, "codex");
        assert_eq!(config.settings.timeout_sec, Some(90));
        assert!(config.settings.exclude_chairman_from_members);
    }

    #[test]
    fn test_load_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("council.toml");
        std::fs::write(
            &path,
            r#"
[council.chairman]
name = "claude"

[[council.members]]
name = "codex"
command = "codex exec"

[council.settings]
exclude_chairman_from_members = false
timeout = 0
"#,
        )
        .unwrap();

        let config = FileConfigLoader.load(&path).unwrap();
        assert_eq!(config.members, vec![MemberConfig::new("codex", "codex exec")]);
        assert_eq!(config.chairman.role, "claude");
        assert_eq!(config.settings.timeout_sec, None);
        assert!(!config.settings.exclude_chairman_from_members);
    }

    #[test]
    fn test_missing_or_empty_falls_back() {
        let dir = tempdir().unwrap();
        let missing = FileConfigLoader
            .load(&dir.path().join("nope.yaml"))
            .unwrap();
        assert_eq!(missing, CouncilConfig::default());

        let path = dir.path().join("empty.yaml");
        std::fs::write(&path, "council:\n  members: []\n").unwrap();
        assert_eq!(FileConfigLoader.load(&path).unwrap(), CouncilConfig::default());
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "council: [unclosed").unwrap();
        let err = FileConfigLoader.load(&path).unwrap_err();
        assert!(matches!(err, CouncilError::Config { .. }));
    }

    #[test]
    fn test_default_council() {
        let config = CouncilConfig::default();
        let names: Vec<_> = config.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["claude", "codex", "gemini"]);
        assert_eq!(config.chairman.role, "auto");
        assert_eq!(config.settings.timeout_sec, Some(120));
    }

    #[test]
    fn test_resolve_chairman_role() {
        assert_eq!(resolve_chairman_role("auto", "codex"), "codex");
        assert_eq!(resolve_chairman_role("auto", "claude"), "claude");
        assert_eq!(resolve_chairman_role("", "unknown"), "claude");
        assert_eq!(resolve_chairman_role(" Gemini ", "codex"), "gemini");
    }

    #[test]
    fn test_host_role_from_path() {
        assert_eq!(
            host_role_from_path(Path::new("/home/u/.claude/skills/council/bin/council-job")),
            "claude"
        );
        assert_eq!(
            host_role_from_path(Path::new("/home/u/.codex/skills/council/council-job")),
            "codex"
        );
        assert_eq!(host_role_from_path(Path::new("/usr/local/bin/council-job")), "unknown");
    }

    #[test]
    fn test_normalize_bool() {
        assert_eq!(normalize_bool("ON"), Some(true));
        assert_eq!(normalize_bool(" n "), Some(false));
        assert_eq!(normalize_bool("maybe"), None);
    }
}
