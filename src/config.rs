use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Base URL; requests go to `{api_base}/v1/messages`.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
    /// Value of the `anthropic-beta` header. Empty disables the header.
    #[serde(default = "default_beta")]
    pub beta: String,
    #[serde(default = "default_tool_type")]
    pub tool_type: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Send accumulated turn history with every request.
    #[serde(default = "default_true")]
    pub multi_turn: bool,
    /// Optional API key stored in config.toml (env DESKPILOT_API_KEY / ANTHROPIC_API_KEY win).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            anthropic_version: default_anthropic_version(),
            beta: default_beta(),
            tool_type: default_tool_type(),
            timeout_secs: default_timeout_secs(),
            multi_turn: true,
            api_key: None,
        }
    }
}

impl DecisionConfig {
    pub fn resolve_api_key(&self) -> String {
        std::env::var("DESKPILOT_API_KEY")
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
            .unwrap_or_else(|_| self.api_key.clone().unwrap_or_default())
    }
}

fn default_api_base() -> String {
    "https://api.anthropic.com".into()
}

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".into()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_anthropic_version() -> String {
    "2023-06-01".into()
}

fn default_beta() -> String {
    "computer-use-2024-10-22".into()
}

fn default_tool_type() -> String {
    "computer_20241022".into()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Retry and loop-limit policy for a run. Zero means "unlimited" for the limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub max_transport_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_capture_retries")]
    pub capture_retries: u32,
    #[serde(default)]
    pub max_iterations: u32,
    #[serde(default)]
    pub max_duration_minutes: u32,
    #[serde(default)]
    pub max_consecutive_failures: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_transport_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            capture_retries: default_capture_retries(),
            max_iterations: 0,
            max_duration_minutes: 0,
            max_consecutive_failures: 0,
        }
    }
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_capture_retries() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaptureConfig {
    /// Write a full-resolution PNG when a run starts.
    #[serde(default)]
    pub archive_on_start: bool,
    /// Target directory for the archived PNG; empty means the desktop directory.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
}

impl CaptureConfig {
    /// Explicit archive directory. `archive_dir = ""` counts as unset.
    pub fn configured_archive_dir(&self) -> Option<&Path> {
        self.archive_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SafetyConfig {
    /// Action names (e.g. "left_click", "type") that wait for operator
    /// approval while a run is human-supervised.
    #[serde(default)]
    pub require_approval_for: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryConfig {
    /// Append every turn record to a JSONL session file.
    #[serde(default)]
    pub persist: bool,
}

fn default_true() -> bool {
    true
}

fn resolve_config_path() -> DeskPilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(DeskPilotError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> DeskPilotResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> DeskPilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        model = %config.decision.model,
        multi_turn = config.decision.multi_turn,
        "config loaded"
    );
    Ok(config)
}
