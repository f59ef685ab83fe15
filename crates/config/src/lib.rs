//! Configuration loading, validation, and management for QuillClaw.
//!
//! Loads configuration from `~/.quillclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.quillclaw/config.toml`. Every section is optional;
/// missing values fall back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Thought memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Structured-data rendering limits
    #[serde(default)]
    pub serializer: SerializerConfig,

    /// Execution loop configuration
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Prompt assembly configuration
    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum thought records kept per agent
    #[serde(default = "default_memory_capacity")]
    pub capacity: usize,

    /// Most recent records rendered without abridging
    #[serde(default = "default_full_detail")]
    pub full_detail: usize,

    /// Keys enumerated for older composite content
    #[serde(default = "default_summary_keys")]
    pub summary_keys: usize,

    /// Characters kept for older free-text values
    #[serde(default = "default_summary_text_chars")]
    pub summary_text_chars: usize,

    /// Elements kept for older list values
    #[serde(default = "default_summary_list_items")]
    pub summary_list_items: usize,
}

fn default_memory_capacity() -> usize {
    10
}
fn default_full_detail() -> usize {
    3
}
fn default_summary_keys() -> usize {
    3
}
fn default_summary_text_chars() -> usize {
    100
}
fn default_summary_list_items() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_memory_capacity(),
            full_detail: default_full_detail(),
            summary_keys: default_summary_keys(),
            summary_text_chars: default_summary_text_chars(),
            summary_list_items: default_summary_list_items(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializerConfig {
    /// Nesting depth beyond which rendering stops
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Array elements rendered before the remainder marker
    #[serde(default = "default_max_array_items")]
    pub max_array_items: usize,
}

fn default_max_depth() -> usize {
    15
}
fn default_max_array_items() -> usize {
    100
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_array_items: default_max_array_items(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Hard cap on iterations per run (across resumes)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Consecutive unparsable plans tolerated before the run fails
    #[serde(default = "default_max_plan_failures")]
    pub max_consecutive_plan_failures: u32,

    /// Tool name that records a thought into agent memory
    #[serde(default = "default_record_thought_tool")]
    pub record_thought_tool: String,

    /// Tool name that suspends the run with a question for the user
    #[serde(default = "default_ask_user_tool")]
    pub ask_user_tool: String,

    /// Tool name that completes the run
    #[serde(default = "default_finish_tool")]
    pub finish_tool: String,

    /// Tools whose results are summarized instead of rendered in full
    #[serde(default = "default_condensed_tools")]
    pub condensed_result_tools: Vec<String>,
}

fn default_max_iterations() -> u32 {
    50
}
fn default_max_plan_failures() -> u32 {
    3
}
fn default_record_thought_tool() -> String {
    "record_thought".into()
}
fn default_ask_user_tool() -> String {
    "ask_user".into()
}
fn default_finish_tool() -> String {
    "finish".into()
}
fn default_condensed_tools() -> Vec<String> {
    vec![
        "apply_edits".into(),
        "insert_content".into(),
        "replace_content".into(),
        "delete_content".into(),
    ]
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_consecutive_plan_failures: default_max_plan_failures(),
            record_thought_tool: default_record_thought_tool(),
            ask_user_tool: default_ask_user_tool(),
            finish_tool: default_finish_tool(),
            condensed_result_tools: default_condensed_tools(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Extra lines appended to the tool-use guidance section
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_guidance: Vec<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.quillclaw/config.toml),
    /// then apply environment overrides:
    /// - `QUILLCLAW_MAX_ITERATIONS`
    /// - `QUILLCLAW_MAX_PLAN_FAILURES`
    /// - `QUILLCLAW_MAX_DEPTH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the environment, in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("QUILLCLAW_MAX_ITERATIONS") {
            self.execution.max_iterations = parse_override("QUILLCLAW_MAX_ITERATIONS", &raw)?;
        }
        if let Some(raw) = lookup("QUILLCLAW_MAX_PLAN_FAILURES") {
            self.execution.max_consecutive_plan_failures =
                parse_override("QUILLCLAW_MAX_PLAN_FAILURES", &raw)?;
        }
        if let Some(raw) = lookup("QUILLCLAW_MAX_DEPTH") {
            self.serializer.max_depth = parse_override("QUILLCLAW_MAX_DEPTH", &raw)?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "memory.capacity must be at least 1".into(),
            ));
        }
        if self.memory.full_detail > self.memory.capacity {
            return Err(ConfigError::ValidationError(
                "memory.full_detail cannot exceed memory.capacity".into(),
            ));
        }
        if self.serializer.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "serializer.max_depth must be at least 1".into(),
            ));
        }
        if self.execution.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "execution.max_iterations must be at least 1".into(),
            ));
        }
        if self.execution.max_consecutive_plan_failures == 0 {
            return Err(ConfigError::ValidationError(
                "execution.max_consecutive_plan_failures must be at least 1".into(),
            ));
        }

        let designated = [
            &self.execution.record_thought_tool,
            &self.execution.ask_user_tool,
            &self.execution.finish_tool,
        ];
        if designated.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "designated tool names must not be empty".into(),
            ));
        }
        if designated[0] == designated[1]
            || designated[0] == designated[2]
            || designated[1] == designated[2]
        {
            return Err(ConfigError::ValidationError(
                "record_thought_tool, ask_user_tool and finish_tool must be distinct".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".quillclaw")
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| {
            ConfigError::ValidationError(format!("{key} must be a positive integer, got '{raw}'"))
        })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
