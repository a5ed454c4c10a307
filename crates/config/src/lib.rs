//! Configuration loading, validation, and management for codeloop.
//!
//! Loads configuration from `~/.codeloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use codeloop_core::tool::ToolErrorPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.codeloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Query loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Context collection settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Session recording settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("context", &self.context)
            .field("session", &self.session)
            .field("tools", &self.tools)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Stream model output (and echo it) instead of waiting for the full text
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Per-tool execution timeout
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,

    /// Maximum model rounds per query; 0 = unbounded
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Whether tool execution errors abort the run or go back to the model
    #[serde(default)]
    pub tool_errors: ToolErrorPolicy,

    /// Extra behavioral instructions appended to the built-in ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instructions: Vec<String>,
}

fn default_tool_timeout_ms() -> u64 {
    60_000
}
fn default_max_rounds() -> u32 {
    25
}

impl AgentConfig {
    /// The round cap as the query loop expects it.
    pub fn max_rounds(&self) -> Option<u32> {
        (self.max_rounds > 0).then_some(self.max_rounds)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            stream: true,
            tool_timeout_ms: default_tool_timeout_ms(),
            max_rounds: default_max_rounds(),
            tool_errors: ToolErrorPolicy::default(),
            instructions: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_true")]
    pub git: bool,

    #[serde(default = "default_true")]
    pub directory: bool,

    /// README.md / AGENTS.md / CONTRIBUTING.md
    #[serde(default = "default_true")]
    pub project_files: bool,

    /// Resolve `@path` mentions in the prompt to file contents
    #[serde(default = "default_true")]
    pub file_mentions: bool,

    #[serde(default = "default_max_directory_entries")]
    pub max_directory_entries: usize,

    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
}

fn default_max_directory_entries() -> usize {
    200
}
fn default_max_file_bytes() -> usize {
    64 * 1024
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            git: true,
            directory: true,
            project_files: true,
            file_mentions: true,
            max_directory_entries: default_max_directory_entries(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Where session logs go (default: ~/.codeloop/sessions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl SessionConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("sessions"))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Register the bash tool
    #[serde(default = "default_true")]
    pub shell: bool,

    /// If non-empty, only these base commands may run
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    /// Keep file tools inside the working directory
    #[serde(default = "default_true")]
    pub workspace_only: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell: true,
            allowed_commands: vec![],
            workspace_only: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.codeloop/config.toml).
    ///
    /// Also checks environment variables:
    /// - `CODELOOP_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `CODELOOP_MODEL`
    /// - `CODELOOP_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("CODELOOP_API_KEY").or_else(|| {
            if self.api_key.is_none() {
                lookup("OPENAI_API_KEY")
            } else {
                None
            }
        }) {
            self.api_key = Some(key);
        }

        if let Some(model) = lookup("CODELOOP_MODEL") {
            self.model = model;
        }

        if let Some(url) = lookup("CODELOOP_BASE_URL") {
            self.base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".codeloop")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.tool_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "agent.tool_timeout_ms must be > 0".into(),
            ));
        }

        if self.context.max_directory_entries == 0 {
            return Err(ConfigError::ValidationError(
                "context.max_directory_entries must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            context: ContextConfig::default(),
            session: SessionConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.tool_timeout_ms, 60_000);
        assert_eq!(config.agent.max_rounds(), Some(25));
        assert_eq!(config.agent.tool_errors, ToolErrorPolicy::Propagate);
        assert!(config.tools.workspace_only);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.agent.tool_timeout_ms, config.agent.tool_timeout_ms);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_tool_timeout_rejected() {
        let mut config = AppConfig::default();
        config.agent.tool_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn zero_max_rounds_means_unbounded() {
        let config: AppConfig = toml::from_str("[agent]\nmax_rounds = 0\n").unwrap();
        assert_eq!(config.agent.max_rounds(), None);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().model, "gpt-4o");
    }

    #[test]
    fn load_from_file_reads_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
model = "local-coder"

[agent]
stream = false
tool_errors = "report"
instructions = ["Prefer small diffs."]

[tools]
allowed_commands = ["ls", "git"]
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "local-coder");
        assert!(!config.agent.stream);
        assert_eq!(config.agent.tool_errors, ToolErrorPolicy::Report);
        assert_eq!(config.agent.instructions, vec!["Prefer small diffs."]);
        assert_eq!(config.tools.allowed_commands, vec!["ls", "git"]);
        assert!(config.context.git);
    }

    #[test]
    fn unparseable_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_take_priority() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CODELOOP_API_KEY", "sk-codeloop"),
            ("OPENAI_API_KEY", "sk-openai"),
            ("CODELOOP_MODEL", "gpt-4o-mini"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-codeloop"));
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.base_url, default_base_url());
    }

    #[test]
    fn openai_key_does_not_replace_configured_key() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(|k| (k == "OPENAI_API_KEY").then(|| "sk-openai".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o"));
        assert!(toml_str.contains("tool_timeout_ms"));
    }
}
