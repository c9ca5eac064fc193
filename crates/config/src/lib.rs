//! Configuration loading, validation, and management for deskhand.
//!
//! Loads configuration from `~/.deskhand/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.deskhand/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model backend settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Multi-turn elicitation settings
    #[serde(default)]
    pub elicitation: ElicitationConfig,

    /// Retry/validate/correct engine settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Interaction history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Document-summary pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Model backend settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key; `DESKHAND_API_KEY` / `OPENAI_API_KEY` override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used by the primary producer
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used by the checker (validator) producer.
    /// Typically cheaper or stricter than the primary.
    #[serde(default = "default_checker_model")]
    pub checker_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Multi-turn elicitation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitationConfig {
    /// Maximum back-and-forth turns before finalization is forced
    #[serde(default = "default_turn_budget")]
    pub turn_budget: u32,

    /// Remaining-turn threshold at which the "prefer closing" hint is armed
    #[serde(default = "default_accelerate_threshold")]
    pub accelerate_threshold: u32,
}

/// Retry engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum produce attempts per engine invocation
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Interaction history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Path of the append-only JSONL event stream.
    /// `None` keeps history in memory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

/// Document-summary pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum items fetched by the collect stage
    #[serde(default = "default_collect_limit")]
    pub collect_limit: usize,

    /// Collect-stage lookback window in days
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    /// Parent page id for published artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_parent_id: Option<String>,

    /// JSONL file the collect stage reads items from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,

    /// Directory published pages are written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_dir: Option<PathBuf>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_checker_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_turn_budget() -> u32 {
    15
}
fn default_accelerate_threshold() -> u32 {
    2
}
fn default_max_attempts() -> u32 {
    5
}
fn default_collect_limit() -> usize {
    50
}
fn default_lookback_days() -> i64 {
    7
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("checker_model", &self.checker_model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("elicitation", &self.elicitation)
            .field("retry", &self.retry)
            .field("history", &self.history)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.deskhand/config.toml).
    ///
    /// Environment variable overrides (highest priority):
    /// - `DESKHAND_API_KEY`, then `OPENAI_API_KEY` for the API key
    /// - `DESKHAND_MODEL` for the primary model
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.provider.api_key.is_none() {
            config.provider.api_key = std::env::var("DESKHAND_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("DESKHAND_MODEL") {
            config.provider.model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".deskhand")
    }

    /// Default path of the durable interaction log.
    pub fn default_log_path() -> PathBuf {
        Self::config_dir().join("history").join("events.jsonl")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.elicitation.turn_budget == 0 {
            return Err(ConfigError::ValidationError(
                "elicitation.turn_budget must be at least 1".into(),
            ));
        }

        if self.elicitation.accelerate_threshold >= self.elicitation.turn_budget {
            return Err(ConfigError::ValidationError(
                "elicitation.accelerate_threshold must be below turn_budget".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            elicitation: ElicitationConfig::default(),
            retry: RetryConfig::default(),
            history: HistoryConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            checker_model: default_checker_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ElicitationConfig {
    fn default() -> Self {
        Self {
            turn_budget: default_turn_budget(),
            accelerate_threshold: default_accelerate_threshold(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { log_path: None }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collect_limit: default_collect_limit(),
            lookback_days: default_lookback_days(),
            publish_parent_id: None,
            source_path: None,
            pages_dir: None,
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
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.elicitation.turn_budget, 15);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let back: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.provider.model, config.provider.model);
        assert_eq!(back.pipeline.collect_limit, config.pipeline.collect_limit);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = AppConfig::load_from(Path::new("/tmp/deskhand_no_such_config.toml")).unwrap();
        assert_eq!(config.provider.base_url, default_base_url());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[elicitation]\nturn_budget = 3").unwrap();

        let config = AppConfig::load_from(tmp.path()).unwrap();
        assert_eq!(config.elicitation.turn_budget, 3);
        // Everything else defaulted
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[retry]\nmax_attempts = 0").unwrap();

        let err = AppConfig::load_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn rejects_threshold_at_or_above_budget() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[elicitation]\nturn_budget = 2\naccelerate_threshold = 2").unwrap();

        assert!(AppConfig::load_from(tmp.path()).is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
