//! Configuration loading, validation, and management for tenax.
//!
//! Loads configuration from `~/.tenax/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! The environment variables mirror the deployment contract: `AWS_REGION`,
//! `MODEL_ID`, `FALLBACK_MODEL_ID`, `BEDROCK_API_KEY`, `TAVILY_API_KEY`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.tenax/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bedrock API key (bearer token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Region the model endpoint lives in
    #[serde(default = "default_region")]
    pub region: String,

    /// Primary model
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Fallback model, used when the primary fails
    #[serde(default = "default_fallback_model_id")]
    pub fallback_model_id: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Retry and backoff settings for the primary model
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP entrypoint settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Web search settings
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_region() -> String {
    "us-east-2".into()
}
fn default_model_id() -> String {
    "global.anthropic.claude-haiku-4-5-20251001-v1:0".into()
}
fn default_fallback_model_id() -> String {
    "global.anthropic.claude-sonnet-4-5-20250929-v1:0".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

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
            .field("region", &self.region)
            .field("model_id", &self.model_id)
            .field("fallback_model_id", &self.fallback_model_id)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("retry", &self.retry)
            .field("server", &self.server)
            .field("search", &self.search)
            .finish()
    }
}

/// Retry and backoff settings for the primary model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total primary attempts per call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait before the first retry, in seconds
    #[serde(default = "default_min_wait_secs")]
    pub min_wait_secs: f64,

    /// Cap on the exponentially growing wait, in seconds
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_min_wait_secs() -> f64 {
    1.0
}
fn default_max_wait_secs() -> f64 {
    10.0
}

impl RetryConfig {
    pub fn min_wait(&self) -> Duration {
        Duration::from_secs_f64(self.min_wait_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs_f64(self.max_wait_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_wait_secs: default_min_wait_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

/// HTTP entrypoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Web search settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Tavily API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Results per search
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    3
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("max_results", &self.max_results)
            .finish()
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            max_results: default_max_results(),
        }
    }
}

impl SearchConfig {
    /// Resolve the search API key: `TAVILY_API_KEY` env var first, then the
    /// config file. Absence is a warning, not a startup failure: the agent
    /// runs, and web search fails at runtime instead.
    pub fn resolve_api_key(&self) -> Option<String> {
        let key = std::env::var("TAVILY_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone());

        if key.is_none() {
            tracing::warn!(
                "TAVILY_API_KEY not found in environment or config. Web search will fail at runtime."
            );
        }
        key
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tenax/config.toml),
    /// then apply environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(region) = std::env::var("AWS_REGION") {
            config.region = region;
        }
        if let Ok(model) = std::env::var("MODEL_ID") {
            config.model_id = model;
        }
        if let Ok(model) = std::env::var("FALLBACK_MODEL_ID") {
            config.fallback_model_id = model;
        }
        if config.api_key.is_none() {
            config.api_key = std::env::var("BEDROCK_API_KEY")
                .ok()
                .or_else(|| std::env::var("AWS_BEARER_TOKEN_BEDROCK").ok());
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
        dirs_home().join(".tenax")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retry.max_attempts < 1 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.retry.min_wait_secs <= 0.0 || self.retry.min_wait_secs > self.retry.max_wait_secs {
            return Err(ConfigError::ValidationError(
                "retry waits must satisfy 0 < min_wait_secs <= max_wait_secs".into(),
            ));
        }

        Ok(())
    }

    /// Check if a Bedrock API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            region: default_region(),
            model_id: default_model_id(),
            fallback_model_id: default_fallback_model_id(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            retry: RetryConfig::default(),
            server: ServerConfig::default(),
            search: SearchConfig::default(),
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
