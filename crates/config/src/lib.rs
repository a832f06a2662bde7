//! Configuration loading, validation, and management for Flint.
//!
//! Loads configuration from `~/.flint/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.flint/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model identifier used for token counting and completion
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum combined tokens of one assembled request
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Chunked embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    /// Similarity retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Live session lifecycle configuration
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Usage telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_token_budget() -> usize {
    4096
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Maximum characters per embedded chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Prefix framing stored passages
    #[serde(default = "default_passage_prefix")]
    pub passage_prefix: String,

    /// Prefix framing search queries
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,

    /// Base URL of the OpenAI-compatible embeddings API
    #[serde(default = "default_embeddings_url")]
    pub base_url: String,

    /// Embedding model name sent with each request
    #[serde(default = "default_embeddings_model")]
    pub model: String,

    /// Bearer token, if the endpoint needs one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_embeddings_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_chunk_size() -> usize {
    512
}
fn default_passage_prefix() -> String {
    "passage: ".into()
}
fn default_query_prefix() -> String {
    "query: ".into()
}
fn default_embeddings_url() -> String {
    "http://localhost:8080/v1".into()
}
fn default_embeddings_model() -> String {
    "intfloat/multilingual-e5-large".into()
}
fn default_embeddings_timeout_secs() -> u64 {
    30
}

impl EmbeddingsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            passage_prefix: default_passage_prefix(),
            query_prefix: default_query_prefix(),
            base_url: default_embeddings_url(),
            model: default_embeddings_model(),
            api_key: None,
            timeout_secs: default_embeddings_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum cosine distance (0 = identical, 2 = opposite) accepted as a match
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,

    /// Maximum matching chunks kept per search
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Upper bound on one retrieval, after which it counts as "no result"
    #[serde(default = "default_retrieval_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_distance_threshold() -> f32 {
    0.20
}
fn default_top_n() -> usize {
    3
}
fn default_retrieval_timeout_ms() -> u64 {
    3000
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            distance_threshold: default_distance_threshold(),
            top_n: default_top_n(),
            timeout_ms: default_retrieval_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Documents replayed into a session when it is rebuilt
    #[serde(default = "default_rehydrate_limit")]
    pub rehydrate_limit: usize,

    /// Users with a document inside this window are rebuilt on reset
    #[serde(default = "default_active_window_hours")]
    pub active_window_hours: u64,

    /// How often every session is discarded and rebuilt from storage
    #[serde(default = "default_reset_interval_minutes")]
    pub reset_interval_minutes: u64,
}

fn default_rehydrate_limit() -> usize {
    10
}
fn default_active_window_hours() -> u64 {
    24
}
fn default_reset_interval_minutes() -> u64 {
    1439
}

impl SessionsConfig {
    pub fn active_window(&self) -> Duration {
        Duration::from_secs(self.active_window_hours * 3600)
    }

    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval_minutes * 60)
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            rehydrate_limit: default_rehydrate_limit(),
            active_window_hours: default_active_window_hours(),
            reset_interval_minutes: default_reset_interval_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether usage events are collected and uploaded
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Collection endpoint receiving JSON batches
    #[serde(default = "default_telemetry_server")]
    pub server_url: String,

    /// How often the accumulated batch is uploaded
    #[serde(default = "default_upload_interval_minutes")]
    pub upload_interval_minutes: u64,

    /// Client surface reported with every event
    #[serde(default = "default_client_os")]
    pub client_os: String,
}

fn default_telemetry_server() -> String {
    "https://telemetry.flint.chat/v1/telemetry".into()
}
fn default_upload_interval_minutes() -> u64 {
    11
}
fn default_client_os() -> String {
    "whatsapp".into()
}

impl TelemetryConfig {
    pub fn upload_interval(&self) -> Duration {
        Duration::from_secs(self.upload_interval_minutes * 60)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_url: default_telemetry_server(),
            upload_interval_minutes: default_upload_interval_minutes(),
            client_os: default_client_os(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.flint/config.toml).
    ///
    /// Environment variables override the file:
    /// - `FLINT_MODEL`
    /// - `FLINT_TOKEN_BUDGET`
    /// - `FLINT_TELEMETRY_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from a variable lookup (the process environment in
    /// [`load`](Self::load)).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("FLINT_MODEL") {
            self.model = model;
        }

        if let Some(budget) = lookup("FLINT_TOKEN_BUDGET") {
            self.token_budget = budget.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "FLINT_TOKEN_BUDGET must be a positive integer, got '{budget}'"
                ))
            })?;
        }

        if let Some(url) = lookup("FLINT_TELEMETRY_URL") {
            self.telemetry.server_url = url;
        }

        if let Some(url) = lookup("FLINT_EMBEDDINGS_URL") {
            self.embeddings.base_url = url;
        }

        if let Some(key) = lookup("FLINT_EMBEDDINGS_API_KEY") {
            self.embeddings.api_key = Some(key);
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".flint")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "token_budget must be greater than 0".into(),
            ));
        }

        if self.embeddings.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "embeddings.chunk_size must be greater than 0".into(),
            ));
        }

        if self.embeddings.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "embeddings.base_url must not be empty".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.retrieval.distance_threshold) {
            return Err(ConfigError::ValidationError(
                "retrieval.distance_threshold must be between 0.0 and 2.0".into(),
            ));
        }

        if self.sessions.reset_interval_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "sessions.reset_interval_minutes must be greater than 0".into(),
            ));
        }

        if self.telemetry.enabled && self.telemetry.upload_interval_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "telemetry.upload_interval_minutes must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            token_budget: default_token_budget(),
            embeddings: EmbeddingsConfig::default(),
            retrieval: RetrievalConfig::default(),
            sessions: SessionsConfig::default(),
            telemetry: TelemetryConfig::default(),
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
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.token_budget, 4096);
        assert_eq!(config.embeddings.chunk_size, 512);
        assert_eq!(config.retrieval.top_n, 3);
        assert!((config.retrieval.distance_threshold - 0.20).abs() < f32::EPSILON);
        assert_eq!(config.sessions.rehydrate_limit, 10);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.embeddings.query_prefix, "query: ");
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().model, "gpt-3.5-turbo");
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
model = "gpt-4"
token_budget = 2048

[retrieval]
top_n = 5
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.token_budget, 2048);
        assert_eq!(config.retrieval.top_n, 5);
        assert_eq!(config.retrieval.timeout(), Duration::from_secs(3));
        assert_eq!(config.sessions.reset_interval(), Duration::from_secs(1439 * 60));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "token_budget = \"lots\"").unwrap();

        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.distance_threshold = 2.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_budget_rejected() {
        let config = AppConfig {
            token_budget: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("FLINT_MODEL", "gpt-4o"),
            ("FLINT_TOKEN_BUDGET", " 8192 "),
            ("FLINT_TELEMETRY_URL", "http://localhost:9000/t"),
            ("FLINT_EMBEDDINGS_URL", "https://api.openai.com/v1"),
            ("FLINT_EMBEDDINGS_API_KEY", "sk-test"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.token_budget, 8192);
        assert_eq!(config.telemetry.server_url, "http://localhost:9000/t");
        assert_eq!(config.embeddings.base_url, "https://api.openai.com/v1");
        assert_eq!(config.embeddings.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn invalid_budget_override_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "FLINT_TOKEN_BUDGET").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("FLINT_TOKEN_BUDGET"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-3.5-turbo"));
        assert!(toml_str.contains("[retrieval]"));
    }
}
