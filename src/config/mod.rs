pub mod validation;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;
use crate::error::RelayError;
use crate::protocol::canonical::OutputLanguage;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_max_blocking_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub http_use_env_proxy: bool,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}
fn default_max_request_body_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize)]
struct ServerConfigWire {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    http_pool_idle_timeout_secs: u64,
    #[serde(default = "default_max_request_body_bytes")]
    max_request_body_bytes: usize,
    #[serde(default)]
    runtime_worker_threads: Option<RuntimeThreadsSetting>,
    #[serde(default)]
    runtime_max_blocking_threads: Option<RuntimeThreadsSetting>,
    #[serde(default)]
    base_path: String,
    #[serde(default)]
    http_use_env_proxy: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuntimeThreadsSetting {
    Fixed(usize),
    Auto(()),
}

fn runtime_threads_or_default(
    setting: Option<&RuntimeThreadsSetting>,
    default: Option<usize>,
) -> Option<usize> {
    match setting {
        None => default,
        Some(RuntimeThreadsSetting::Fixed(threads)) => Some(*threads),
        Some(RuntimeThreadsSetting::Auto(())) => None,
    }
}

impl<'de> Deserialize<'de> for ServerConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = ServerConfigWire::deserialize(deserializer)?;
        Ok(Self {
            port: wire.port,
            host: wire.host,
            timeout: wire.timeout,
            http_pool_max_idle_per_host: wire.http_pool_max_idle_per_host,
            http_pool_idle_timeout_secs: wire.http_pool_idle_timeout_secs,
            max_request_body_bytes: wire.max_request_body_bytes,
            // missing => Some(default), explicit null => None
            runtime_worker_threads: runtime_threads_or_default(
                wire.runtime_worker_threads.as_ref(),
                None,
            ),
            runtime_max_blocking_threads: runtime_threads_or_default(
                wire.runtime_max_blocking_threads.as_ref(),
                Some(8),
            ),
            base_path: wire.base_path,
            http_use_env_proxy: wire.http_use_env_proxy,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            max_request_body_bytes: default_max_request_body_bytes(),
            runtime_worker_threads: None,
            runtime_max_blocking_threads: Some(8),
            base_path: String::new(),
            http_use_env_proxy: false,
        }
    }
}

/// Upstream API dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenAi,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

/// Streaming wire format requested from a Gemini upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    /// Use the mode's default shape.
    #[default]
    Auto,
    Array,
    Sse,
}

/// Upstream service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Literal key; when empty the key is read from `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub stream_format: StreamFormat,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_base_url() -> String {
    "https://aihubmix.com/gemini/v1beta".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_api_key_env() -> String {
    "AIHUBMIX_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_k() -> u32 {
    40
}
fn default_top_p() -> f32 {
    0.8
}
fn default_max_output_tokens() -> u32 {
    2048
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: String::new(),
            api_key_env: default_api_key_env(),
            stream_format: StreamFormat::default(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
            proxy: None,
        }
    }
}

impl UpstreamConfig {
    /// Resolve the upstream credential for one request.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when neither `api_key` nor the
    /// environment variable named by `api_key_env` provides a key.
    pub fn resolve_api_key(&self) -> Result<String, RelayError> {
        if !self.api_key.trim().is_empty() {
            return Ok(self.api_key.trim().to_string());
        }
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(RelayError::Config(format!(
                "upstream API key is not configured (set upstream.api_key or the {} environment variable)",
                self.api_key_env
            ))),
        }
    }
}

/// Timeouts applied while relaying an upstream stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_total_timeout_secs")]
    pub total_timeout_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    30
}
fn default_total_timeout_secs() -> u64 {
    120
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            total_timeout_secs: default_total_timeout_secs(),
        }
    }
}

impl StreamingConfig {
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    #[must_use]
    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub default_language: OutputLanguage,
    #[serde(default = "default_true")]
    pub language_post_filter: bool,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    /// Per-mode instruction template overrides, keyed by mode name.
    #[serde(default)]
    pub prompt_templates: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_max_image_bytes() -> usize {
    4 * 1024 * 1024
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            default_language: OutputLanguage::default(),
            language_post_filter: true,
            max_image_bytes: default_max_image_bytes(),
            prompt_templates: BTreeMap::new(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.upstream.provider, ProviderKind::Gemini);
        assert_eq!(config.upstream.api_key_env, "AIHUBMIX_API_KEY");
        assert_eq!(config.streaming.idle_timeout_secs, 30);
        assert_eq!(config.features.max_image_bytes, 4 * 1024 * 1024);
        assert!(config.features.language_post_filter);
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("upstream:\n  provider: openai\n").unwrap();
        assert_eq!(config.upstream.provider, ProviderKind::OpenAi);
        assert_eq!(config.upstream.model, "gemini-2.5-flash");
        assert_eq!(config.upstream.stream_format, StreamFormat::Auto);
        assert_eq!(config.features.default_language, OutputLanguage::En);
        assert_eq!(config.server.runtime_max_blocking_threads, Some(8));
    }

    #[test]
    fn test_explicit_null_runtime_threads_means_auto() {
        let config: AppConfig =
            serde_yaml::from_str("server:\n  runtime_max_blocking_threads: null\n").unwrap();
        assert_eq!(config.server.runtime_max_blocking_threads, None);
    }

    #[test]
    fn test_literal_api_key_wins_over_env() {
        let upstream = UpstreamConfig {
            api_key: " sk-literal ".to_string(),
            api_key_env: "PROMPT_RELAY_TEST_KEY_UNSET_A".to_string(),
            ..UpstreamConfig::default()
        };
        assert_eq!(upstream.resolve_api_key().unwrap(), "sk-literal");
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let upstream = UpstreamConfig {
            api_key: String::new(),
            api_key_env: "PROMPT_RELAY_TEST_KEY_UNSET_B".to_string(),
            ..UpstreamConfig::default()
        };
        let err = upstream.resolve_api_key().unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
        assert!(err.to_string().contains("PROMPT_RELAY_TEST_KEY_UNSET_B"));
    }

    #[test]
    fn test_api_key_is_never_serialized() {
        let upstream = UpstreamConfig {
            api_key: "sk-secret".to_string(),
            ..UpstreamConfig::default()
        };
        let json = serde_json::to_string(&upstream).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
