use super::{AppConfig, ConfigError};
use crate::modes::OptimizeMode;

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_streaming(config)?;
    validate_log_level(config)?;
    validate_image_limit(config)?;
    validate_prompt_templates(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.max_request_body_bytes == 0 {
        return Err(validation_err(
            "server.max_request_body_bytes must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    if let Some(max_blocking_threads) = server.runtime_max_blocking_threads {
        if max_blocking_threads == 0 {
            return Err(validation_err(
                "server.runtime_max_blocking_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    if !upstream.base_url.starts_with("http://") && !upstream.base_url.starts_with("https://") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    if upstream.model.trim().is_empty() {
        return Err(validation_err("upstream.model cannot be empty"));
    }
    if upstream.api_key.trim().is_empty() && upstream.api_key_env.trim().is_empty() {
        return Err(validation_err(
            "either upstream.api_key or upstream.api_key_env must be set",
        ));
    }
    if !(0.0..=2.0).contains(&upstream.temperature) {
        return Err(validation_err(
            "upstream.temperature must be between 0.0 and 2.0",
        ));
    }
    if !(0.0..=1.0).contains(&upstream.top_p) {
        return Err(validation_err("upstream.top_p must be between 0.0 and 1.0"));
    }
    if upstream.max_output_tokens == 0 {
        return Err(validation_err(
            "upstream.max_output_tokens must be greater than 0",
        ));
    }
    if let Some(proxy) = upstream.proxy.as_deref() {
        let proxy = proxy.trim();
        if proxy.is_empty() {
            return Err(validation_err("upstream.proxy cannot be empty when set"));
        }
        if !proxy.starts_with("http://") && !proxy.starts_with("https://") {
            return Err(validation_err(
                "upstream.proxy must start with http:// or https://",
            ));
        }
    }
    Ok(())
}

fn validate_streaming(config: &AppConfig) -> Result<(), ConfigError> {
    let streaming = &config.streaming;
    if streaming.idle_timeout_secs == 0 {
        return Err(validation_err(
            "streaming.idle_timeout_secs must be greater than 0",
        ));
    }
    if streaming.total_timeout_secs < streaming.idle_timeout_secs {
        return Err(validation_err(
            "streaming.total_timeout_secs must be at least streaming.idle_timeout_secs",
        ));
    }
    // The HTTP client timeout also bounds streamed bodies.
    if config.server.timeout < streaming.total_timeout_secs {
        return Err(validation_err(
            "server.timeout must be at least streaming.total_timeout_secs",
        ));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED", "TRACE",
];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is invalid. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

fn validate_image_limit(config: &AppConfig) -> Result<(), ConfigError> {
    let max_image_bytes = config.features.max_image_bytes;
    if max_image_bytes == 0 {
        return Err(validation_err(
            "features.max_image_bytes must be greater than 0",
        ));
    }
    if max_image_bytes > config.server.max_request_body_bytes {
        return Err(validation_err(
            "features.max_image_bytes cannot exceed server.max_request_body_bytes",
        ));
    }
    Ok(())
}

fn validate_prompt_templates(config: &AppConfig) -> Result<(), ConfigError> {
    for (mode_name, template) in &config.features.prompt_templates {
        if OptimizeMode::from_name(mode_name).is_none() {
            return Err(validation_err(format!(
                "features.prompt_templates: unknown mode '{mode_name}'"
            )));
        }
        if !template.contains("{prompt}") {
            return Err(validation_err(format!(
                "features.prompt_templates.{mode_name} must contain {{prompt}} placeholder"
            )));
        }
    }
    Ok(())
}
