use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::modes::MODES;
use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    let modes: Vec<&str> = MODES.iter().map(|descriptor| descriptor.route_slug).collect();
    Json(json!({
        "status": "prompt-relay is running",
        "config": {
            "provider": config.upstream.provider,
            "model": config.upstream.model,
            "modes": modes,
            "streaming": {
                "idle_timeout_secs": config.streaming.idle_timeout_secs,
                "total_timeout_secs": config.streaming.total_timeout_secs,
            },
            "features": {
                "log_level": config.features.log_level,
                "default_language": config.features.default_language,
                "language_post_filter": config.features.language_post_filter,
                "max_image_bytes": config.features.max_image_bytes,
            }
        }
    }))
}

/// `GET /api/check-config`: reports whether a credential is available
/// without revealing any part of it.
pub fn check_config_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let upstream = &state.config.upstream;
    let (has_api_key, key_source) = if !upstream.api_key.trim().is_empty() {
        (true, "config")
    } else if upstream.resolve_api_key().is_ok() {
        (true, "env")
    } else {
        (false, "missing")
    };
    Json(json!({
        "hasApiKey": has_api_key,
        "keySource": key_source,
        "apiKeyEnv": upstream.api_key_env,
        "provider": upstream.provider,
        "baseUrl": upstream.base_url,
        "model": upstream.model,
    }))
}
