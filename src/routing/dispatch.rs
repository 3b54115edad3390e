use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::extract::State;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::{health, optimize};
use crate::error::RelayError;
use crate::modes::OptimizeMode;
use crate::state::AppState;

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch {
    Health,
    CheckConfig,
    Optimize { mode: OptimizeMode, stream: bool },
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path(), base_path.as_ref());

    let response = match route {
        RouteMatch::Health => health::health_handler(State(state)).into_response(),
        RouteMatch::CheckConfig => health::check_config_handler(State(state)).into_response(),
        RouteMatch::Optimize { mode, stream } => {
            let limit = state.config.server.max_request_body_bytes;
            let body_bytes = match read_request_body(body, limit).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            if stream {
                optimize::stream_handler(state, mode, parts.headers, body_bytes).await
            } else {
                optimize::optimize_handler(state, mode, parts.headers, body_bytes).await
            }
        }
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    Ok(response)
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body, limit: usize) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, limit).await.map_err(|_| {
        let mut response = RelayError::InvalidRequest(format!(
            "Request body too large (max {limit} bytes)"
        ))
        .into_response();
        *response.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
        response
    })
}

fn match_route(method: &Method, path: &str, base_path: &str) -> RouteMatch {
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    match path {
        "/" => {
            if method == Method::GET {
                RouteMatch::Health
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/api/check-config" => {
            if method == Method::GET {
                RouteMatch::CheckConfig
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        _ => {
            let Some(route) = path.strip_prefix("/api/") else {
                return RouteMatch::NotFound;
            };
            let (slug, stream) = match route.strip_suffix("/stream") {
                Some(slug) => (slug, true),
                None => (route, false),
            };
            match OptimizeMode::from_route_slug(slug) {
                Some(mode) if method == Method::POST => RouteMatch::Optimize { mode, stream },
                Some(_) => RouteMatch::MethodNotAllowed,
                None => RouteMatch::NotFound,
            }
        }
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}
