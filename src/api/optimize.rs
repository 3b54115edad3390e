//! One handler pair shared by every optimization mode. The mode descriptor
//! selects the prompt template, the expected images and the upstream shape.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{json, Value};

use crate::api::request::parse_optimize_request;
use crate::error::RelayError;
use crate::modes::{ModeDescriptor, OptimizeMode};
use crate::observability::log_request_complete;
use crate::protocol::canonical::OptimizeRequest;
use crate::protocol::extract::{embedded_error_message, extract_static_text, sanitize_upstream_error};
use crate::protocol::language::filter_language;
use crate::state::AppState;
use crate::stream::{
    encode_event, normalize_stream, sse_ok_response, Normalizer, NormalizerOptions, StreamTimeouts,
};
use crate::transport::transport_error;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Streaming route: `POST /api/<slug>/stream`.
pub(crate) async fn stream_handler(
    state: Arc<AppState>,
    mode: OptimizeMode,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = state.next_request_id();
    let response = match open_stream(&state, mode.descriptor(), &request_id, &headers, body).await {
        Ok(response) => response,
        Err(err) => error_response(&request_id, err),
    };
    finish(response, &request_id, mode, true, started)
}

/// Non-streaming route: `POST /api/<slug>`.
pub(crate) async fn optimize_handler(
    state: Arc<AppState>,
    mode: OptimizeMode,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = state.next_request_id();
    let response = match optimize_once(&state, mode.descriptor(), &request_id, &headers, body).await
    {
        Ok(response) => response,
        Err(err) => error_response(&request_id, err),
    };
    finish(response, &request_id, mode, false, started)
}

fn error_response(request_id: &str, err: RelayError) -> Response {
    match &err {
        RelayError::InvalidRequest(_) => {
            tracing::debug!(request_id, error = %err, "rejected request");
        }
        _ => tracing::error!(request_id, error = %err, "request failed before streaming"),
    }
    err.into_response()
}

fn finish(
    mut response: Response,
    request_id: &str,
    mode: OptimizeMode,
    stream: bool,
    started: Instant,
) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    log_request_complete(request_id, mode, stream, response.status().as_u16(), started);
    response
}

/// Everything up to the first upstream byte: validation, credential, the
/// upstream call and its status. Errors here become plain JSON responses.
async fn call_upstream(
    state: &AppState,
    descriptor: &ModeDescriptor,
    request_id: &str,
    headers: &HeaderMap,
    body: Bytes,
    stream: bool,
) -> Result<(OptimizeRequest, reqwest::Response), RelayError> {
    let config = &state.config;
    let request = parse_optimize_request(
        headers,
        body,
        descriptor,
        &config.features,
        config.server.max_request_body_bytes,
    )
    .await?;
    let api_key = config.upstream.resolve_api_key()?;

    let shape = stream.then(|| state.upstream.stream_shape(descriptor));
    let instruction = state.instruction_for(descriptor, &request.prompt, request.language);
    let upstream_body =
        state
            .upstream
            .encode_body(&config.upstream, descriptor, &request, instruction, stream)?;
    let upstream_headers = state.upstream.request_headers(&api_key)?;
    let url = state.upstream.request_url(shape);

    tracing::info!(
        request_id,
        mode = %descriptor.mode,
        provider = %state.upstream.provider_kind(),
        shape = %shape.map_or_else(|| "unary".to_string(), |shape| shape.to_string()),
        language = %request.language,
        images = request.images.len(),
        prompt_chars = request.prompt.chars().count(),
        "forwarding to upstream"
    );

    let idle = config.streaming.idle_timeout();
    let send = state.transport.post_json(url, upstream_headers, upstream_body);
    let response = if stream {
        tokio::time::timeout(idle, send).await.map_err(|_| {
            RelayError::Timeout(format!("no response headers within {}s", idle.as_secs()))
        })??
    } else {
        send.await?
    };

    let status = response.status();
    if !status.is_success() {
        let error_body = response.bytes().await.unwrap_or_default();
        let message = sanitize_upstream_error(&error_body);
        tracing::warn!(
            request_id,
            status = status.as_u16(),
            message = %message,
            "upstream returned an error status"
        );
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            message,
        });
    }
    Ok((request, response))
}

async fn open_stream(
    state: &AppState,
    descriptor: &ModeDescriptor,
    request_id: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    let (request, upstream) =
        call_upstream(state, descriptor, request_id, headers, body, true).await?;

    let normalizer = Normalizer::new(
        NormalizerOptions {
            shape: state.upstream.stream_shape(descriptor),
            language: request.language,
            language_filter: state.config.features.language_post_filter,
        },
        request_id,
    );
    let timeouts = StreamTimeouts {
        idle: state.config.streaming.idle_timeout(),
        total: state.config.streaming.total_timeout(),
    };
    let body = upstream
        .bytes_stream()
        .map(|chunk| chunk.map_err(|err| transport_error(&err)));
    let frames = normalize_stream(body, normalizer, timeouts)
        .map(|event| Ok::<_, Infallible>(encode_event(&event)));
    Ok(sse_ok_response(Body::from_stream(frames)))
}

async fn optimize_once(
    state: &AppState,
    descriptor: &ModeDescriptor,
    request_id: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    let (request, upstream) =
        call_upstream(state, descriptor, request_id, headers, body, false).await?;
    let bytes = upstream.bytes().await.map_err(|err| transport_error(&err))?;

    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(request_id, error = %err, "upstream body is not JSON; echoing prompt");
            Value::Null
        }
    };
    if let Some(message) = embedded_error_message(&value) {
        let status = value
            .pointer("/error/code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .filter(|code| *code >= 400)
            .unwrap_or(502);
        return Err(RelayError::Upstream { status, message });
    }

    let extracted = extract_static_text(&value);
    let text = if state.config.features.language_post_filter {
        filter_language(&extracted, request.language).trim()
    } else {
        extracted.as_str()
    };
    if text.is_empty() {
        tracing::warn!(request_id, "upstream returned no text; echoing prompt");
    }
    let optimized = if text.is_empty() {
        request.prompt.as_str()
    } else {
        text
    };

    Ok(Json(json!({
        "optimizedPrompt": optimized,
        "language": request.language,
    }))
    .into_response())
}
