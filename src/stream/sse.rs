//! Outbound SSE encoding of canonical events.
//!
//! Frames use the Responses-style event names the browser client already
//! understands: `response.output_text.delta`, `response.completed` and
//! `response.error`.

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;

use crate::protocol::canonical::CanonicalEvent;
use crate::util::push_json_string_escaped;

const DELTA_PREFIX: &str = r#"data: {"type":"response.output_text.delta","delta":"#;
const COMPLETED_FRAME: &[u8] = b"data: {\"type\":\"response.completed\"}\n\n";
const ERROR_PREFIX: &str = r#"data: {"type":"response.error","error":{"message":"#;

/// Encode one canonical event as a complete SSE message.
#[must_use]
pub fn encode_event(event: &CanonicalEvent) -> Bytes {
    match event {
        CanonicalEvent::TextDelta(text) => {
            let mut out = String::with_capacity(DELTA_PREFIX.len() + text.len() + 8);
            out.push_str(DELTA_PREFIX);
            push_json_string_escaped(&mut out, text);
            out.push_str("}\n\n");
            Bytes::from(out)
        }
        CanonicalEvent::Completed => Bytes::from_static(COMPLETED_FRAME),
        CanonicalEvent::Error(message) => {
            let mut out = String::with_capacity(ERROR_PREFIX.len() + message.len() + 8);
            out.push_str(ERROR_PREFIX);
            push_json_string_escaped(&mut out, message);
            out.push_str("}}\n\n");
            Bytes::from(out)
        }
    }
}

/// 200 response carrying an SSE body, with headers that keep proxies from
/// buffering or transforming the stream.
#[must_use]
pub fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    headers.insert("x-accel-buffering", http::HeaderValue::from_static("no"));
    response
}
