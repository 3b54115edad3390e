use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::Request as ExtractRequest;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use prompt_relay::config::{AppConfig, ProviderKind, UpstreamConfig};
use prompt_relay::routing::dispatch::dispatch_request;
use prompt_relay::state::AppState;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct Captured {
    path_and_query: String,
    api_key: Option<String>,
    authorization: Option<String>,
    body: Value,
}

type Log = Arc<Mutex<Vec<Captured>>>;

#[derive(Clone)]
enum Reply {
    Chunks {
        content_type: &'static str,
        chunks: Vec<&'static str>,
    },
    Json(StatusCode, Value),
}

async fn spawn_upstream(reply: Reply) -> (String, Log, tokio::task::JoinHandle<()>) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let handler_log = Arc::clone(&log);
    let app = Router::new().fallback(move |request: ExtractRequest| {
        let log = Arc::clone(&handler_log);
        let reply = reply.clone();
        async move {
            let (parts, body) = request.into_parts();
            let path_and_query = parts
                .uri
                .path_and_query()
                .map(ToString::to_string)
                .unwrap_or_default();
            let header = |name: &str| {
                parts
                    .headers
                    .get(name)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned)
            };
            let api_key = header("x-goog-api-key");
            let authorization = header("authorization");
            let body = axum::body::to_bytes(body, usize::MAX)
                .await
                .expect("read upstream body");
            log.lock().expect("log lock").push(Captured {
                path_and_query,
                api_key,
                authorization,
                body: serde_json::from_slice(&body).unwrap_or(Value::Null),
            });

            match reply {
                Reply::Chunks {
                    content_type,
                    chunks,
                } => {
                    let stream = futures_util::stream::iter(
                        chunks
                            .into_iter()
                            .map(|chunk| Ok::<_, Infallible>(Bytes::from_static(chunk.as_bytes()))),
                    );
                    Response::builder()
                        .header("content-type", content_type)
                        .body(Body::from_stream(stream))
                        .expect("build mock response")
                }
                Reply::Json(status, value) => (status, axum::Json(value)).into_response(),
            }
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/gemini/v1beta"), log, server)
}

fn build_state(base_url: String, provider: ProviderKind, api_key: &str) -> Arc<AppState> {
    let mut config = AppConfig::default();
    config.upstream = UpstreamConfig {
        provider,
        base_url,
        api_key: api_key.to_string(),
        api_key_env: "PROMPT_RELAY_TEST_KEY_NEVER_SET".to_string(),
        ..UpstreamConfig::default()
    };
    Arc::new(AppState::new(config).expect("build state"))
}

fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serialize request")))
        .expect("build request")
}

fn multipart_request(uri: &str, prompt: &str, image: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--B\r\nContent-Disposition: form-data; name=\"prompt\"\r\n\r\n{prompt}\r\n--B\r\nContent-Disposition: form-data; name=\"image\"; filename=\"i.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(image);
    body.extend_from_slice(b"\r\n--B--\r\n");
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "multipart/form-data; boundary=B")
        .body(Body::from(body))
        .expect("build request")
}

async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, Option<String>, Bytes) {
    let response = dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    (status, request_id, body)
}

fn sse_events(body: &[u8]) -> Vec<Value> {
    std::str::from_utf8(body)
        .expect("utf8 sse body")
        .split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| {
            let data = frame.strip_prefix("data: ").expect("data frame");
            serde_json::from_str(data).expect("json frame")
        })
        .collect()
}

fn deltas(events: &[Value]) -> String {
    events
        .iter()
        .filter(|event| event["type"] == "response.output_text.delta")
        .filter_map(|event| event["delta"].as_str())
        .collect()
}

#[tokio::test]
async fn snapshot_array_stream_is_relayed_as_deltas() {
    let (base_url, log, server) = spawn_upstream(Reply::Chunks {
        content_type: "application/json",
        chunks: vec![
            r#"[{"candidates":[{"content":{"parts":[{"text":"a cat"}]}}]}"#,
            "\n,\r\n",
            r#"{"candidates":[{"content":{"parts":[{"text":" walking, golden hour lighting"}]},"finishReason":"STOP"}]}"#,
            "\n",
            "]",
        ],
    })
    .await;
    let state = build_state(base_url, ProviderKind::Gemini, "test-key");

    let (status, request_id, body) = send(
        state,
        multipart_request("/api/optimize-and-edit/stream", "a cat", b"\xff\xd8jpeg"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(request_id.is_some_and(|id| id.starts_with("req_")));

    let events = sse_events(&body);
    assert_eq!(deltas(&events), "a cat walking, golden hour lighting");
    assert_eq!(events.last(), Some(&json!({"type":"response.completed"})));
    assert_eq!(events.len(), 3);

    let captured = log.lock().expect("log lock").clone();
    assert_eq!(captured.len(), 1);
    assert_eq!(
        captured[0].path_and_query,
        "/gemini/v1beta/models/gemini-2.5-flash:streamGenerateContent"
    );
    assert_eq!(captured[0].api_key.as_deref(), Some("test-key"));
    let parts = &captured[0].body["contents"][0]["parts"];
    assert!(parts[0]["text"].as_str().is_some_and(|text| text.contains("a cat")));
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");

    server.abort();
}

#[tokio::test]
async fn sse_stream_uses_alt_sse_and_relays_lines() {
    let (base_url, log, server) = spawn_upstream(Reply::Chunks {
        content_type: "text/event-stream",
        chunks: vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"A sleek\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" red car\"}]}}]}\n",
            "\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"\"}]},\"finishReason\":\"STOP\"}]}\n\n",
        ],
    })
    .await;
    let state = build_state(base_url, ProviderKind::Gemini, "test-key");

    let (status, _, body) = send(
        state,
        json_request(
            "/api/optimize-and-generate/stream",
            &json!({"prompt": "red car", "language": "en"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = sse_events(&body);
    assert_eq!(deltas(&events), "A sleek red car");
    assert_eq!(events.last(), Some(&json!({"type":"response.completed"})));

    let captured = log.lock().expect("log lock").clone();
    assert!(captured[0].path_and_query.ends_with(":streamGenerateContent?alt=sse"));

    server.abort();
}

#[tokio::test]
async fn safety_block_yields_single_error_event() {
    let (base_url, _log, server) = spawn_upstream(Reply::Chunks {
        content_type: "text/event-stream",
        chunks: vec!["data: {\"candidates\":[{\"finishReason\":\"SAFETY\"}]}\n\n"],
    })
    .await;
    let state = build_state(base_url, ProviderKind::Gemini, "test-key");

    let (status, _, body) = send(
        state,
        json_request("/api/optimize-and-generate/stream", &json!({"prompt": "p"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = sse_events(&body);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "response.error");
    assert!(events[0]["error"]["message"]
        .as_str()
        .is_some_and(|message| message.contains("safety")));

    server.abort();
}

#[tokio::test]
async fn empty_upstream_stream_is_an_error_not_completion() {
    let (base_url, _log, server) = spawn_upstream(Reply::Chunks {
        content_type: "application/json",
        chunks: vec![],
    })
    .await;
    let state = build_state(base_url, ProviderKind::Gemini, "test-key");

    let (_, _, body) = send(
        state,
        json_request(
            "/api/optimize-and-generate-video/stream",
            &json!({"prompt": "p", "language": "zh"}),
        ),
    )
    .await;
    let events = sse_events(&body);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "response.error");

    server.abort();
}

#[tokio::test]
async fn upstream_error_status_is_reported_before_streaming() {
    let (base_url, _log, server) = spawn_upstream(Reply::Json(
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": {"code": 429, "message": "Resource has been exhausted"}}),
    ))
    .await;
    let state = build_state(base_url, ProviderKind::Gemini, "test-key");

    let (status, request_id, body) = send(
        state,
        json_request("/api/optimize-and-generate/stream", &json!({"prompt": "p"})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(request_id.is_some());
    let payload: Value = serde_json::from_slice(&body).expect("json error");
    assert!(payload["error"]
        .as_str()
        .is_some_and(|message| message.contains("Resource has been exhausted")));

    server.abort();
}

#[tokio::test]
async fn non_stream_returns_extracted_text() {
    let (base_url, log, server) = spawn_upstream(Reply::Json(
        StatusCode::OK,
        json!({"candidates": [{"content": {"parts": [{"text": "  A tabby cat, soft light  "}]}}]}),
    ))
    .await;
    let state = build_state(base_url, ProviderKind::Gemini, "test-key");

    let (status, _, body) = send(
        state,
        json_request("/api/optimize-and-generate", &json!({"prompt": "cat"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(
        payload,
        json!({"optimizedPrompt": "A tabby cat, soft light", "language": "en"})
    );
    let captured = log.lock().expect("log lock").clone();
    assert!(captured[0].path_and_query.ends_with(":generateContent"));

    server.abort();
}

#[tokio::test]
async fn non_stream_empty_extraction_echoes_prompt() {
    let (base_url, _log, server) =
        spawn_upstream(Reply::Json(StatusCode::OK, json!({"candidates": []}))).await;
    let state = build_state(base_url, ProviderKind::Gemini, "test-key");

    let (status, _, body) = send(
        state,
        json_request(
            "/api/optimize-and-generate",
            &json!({"prompt": "一只猫", "language": "zh"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload, json!({"optimizedPrompt": "一只猫", "language": "zh"}));

    server.abort();
}

#[tokio::test]
async fn validation_failure_never_reaches_upstream() {
    let (base_url, log, server) =
        spawn_upstream(Reply::Json(StatusCode::OK, json!({"text": "unused"}))).await;
    let state = build_state(base_url, ProviderKind::Gemini, "test-key");

    let (status, _, body) = send(
        Arc::clone(&state),
        json_request("/api/optimize-and-edit/stream", &json!({"prompt": "p"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let payload: Value = serde_json::from_slice(&body).expect("json error");
    assert_eq!(payload, json!({"error": "Missing required image 'image'"}));

    let (status, _, _) = send(
        state,
        json_request(
            "/api/optimize-and-generate",
            &json!({"prompt": "p", "language": "de"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(log.lock().expect("log lock").is_empty());

    server.abort();
}

#[tokio::test]
async fn missing_credential_is_a_server_error_before_upstream() {
    let (base_url, log, server) =
        spawn_upstream(Reply::Json(StatusCode::OK, json!({"text": "unused"}))).await;
    let state = build_state(base_url, ProviderKind::Gemini, "");

    let (status, _, body) = send(
        state,
        json_request("/api/optimize-and-generate/stream", &json!({"prompt": "p"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let payload: Value = serde_json::from_slice(&body).expect("json error");
    assert!(payload["error"]
        .as_str()
        .is_some_and(|message| message.contains("PROMPT_RELAY_TEST_KEY_NEVER_SET")));
    assert!(log.lock().expect("log lock").is_empty());

    server.abort();
}

#[tokio::test]
async fn openai_provider_streams_chat_deltas() {
    let (base_url, log, server) = spawn_upstream(Reply::Chunks {
        content_type: "text/event-stream",
        chunks: vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Smooth dolly\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" shot\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        ],
    })
    .await;
    let state = build_state(base_url, ProviderKind::OpenAi, "sk-test");

    let (status, _, body) = send(
        state,
        json_request(
            "/api/optimize-frame-transition/stream",
            &json!({"prompt": "dolly", "images": [{"data": "b25l"}, {"data": "dHdv"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = sse_events(&body);
    assert_eq!(deltas(&events), "Smooth dolly shot");
    assert_eq!(events.last(), Some(&json!({"type":"response.completed"})));

    let captured = log.lock().expect("log lock").clone();
    assert_eq!(captured[0].path_and_query, "/gemini/v1beta/chat/completions");
    assert_eq!(captured[0].authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(captured[0].body["stream"], true);
    assert_eq!(
        captured[0].body["messages"][0]["content"][1]["image_url"]["url"],
        "data:image/png;base64,b25l"
    );

    server.abort();
}

#[tokio::test]
async fn operational_routes_report_config() {
    let state = build_state("http://127.0.0.1:9/v1".to_string(), ProviderKind::Gemini, "");

    let health = Request::builder()
        .uri("/")
        .body(Body::empty())
        .expect("build request");
    let (status, _, body) = send(Arc::clone(&state), health).await;
    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload["status"], "prompt-relay is running");

    let check = Request::builder()
        .uri("/api/check-config")
        .body(Body::empty())
        .expect("build request");
    let (status, _, body) = send(state, check).await;
    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload["hasApiKey"], false);
    assert_eq!(payload["model"], "gemini-2.5-flash");
}
