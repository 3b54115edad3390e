/// Relay error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Upstream timed out: {0}")]
    Timeout(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    BadGateway,
    GatewayTimeout,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 | 404 | 413 | 422 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::BadGateway,
        _ => ErrorCategory::Unknown,
    }
}

impl RelayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            RelayError::Transport(_) => ErrorCategory::BadGateway,
            RelayError::Timeout(_) => ErrorCategory::GatewayTimeout,
            RelayError::Config(_) | RelayError::Internal(_) => ErrorCategory::ServerError,
            RelayError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// Message shown to API clients. Drops the Rust-side variant prefix for
    /// request validation so the client sees exactly what was wrong.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RelayError::InvalidRequest(message) => message.clone(),
            RelayError::Upstream { status, message } => {
                format!("Upstream returned HTTP {status}: {message}")
            }
            other => other.to_string(),
        }
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::BadGateway => http::StatusCode::BAD_GATEWAY,
        ErrorCategory::GatewayTimeout => http::StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::ServerError | ErrorCategory::Unknown => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Format an error as `(status_code, {"error": message})`.
#[must_use]
pub fn format_error(err: &RelayError) -> (http::StatusCode, serde_json::Value) {
    let status = http_status_for_category(err.category());
    let body = serde_json::json!({ "error": err.client_message() });
    (status, body)
}

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request_with_bare_message() {
        let err = RelayError::InvalidRequest("prompt must not be empty".to_string());
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "prompt must not be empty");
    }

    #[test]
    fn config_errors_are_server_errors() {
        let err = RelayError::Config("missing credential".to_string());
        let (status, _) = format_error(&err);
        assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upstream_status_categories() {
        assert_eq!(
            category_from_upstream_status(401),
            ErrorCategory::Authentication
        );
        assert_eq!(category_from_upstream_status(429), ErrorCategory::RateLimit);
        assert_eq!(category_from_upstream_status(503), ErrorCategory::BadGateway);
        assert_eq!(category_from_upstream_status(302), ErrorCategory::Unknown);
    }

    #[test]
    fn transport_and_timeout_map_to_gateway_statuses() {
        let (status, _) = format_error(&RelayError::Transport("refused".to_string()));
        assert_eq!(status, http::StatusCode::BAD_GATEWAY);
        let (status, _) = format_error(&RelayError::Timeout("30s".to_string()));
        assert_eq!(status, http::StatusCode::GATEWAY_TIMEOUT);
    }
}
