use std::time::Instant;

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::modes::OptimizeMode;

/// Map a configured level name to an `EnvFilter` directive.
///
/// - "DISABLED" -> `None`, no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (TRACE, DEBUG, INFO, WARN, ERROR)
#[must_use]
pub fn level_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber with the configured level and format.
pub fn init_tracing(log_level: &str, format: LogFormat) {
    let Some(directive) = level_directive(log_level) else {
        return;
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// One summary line per finished HTTP exchange.
pub fn log_request_complete(
    request_id: &str,
    mode: OptimizeMode,
    stream: bool,
    status: u16,
    start_time: Instant,
) {
    let elapsed_ms = start_time.elapsed().as_millis();
    if status >= 500 {
        tracing::warn!(request_id, %mode, stream, status, elapsed_ms, "request finished");
    } else {
        tracing::info!(request_id, %mode, stream, status, elapsed_ms, "request finished");
    }
}

#[cfg(test)]
mod tests {
    use super::level_directive;

    #[test]
    fn config_level_aliases() {
        assert_eq!(level_directive("warning").as_deref(), Some("WARN"));
        assert_eq!(level_directive("CRITICAL").as_deref(), Some("ERROR"));
        assert_eq!(level_directive("debug").as_deref(), Some("DEBUG"));
        assert_eq!(level_directive("DISABLED"), None);
    }
}
