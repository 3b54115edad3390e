//! Text extraction over the upstream response shapes we know about.
//!
//! Shape dispatch is an ordered list of pure functions; the first rule that
//! yields non-empty text wins. Adding a provider means adding a rule.

use serde_json::Value;

type Rule = fn(&Value) -> Option<String>;

/// Rules for one complete (non-streaming) upstream body.
const STATIC_RULES: &[Rule] = &[
    direct_text_field,
    output_items_text,
    chat_choice_text,
    gemini_candidates_text,
    fallback_field_text,
];

/// Rules for one streamed record (a line payload or a snapshot element).
const FRAGMENT_RULES: &[Rule] = &[
    gemini_candidate_fragment,
    chat_delta_fragment,
    chat_message_fragment,
    output_items_fragment,
    plain_text_fragment,
];

const FALLBACK_FIELDS: &[&str] = &[
    "content",
    "result",
    "response",
    "message",
    "completion",
    "generated_text",
    "optimized_prompt",
    "optimizedPrompt",
    "answer",
];

const FILTERED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "IMAGE_SAFETY",
    "content_filter",
];

const TRUNCATED_FINISH_REASONS: &[&str] = &["MAX_TOKENS", "length", "max_output_tokens"];

/// Extract the optimized text from one complete upstream JSON body.
///
/// Never fails: returns trimmed text, or an empty string when no known
/// shape carries any.
#[must_use]
pub fn extract_static_text(body: &Value) -> String {
    STATIC_RULES
        .iter()
        .find_map(|rule| rule(body).and_then(non_blank))
        .unwrap_or_default()
}

/// Extract the text fragment carried by one streamed record.
///
/// Fragments are not trimmed: whitespace between deltas is significant.
#[must_use]
pub fn extract_record_fragment(record: &Value) -> Option<String> {
    match record {
        Value::String(text) => return non_empty(text.clone()),
        Value::Object(map) => {
            if let Some(kind) = map.get("type").and_then(Value::as_str) {
                if kind.starts_with("response.") {
                    // Responses API events: only deltas carry new text; the
                    // `.done` events repeat the full text and must not count.
                    return match kind {
                        "response.output_text.delta" => map
                            .get("delta")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .and_then(non_empty),
                        _ => None,
                    };
                }
            }
        }
        _ => return None,
    }
    FRAGMENT_RULES.iter().find_map(|rule| rule(record))
}

/// Terminal or status information carried alongside text in a record.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordStatus {
    /// Set when the provider stopped generation for safety/policy reasons.
    pub filtered: Option<String>,
    /// Set when the provider stopped at the output token limit.
    pub truncated: bool,
    /// An error payload embedded in an otherwise successful stream.
    pub error: Option<String>,
}

/// Inspect finish reasons, block reasons and embedded errors of a record.
#[must_use]
pub fn inspect_record(record: &Value) -> RecordStatus {
    let mut status = RecordStatus::default();
    let Some(map) = record.as_object() else {
        return status;
    };

    if let Some(reason) = record
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        status.filtered = Some(reason.to_string());
        return status;
    }

    for reason in finish_reasons(record) {
        if FILTERED_FINISH_REASONS.contains(&reason) {
            status.filtered = Some(reason.to_string());
            return status;
        }
        if TRUNCATED_FINISH_REASONS.contains(&reason) {
            status.truncated = true;
        }
    }

    match map.get("type").and_then(Value::as_str) {
        Some("response.failed" | "response.error" | "error") => {
            status.error = Some(
                embedded_error_message(record)
                    .unwrap_or_else(|| "upstream reported a failed response".to_string()),
            );
            return status;
        }
        Some("response.incomplete") => {
            match record
                .pointer("/response/incomplete_details/reason")
                .and_then(Value::as_str)
            {
                Some("content_filter") => status.filtered = Some("content_filter".to_string()),
                _ => status.truncated = true,
            }
            return status;
        }
        _ => {}
    }

    if map.get("error").is_some_and(|error| !error.is_null()) {
        status.error = Some(
            embedded_error_message(record)
                .unwrap_or_else(|| "upstream returned an error payload".to_string()),
        );
    }
    status
}

fn finish_reasons(record: &Value) -> impl Iterator<Item = &str> {
    let candidates = record
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.get("finishReason").and_then(Value::as_str));
    let choices = record
        .get("choices")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|choice| choice.get("finish_reason").and_then(Value::as_str));
    candidates.chain(choices)
}

const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Pull a client-safe error message out of an upstream error payload.
#[must_use]
pub fn embedded_error_message(record: &Value) -> Option<String> {
    let error = record
        .get("error")
        .or_else(|| record.pointer("/response/error"))?;
    let message = match error {
        Value::String(message) => message.as_str(),
        Value::Object(map) => map.get("message").and_then(Value::as_str)?,
        _ => return None,
    };
    non_blank(truncate_chars(message, MAX_ERROR_MESSAGE_CHARS))
}

/// Sanitize a non-2xx upstream body into a short message.
#[must_use]
pub fn sanitize_upstream_error(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        if let Some(message) = embedded_error_message(&json) {
            return message;
        }
        // Gemini sometimes wraps the error object in a one-element array.
        if let Some(message) = json
            .as_array()
            .and_then(|items| items.first())
            .and_then(embedded_error_message)
        {
            return message;
        }
    }
    let lossy = String::from_utf8_lossy(body);
    let trimmed = lossy.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        truncate_chars(trimmed, MAX_ERROR_MESSAGE_CHARS)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == text.len() {
        Some(text)
    } else {
        Some(trimmed.to_string())
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Join the `text` of every text-bearing block in `blocks`.
fn join_block_texts(blocks: &[Value], separator: &str) -> Option<String> {
    let texts: Vec<&str> = blocks
        .iter()
        .filter(|block| !block.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|block| match block {
            Value::String(text) => Some(text.as_str()),
            _ => block.get("text").and_then(Value::as_str),
        })
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join(separator))
    }
}

/// String content, or a list of text blocks.
fn content_text(content: &Value, separator: &str) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => join_block_texts(blocks, separator),
        _ => None,
    }
}

fn output_items_joined(record: &Value, separator: &str) -> Option<String> {
    let items = record.get("output")?.as_array()?;
    let mut texts = Vec::new();
    for item in items {
        if let Some(text) = item.get("text").and_then(Value::as_str) {
            texts.push(text.to_string());
        } else if let Some(text) = item
            .get("content")
            .and_then(|content| content_text(content, separator))
        {
            texts.push(text);
        }
    }
    if texts.is_empty() {
        None
    } else {
        Some(texts.join(separator))
    }
}

fn first_candidate_parts(record: &Value) -> Option<String> {
    record
        .get("candidates")?
        .as_array()?
        .iter()
        .filter_map(|candidate| candidate.pointer("/content/parts")?.as_array())
        .find_map(|parts| join_block_texts(parts, ""))
}

// ---------------------------------------------------------------------------
// Static rules
// ---------------------------------------------------------------------------

fn direct_text_field(body: &Value) -> Option<String> {
    ["output_text", "text"].iter().find_map(|field| {
        body.get(*field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .and_then(non_blank)
    })
}

fn output_items_text(body: &Value) -> Option<String> {
    output_items_joined(body, "\n")
}

fn chat_choice_text(body: &Value) -> Option<String> {
    let choice = body.get("choices")?.as_array()?.first()?;
    choice
        .pointer("/message/content")
        .and_then(|content| content_text(content, "\n"))
        .and_then(non_blank)
        .or_else(|| choice.get("text").and_then(Value::as_str).map(str::to_string))
}

fn gemini_candidates_text(body: &Value) -> Option<String> {
    first_candidate_parts(body)
}

fn fallback_field_text(body: &Value) -> Option<String> {
    FALLBACK_FIELDS.iter().find_map(|field| {
        body.get(*field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .and_then(non_blank)
    })
}

// ---------------------------------------------------------------------------
// Fragment rules
// ---------------------------------------------------------------------------

fn gemini_candidate_fragment(record: &Value) -> Option<String> {
    first_candidate_parts(record).and_then(non_empty)
}

fn chat_delta_fragment(record: &Value) -> Option<String> {
    record
        .pointer("/choices/0/delta/content")
        .and_then(|content| content_text(content, ""))
        .and_then(non_empty)
}

fn chat_message_fragment(record: &Value) -> Option<String> {
    let choice = record.pointer("/choices/0")?;
    choice
        .pointer("/message/content")
        .and_then(|content| content_text(content, ""))
        .or_else(|| choice.get("text").and_then(Value::as_str).map(str::to_string))
        .and_then(non_empty)
}

fn output_items_fragment(record: &Value) -> Option<String> {
    output_items_joined(record, "").and_then(non_empty)
}

fn plain_text_fragment(record: &Value) -> Option<String> {
    ["text", "delta", "content", "output_text"]
        .iter()
        .find_map(|field| record.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .and_then(non_empty)
}
