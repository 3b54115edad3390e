use std::sync::Arc;

use serde_json::Value;

use super::buffer::ParseBuffer;
use super::cumulative::{Advance, CumulativeText};
use super::notice::Notice;
use crate::error::RelayError;
use crate::json_scan::{ScanEvent, SnapshotScanner};
use crate::protocol::canonical::{CanonicalEvent, OutputLanguage, UpstreamShape};
use crate::protocol::extract::{extract_record_fragment, inspect_record};
use crate::protocol::language::filter_language;

#[derive(Debug, Clone, Copy)]
pub struct NormalizerOptions {
    pub shape: UpstreamShape,
    /// Language used for notices and, when enabled, the post-filter.
    pub language: OutputLanguage,
    pub language_filter: bool,
}

/// Per-request state machine turning raw upstream bytes into canonical events.
///
/// Feed chunks in arrival order with [`Normalizer::feed_into`], then call
/// [`Normalizer::finalize_into`] at end of stream (or
/// [`Normalizer::fail_into`] on a transport failure). Exactly one terminal
/// event is ever produced; input after it is ignored.
pub struct Normalizer {
    options: NormalizerOptions,
    request_id: Arc<str>,
    buffer: ParseBuffer,
    scanner: SnapshotScanner,
    /// Accumulated upstream text before the language filter.
    raw_text: String,
    /// A top-level array closed; the next one re-sends the snapshot.
    snapshot_closed: bool,
    cumulative: CumulativeText,
    bytes_received: u64,
    records_parsed: u64,
    malformed_records: u64,
    truncated: bool,
    unterminated: bool,
    finished: bool,
}

impl Normalizer {
    #[must_use]
    pub fn new(options: NormalizerOptions, request_id: impl Into<Arc<str>>) -> Self {
        Self {
            options,
            request_id: request_id.into(),
            buffer: ParseBuffer::default(),
            scanner: SnapshotScanner::default(),
            raw_text: String::new(),
            snapshot_closed: false,
            cumulative: CumulativeText::default(),
            bytes_received: 0,
            records_parsed: 0,
            malformed_records: 0,
            truncated: false,
            unterminated: false,
            finished: false,
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Text delivered to the client so far.
    #[must_use]
    pub fn text(&self) -> &str {
        self.cumulative.as_str()
    }

    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Process one raw upstream chunk.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<CanonicalEvent>) {
        if self.finished || chunk.is_empty() {
            return;
        }
        self.bytes_received += chunk.len() as u64;
        tracing::debug!(
            request_id = %self.request_id,
            bytes = chunk.len(),
            total_bytes = self.bytes_received,
            "upstream chunk"
        );
        self.buffer.push(chunk);
        match self.options.shape {
            UpstreamShape::SnapshotArray => self.drain_snapshots(out),
            UpstreamShape::LineDelimited => self.drain_lines(out),
        }
    }

    /// The upstream closed cleanly: flush what is buffered and terminate.
    pub fn finalize_into(&mut self, out: &mut Vec<CanonicalEvent>) {
        if self.finished {
            return;
        }
        match self.options.shape {
            UpstreamShape::LineDelimited => {
                if let Some(rest) = self.buffer.take_remainder() {
                    self.process_line(&rest, out);
                }
            }
            UpstreamShape::SnapshotArray => {
                if !self.scanner.is_idle() {
                    self.unterminated = true;
                    tracing::warn!(
                        request_id = %self.request_id,
                        pending_bytes = self.buffer.pending().len(),
                        "upstream stream ended inside an unterminated JSON value"
                    );
                }
            }
        }
        self.complete_into(out);
    }

    /// The upstream failed mid-stream.
    pub fn fail_into(&mut self, error: &RelayError, out: &mut Vec<CanonicalEvent>) {
        if self.finished {
            return;
        }
        let language = self.options.language;
        let message = match error {
            RelayError::Timeout(detail) => format!("{} ({detail})", Notice::TimedOut.text(language)),
            RelayError::Transport(detail) => {
                format!("{} ({detail})", Notice::Interrupted.text(language))
            }
            other => other.client_message(),
        };
        self.fail_with(message, out);
    }

    fn drain_lines(&mut self, out: &mut Vec<CanonicalEvent>) {
        while !self.finished {
            let Some(line) = self.buffer.next_line() else {
                break;
            };
            self.process_line(&line, out);
        }
        self.buffer.compact();
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<CanonicalEvent>) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        let payload = if let Some(rest) = line.strip_prefix("data:") {
            rest.trim()
        } else if ["event:", "id:", "retry:"]
            .iter()
            .any(|field| line.starts_with(field))
        {
            return;
        } else {
            line
        };
        if payload.is_empty() {
            return;
        }
        if payload == "[DONE]" {
            tracing::debug!(request_id = %self.request_id, "upstream sent [DONE]");
            self.complete_into(out);
            return;
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(record) => {
                self.records_parsed += 1;
                self.accept_record(&record, out);
            }
            Err(err) => {
                self.malformed_records += 1;
                tracing::warn!(
                    request_id = %self.request_id,
                    error = %err,
                    line_len = payload.len(),
                    "skipping unparsable upstream line"
                );
            }
        }
    }

    fn drain_snapshots(&mut self, out: &mut Vec<CanonicalEvent>) {
        while !self.finished {
            let Some(event) = self.scanner.next_event(self.buffer.pending()) else {
                break;
            };
            match event {
                ScanEvent::Element(range) => {
                    self.reopen_snapshot();
                    let parsed = serde_json::from_slice::<Value>(&self.buffer.pending()[range]);
                    self.accept_parsed(parsed, out);
                }
                ScanEvent::Value(range) => {
                    if self.buffer.pending()[range.start] == b'[' {
                        // Elements were taken as they completed.
                        self.reopen_snapshot();
                        self.snapshot_closed = true;
                    } else {
                        let parsed = serde_json::from_slice::<Value>(&self.buffer.pending()[range]);
                        self.accept_parsed(parsed, out);
                    }
                }
            }
        }
        let discardable = self.scanner.discardable_prefix();
        if discardable > 0 {
            self.buffer.consume(discardable);
            self.scanner.discard_prefix(discardable);
        }
    }

    /// Objects after a closed array extend it; a new array starts over.
    fn reopen_snapshot(&mut self) {
        if self.snapshot_closed {
            self.raw_text.clear();
            self.snapshot_closed = false;
        }
    }

    fn accept_parsed(
        &mut self,
        parsed: Result<Value, serde_json::Error>,
        out: &mut Vec<CanonicalEvent>,
    ) {
        match parsed {
            Ok(record) => {
                self.records_parsed += 1;
                self.accept_record(&record, out);
            }
            Err(err) => {
                self.malformed_records += 1;
                tracing::warn!(
                    request_id = %self.request_id,
                    error = %err,
                    "skipping unparsable snapshot element"
                );
            }
        }
    }

    fn accept_record(&mut self, record: &Value, out: &mut Vec<CanonicalEvent>) {
        if let Value::Array(items) = record {
            for item in items {
                if self.finished {
                    return;
                }
                self.accept_record(item, out);
            }
            return;
        }

        let status = inspect_record(record);
        if let Some(reason) = status.filtered.as_deref() {
            tracing::warn!(
                request_id = %self.request_id,
                reason,
                emitted_chars = self.cumulative.char_count(),
                "upstream stopped generation by content filter"
            );
            let message = Notice::ContentFiltered.text(self.options.language).to_string();
            self.fail_with(message, out);
            return;
        }
        if let Some(message) = status.error {
            self.fail_with(format!("Upstream error: {message}"), out);
            return;
        }

        if let Some(fragment) = extract_record_fragment(record) {
            self.raw_text.push_str(&fragment);
            self.publish(out);
        }

        if status.truncated && !self.truncated {
            self.truncated = true;
            tracing::info!(
                request_id = %self.request_id,
                emitted_chars = self.cumulative.char_count(),
                "upstream output hit the token limit"
            );
        }
    }

    fn publish(&mut self, out: &mut Vec<CanonicalEvent>) {
        let raw = self.raw_text.as_str();
        let candidate = if self.options.language_filter {
            filter_language(raw, self.options.language)
        } else {
            raw
        };
        match self.cumulative.advance(candidate) {
            Advance::Extended(delta) => out.push(CanonicalEvent::TextDelta(delta.to_string())),
            Advance::Stale => {}
            Advance::Diverged => {
                tracing::warn!(
                    request_id = %self.request_id,
                    emitted_chars = self.cumulative.char_count(),
                    snapshot_chars = candidate.chars().count(),
                    "upstream snapshot does not extend emitted text; waiting for realignment"
                );
            }
        }
    }

    fn complete_into(&mut self, out: &mut Vec<CanonicalEvent>) {
        if self.finished {
            return;
        }
        if !self.cumulative.as_str().trim().is_empty() {
            self.finished = true;
            tracing::debug!(
                request_id = %self.request_id,
                text_chars = self.cumulative.char_count(),
                bytes_received = self.bytes_received,
                truncated = self.truncated,
                malformed_records = self.malformed_records,
                "stream completed"
            );
            out.push(CanonicalEvent::Completed);
            return;
        }

        let notice = if self.bytes_received == 0 {
            Notice::NothingReceived
        } else if self.truncated {
            Notice::InputTooLarge
        } else if self.records_parsed == 0 {
            Notice::Malformed
        } else {
            Notice::EmptyResult
        };
        self.fail_with(notice.text(self.options.language).to_string(), out);
    }

    fn fail_with(&mut self, message: String, out: &mut Vec<CanonicalEvent>) {
        self.finished = true;
        tracing::error!(
            request_id = %self.request_id,
            emitted_chars = self.cumulative.char_count(),
            bytes_received = self.bytes_received,
            malformed_records = self.malformed_records,
            unterminated = self.unterminated,
            error = %message,
            "stream failed"
        );
        out.push(CanonicalEvent::Error(message));
    }
}
