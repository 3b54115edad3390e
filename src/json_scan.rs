//! Incremental boundary scanner for JSON values arriving in pieces.
//!
//! The scanner never parses; it only tracks bracket depth and string/escape
//! state so the caller knows when a slice is worth handing to `serde_json`.
//! Each byte is visited once across all calls.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScanEvent {
    /// A complete depth-1 element (object, array or string) of a top-level
    /// array that is still open.
    Element(Range<usize>),
    /// A complete top-level object or array.
    Value(Range<usize>),
}

#[derive(Debug, Default)]
pub(crate) struct SnapshotScanner {
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    value_start: usize,
    top_is_array: bool,
    element_start: Option<usize>,
}

impl SnapshotScanner {
    /// Continue scanning `bytes` (the whole buffer, of which a prefix was
    /// already scanned) and stop at the next boundary.
    ///
    /// Returns `None` once every available byte has been consumed without
    /// closing anything; call again after appending more bytes.
    pub(crate) fn next_event(&mut self, bytes: &[u8]) -> Option<ScanEvent> {
        while self.pos < bytes.len() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                    self.pos += 1;
                    continue;
                }
                let Some(offset) = memchr::memchr2(b'"', b'\\', &bytes[self.pos..]) else {
                    self.pos = bytes.len();
                    break;
                };
                let i = self.pos + offset;
                self.pos = i + 1;
                if bytes[i] == b'\\' {
                    self.escaped = true;
                    continue;
                }
                self.in_string = false;
                if self.depth == 1 && self.top_is_array {
                    if let Some(start) = self.element_start.take() {
                        return Some(ScanEvent::Element(start..i + 1));
                    }
                }
                continue;
            }

            if self.depth == 0 {
                // Anything outside a value (SSE markers, separators, noise) is skipped.
                let Some(offset) = memchr::memchr2(b'[', b'{', &bytes[self.pos..]) else {
                    self.pos = bytes.len();
                    break;
                };
                let i = self.pos + offset;
                self.pos = i + 1;
                self.value_start = i;
                self.top_is_array = bytes[i] == b'[';
                self.element_start = None;
                self.depth = 1;
                continue;
            }

            let i = self.pos;
            self.pos += 1;
            match bytes[i] {
                b'"' => {
                    self.in_string = true;
                    if self.depth == 1 && self.top_is_array {
                        self.element_start = Some(i);
                    }
                }
                b'[' | b'{' => {
                    if self.depth == 1 && self.top_is_array {
                        self.element_start = Some(i);
                    }
                    self.depth += 1;
                }
                b']' | b'}' => {
                    self.depth -= 1;
                    match self.depth {
                        0 => {
                            self.element_start = None;
                            return Some(ScanEvent::Value(self.value_start..i + 1));
                        }
                        1 if self.top_is_array => {
                            if let Some(start) = self.element_start.take() {
                                return Some(ScanEvent::Element(start..i + 1));
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Whether the scanner is between top-level values.
    pub(crate) fn is_idle(&self) -> bool {
        self.depth == 0 && !self.in_string
    }

    /// Bytes before this offset can never be part of a future value.
    pub(crate) fn discardable_prefix(&self) -> usize {
        if self.is_idle() {
            self.pos
        } else {
            self.value_start
        }
    }

    /// Shift internal offsets after the caller dropped `count` bytes from
    /// the front of its buffer. `count` must not exceed
    /// [`Self::discardable_prefix`].
    pub(crate) fn discard_prefix(&mut self, count: usize) {
        self.pos -= count;
        self.value_start = self.value_start.saturating_sub(count);
        if let Some(start) = self.element_start.as_mut() {
            *start -= count;
        }
    }
}
