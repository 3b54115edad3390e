use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One event of the normalized outbound stream.
///
/// All `TextDelta` payloads of a request concatenate to the final text.
/// `Completed` and `Error` are terminal; exactly one of them ends a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalEvent {
    TextDelta(String),
    Completed,
    Error(String),
}

impl CanonicalEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CanonicalEvent::Completed | CanonicalEvent::Error(_))
    }
}

/// Wire shape of an upstream streaming body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamShape {
    /// The upstream re-sends one growing JSON array of increments.
    SnapshotArray,
    /// One JSON record per line, optionally behind an SSE `data:` marker.
    LineDelimited,
}

impl fmt::Display for UpstreamShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamShape::SnapshotArray => write!(f, "snapshot-array"),
            UpstreamShape::LineDelimited => write!(f, "line-delimited"),
        }
    }
}

/// Output language requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputLanguage {
    #[default]
    En,
    Zh,
}

impl OutputLanguage {
    /// Parse a caller-supplied language code (case-insensitive).
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.eq_ignore_ascii_case("en") {
            Some(OutputLanguage::En)
        } else if code.eq_ignore_ascii_case("zh") {
            Some(OutputLanguage::Zh)
        } else {
            None
        }
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            OutputLanguage::En => "en",
            OutputLanguage::Zh => "zh",
        }
    }

    /// Language name embedded in upstream instructions.
    #[must_use]
    pub fn instruction_name(self) -> &'static str {
        match self {
            OutputLanguage::En => "English",
            OutputLanguage::Zh => "Simplified Chinese",
        }
    }
}

impl fmt::Display for OutputLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A reference image attached to an optimization request.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    /// Form field (or JSON position label) the image arrived under.
    pub field: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// A validated inbound optimization request.
#[derive(Debug, Clone)]
pub struct OptimizeRequest {
    pub prompt: String,
    pub language: OutputLanguage,
    pub images: Vec<ImageAttachment>,
}
