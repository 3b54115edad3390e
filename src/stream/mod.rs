//! Upstream stream normalization and outbound SSE encoding.

mod buffer;
mod cumulative;
pub mod driver;
pub mod normalizer;
mod notice;
pub mod sse;

pub use driver::{normalize_stream, StreamTimeouts};
pub use normalizer::{Normalizer, NormalizerOptions};
pub use sse::{encode_event, sse_ok_response};
