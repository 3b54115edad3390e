use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::time::Instant;

use super::normalizer::Normalizer;
use crate::error::RelayError;
use crate::protocol::canonical::CanonicalEvent;

/// Bounds on how long a relayed stream may wait.
#[derive(Debug, Clone, Copy)]
pub struct StreamTimeouts {
    /// Longest gap between two upstream chunks.
    pub idle: Duration,
    /// Longest lifetime of the whole stream.
    pub total: Duration,
}

/// Logs when the client drops the stream before a terminal event. Dropping
/// the stream also drops the upstream body, which aborts the upstream call.
struct CancelGuard {
    request_id: Arc<str>,
    started: Instant,
    terminated: bool,
    text_chars: usize,
    bytes_received: u64,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis();
        if self.terminated {
            tracing::info!(
                request_id = %self.request_id,
                elapsed_ms,
                text_chars = self.text_chars,
                bytes_received = self.bytes_received,
                "relay stream finished"
            );
        } else {
            tracing::info!(
                request_id = %self.request_id,
                elapsed_ms,
                bytes_received = self.bytes_received,
                "client disconnected before the stream finished; upstream request cancelled"
            );
        }
    }
}

struct DriverState<S> {
    upstream: Pin<Box<S>>,
    normalizer: Normalizer,
    pending: VecDeque<CanonicalEvent>,
    scratch: Vec<CanonicalEvent>,
    timeouts: StreamTimeouts,
    deadline: Instant,
    guard: CancelGuard,
}

impl<S, E> DriverState<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<RelayError>,
{
    /// One read, processed synchronously into zero or more events.
    async fn pump(&mut self) {
        let idle_deadline = Instant::now() + self.timeouts.idle;
        let total_bound = self.deadline <= idle_deadline;
        let wait_until = if total_bound {
            self.deadline
        } else {
            idle_deadline
        };

        match tokio::time::timeout_at(wait_until, self.upstream.next()).await {
            Ok(Some(Ok(chunk))) => self.normalizer.feed_into(&chunk, &mut self.scratch),
            Ok(Some(Err(err))) => {
                let err: RelayError = err.into();
                self.normalizer.fail_into(&err, &mut self.scratch);
            }
            Ok(None) => self.normalizer.finalize_into(&mut self.scratch),
            Err(_) => {
                let detail = if total_bound {
                    format!("stream exceeded {}s", self.timeouts.total.as_secs_f32())
                } else {
                    format!("no data for {}s", self.timeouts.idle.as_secs_f32())
                };
                tracing::warn!(
                    request_id = %self.guard.request_id,
                    detail = %detail,
                    "upstream read timed out"
                );
                self.normalizer
                    .fail_into(&RelayError::Timeout(detail), &mut self.scratch);
            }
        }
        self.guard.bytes_received = self.normalizer.bytes_received();
        self.pending.extend(self.scratch.drain(..));
    }
}

/// Drive `normalizer` over an upstream byte stream, yielding canonical events.
///
/// Reads are strictly sequential and pull-driven: nothing is read from the
/// upstream until the consumer asks for the next event. The stream ends right
/// after the terminal event, dropping the upstream.
pub fn normalize_stream<S, E>(
    upstream: S,
    normalizer: Normalizer,
    timeouts: StreamTimeouts,
) -> impl Stream<Item = CanonicalEvent> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<RelayError> + Send + 'static,
{
    let started = Instant::now();
    let guard = CancelGuard {
        request_id: Arc::from(normalizer.request_id()),
        started,
        terminated: false,
        text_chars: 0,
        bytes_received: 0,
    };
    let state = DriverState {
        upstream: Box::pin(upstream),
        normalizer,
        pending: VecDeque::new(),
        scratch: Vec::new(),
        timeouts,
        deadline: started + timeouts.total,
        guard,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                if event.is_terminal() {
                    state.guard.terminated = true;
                    state.guard.text_chars = state.normalizer.text().chars().count();
                }
                return Some((event, state));
            }
            if state.normalizer.is_finished() {
                return None;
            }
            state.pump().await;
        }
    })
}
