use std::sync::atomic::{AtomicU64, Ordering};

use crate::util::{format_hex_id, mix_u64};

/// Per-process request id source. Ids are unique within a process and do not
/// reveal the request count.
pub(crate) struct RequestIdGenerator {
    seed: u64,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            seed: fastrand::u64(..),
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format_hex_id("req_", mix_u64(self.seed ^ seq))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn ids_are_distinct_and_fixed_width() {
        let generator = RequestIdGenerator::new();
        let ids: HashSet<String> = (0..1000).map(|_| generator.next_id()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.len() == 20 && id.starts_with("req_")));
    }
}
