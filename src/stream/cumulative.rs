/// Outcome of offering a new full-text snapshot to [`CumulativeText`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Advance<'s> {
    /// The snapshot extends the text; carries exactly the new suffix.
    Extended(&'s str),
    /// The snapshot equals, or is a prefix of, what was already emitted.
    Stale,
    /// The snapshot disagrees with emitted text; nothing can be emitted.
    Diverged,
}

/// Text already delivered to the client for one request.
///
/// Only ever grows, and only by appending, so every delta sent downstream
/// is a suffix the client can simply concatenate.
#[derive(Debug, Default)]
pub(crate) struct CumulativeText {
    text: String,
}

impl CumulativeText {
    pub(crate) fn advance<'s>(&mut self, snapshot: &'s str) -> Advance<'s> {
        if snapshot.len() > self.text.len() && snapshot.starts_with(self.text.as_str()) {
            let delta = &snapshot[self.text.len()..];
            self.text.push_str(delta);
            Advance::Extended(delta)
        } else if self.text.starts_with(snapshot) {
            Advance::Stale
        } else {
            Advance::Diverged
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.text
    }

    pub(crate) fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growing_snapshots_yield_suffixes() {
        let mut cumulative = CumulativeText::default();
        assert_eq!(cumulative.advance("a"), Advance::Extended("a"));
        assert_eq!(
            cumulative.advance("a cat walking"),
            Advance::Extended(" cat walking")
        );
        assert_eq!(
            cumulative.advance("a cat walking, golden hour lighting"),
            Advance::Extended(", golden hour lighting")
        );
        assert_eq!(cumulative.as_str(), "a cat walking, golden hour lighting");
    }

    #[test]
    fn shorter_or_equal_snapshot_is_stale() {
        let mut cumulative = CumulativeText::default();
        cumulative.advance("hello world");
        assert_eq!(cumulative.advance("hello"), Advance::Stale);
        assert_eq!(cumulative.advance("hello world"), Advance::Stale);
        assert_eq!(cumulative.advance(""), Advance::Stale);
        assert_eq!(cumulative.as_str(), "hello world");
    }

    #[test]
    fn divergent_snapshot_leaves_text_untouched() {
        let mut cumulative = CumulativeText::default();
        cumulative.advance("a dog");
        assert_eq!(cumulative.advance("a cat sitting"), Advance::Diverged);
        assert_eq!(cumulative.as_str(), "a dog");
        assert_eq!(cumulative.advance("a dog running"), Advance::Extended(" running"));
    }

    #[test]
    fn suffix_boundaries_respect_multibyte_chars() {
        let mut cumulative = CumulativeText::default();
        cumulative.advance("一只");
        assert_eq!(cumulative.advance("一只猫"), Advance::Extended("猫"));
        assert_eq!(cumulative.char_count(), 3);
    }
}
