use memchr::memchr;

const COMPACT_THRESHOLD_BYTES: usize = 8 * 1024;

/// Undecoded upstream bytes owned by one in-flight request.
///
/// Bytes before `read_offset` are consumed and dropped lazily, so chunk
/// boundaries never force a copy of the unconsumed tail.
#[derive(Debug, Default)]
pub(crate) struct ParseBuffer {
    bytes: Vec<u8>,
    read_offset: usize,
}

impl ParseBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Unconsumed bytes.
    pub(crate) fn pending(&self) -> &[u8] {
        &self.bytes[self.read_offset..]
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.read_offset == self.bytes.len()
    }

    /// Mark the first `count` pending bytes as consumed.
    pub(crate) fn consume(&mut self, count: usize) {
        self.read_offset = (self.read_offset + count).min(self.bytes.len());
        self.compact();
    }

    /// Pop the next complete `\n`-terminated line, without its terminator.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let pending = self.pending();
        let newline = memchr(b'\n', pending)?;
        let mut line = &pending[..newline];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        let line = String::from_utf8_lossy(line).into_owned();
        self.read_offset += newline + 1;
        Some(line)
    }

    /// Take whatever is left, used once the upstream has closed.
    pub(crate) fn take_remainder(&mut self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(self.pending()).into_owned();
        self.bytes.clear();
        self.read_offset = 0;
        Some(rest)
    }

    pub(crate) fn compact(&mut self) {
        if self.read_offset == self.bytes.len() {
            self.bytes.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.bytes.len() / 2
                || self.read_offset >= COMPACT_THRESHOLD_BYTES);
        if should_compact {
            self.bytes.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_split_across_pushes() {
        let mut buffer = ParseBuffer::default();
        buffer.push(b"data: {\"a\"");
        assert_eq!(buffer.next_line(), None);
        buffer.push(b":1}\r\ndata: [DONE]\n");
        assert_eq!(buffer.next_line().as_deref(), Some("data: {\"a\":1}"));
        assert_eq!(buffer.next_line().as_deref(), Some("data: [DONE]"));
        assert_eq!(buffer.next_line(), None);
        buffer.compact();
        assert!(buffer.is_empty());
    }

    #[test]
    fn multibyte_text_split_mid_character_is_reassembled() {
        let text = "猫\n".as_bytes();
        let mut buffer = ParseBuffer::default();
        buffer.push(&text[..1]);
        assert_eq!(buffer.next_line(), None);
        buffer.push(&text[1..]);
        assert_eq!(buffer.next_line().as_deref(), Some("猫"));
    }

    #[test]
    fn remainder_is_returned_once() {
        let mut buffer = ParseBuffer::default();
        buffer.push(b"line\npartial");
        assert_eq!(buffer.next_line().as_deref(), Some("line"));
        assert_eq!(buffer.take_remainder().as_deref(), Some("partial"));
        assert_eq!(buffer.take_remainder(), None);
    }

    #[test]
    fn consume_advances_pending_view() {
        let mut buffer = ParseBuffer::default();
        buffer.push(b"abcdef");
        buffer.consume(2);
        assert_eq!(buffer.pending(), b"cdef");
        buffer.consume(10);
        assert!(buffer.is_empty());
    }
}
