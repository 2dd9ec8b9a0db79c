//! Accumulation buffer for one stream of a response.
//!
//! Raw bytes are kept as they arrived so a multi-byte character split across
//! two reads is reassembled before it is decoded.

use memchr::memmem;

use super::terminator::{Terminator, any_match};

/// Buffer for accumulating output and checking it against terminators.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    /// The accumulated output buffer.
    buffer: Vec<u8>,
}

impl ResponseBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Append a chunk.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Check the whole accumulated text against the terminators.
    pub fn matches(&self, terminators: &[Terminator]) -> bool {
        any_match(&self.buffer, terminators)
    }

    /// Cut the buffer just before the last `"\r\n" + prompt`.
    ///
    /// An occurrence at offset zero is left alone. Returns true if the buffer
    /// was shortened.
    pub fn trim_prompt_echo(&mut self, prompt: &str) -> bool {
        if prompt.is_empty() || self.buffer.is_empty() {
            return false;
        }

        let mut needle = Vec::with_capacity(prompt.len() + 2);
        needle.extend_from_slice(b"\r\n");
        needle.extend_from_slice(prompt.as_bytes());

        match memmem::rfind(&self.buffer, &needle) {
            Some(index) if index > 0 => {
                self.buffer.truncate(index);
                true
            }
            _ => false,
        }
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the buffer contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Consume the buffer into a string (lossy UTF-8 conversion).
    pub fn into_string(self) -> String {
        match String::from_utf8(self.buffer) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_extend() {
        let mut buffer = ResponseBuffer::new();
        buffer.extend(b"Hello, ");
        buffer.extend(b"world!");
        assert_eq!(buffer.as_slice(), b"Hello, world!");
        assert_eq!(buffer.len(), 13);
    }

    #[test]
    fn test_split_utf8_is_reassembled() {
        let mut buffer = ResponseBuffer::new();
        let text = "caf\u{e9}";
        let bytes = text.as_bytes();
        buffer.extend(&bytes[..4]);
        buffer.extend(&bytes[4..]);
        assert_eq!(buffer.into_string(), "caf\u{e9}");
    }

    #[test]
    fn test_matches_whole_buffer() {
        let mut buffer = ResponseBuffer::new();
        buffer.extend(b"ab");
        let terminators = Terminator::parse("^ab");
        assert!(buffer.matches(&terminators));
        buffer.extend(b"cd");
        assert!(buffer.matches(&terminators));
        assert!(!buffer.matches(&Terminator::parse("ab$")));
    }

    #[test]
    fn test_trim_prompt_echo_uses_last_occurrence() {
        let mut buffer = ResponseBuffer::new();
        buffer.extend(b"one\r\n$ two\r\n$ ");
        assert!(buffer.trim_prompt_echo("$ "));
        assert_eq!(buffer.as_str_lossy(), "one\r\n$ two");
    }

    #[test]
    fn test_trim_prompt_echo_ignores_leading_occurrence() {
        let mut buffer = ResponseBuffer::new();
        buffer.extend(b"\r\n$ ");
        assert!(!buffer.trim_prompt_echo("$ "));
        assert_eq!(buffer.as_slice(), b"\r\n$ ");
    }

    #[test]
    fn test_trim_prompt_echo_needs_prompt() {
        let mut buffer = ResponseBuffer::new();
        buffer.extend(b"out\r\nmore");
        assert!(!buffer.trim_prompt_echo(""));
        assert!(!buffer.trim_prompt_echo("> "));
        assert_eq!(buffer.as_slice(), b"out\r\nmore");
    }
}
