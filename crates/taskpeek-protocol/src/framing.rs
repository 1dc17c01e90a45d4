//! Newline framing for the request channel.
//!
//! Pipes carry a byte stream with no message boundaries: one `read()` can return half a
//! request or three of them. [`LineFramer`] buffers raw chunks and hands back complete
//! lines.

use std::collections::VecDeque;

use tracing::warn;

/// Splits a byte stream into newline-terminated request lines.
///
/// - `\n` and `\r\n` terminators are stripped.
/// - Blank lines are dropped.
/// - A line longer than `max_len` bytes is discarded up to its terminator.
/// - Invalid UTF-8 is replaced lossily; the decoder rejects such lines anyway.
#[derive(Debug)]
pub struct LineFramer
{
    buffer: Vec<u8>,
    max_len: usize,
    discarding: bool,
    dropped: usize,
    ready: VecDeque<String>,
}

impl Default for LineFramer
{
    fn default() -> Self
    {
        Self::new(Self::DEFAULT_MAX_LEN)
    }
}

impl LineFramer
{
    /// Default upper bound on a single request line, in bytes.
    pub const DEFAULT_MAX_LEN: usize = 128;

    pub fn new(max_len: usize) -> Self
    {
        Self {
            buffer: Vec::new(),
            max_len: max_len.max(1),
            discarding: false,
            dropped: 0,
            ready: VecDeque::new(),
        }
    }

    /// Feed a chunk of bytes read from the channel.
    pub fn push(&mut self, chunk: &[u8])
    {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.absorb(&rest[..pos]);
            self.complete_line();
            rest = &rest[pos + 1..];
        }
        self.absorb(rest);
    }

    /// Pop the oldest complete line.
    pub fn next_line(&mut self) -> Option<String>
    {
        self.ready.pop_front()
    }

    /// Flush an unterminated trailing fragment once the stream has ended.
    pub fn finish(&mut self) -> Option<String>
    {
        if !self.buffer.is_empty() || self.discarding {
            self.complete_line();
        }
        self.ready.pop_front()
    }

    /// Whether complete lines are waiting to be popped.
    pub fn has_line(&self) -> bool
    {
        !self.ready.is_empty()
    }

    /// Number of oversized lines dropped so far.
    pub fn dropped(&self) -> usize
    {
        self.dropped
    }

    pub fn max_len(&self) -> usize
    {
        self.max_len
    }

    fn absorb(&mut self, bytes: &[u8])
    {
        if self.discarding || bytes.is_empty() {
            return;
        }

        self.buffer.extend_from_slice(bytes);
        // A trailing `\r` may be half of a `\r\n` terminator and doesn't count yet.
        let limit = self.max_len + usize::from(self.buffer.last() == Some(&b'\r'));
        if self.buffer.len() > limit {
            warn!(
                "Discarding request line longer than {} bytes (buffered {})",
                self.max_len,
                self.buffer.len()
            );
            self.buffer.clear();
            self.discarding = true;
            self.dropped += 1;
        }
    }

    fn complete_line(&mut self)
    {
        if self.discarding {
            self.discarding = false;
            self.buffer.clear();
            return;
        }

        let mut line = std::mem::take(&mut self.buffer);
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        let text = String::from_utf8_lossy(&line);
        if !text.trim().is_empty() {
            self.ready.push_back(text.into_owned());
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn drain(framer: &mut LineFramer) -> Vec<String>
    {
        std::iter::from_fn(|| framer.next_line()).collect()
    }

    #[test]
    fn splits_multiple_lines_in_one_chunk()
    {
        let mut framer = LineFramer::default();
        framer.push(b"1000 b\n2000 b\n");
        assert_eq!(drain(&mut framer), vec!["1000 b", "2000 b"]);
    }

    #[test]
    fn joins_lines_across_chunks()
    {
        let mut framer = LineFramer::default();
        framer.push(b"10");
        assert!(!framer.has_line());
        framer.push(b"00 ");
        framer.push(b"b\r\n20");
        assert_eq!(drain(&mut framer), vec!["1000 b"]);
        framer.push(b"00 b\n");
        assert_eq!(drain(&mut framer), vec!["2000 b"]);
    }

    #[test]
    fn blank_lines_are_skipped()
    {
        let mut framer = LineFramer::default();
        framer.push(b"\n\r\n   \n1000 b\n");
        assert_eq!(drain(&mut framer), vec!["1000 b"]);
    }

    #[test]
    fn oversized_lines_are_dropped()
    {
        let mut framer = LineFramer::new(8);
        framer.push(b"0123456789abcdef");
        framer.push(b"0123 b\n1000 b\n");
        assert_eq!(drain(&mut framer), vec!["1000 b"]);
        assert_eq!(framer.dropped(), 1);
    }

    #[test]
    fn line_of_exactly_max_len_is_kept()
    {
        let mut framer = LineFramer::new(6);
        framer.push(b"1000 b\n");
        assert_eq!(drain(&mut framer), vec!["1000 b"]);
    }

    #[test]
    fn crlf_line_of_exactly_max_len_is_kept()
    {
        let mut framer = LineFramer::new(6);
        framer.push(b"1000 b\r\n");
        assert_eq!(drain(&mut framer), vec!["1000 b"]);

        // Terminator split across chunks.
        framer.push(b"2000 b\r");
        framer.push(b"\n");
        assert_eq!(drain(&mut framer), vec!["2000 b"]);
        assert_eq!(framer.dropped(), 0);

        framer.push(b"1000 b\rx\n");
        assert!(drain(&mut framer).is_empty());
        assert_eq!(framer.dropped(), 1);
    }

    #[test]
    fn finish_flushes_trailing_fragment()
    {
        let mut framer = LineFramer::default();
        framer.push(b"1000 b\n2000 b");
        assert_eq!(framer.next_line().as_deref(), Some("1000 b"));
        assert_eq!(framer.next_line(), None);
        assert_eq!(framer.finish().as_deref(), Some("2000 b"));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn invalid_utf8_is_replaced()
    {
        let mut framer = LineFramer::default();
        framer.push(b"10\xff0 b\n");
        let line = framer.next_line().unwrap();
        assert!(line.contains('\u{fffd}'));
    }
}
