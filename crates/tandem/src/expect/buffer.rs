//! Unconsumed-output buffer for a session.
//!
//! Decoded output is appended at the end; a confirmed match consumes
//! everything up to and including it. When the unconsumed text grows past
//! the configured limit the oldest text is dropped.
//!
//! Consumed and dropped text is skipped by moving a start offset. The
//! backing string is only compacted once the dead prefix outweighs the live
//! text, so a process that floods the terminal costs amortised constant work
//! per byte rather than a shift of the whole buffer per chunk.

use std::fmt;

use super::pattern::PatternMatch;
use crate::types::MatchResult;

/// Default maximum unconsumed size (1 MB).
pub const DEFAULT_MAX_SIZE: usize = 1024 * 1024;

/// Dead prefixes shorter than this are never compacted.
const COMPACT_MIN: usize = 4096;

/// Append-only text buffer with match consumption.
#[derive(Clone)]
pub struct OutputBuffer {
    data: String,
    start: usize,
    max_size: usize,
    total_written: usize,
    bytes_discarded: usize,
    discarded_since_match: usize,
}

impl OutputBuffer {
    /// Create a new buffer holding at most `max_size` bytes of unconsumed text.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            data: String::with_capacity(max_size.min(4096)),
            start: 0,
            max_size: max_size.max(1),
            total_written: 0,
            bytes_discarded: 0,
            discarded_since_match: 0,
        }
    }

    /// Append text, returning how many bytes were discarded to make room.
    ///
    /// Discarding always happens at a character boundary, so slightly more
    /// than the overflow may be dropped.
    pub fn append(&mut self, text: &str) -> usize {
        self.total_written += text.len();
        self.data.push_str(text);

        let overflow = self.len().saturating_sub(self.max_size);
        if overflow == 0 {
            return 0;
        }

        let mut cut = self.start + overflow;
        while !self.data.is_char_boundary(cut) {
            cut += 1;
        }
        let dropped = cut - self.start;
        self.start = cut;
        self.bytes_discarded += dropped;
        self.discarded_since_match += dropped;
        self.compact();
        dropped
    }

    /// Drop the dead prefix once it is larger than the live text.
    fn compact(&mut self) {
        if self.start >= COMPACT_MIN && self.start >= self.len() {
            self.data.drain(..self.start);
            self.start = 0;
        }
    }

    /// The unconsumed text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.data[self.start..]
    }

    /// Length of the unconsumed text in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    /// Check if nothing is left unconsumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retention limit in bytes.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Total bytes of text ever appended.
    #[must_use]
    pub const fn total_written(&self) -> usize {
        self.total_written
    }

    /// Bytes dropped because the buffer overflowed.
    #[must_use]
    pub const fn bytes_discarded(&self) -> usize {
        self.bytes_discarded
    }

    /// Bytes dropped since the last match was consumed.
    ///
    /// Non-zero means the text a pending pattern would have matched may
    /// already be gone.
    #[must_use]
    pub const fn discarded_since_match(&self) -> usize {
        self.discarded_since_match
    }

    /// Consume through the end of `m`, producing the caller-facing result.
    ///
    /// `m` must have been found in the current contents of this buffer.
    pub fn consume_match(&mut self, m: PatternMatch) -> MatchResult {
        let live = self.as_str();
        let before = live[..m.start].to_string();
        let matched = live[m.start..m.end].to_string();
        self.start += m.end;
        self.discarded_since_match = 0;
        self.compact();

        MatchResult {
            index: m.index,
            matched,
            captures: m.captures,
            named: m.named,
            before,
        }
    }

    /// Take everything that is left, leaving the buffer empty.
    pub fn take(&mut self) -> String {
        let rest = self.as_str().to_string();
        self.data.clear();
        self.start = 0;
        rest
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .field("total_written", &self.total_written)
            .field("bytes_discarded", &self.bytes_discarded)
            .field("discarded_since_match", &self.discarded_since_match)
            .finish()
    }
}
