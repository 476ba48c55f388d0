//! Stream framing
//!
//! Turns an arbitrarily chunked byte stream into complete CoT messages. A
//! message ends at the first `</event>` or `</auth>`; everything after it
//! stays buffered until the next closing tag arrives.

use crate::error::FrameError;

const CLOSING_TAGS: [&[u8]; 2] = [b"</event>", b"</auth>"];
const LONGEST_TAG: usize = 8;

/// Per-connection framing buffer. Owned by exactly one connection worker.
#[derive(Debug)]
pub struct MessageFramer {
    buffer: Vec<u8>,
    // Bytes before this offset are known not to start a closing tag.
    scanned: usize,
    max_bytes: usize,
}

impl MessageFramer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_bytes,
        }
    }

    /// Appends `chunk` and returns every message completed by it, in stream order.
    ///
    /// Fails once the unterminated remainder grows past the configured limit.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, FrameError> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(end) = self.next_boundary() {
            let frame: Vec<u8> = self.buffer.drain(..end).collect();
            frames.push(String::from_utf8_lossy(&frame).into_owned());
            self.scanned = 0;
        }
        self.scanned = self.buffer.len().saturating_sub(LONGEST_TAG - 1);

        if self.buffer.len() > self.max_bytes {
            return Err(FrameError::Overflow {
                limit: self.max_bytes,
            });
        }

        Ok(frames)
    }

    /// Bytes waiting for a closing tag.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// End offset (exclusive) of the earliest closing tag in the buffer.
    fn next_boundary(&self) -> Option<usize> {
        let haystack = &self.buffer[self.scanned..];
        CLOSING_TAGS
            .iter()
            .filter_map(|tag| find(haystack, tag).map(|start| (start, tag.len())))
            .min_by_key(|(start, _)| *start)
            .map(|(start, len)| self.scanned + start + len)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
