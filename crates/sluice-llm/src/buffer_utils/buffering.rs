use std::collections::VecDeque;

/// Longest line accepted by default; a body without newlines must not grow
/// the buffer forever.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Circular buffer for line-based parsing of a chunked byte stream.
/// Bytes arrive in arbitrary network-sized pieces; lines come out whole.
pub struct CircularLineBuffer {
    buffer: VecDeque<u8>,
    // Prefix already known to hold no '\n'
    scanned: usize,
    max_line_len: usize,
}

impl CircularLineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            scanned: 0,
            max_line_len: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Extract the next complete line without its `\n` / `\r\n` terminator.
    /// Returns None if no complete line is buffered yet. Only bytes added
    /// since the previous miss are searched.
    pub fn next_line(&mut self) -> Option<String> {
        let found = self.buffer.range(self.scanned..).position(|&b| b == b'\n');
        let newline_pos = match found {
            Some(offset) => self.scanned + offset,
            None => {
                self.scanned = self.buffer.len();
                return None;
            }
        };
        self.scanned = 0;
        let mut line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        line_bytes.pop();
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }
        Some(decode(line_bytes))
    }

    /// Drain whatever is left once the stream has ended
    pub fn take_remaining(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        self.scanned = 0;
        let mut rest: Vec<u8> = self.buffer.drain(..).collect();
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        Some(decode(rest))
    }

    /// The unterminated tail is longer than any accepted line
    pub fn is_overflowing(&self) -> bool {
        self.buffer.len() > self.max_line_len
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// Lines are only split on '\n', so multi-byte UTF-8 sequences are never cut.
// Invalid bytes from a misbehaving upstream are replaced rather than dropped,
// letting the JSON layer report the payload as malformed.
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
