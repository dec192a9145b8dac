use futures::{Stream, StreamExt};
use std::fmt::Display;

use super::buffering::{CircularLineBuffer, DEFAULT_MAX_LINE_BYTES};
use crate::error::StreamError;

/// Assembles SSE lines into frames: consecutive `data:` lines are joined with
/// `\n` and a blank line dispatches the frame. Comments (`:`) and the other
/// SSE fields (`event`, `id`, `retry`) carry nothing for chat completions.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    data: Option<String>,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns the frame payload when this line completes one.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            // An empty data buffer (e.g. a bare `data:` heartbeat) is not dispatched
            return self.data.take().filter(|data| !data.is_empty());
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            match &mut self.data {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
        None
    }

    /// Dispatch a trailing frame that was not followed by a blank line
    pub fn finish(&mut self) -> Option<String> {
        self.data.take().filter(|data| !data.is_empty())
    }
}

/// Turn a chunked byte stream into SSE frame payloads.
/// A transport failure ends the stream after yielding one error.
pub fn sse_frames<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<String, StreamError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    async_stream::stream! {
        let mut byte_chunks = Box::pin(byte_stream);
        let mut buffer = CircularLineBuffer::with_capacity(8192);
        let mut decoder = SseFrameDecoder::new();

        while let Some(chunk_result) = byte_chunks.next().await {
            match chunk_result {
                Ok(bytes) => {
                    buffer.extend(bytes.as_ref());

                    while let Some(line) = buffer.next_line() {
                        if let Some(frame) = decoder.push_line(&line) {
                            yield Ok(frame);
                        }
                    }
                    if buffer.is_overflowing() {
                        yield Err(StreamError::malformed(format!(
                            "SSE line exceeds {} bytes without a terminator",
                            DEFAULT_MAX_LINE_BYTES
                        )));
                        return;
                    }
                }
                Err(e) => {
                    yield Err(StreamError::transport(format!("Stream error: {}", e)));
                    return;
                }
            }
        }

        if let Some(line) = buffer.take_remaining() {
            if let Some(frame) = decoder.push_line(&line) {
                yield Ok(frame);
            }
        }
        if let Some(frame) = decoder.finish() {
            yield Ok(frame);
        }
    }
}
