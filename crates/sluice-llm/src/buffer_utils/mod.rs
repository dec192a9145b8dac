mod buffering;
mod sse_parser;

pub use buffering::{CircularLineBuffer, DEFAULT_MAX_LINE_BYTES};
pub use sse_parser::{sse_frames, SseFrameDecoder};
