//! HTTP/2 framing for the header stream of a multiplexed session.
//!
//! Every frame carries the standard 9-byte HTTP/2 header:
//! - a 3-byte big-endian payload length
//! - a 1-byte frame type and a 1-byte flag set
//! - a 4-byte stream id (high bit reserved)
//!
//! Frames are surfaced as the tagged [`Frame`] enum so callers match on the
//! kind explicitly instead of narrowing a generic frame.

pub mod codec;
pub mod error;
pub mod reader;
pub mod stream;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameCodec, FrameConfig, HeadersFrame, Priority,
    DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_LEN, MAX_FRAME_SIZE_LIMIT,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use stream::{CRYPTO_STREAM_ID, HEADER_STREAM_ID};
pub use writer::FrameWriter;
