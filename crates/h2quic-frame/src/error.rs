/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame payload exceeds the configured maximum frame size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The padding length is not smaller than the remaining payload.
    #[error("{kind} frame has invalid padding")]
    InvalidPadding { kind: &'static str },

    /// The payload is shorter than its flags require.
    #[error("{kind} frame payload too short ({len} bytes)")]
    ShortPayload { kind: &'static str, len: usize },

    /// A stream-scoped frame was sent on stream 0.
    #[error("{kind} frame on stream 0")]
    ZeroStreamId { kind: &'static str },

    /// A header block split across frames was cut short by another frame.
    #[error("header block for stream {stream_id} interrupted by {kind} frame")]
    HeaderBlockInterrupted { stream_id: u32, kind: &'static str },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended in the middle of a frame.
    #[error("connection closed (incomplete frame, {buffered} bytes buffered)")]
    Truncated { buffered: usize },

    /// The stream ended cleanly at a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
