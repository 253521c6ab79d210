use h2quic_frame::FrameError;
use h2quic_transport::{StreamId, TransportError};

/// Connection-fatal errors: the dispatcher stops reading the header stream.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Reading the header stream failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The session refused to open a data stream.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame other than HEADERS arrived on the header stream.
    #[error("unexpected {kind} frame on header stream (stream {stream_id})")]
    UnexpectedFrame {
        kind: &'static str,
        stream_id: StreamId,
    },

    /// A HEADERS frame arrived without END_HEADERS.
    #[error("http2 header continuation not implemented (stream {stream_id})")]
    ContinuationUnsupported { stream_id: StreamId },

    /// The header block could not be decoded; the compression context is lost.
    #[error("invalid http2 headers encoding: {0}")]
    Decode(#[from] DecodeError),

    /// The server was started with an unusable configuration.
    #[error("server config rejected: {0}")]
    Config(#[from] ConfigError),

    /// The dispatcher task panicked or was cancelled.
    #[error("dispatcher task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// HPACK decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed header block: {reason}")]
pub struct DecodeError {
    reason: String,
}

impl DecodeError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Request-local errors: the request is discarded and dispatch continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// A mandatory pseudo-header is absent or empty.
    #[error("missing or empty pseudo-header {0}")]
    MissingPseudoHeader(&'static str),

    #[error("invalid :method {0:?}")]
    InvalidMethod(String),

    #[error("invalid :scheme {0:?}")]
    InvalidScheme(String),

    #[error("invalid :authority {0:?}")]
    InvalidAuthority(String),

    #[error("invalid :path {0:?}")]
    InvalidPath(String),

    /// An ordinary header field has an invalid name or value.
    #[error("invalid header field {0:?}")]
    InvalidHeader(String),

    /// The HEADERS frame names a stream that cannot carry a request.
    #[error("stream {0} cannot carry a request")]
    InvalidStream(StreamId),

    /// The stream's previous request is still running.
    #[error("stream {0} already carries a request in flight")]
    StreamInUse(StreamId),
}

/// Errors surfaced to handlers by the response writer.
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    /// Writing the response header frame failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Writing to the data stream failed.
    #[error("response I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A previous header write failed; the peer's decoder can no longer be
    /// kept in sync.
    #[error("header stream unusable after a failed write")]
    HeaderStreamBroken,

    /// The response was already closed.
    #[error("response already closed")]
    Closed,
}

/// Invalid server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
