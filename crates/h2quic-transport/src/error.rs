/// Errors that can occur in session transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The session has been closed; no substreams can be opened.
    #[error("session closed")]
    SessionClosed,

    /// An I/O error occurred on a substream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
