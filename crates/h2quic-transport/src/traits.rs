use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Identifier of a substream within a session.
pub type StreamId = u32;

/// An ordered bidirectional byte-stream within a session.
///
/// Handles are cheap to clone; every clone refers to the same underlying
/// stream. Each direction closes independently: [`AsyncWrite::poll_shutdown`]
/// ends the local write side, [`Substream::close_remote`] ends the read side.
pub trait Substream: AsyncRead + AsyncWrite + Clone + Send + Sync + Unpin + 'static {
    /// The id this stream was opened with.
    fn stream_id(&self) -> StreamId;

    /// Treat the remote side as finished.
    ///
    /// Reads drain whatever is already buffered and then report end-of-stream.
    fn close_remote(&self);
}

/// A multiplexed transport session.
pub trait Session: Send + Sync + 'static {
    type Stream: Substream;

    /// Return the substream with `id`, opening it on first reference.
    ///
    /// Repeated calls with the same id return handles to the same stream.
    /// Safe to call concurrently.
    fn get_or_open_stream(&self, id: StreamId) -> Result<Self::Stream>;

    /// Close the session and every substream in it.
    ///
    /// `None` closes without an error reason.
    fn close(&self, reason: Option<&str>) -> Result<()>;
}
