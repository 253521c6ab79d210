use bytes::BytesMut;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::{Frame, FrameCodec, FrameConfig};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `AsyncRead` stream.
///
/// Partial reads are buffered internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: FramedRead<T, FrameCodec>,
}

impl<T: AsyncRead + Unpin> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner: FramedRead::new(inner, FrameCodec::new(config)),
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached at a
    /// frame boundary and `Err(FrameError::Truncated)` when it is reached
    /// inside a frame.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        match self.inner.next().await {
            Some(frame) => frame,
            None => Err(FrameError::ConnectionClosed),
        }
    }

    /// Read the next frame, joining a HEADERS frame with the CONTINUATION
    /// frames that complete its header block.
    ///
    /// Other frames are returned as read. Any frame other than a CONTINUATION
    /// for the same stream inside a split block is a
    /// [`FrameError::HeaderBlockInterrupted`].
    pub async fn read_header_block(&mut self) -> Result<Frame> {
        let mut headers = match self.read_frame().await? {
            Frame::Headers(headers) if !headers.end_headers => headers,
            other => return Ok(other),
        };

        let mut block = BytesMut::from(&headers.block[..]);
        loop {
            match self.read_frame().await? {
                Frame::Continuation {
                    stream_id,
                    block: fragment,
                    end_headers,
                } if stream_id == headers.stream_id => {
                    block.extend_from_slice(&fragment);
                    if end_headers {
                        break;
                    }
                }
                other => {
                    return Err(FrameError::HeaderBlockInterrupted {
                        stream_id: headers.stream_id,
                        kind: other.kind_name(),
                    })
                }
            }
        }

        headers.block = block.freeze();
        headers.end_headers = true;
        Ok(Frame::Headers(headers))
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        self.inner.get_ref()
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Update maximum frame size for subsequent frame decoding.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.inner.decoder_mut().set_max_frame_size(max_frame_size);
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        self.inner.decoder().config()
    }
}
