use bytes::Bytes;
use futures_util::SinkExt;
use h2quic_transport::StreamId;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::codec::{Frame, FrameCodec, FrameConfig, HeadersFrame};
use crate::error::Result;

/// Writes complete frames to any `AsyncWrite` stream.
pub struct FrameWriter<T> {
    inner: FramedWrite<T, FrameCodec>,
}

impl<T: AsyncWrite + Unpin> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner: FramedWrite::new(inner, FrameCodec::new(config)),
        }
    }

    /// Write a complete frame and flush it.
    pub async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        self.inner.send(frame).await
    }

    /// Write a complete header block for `stream_id`.
    ///
    /// A block larger than the maximum frame size goes out as a HEADERS frame
    /// followed by CONTINUATION frames; the frames are flushed together.
    pub async fn write_headers(
        &mut self,
        stream_id: StreamId,
        block: impl Into<Bytes>,
        end_stream: bool,
    ) -> Result<()> {
        let mut block: Bytes = block.into();
        let max = self.config().max_frame_size.max(1);

        let first = block.split_to(max.min(block.len()));
        let headers = HeadersFrame::new(stream_id, first)
            .with_end_stream(end_stream)
            .with_end_headers(block.is_empty());
        self.inner.feed(headers.into()).await?;

        while !block.is_empty() {
            let fragment = block.split_to(max.min(block.len()));
            self.inner
                .feed(Frame::Continuation {
                    stream_id,
                    block: fragment,
                    end_headers: block.is_empty(),
                })
                .await?;
        }
        self.inner.flush().await
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        self.inner.get_ref()
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        self.inner.encoder().config()
    }
}
