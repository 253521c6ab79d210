//! Response writing.
//!
//! A response is split across two streams: its header block goes to the
//! header stream as a HEADERS frame tagged with the request's stream id,
//! its body goes raw to the request's data stream.

use std::fmt;
use std::iter;
use std::sync::Arc;

use h2quic_frame::{FrameConfig, FrameWriter};
use h2quic_transport::StreamId;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ResponseError;

type BoxWrite = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// Writes response header blocks on the header stream.
///
/// One per connection. The HPACK encoder and the frame writer live behind
/// the same lock so blocks reach the peer in the order they were encoded.
pub(crate) struct HeaderStreamWriter {
    writer: FrameWriter<BoxWrite>,
    encoder: fluke_hpack::Encoder<'static>,
    broken: bool,
}

pub(crate) type SharedHeaderStream = Arc<Mutex<HeaderStreamWriter>>;

impl HeaderStreamWriter {
    pub(crate) fn new<W>(header_stream: W, config: FrameConfig) -> Self
    where
        W: AsyncWrite + Send + Sync + Unpin + 'static,
    {
        Self {
            writer: FrameWriter::with_config(Box::new(header_stream), config),
            encoder: fluke_hpack::Encoder::new(),
            broken: false,
        }
    }

    pub(crate) fn shared(self) -> SharedHeaderStream {
        Arc::new(Mutex::new(self))
    }

    async fn write_response_headers(
        &mut self,
        stream_id: StreamId,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<(), ResponseError> {
        if self.broken {
            return Err(ResponseError::HeaderStreamBroken);
        }

        let fields = iter::once((&b":status"[..], status.as_str().as_bytes())).chain(
            headers
                .iter()
                .map(|(name, value)| (name.as_str().as_bytes(), value.as_bytes())),
        );
        let block = self.encoder.encode(fields);

        // The encoder's table already holds this block; losing the frames
        // would desynchronize the peer for every later response. Stays set if
        // this future is dropped before the write completes.
        self.broken = true;
        self.writer.write_headers(stream_id, block, false).await?;
        self.broken = false;
        Ok(())
    }
}

struct ResponseState {
    headers: HeaderMap,
    status: Option<StatusCode>,
    body: BoxWrite,
    bytes_written: u64,
    closed: bool,
}

/// Response sink bound to one request.
///
/// Cheap to clone; all clones drive the same response.
#[derive(Clone)]
pub struct ResponseWriter {
    stream_id: StreamId,
    state: Arc<Mutex<ResponseState>>,
    header_stream: SharedHeaderStream,
}

impl ResponseWriter {
    pub(crate) fn new<W>(
        stream_id: StreamId,
        data_stream: W,
        header_stream: SharedHeaderStream,
    ) -> Self
    where
        W: AsyncWrite + Send + Sync + Unpin + 'static,
    {
        Self {
            stream_id,
            state: Arc::new(Mutex::new(ResponseState {
                headers: HeaderMap::new(),
                status: None,
                body: Box::new(data_stream),
                bytes_written: 0,
                closed: false,
            })),
            header_stream,
        }
    }

    /// Data stream this response is written to.
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Set a response header, replacing earlier values.
    ///
    /// Ignored once the header frame has been sent.
    pub async fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        let mut state = self.state.lock().await;
        if state.status.is_some() {
            warn!(stream_id = self.stream_id, header = %name, "header set after response headers were sent");
            return;
        }
        state.headers.insert(name, value);
    }

    /// Add a response header, keeping earlier values.
    pub async fn append_header(&self, name: HeaderName, value: HeaderValue) {
        let mut state = self.state.lock().await;
        if state.status.is_some() {
            warn!(stream_id = self.stream_id, header = %name, "header set after response headers were sent");
            return;
        }
        state.headers.append(name, value);
    }

    /// Send the header frame with `status`.
    ///
    /// Only the first call has an effect.
    pub async fn write_header(&self, status: StatusCode) -> Result<(), ResponseError> {
        let mut state = self.state.lock().await;
        if let Some(sent) = state.status {
            warn!(stream_id = self.stream_id, %sent, ignored = %status, "superfluous write_header call");
            return Ok(());
        }
        self.send_headers(&mut state, status).await
    }

    /// Write body bytes, sending a `200` header frame first if needed.
    pub async fn write(&self, data: &[u8]) -> Result<usize, ResponseError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(ResponseError::Closed);
        }
        if state.status.is_none() {
            self.send_headers(&mut state, StatusCode::OK).await?;
        }
        state.body.write_all(data).await?;
        state.bytes_written += data.len() as u64;
        Ok(data.len())
    }

    /// Send pending headers and flush the data stream.
    pub async fn flush(&self) -> Result<(), ResponseError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        if state.status.is_none() {
            self.send_headers(&mut state, StatusCode::OK).await?;
        }
        state.body.flush().await?;
        Ok(())
    }

    /// Finish the response: send headers if none were sent, then close the
    /// data stream's write side. Later calls do nothing.
    pub async fn close(&self) -> Result<(), ResponseError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        if state.status.is_none() {
            self.send_headers(&mut state, StatusCode::OK).await?;
        }
        state.body.shutdown().await?;
        debug!(
            stream_id = self.stream_id,
            bytes = state.bytes_written,
            "response closed"
        );
        Ok(())
    }

    /// Status sent so far, if any.
    pub async fn status(&self) -> Option<StatusCode> {
        self.state.lock().await.status
    }

    async fn send_headers(
        &self,
        state: &mut ResponseState,
        status: StatusCode,
    ) -> Result<(), ResponseError> {
        info!(stream_id = self.stream_id, status = status.as_u16(), headers = ?state.headers, "responding");
        self.header_stream
            .lock()
            .await
            .write_response_headers(self.stream_id, status, &state.headers)
            .await?;
        state.status = Some(status);
        Ok(())
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("stream_id", &self.stream_id)
            .finish_non_exhaustive()
    }
}
