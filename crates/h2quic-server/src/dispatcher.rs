use std::sync::Arc;

use h2quic_frame::stream::{is_client_initiated, is_reserved, stream_name};
use h2quic_frame::{Frame, FrameError, FrameReader, HeadersFrame};
use h2quic_transport::{Session, Substream};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::decoder::HeaderDecoder;
use crate::error::{DispatchError, RequestError, Result};
use crate::handler::Handler;
use crate::request::{build_request, Body};
use crate::response::{HeaderStreamWriter, ResponseWriter, SharedHeaderStream};
use crate::runner::{spawn_request, ActiveStreams, SessionCloser};

/// Reads one connection's header stream and turns every HEADERS frame into
/// a request.
///
/// The dispatcher task is the only owner of the connection's HPACK decoder,
/// so blocks are decoded strictly in arrival order.
pub(crate) struct Dispatcher<S: Session> {
    session: Arc<S>,
    reader: FrameReader<S::Stream>,
    decoder: HeaderDecoder,
    header_stream: SharedHeaderStream,
    handler: Arc<dyn Handler>,
    closer: Option<SessionCloser<S>>,
    tracker: TaskTracker,
    active: ActiveStreams,
}

impl<S: Session> Dispatcher<S> {
    pub(crate) fn new(
        session: Arc<S>,
        header_stream: S::Stream,
        handler: Arc<dyn Handler>,
        config: &ServerConfig,
        tracker: TaskTracker,
    ) -> Self {
        let frame_config = config.frame_config();
        let closer = config
            .close_after_first_request
            .then(|| SessionCloser::new(Arc::clone(&session), config.close_grace));

        Self {
            reader: FrameReader::with_config(header_stream.clone(), frame_config.clone()),
            header_stream: HeaderStreamWriter::new(header_stream, frame_config).shared(),
            decoder: HeaderDecoder::new(),
            session,
            handler,
            closer,
            tracker,
            active: ActiveStreams::default(),
        }
    }

    /// Serve requests until the header stream ends or fails.
    ///
    /// A clean end of stream is `Ok`; anything else is returned after being
    /// logged.
    pub(crate) async fn run(mut self) -> Result<()> {
        loop {
            match self.dispatch_next().await {
                Ok(()) => {}
                Err(DispatchError::Frame(FrameError::ConnectionClosed)) => {
                    info!(
                        requests = self.decoder.blocks_decoded(),
                        "header stream closed"
                    );
                    return Ok(());
                }
                Err(err) => {
                    error!(error = %err, "error handling h2 request");
                    return Err(err);
                }
            }
        }
    }

    async fn dispatch_next(&mut self) -> Result<()> {
        let frame = match self.reader.read_frame().await? {
            Frame::Headers(headers) => headers,
            other => {
                return Err(DispatchError::UnexpectedFrame {
                    kind: other.kind_name(),
                    stream_id: other.stream_id(),
                })
            }
        };
        if !frame.end_headers {
            return Err(DispatchError::ContinuationUnsupported {
                stream_id: frame.stream_id,
            });
        }

        // Decode before any validation so the decoder sees every block.
        let headers = self.decoder.decode(&frame.block)?;

        let admitted = validate_stream(&frame)
            .and_then(|()| build_request(&headers))
            .and_then(|request| Ok((request, self.active.claim(frame.stream_id)?)));
        let (request, claim) = match admitted {
            Ok(admitted) => admitted,
            Err(err) => {
                warn!(
                    stream_id = frame.stream_id,
                    stream = stream_name(frame.stream_id),
                    error = %err,
                    "discarding request"
                );
                return Ok(());
            }
        };

        info!(
            stream_id = frame.stream_id,
            method = %request.method(),
            authority = request.uri().authority().map(|a| a.as_str()).unwrap_or_default(),
            path = request.uri().path(),
            end_stream = frame.end_stream,
            "request"
        );

        let data_stream = self.session.get_or_open_stream(frame.stream_id)?;
        if frame.end_stream {
            data_stream.close_remote();
        }

        let request = request.map(|()| Body::new(data_stream.clone()));
        let response =
            ResponseWriter::new(frame.stream_id, data_stream, Arc::clone(&self.header_stream));

        spawn_request(
            &self.tracker,
            Arc::clone(&self.handler),
            request,
            response,
            claim,
            self.closer.clone(),
        );
        debug!(stream_id = frame.stream_id, in_flight = self.active.len(), "request dispatched");
        Ok(())
    }
}

/// Requests travel on client-initiated streams above the reserved range.
fn validate_stream(frame: &HeadersFrame) -> std::result::Result<(), RequestError> {
    if is_reserved(frame.stream_id) || !is_client_initiated(frame.stream_id) {
        return Err(RequestError::InvalidStream(frame.stream_id));
    }
    Ok(())
}
