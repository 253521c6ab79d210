use std::path::Path;
use std::sync::Arc;

use bytes::BytesMut;
use h2quic_frame::stream::{is_client_initiated, is_reserved};
use h2quic_frame::{decode_frame, Frame, FrameConfig, FrameReader, HEADER_STREAM_ID};
use h2quic_server::{Handler, Request, ResponseWriter, Router, Server, ServerConfig};
use h2quic_transport::{MemorySession, MemoryStream, Session, StreamId, Substream};
use http::header::{HeaderValue, CONTENT_TYPE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::cmd::{ReplayArgs, Respond};
use crate::exit::{
    config_error, dispatch_error, io_error, transport_error, CliError, CliResult, SUCCESS, USAGE,
};
use crate::output::{print_responses, OutputFormat, ResponseRecord};

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let capture =
        std::fs::read(&args.capture).map_err(|err| io_error("read capture failed", err))?;
    if capture.is_empty() {
        return Err(CliError::new(
            USAGE,
            format!("capture {} is empty", args.capture.display()),
        ));
    }

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    let server = Server::new()
        .with_config(config)
        .with_shared_handler(handler_for(args.respond));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime init failed", err))?;
    let outcome = runtime.block_on(replay(server, capture))?;

    print_responses(&outcome.responses, format);
    match outcome.result {
        Ok(()) => Ok(SUCCESS),
        Err(err) => Err(dispatch_error("replay failed", err)),
    }
}

fn load_config(path: &Path) -> CliResult<ServerConfig> {
    let text = std::fs::read_to_string(path).map_err(|err| io_error("read config failed", err))?;
    ServerConfig::from_json(&text).map_err(|err| config_error("invalid config", err))
}

fn handler_for(respond: Respond) -> Arc<dyn Handler> {
    match respond {
        Respond::NotFound => Arc::new(Router::default()),
        Respond::Echo => Arc::new(echo),
        Respond::Summary => Arc::new(summary),
    }
}

struct Outcome {
    responses: Vec<ResponseRecord>,
    result: h2quic_server::Result<()>,
}

/// Feed `capture` to a server over an in-memory session and collect what it
/// answers.
async fn replay(server: Server, capture: Vec<u8>) -> CliResult<Outcome> {
    let max_frame_size = server.config().max_frame_size;
    let (server_session, client) = MemorySession::pair();
    let server_session = Arc::new(server_session);

    // Captures hold the header stream only, so every request body is empty.
    let mut data_streams = Vec::new();
    for stream_id in request_stream_ids(&capture, max_frame_size) {
        let mut stream = client
            .get_or_open_stream(stream_id)
            .map_err(|err| transport_error("open data stream failed", err))?;
        stream
            .shutdown()
            .await
            .map_err(|err| io_error("finish request body failed", err))?;
        data_streams.push(stream);
    }

    let connection = server
        .serve_session(Arc::clone(&server_session))
        .map_err(|err| dispatch_error("serve failed", err))?;

    let mut header_stream = client
        .get_or_open_stream(HEADER_STREAM_ID)
        .map_err(|err| transport_error("open header stream failed", err))?;
    header_stream
        .write_all(&capture)
        .await
        .map_err(|err| io_error("write capture failed", err))?;
    header_stream
        .shutdown()
        .await
        .map_err(|err| io_error("finish header stream failed", err))?;
    info!(bytes = capture.len(), requests = data_streams.len(), "capture replayed");

    let result = connection.join().await;

    // Every response is buffered by now; closing lets the reads below end.
    client
        .close(None)
        .map_err(|err| transport_error("close session failed", err))?;
    let responses = collect_responses(header_stream, &data_streams, max_frame_size).await;

    Ok(Outcome { responses, result })
}

/// Stream ids of the HEADERS frames in `capture` that can carry a request.
fn request_stream_ids(capture: &[u8], max_frame_size: usize) -> Vec<StreamId> {
    let mut buf = BytesMut::from(capture);
    let mut ids = Vec::new();
    loop {
        match decode_frame(&mut buf, max_frame_size) {
            Ok(Some(Frame::Headers(headers))) => {
                let id = headers.stream_id;
                if !is_reserved(id) && is_client_initiated(id) && !ids.contains(&id) {
                    ids.push(id);
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, "capture scan stopped");
                break;
            }
        }
    }
    ids
}

async fn collect_responses(
    header_stream: MemoryStream,
    data_streams: &[MemoryStream],
    max_frame_size: usize,
) -> Vec<ResponseRecord> {
    let mut reader = FrameReader::with_config(header_stream, FrameConfig { max_frame_size });
    let mut decoder = fluke_hpack::Decoder::new();
    let mut responses = Vec::new();

    while let Ok(frame) = reader.read_header_block().await {
        let frame = match frame {
            Frame::Headers(frame) => frame,
            other => {
                warn!(kind = other.kind_name(), "unexpected response frame");
                continue;
            }
        };
        let fields = match decoder.decode(&frame.block) {
            Ok(fields) => fields,
            Err(err) => {
                warn!(stream_id = frame.stream_id, error = ?err, "undecodable response headers");
                break;
            }
        };

        let mut status = String::new();
        let mut headers = Vec::new();
        for (name, value) in fields {
            let name = String::from_utf8_lossy(&name).into_owned();
            let value = String::from_utf8_lossy(&value).into_owned();
            if name == ":status" {
                status = value;
            } else {
                headers.push((name, value));
            }
        }

        let mut body = Vec::new();
        if let Some(stream) = data_streams
            .iter()
            .find(|s| s.stream_id() == frame.stream_id)
        {
            let mut stream = stream.clone();
            if let Err(err) = stream.read_to_end(&mut body).await {
                warn!(stream_id = frame.stream_id, error = %err, "response body incomplete");
            }
        }

        responses.push(ResponseRecord {
            stream_id: frame.stream_id,
            status,
            headers,
            body: body.into(),
        });
    }
    responses
}

async fn echo(request: Request, response: ResponseWriter) {
    let content_type = request.headers().get(CONTENT_TYPE).cloned();
    let body = match request.into_body().collect().await {
        Ok(body) => body,
        Err(err) => {
            warn!(stream_id = response.stream_id(), error = %err, "failed to read request body");
            return;
        }
    };
    if let Some(content_type) = content_type {
        response.insert_header(CONTENT_TYPE, content_type).await;
    }
    if let Err(err) = response.write(&body).await {
        warn!(stream_id = response.stream_id(), error = %err, "echo failed");
    }
}

async fn summary(request: Request, response: ResponseWriter) {
    let (parts, body) = request.into_parts();
    let body_size = match body.collect().await {
        Ok(body) => body.len(),
        Err(err) => {
            warn!(stream_id = response.stream_id(), error = %err, "failed to read request body");
            0
        }
    };
    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let doc = serde_json::json!({
        "stream_id": response.stream_id(),
        "method": parts.method.as_str(),
        "uri": parts.uri.to_string(),
        "headers": headers,
        "body_size": body_size,
    });

    response
        .insert_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .await;
    if let Err(err) = response.write(doc.to_string().as_bytes()).await {
        warn!(stream_id = response.stream_id(), error = %err, "summary failed");
    }
}
