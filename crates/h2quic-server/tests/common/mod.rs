#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use h2quic_frame::{Frame, FrameReader, FrameWriter, HeadersFrame, HEADER_STREAM_ID};
use h2quic_server::{Connection, Server};
use h2quic_transport::{MemorySession, MemoryStream, Session};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Client end of an in-memory session with a running server.
pub struct TestClient {
    pub session: MemorySession,
    pub server_session: Arc<MemorySession>,
    writer: FrameWriter<MemoryStream>,
    reader: FrameReader<MemoryStream>,
    encoder: fluke_hpack::Encoder<'static>,
    decoder: fluke_hpack::Decoder<'static>,
}

pub struct Response {
    pub stream_id: u32,
    pub fields: Vec<(String, String)>,
}

impl Response {
    pub fn status(&self) -> &str {
        self.get(":status").unwrap_or("")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

pub fn start(server: Server) -> (TestClient, Connection) {
    let (server_session, client_session) = MemorySession::pair();
    let server_session = Arc::new(server_session);
    let connection = server
        .serve_session(Arc::clone(&server_session))
        .expect("serve session");

    let header_stream = client_session
        .get_or_open_stream(HEADER_STREAM_ID)
        .expect("open header stream");
    let client = TestClient {
        writer: FrameWriter::new(header_stream.clone()),
        reader: FrameReader::new(header_stream),
        session: client_session,
        server_session,
        encoder: fluke_hpack::Encoder::new(),
        decoder: fluke_hpack::Decoder::new(),
    };
    (client, connection)
}

pub fn get(authority: &str, path: &str) -> Vec<(String, String)> {
    fields(&[
        (":method", "GET"),
        (":scheme", "https"),
        (":authority", authority),
        (":path", path),
    ])
}

pub fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl TestClient {
    /// Encode `fields` and send them as one HEADERS frame.
    pub async fn send(&mut self, stream_id: u32, fields: &[(String, String)], end_stream: bool) {
        let block = self.encode(fields);
        self.writer
            .write_headers(stream_id, block, end_stream)
            .await
            .expect("write request headers");
    }

    pub fn encode(&mut self, fields: &[(String, String)]) -> Vec<u8> {
        self.encoder
            .encode(fields.iter().map(|(k, v)| (k.as_bytes(), v.as_bytes())))
    }

    pub async fn send_frame(&mut self, frame: Frame) {
        self.writer.write_frame(frame).await.expect("write frame");
    }

    pub async fn send_raw_block(&mut self, stream_id: u32, block: &[u8], end_stream: bool) {
        let frame = HeadersFrame::new(stream_id, Bytes::copy_from_slice(block))
            .with_end_stream(end_stream);
        self.send_frame(frame.into()).await;
    }

    /// Read the next response header block from the header stream.
    pub async fn response(&mut self) -> Response {
        match self
            .reader
            .read_header_block()
            .await
            .expect("read response frame")
        {
            Frame::Headers(headers) => {
                let fields = self
                    .decoder
                    .decode(&headers.block)
                    .expect("decode response headers")
                    .into_iter()
                    .map(|(k, v)| {
                        (
                            String::from_utf8(k).expect("utf8 name"),
                            String::from_utf8(v).expect("utf8 value"),
                        )
                    })
                    .collect();
                Response {
                    stream_id: headers.stream_id,
                    fields,
                }
            }
            other => panic!("expected HEADERS, got {other:?}"),
        }
    }

    /// Read a response body to EOF.
    pub async fn body(&self, stream_id: u32) -> Vec<u8> {
        let mut stream = self
            .session
            .get_or_open_stream(stream_id)
            .expect("open data stream");
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.expect("read body");
        out
    }

    /// Write a request body and finish the stream.
    pub async fn send_body(&self, stream_id: u32, body: &[u8]) {
        let mut stream = self
            .session
            .get_or_open_stream(stream_id)
            .expect("open data stream");
        stream.write_all(body).await.expect("write body");
        stream.shutdown().await.expect("finish body");
    }

    /// Close the client's side of the header stream.
    pub async fn finish(&mut self) {
        self.writer
            .get_mut()
            .shutdown()
            .await
            .expect("shutdown header stream");
    }

    /// Read one more frame after the session is closed; expects nothing.
    pub async fn assert_no_more_frames(&mut self) {
        assert!(self.reader.read_frame().await.is_err());
    }
}
