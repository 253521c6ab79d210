//! Minimal server: one route, one in-memory client request.
//!
//! Run with:
//!   cargo run --example hello-server

use std::sync::Arc;

use h2quic::frame::{Frame, FrameReader, FrameWriter, HEADER_STREAM_ID};
use h2quic::server::{Request, ResponseWriter, Router, Server, ServerConfig};
use h2quic::transport::{MemorySession, Session};
use http::header::{HeaderValue, CONTENT_TYPE};
use tokio::io::AsyncReadExt;

async fn hello(request: Request, response: ResponseWriter) {
    response
        .insert_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
        .await;
    let greeting = format!("hello from {}\n", request.uri().path());
    if let Err(err) = response.write(greeting.as_bytes()).await {
        eprintln!("write failed: {err}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (server_session, client) = MemorySession::pair();
    let server = Server::new()
        .with_handler(Router::new().route("/hello", hello))
        .with_config(ServerConfig::default().with_close_after_first_request(true));
    let connection = server.serve_session(Arc::new(server_session))?;

    let header_stream = client.get_or_open_stream(HEADER_STREAM_ID)?;
    let mut writer = FrameWriter::new(header_stream.clone());
    let mut reader = FrameReader::new(header_stream);
    let mut data_stream = client.get_or_open_stream(5)?;

    let mut encoder = fluke_hpack::Encoder::new();
    let block = encoder.encode([
        (&b":method"[..], &b"GET"[..]),
        (&b":authority"[..], &b"localhost"[..]),
        (&b":path"[..], &b"/hello"[..]),
    ]);
    writer.write_headers(5, block, true).await?;

    if let Frame::Headers(headers) = reader.read_header_block().await? {
        let mut decoder = fluke_hpack::Decoder::new();
        for (name, value) in decoder
            .decode(&headers.block)
            .map_err(|err| format!("bad response headers: {err:?}"))?
        {
            eprintln!(
                "{}: {}",
                String::from_utf8_lossy(&name),
                String::from_utf8_lossy(&value)
            );
        }
    }

    let mut body = String::new();
    data_stream.read_to_string(&mut body).await?;
    eprint!("{body}");

    // The server closes the session shortly after this request; the
    // dispatcher then stops with a read error.
    if let Err(err) = connection.join().await {
        eprintln!("dispatcher stopped: {err}");
    }
    Ok(())
}
