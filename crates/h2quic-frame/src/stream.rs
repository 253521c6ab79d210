//! Reserved stream ids.
//!
//! Streams 1 and 3 are reserved by the session for the handshake and for
//! header records. Request/response bodies travel on client-initiated
//! (odd) streams from 5 upwards.

use h2quic_transport::StreamId;

/// Handshake stream, owned by the transport.
pub const CRYPTO_STREAM_ID: StreamId = 1;

/// Header stream: carries only HPACK-compressed header frames.
pub const HEADER_STREAM_ID: StreamId = 3;

/// Returns a human-readable name for a stream id.
pub fn stream_name(id: StreamId) -> &'static str {
    match id {
        CRYPTO_STREAM_ID => "CRYPTO",
        HEADER_STREAM_ID => "HEADERS",
        0 | 2 => "RESERVED",
        _ => "DATA",
    }
}

/// Returns true if the id can never carry a request body.
pub fn is_reserved(id: StreamId) -> bool {
    id <= HEADER_STREAM_ID
}

/// Returns true if the id belongs to a client-initiated stream.
pub fn is_client_initiated(id: StreamId) -> bool {
    id % 2 == 1
}
