//! HTTP/2 request serving over the header stream of a multiplexed session.
//!
//! A client sends each request's HPACK header block as an HTTP/2 HEADERS
//! frame on one reserved stream of the session and the request body on a
//! data stream of its own. h2quic reads the header stream in order, builds
//! an `http::Request` per frame and runs the application's handler for it
//! concurrently.
//!
//! # Crate Structure
//!
//! - [`transport`]: session and substream abstraction, in-memory session
//! - [`frame`]: HTTP/2 frame codec and async frame reader/writer
//! - [`server`]: dispatcher, header decoding, request/response types, handlers

/// Re-export transport types.
pub mod transport {
    pub use h2quic_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use h2quic_frame::*;
}

/// Re-export server types.
pub mod server {
    pub use h2quic_server::*;
}
