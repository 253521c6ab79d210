//! HTTP/2 request dispatch over the header stream of a multiplexed session.
//!
//! The client sends every request's header block as an HTTP/2 HEADERS frame
//! on the reserved header stream (id 3), tagged with the id of the data
//! stream that carries the request body. This crate reads those frames in
//! order, decodes them with one HPACK context per connection, and runs the
//! application [`Handler`] for each request on its own task.
//!
//! Responses travel the same way in reverse: a HEADERS frame with `:status`
//! on the header stream, body bytes on the data stream.

pub mod config;
pub mod decoder;
mod dispatcher;
pub mod error;
pub mod handler;
pub mod request;
pub mod response;
mod runner;
pub mod server;

pub use config::{ServerConfig, DEFAULT_CLOSE_GRACE};
pub use decoder::{HeaderDecoder, HeaderSet, PseudoHeaders};
pub use error::{ConfigError, DecodeError, DispatchError, RequestError, ResponseError, Result};
pub use handler::{not_found, Handler, Router};
pub use request::{build_request, Body, Request};
pub use response::ResponseWriter;
pub use server::{Connection, Server};
