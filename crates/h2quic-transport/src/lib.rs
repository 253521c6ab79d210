//! Multiplexed stream session abstraction.
//!
//! A session carries many independent, ordered, bidirectional substreams.
//! Higher layers only ever need two operations from it:
//! - get-or-open a substream by id (idempotent per id)
//! - close the whole session
//!
//! This is the lowest layer of h2quic. The [`MemorySession`] provided here is
//! a complete in-process implementation used by the server tests and the CLI.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{MemorySession, MemoryStream};
pub use traits::{Session, StreamId, Substream};
