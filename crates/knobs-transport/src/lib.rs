//! Byte-stream transport for live knob values.
//!
//! Provides the connection layer the rest of the workspace builds on:
//! - TCP endpoints (`localhost:8008` unless configured otherwise)
//! - Unix socket pairs (Linux/macOS) for in-process embedding and tests
//!
//! This is the lowest layer of knobs. Everything else reads from the
//! [`KnobStream`] type provided here.

pub mod error;
pub mod stream;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use stream::KnobStream;
pub use tcp::{Endpoint, KnobListener, DEFAULT_HOST, DEFAULT_PORT};
pub use traits::{Connector, TimedEndpoint};
