//! Live knob channel.
//!
//! This is the "just works" layer. Start a [`KnobChannel`], and read knob
//! values as floats in whatever range you need, from any thread, once per
//! rendered frame or as often as you like. A background receiver keeps the
//! values current; reads never block and never see a half-written frame.
//!
//! [`KnobServer`] is the other side of the wire: it holds the authoritative
//! knob bytes and pushes them to every connected channel.

pub mod channel;
pub mod config;
pub mod error;
pub mod server;
pub mod snapshot;
pub mod state;

pub use channel::{KnobChannel, Observer};
pub use config::ChannelConfig;
pub use error::{ChannelError, Result};
pub use server::KnobServer;
pub use snapshot::KnobSnapshot;
pub use state::{ChannelEvent, ChannelState, ChannelStatus, DisconnectReason, StartOutcome};

pub use knobs_frame::{ClampPolicy, ShortReadPolicy};
pub use knobs_transport::{Connector, Endpoint};
