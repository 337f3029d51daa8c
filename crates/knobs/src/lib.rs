//! Live control-knob values streamed over TCP.
//!
//! A knob server pushes one byte per knob; a [`KnobChannel`] keeps the latest
//! bytes and hands them out as floats in whatever range the caller asks for.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP endpoints, listeners and the stream type
//! - [`frame`]: raw knob frames, short-read handling and value scaling
//! - [`channel`]: the live channel and the knob server (behind `channel` feature)

/// Re-export transport types.
pub mod transport {
    pub use knobs_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use knobs_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use knobs_channel::*;
}

#[cfg(feature = "channel")]
pub use knobs_channel::{ChannelConfig, KnobChannel, KnobServer};
