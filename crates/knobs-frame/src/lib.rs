//! Fixed-size raw knob frames and byte-to-float scaling.
//!
//! The wire carries no header and no length: each byte is one knob, and a
//! run of `capacity` bytes is a full refresh of every knob. This crate turns
//! that byte stream into complete [`KnobFrame`]s and maps raw bytes into
//! caller-chosen float ranges.

pub mod codec;
pub mod error;
pub mod reader;
pub mod scale;
pub mod writer;

pub use codec::{decode_frame, FrameConfig, KnobFrame, ShortReadPolicy, DEFAULT_CAPACITY};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use scale::{normalize, raw_from_normalized, scale, ClampPolicy, FULL_SCALE};
pub use writer::FrameWriter;
