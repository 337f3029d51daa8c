use std::path::PathBuf;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] knobs_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] knobs_frame::FrameError),

    /// A channel needs at least one knob.
    #[error("knob capacity must be greater than zero")]
    InvalidCapacity,

    /// Knob index outside the current buffer.
    #[error("knob index {index} out of bounds (capacity {capacity})")]
    IndexOutOfBounds { index: usize, capacity: usize },

    /// The background receiver thread could not be started.
    #[error("failed to spawn receiver thread: {0}")]
    Spawn(std::io::Error),

    /// Configuration could not be parsed.
    #[error("invalid channel config: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ChannelError>;
