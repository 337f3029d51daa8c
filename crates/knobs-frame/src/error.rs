/// Errors that can occur while reading or writing knob frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// A frame must hold at least one knob.
    #[error("frame capacity must be greater than zero")]
    ZeroCapacity,

    /// A frame of the wrong size was handed to the writer.
    #[error("frame holds {actual} values, expected {expected}")]
    CapacityMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
