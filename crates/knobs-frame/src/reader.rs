use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use knobs_transport::KnobStream;
use tracing::trace;

use crate::codec::{decode_frame, FrameConfig, KnobFrame, ShortReadPolicy};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete knob frames from any `Read` stream.
///
/// How a receive shorter than one frame is treated depends on the
/// [`ShortReadPolicy`]: accumulated until complete, or published over the
/// previous receive buffer the way the legacy clients did.
pub struct FrameReader<T> {
    inner: T,
    capacity: usize,
    policy: ShortReadPolicy,
    buf: BytesMut,
    recv_buf: Vec<u8>,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader that accumulates partial receives.
    pub fn new(inner: T, capacity: usize) -> Result<Self> {
        Self::with_policy(inner, capacity, ShortReadPolicy::default())
    }

    /// Create a new frame reader with an explicit short-read policy.
    pub fn with_policy(inner: T, capacity: usize, policy: ShortReadPolicy) -> Result<Self> {
        if capacity == 0 {
            return Err(FrameError::ZeroCapacity);
        }
        Ok(Self {
            inner,
            capacity,
            policy,
            buf: BytesMut::with_capacity(capacity.max(READ_CHUNK_SIZE)),
            recv_buf: vec![0u8; capacity],
        })
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<KnobFrame> {
        match self.policy {
            ShortReadPolicy::Accumulate => self.read_accumulated(),
            ShortReadPolicy::Overwrite => self.read_overwrite(),
        }
    }

    fn read_accumulated(&mut self) -> Result<KnobFrame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.capacity) {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.buf.is_empty() {
                    trace!(buffered = self.buf.len(), "discarding partial frame at EOF");
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    fn read_overwrite(&mut self) -> Result<KnobFrame> {
        loop {
            let read = match self.inner.read(&mut self.recv_buf) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }
            if read < self.capacity {
                trace!(read, capacity = self.capacity, "short read, keeping stale tail");
            }

            return Ok(KnobFrame::new(self.recv_buf.clone()));
        }
    }

    /// Knobs per frame.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Active short-read policy.
    pub fn policy(&self) -> ShortReadPolicy {
        self.policy
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameReader<KnobStream> {
    /// Create a frame reader for `KnobStream` and apply read timeout from config.
    pub fn with_config_stream(inner: KnobStream, config: &FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Self::with_policy(inner, config.capacity, config.short_read)
    }
}

fn transport_to_frame_error(err: knobs_transport::TransportError) -> FrameError {
    match err {
        knobs_transport::TransportError::Io(io)
        | knobs_transport::TransportError::Accept(io) => FrameError::Io(io),
        knobs_transport::TransportError::Bind { source, .. }
        | knobs_transport::TransportError::Connect { source, .. }
        | knobs_transport::TransportError::Resolve { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
