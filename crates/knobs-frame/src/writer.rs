use std::io::{ErrorKind, Write};

use crate::codec::KnobFrame;
use crate::error::{FrameError, Result};

/// Writes complete knob frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    capacity: usize,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer for frames of `capacity` knobs.
    pub fn new(inner: T, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(FrameError::ZeroCapacity);
        }
        Ok(Self { inner, capacity })
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &KnobFrame) -> Result<()> {
        self.send(frame.as_bytes())
    }

    /// Send one full set of raw values.
    pub fn send(&mut self, values: &[u8]) -> Result<()> {
        if values.len() != self.capacity {
            return Err(FrameError::CapacityMismatch {
                expected: self.capacity,
                actual: values.len(),
            });
        }

        let mut offset = 0usize;
        while offset < values.len() {
            match self.inner.write(&values[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Knobs per frame.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
