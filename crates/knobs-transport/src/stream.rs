use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected knob stream. Implements `Read` and `Write`.
///
/// This is the fundamental I/O type returned by transport operations.
/// Over the network it wraps a TCP stream. On Unix it can also wrap one end
/// of a socket pair, which lets an embedding process feed a channel without
/// opening a port.
pub struct KnobStream {
    inner: KnobStreamInner,
}

enum KnobStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for KnobStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            KnobStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            KnobStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for KnobStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            KnobStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            KnobStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            KnobStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            KnobStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl KnobStream {
    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: KnobStreamInner::Tcp(stream),
        }
    }

    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: KnobStreamInner::Unix(stream),
        }
    }

    /// Create a connected pair of in-process streams.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Shut down both directions of the stream.
    ///
    /// A stream the peer already closed reports `NotConnected`; that is not
    /// an error here.
    pub fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            KnobStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            KnobStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            KnobStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            KnobStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            KnobStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            KnobStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            KnobStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            #[cfg(unix)]
            KnobStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Human-readable description of the remote side, for logs.
    pub fn peer_label(&self) -> String {
        match &self.inner {
            KnobStreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:unknown".to_string()),
            #[cfg(unix)]
            KnobStreamInner::Unix(_) => "unix-pair".to_string(),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            KnobStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            KnobStreamInner::Unix(_) => "unix-socket",
        }
    }
}

impl std::fmt::Debug for KnobStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnobStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
