use std::fmt;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::KnobStream;

/// Host the knob server listens on unless configured otherwise.
pub const DEFAULT_HOST: &str = "localhost";

/// Port the knob server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8008;

/// Address of a knob server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Connect to the endpoint (blocking).
    ///
    /// Every resolved address is tried in order; the first that accepts wins.
    /// When all fail, the last connect error is returned.
    pub fn connect(&self, timeout: Option<Duration>) -> Result<KnobStream> {
        let endpoint = self.to_string();
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                endpoint: endpoint.clone(),
                source,
            })?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    // Knob frames are tiny; don't let Nagle hold them back.
                    let _ = stream.set_nodelay(true);
                    debug!(%addr, "connected to knob server");
                    return Ok(KnobStream::from_tcp(stream));
                }
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(source) => Err(TransportError::Connect { endpoint, source }),
            None => Err(TransportError::NoAddress { endpoint }),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TransportError::InvalidEndpoint(s.to_string());
        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

/// TCP listener handing out [`KnobStream`]s, used by the knob server.
pub struct KnobListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl KnobListener {
    /// Bind and listen on a TCP address such as `127.0.0.1:8008`.
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        info!(%local_addr, "listening for knob clients");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<(KnobStream, SocketAddr)> {
        let (stream, addr) = self.listener.accept().map_err(TransportError::Accept)?;
        let _ = stream.set_nodelay(true);
        debug!(%addr, "accepted knob client");
        Ok((KnobStream::from_tcp(stream), addr))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}
