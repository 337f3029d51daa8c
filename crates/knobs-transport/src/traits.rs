use std::time::Duration;

use crate::error::Result;
use crate::stream::KnobStream;
use crate::tcp::Endpoint;

/// Something that can open a [`KnobStream`] on demand.
///
/// Channels hold a connector rather than an address so that embedders and
/// tests can supply streams from elsewhere (a socket pair, a proxy, a
/// pre-connected socket).
pub trait Connector: Send + Sync {
    /// Open a new stream (blocking).
    fn connect(&self) -> Result<KnobStream>;

    /// Short description of where this connector connects to, for logs and status.
    fn describe(&self) -> String;
}

impl Connector for Endpoint {
    fn connect(&self) -> Result<KnobStream> {
        Endpoint::connect(self, None)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

/// An [`Endpoint`] paired with a connect timeout.
#[derive(Debug, Clone)]
pub struct TimedEndpoint {
    pub endpoint: Endpoint,
    pub timeout: Duration,
}

impl Connector for TimedEndpoint {
    fn connect(&self) -> Result<KnobStream> {
        self.endpoint.connect(Some(self.timeout))
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}
