use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use knobs_frame::{ClampPolicy, FrameConfig, ShortReadPolicy, DEFAULT_CAPACITY};
use knobs_transport::{Connector, Endpoint, TimedEndpoint};
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

/// Channel behavior config.
///
/// Every field has a default, so a JSON config only needs the fields it
/// changes:
///
/// ```json
/// { "endpoint": { "port": 9000 }, "capacity": 16, "clamp": "clamp" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Knob server address. Default: `localhost:8008`.
    pub endpoint: Endpoint,
    /// Buffer size before the first `start`. Default: 24.
    pub capacity: usize,
    /// Partial receive handling. Default: accumulate.
    pub short_read: ShortReadPolicy,
    /// Raw values above 127. Default: pass through.
    pub clamp: ClampPolicy,
    /// Connect timeout in milliseconds. Default: none (OS default).
    pub connect_timeout_ms: Option<u64>,
    /// Receive timeout in milliseconds; a silent server for this long counts
    /// as a disconnect. Default: none (wait forever).
    pub read_timeout_ms: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            capacity: DEFAULT_CAPACITY,
            short_read: ShortReadPolicy::default(),
            clamp: ClampPolicy::default(),
            connect_timeout_ms: None,
            read_timeout_ms: None,
        }
    }
}

impl ChannelConfig {
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_short_read(mut self, policy: ShortReadPolicy) -> Self {
        self.short_read = policy;
        self
    }

    pub fn with_clamp(mut self, policy: ClampPolicy) -> Self {
        self.clamp = policy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    /// Parse a JSON config.
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ChannelError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Frame reader settings for a session of `capacity` knobs.
    pub(crate) fn frame_config(&self, capacity: usize) -> FrameConfig {
        FrameConfig {
            capacity,
            short_read: self.short_read,
            read_timeout: self.read_timeout(),
        }
    }

    /// Connector for the configured endpoint.
    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        match self.connect_timeout() {
            Some(timeout) => Arc::new(TimedEndpoint {
                endpoint: self.endpoint.clone(),
                timeout,
            }),
            None => Arc::new(self.endpoint.clone()),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
