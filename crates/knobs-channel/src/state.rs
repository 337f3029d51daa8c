use serde::Serialize;

/// Lifecycle state of a [`KnobChannel`](crate::KnobChannel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Never started.
    Idle,
    /// `start` is opening the connection.
    Connecting,
    /// Connected; the receiver is updating values.
    Running,
    /// Stopped by the owner.
    Stopped,
    /// The server closed the connection or the receive failed.
    Disconnected,
    /// The last `start` could not connect.
    Failed,
}

impl ChannelState {
    pub fn is_running(self) -> bool {
        self == ChannelState::Running
    }

    /// Running, or a `start` is still connecting.
    pub fn is_active(self) -> bool {
        matches!(self, ChannelState::Connecting | ChannelState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Idle => "idle",
            ChannelState::Connecting => "connecting",
            ChannelState::Running => "running",
            ChannelState::Stopped => "stopped",
            ChannelState::Disconnected => "disconnected",
            ChannelState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new connection and receiver were started.
    Started,
    /// The channel was already running or connecting; nothing changed.
    AlreadyRunning,
    /// `stop` was called while connecting; the new connection was closed.
    Cancelled,
}

/// Why a running channel lost its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "error", rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The server closed the stream.
    PeerClosed,
    /// The receive failed.
    Error(String),
}

/// Lifecycle notifications delivered to a channel observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected { endpoint: String },
    ConnectFailed { endpoint: String, error: String },
    Disconnected { reason: DisconnectReason },
    Stopped,
}

/// Point-in-time view of a channel, for diagnostics and UIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub state: ChannelState,
    pub endpoint: String,
    pub capacity: usize,
    pub frames_received: u64,
    pub last_error: Option<String>,
}
