use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use arc_swap::ArcSwap;
use knobs_frame::{ClampPolicy, FrameError, FrameReader};
use knobs_transport::{Connector, KnobStream};
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::snapshot::KnobSnapshot;
use crate::state::{ChannelEvent, ChannelState, ChannelStatus, DisconnectReason, StartOutcome};

/// Callback for channel lifecycle events.
///
/// Called from the thread that caused the transition: the caller's thread
/// for start and stop, the receiver thread for disconnects.
pub type Observer = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// A live connection to a knob server.
///
/// `start` connects and launches one background receiver; the receiver
/// replaces the knob values every time a full frame arrives. `get`,
/// `get_to` and `get_range` read the latest values from any thread without
/// blocking.
///
/// ```no_run
/// use knobs_channel::{ChannelConfig, KnobChannel};
///
/// let knobs = KnobChannel::new(ChannelConfig::default());
/// if let Err(err) = knobs.start(24) {
///     eprintln!("knobs unavailable: {err}");
/// }
/// let hue = knobs.get_to(0, 360.0).unwrap_or(0.0);
/// # let _ = hue;
/// knobs.stop();
/// ```
pub struct KnobChannel {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    observer: Option<Observer>,
    shared: Arc<Shared>,
}

struct Shared {
    values: ArcSwap<KnobSnapshot>,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    state: ChannelState,
    session: u64,
    stream: Option<KnobStream>,
    capacity: usize,
    frames_received: u64,
    last_error: Option<String>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a frame if `session` is still the live one.
    ///
    /// Runs under the lifecycle lock so nothing lands after `stop` returns.
    fn publish(&self, session: u64, frame: knobs_frame::KnobFrame, clamp: ClampPolicy) -> bool {
        let mut lifecycle = self.lock();
        if lifecycle.session != session || !lifecycle.state.is_running() {
            return false;
        }
        lifecycle.frames_received += 1;
        let snapshot = KnobSnapshot::new(frame, lifecycle.frames_received, clamp);
        self.values.store(Arc::new(snapshot));
        true
    }

    /// Mark `session` disconnected. Returns false if it was already
    /// stopped or replaced.
    fn finish(&self, session: u64, reason: &DisconnectReason) -> bool {
        let mut lifecycle = self.lock();
        if lifecycle.session != session || !lifecycle.state.is_running() {
            return false;
        }
        lifecycle.state = ChannelState::Disconnected;
        lifecycle.last_error = match reason {
            DisconnectReason::PeerClosed => None,
            DisconnectReason::Error(err) => Some(err.clone()),
        };
        if let Some(stream) = lifecycle.stream.take() {
            let _ = stream.shutdown();
        }
        true
    }
}

impl KnobChannel {
    /// Create a channel that connects to `config.endpoint`.
    pub fn new(config: ChannelConfig) -> Self {
        let connector = config.connector();
        Self::build(config, connector)
    }

    /// Create a channel that opens its connection through `connector`.
    pub fn with_connector(config: ChannelConfig, connector: impl Connector + 'static) -> Self {
        Self::build(config, Arc::new(connector))
    }

    fn build(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        let snapshot = KnobSnapshot::zeroed(config.capacity, config.clamp);
        let shared = Shared {
            values: ArcSwap::from_pointee(snapshot),
            lifecycle: Mutex::new(Lifecycle {
                state: ChannelState::Idle,
                session: 0,
                stream: None,
                capacity: config.capacity,
                frames_received: 0,
                last_error: None,
            }),
        };
        Self {
            config,
            connector,
            observer: None,
            shared: Arc::new(shared),
        }
    }

    /// Install a lifecycle observer.
    pub fn with_observer(mut self, observer: impl Fn(&ChannelEvent) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Connect and start receiving `capacity` knobs per frame.
    ///
    /// Does nothing if already running or connecting. On connect failure the
    /// channel stays stopped, the error is logged, reported to the observer
    /// and returned; reads keep returning the zeroed buffer.
    ///
    /// The connect runs without the lifecycle lock, so `state`, `status` and
    /// `stop` answer immediately while it is in flight. A `stop` during the
    /// connect wins: the new stream is closed and `Cancelled` is returned.
    pub fn start(&self, capacity: usize) -> Result<StartOutcome> {
        if capacity == 0 {
            return Err(ChannelError::InvalidCapacity);
        }

        let mut lifecycle = self.shared.lock();
        if lifecycle.state.is_active() {
            debug!(state = %lifecycle.state, "knob channel already active; start ignored");
            return Ok(StartOutcome::AlreadyRunning);
        }

        lifecycle.capacity = capacity;
        lifecycle.frames_received = 0;
        lifecycle.session += 1;
        lifecycle.state = ChannelState::Connecting;
        let session = lifecycle.session;
        self.shared
            .values
            .store(Arc::new(KnobSnapshot::zeroed(capacity, self.config.clamp)));
        drop(lifecycle);

        let endpoint = self.connector.describe();
        let opened = self.connector.connect().map_err(ChannelError::from).and_then(|stream| {
            let reader_stream = stream.try_clone()?;
            let reader =
                FrameReader::with_config_stream(reader_stream, &self.config.frame_config(capacity))?;
            Ok((stream, reader))
        });

        let mut lifecycle = self.shared.lock();
        let current = lifecycle.session == session && lifecycle.state == ChannelState::Connecting;
        let (stream, reader) = match opened {
            Ok(parts) if current => parts,
            Ok((stream, _)) => {
                drop(lifecycle);
                let _ = stream.shutdown();
                debug!(%endpoint, session, "knob channel stopped while connecting");
                return Ok(StartOutcome::Cancelled);
            }
            Err(err) => {
                warn!(%endpoint, error = %err, "failed to connect to knob server");
                if !current {
                    return Err(err);
                }
                lifecycle.state = ChannelState::Failed;
                lifecycle.last_error = Some(err.to_string());
                drop(lifecycle);
                self.notify(&ChannelEvent::ConnectFailed {
                    endpoint,
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        let peer = stream.peer_label();
        lifecycle.stream = Some(stream);
        lifecycle.state = ChannelState::Running;
        lifecycle.last_error = None;
        drop(lifecycle);

        info!(%endpoint, %peer, capacity, session, "knob channel connected");
        self.notify(&ChannelEvent::Connected {
            endpoint: endpoint.clone(),
        });

        let shared = Arc::clone(&self.shared);
        let observer = self.observer.clone();
        let clamp = self.config.clamp;
        let spawned = thread::Builder::new()
            .name(format!("knobs-recv-{session}"))
            .spawn(move || receive_loop(shared, reader, session, clamp, observer));

        if let Err(err) = spawned {
            warn!(%endpoint, error = %err, "failed to spawn knob receiver");
            self.abandon_session(session, &err);
            return Err(ChannelError::Spawn(err));
        }

        Ok(StartOutcome::Started)
    }

    /// Close the connection, or cancel a connect in flight. Does nothing if
    /// not running.
    ///
    /// Does not wait for the receiver thread; it notices the closed socket
    /// and exits on its own. No frame is published after this returns.
    pub fn stop(&self) {
        let mut lifecycle = self.shared.lock();
        if !lifecycle.state.is_active() {
            return;
        }

        if let Some(stream) = lifecycle.stream.take() {
            if let Err(err) = stream.shutdown() {
                debug!(error = %err, "socket shutdown during stop failed");
            }
        }
        lifecycle.state = ChannelState::Stopped;
        drop(lifecycle);

        debug!("knob channel stopped");
        self.notify(&ChannelEvent::Stopped);
    }

    /// Knob value in `[0, 1]`.
    pub fn get(&self, index: usize) -> Result<f32> {
        self.shared.values.load().get(index)
    }

    /// Knob value in `[0, max]`.
    pub fn get_to(&self, index: usize, max: f32) -> Result<f32> {
        self.shared.values.load().get_to(index, max)
    }

    /// Knob value in `[min, max]`.
    pub fn get_range(&self, index: usize, min: f32, max: f32) -> Result<f32> {
        self.shared.values.load().get_range(index, min, max)
    }

    /// Raw byte for one knob.
    pub fn raw(&self, index: usize) -> Result<u8> {
        self.shared.values.load().raw(index)
    }

    /// The latest complete frame.
    pub fn snapshot(&self) -> Arc<KnobSnapshot> {
        self.shared.values.load_full()
    }

    /// Size of the current value buffer.
    pub fn capacity(&self) -> usize {
        self.shared.values.load().capacity()
    }

    pub fn state(&self) -> ChannelState {
        self.shared.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn status(&self) -> ChannelStatus {
        let lifecycle = self.shared.lock();
        ChannelStatus {
            state: lifecycle.state,
            endpoint: self.connector.describe(),
            capacity: lifecycle.capacity,
            frames_received: lifecycle.frames_received,
            last_error: lifecycle.last_error.clone(),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Fail a session that connected but has no receiver. The observer
    /// already saw `Connected`, so it gets a matching `Disconnected`.
    fn abandon_session(&self, session: u64, err: &std::io::Error) {
        let mut lifecycle = self.shared.lock();
        if lifecycle.session != session || !lifecycle.state.is_running() {
            return;
        }
        if let Some(stream) = lifecycle.stream.take() {
            let _ = stream.shutdown();
        }
        lifecycle.state = ChannelState::Failed;
        lifecycle.last_error = Some(err.to_string());
        drop(lifecycle);

        self.notify(&ChannelEvent::Disconnected {
            reason: DisconnectReason::Error(err.to_string()),
        });
    }

    fn notify(&self, event: &ChannelEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }
}

impl Default for KnobChannel {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl Drop for KnobChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for KnobChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnobChannel")
            .field("endpoint", &self.connector.describe())
            .field("state", &self.state())
            .finish()
    }
}

fn receive_loop(
    shared: Arc<Shared>,
    mut reader: FrameReader<KnobStream>,
    session: u64,
    clamp: ClampPolicy,
    observer: Option<Observer>,
) {
    let reason = loop {
        match reader.read_frame() {
            Ok(frame) => {
                if !shared.publish(session, frame, clamp) {
                    debug!(session, "receiver superseded; exiting");
                    let _ = reader.get_ref().shutdown();
                    return;
                }
            }
            Err(FrameError::ConnectionClosed) => break DisconnectReason::PeerClosed,
            Err(err) => break DisconnectReason::Error(err.to_string()),
        }
    };

    let _ = reader.get_ref().shutdown();
    if !shared.finish(session, &reason) {
        debug!(session, "receiver exiting after stop");
        return;
    }

    match &reason {
        DisconnectReason::PeerClosed => info!(session, "knob server closed the connection"),
        DisconnectReason::Error(err) => warn!(session, error = %err, "knob receive failed"),
    }
    if let Some(observer) = observer {
        observer(&ChannelEvent::Disconnected { reason });
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use knobs_frame::ShortReadPolicy;
    use knobs_transport::{Endpoint, KnobListener, TransportError};

    use super::*;
    use crate::server::KnobServer;

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn spawn_server(capacity: usize) -> KnobServer {
        KnobServer::spawn("127.0.0.1:0", capacity).expect("server should bind")
    }

    fn channel_for(server: &KnobServer) -> KnobChannel {
        KnobChannel::new(ChannelConfig::default().with_endpoint(server.endpoint()))
    }

    fn dead_endpoint() -> Endpoint {
        let listener = KnobListener::bind("127.0.0.1:0").expect("bind should succeed");
        Endpoint::new("127.0.0.1", listener.local_addr().port())
    }

    #[test]
    fn reads_zero_before_any_data() {
        let server = spawn_server(8);
        let channel = channel_for(&server);

        assert_eq!(channel.start(8).unwrap(), StartOutcome::Started);
        assert_eq!(channel.capacity(), 8);
        for i in 0..8 {
            assert_eq!(channel.get(i).unwrap(), 0.0);
        }
        channel.stop();
    }

    #[test]
    fn reads_before_start_use_configured_capacity() {
        let channel = KnobChannel::new(ChannelConfig::default().with_endpoint(dead_endpoint()));
        assert_eq!(channel.state(), ChannelState::Idle);
        assert_eq!(channel.capacity(), 24);
        assert_eq!(channel.get(23).unwrap(), 0.0);
    }

    #[test]
    fn full_frame_round_trips_through_normalization() {
        let server = spawn_server(5);
        let channel = channel_for(&server);
        channel.start(5).unwrap();
        assert!(wait_for(|| server.client_count() == 1));

        let sent = [0u8, 1, 63, 100, 127];
        server.set_all(&sent).unwrap();
        assert!(wait_for(|| channel.snapshot().as_bytes() == sent));

        for (i, &b) in sent.iter().enumerate() {
            let value = channel.get(i).unwrap();
            assert_eq!((value * 127.0).round() as u8, b);
        }
        assert_eq!(channel.get_range(0, -2.0, 6.0).unwrap(), -2.0);
        assert_eq!(channel.get_range(4, -2.0, 6.0).unwrap(), 6.0);
        assert_eq!(channel.get_to(4, 360.0).unwrap(), 360.0);
        assert_eq!(channel.raw(2).unwrap(), 63);
    }

    #[test]
    fn start_twice_opens_one_connection() {
        let server = spawn_server(4);
        let channel = channel_for(&server);

        assert_eq!(channel.start(4).unwrap(), StartOutcome::Started);
        assert_eq!(channel.start(4).unwrap(), StartOutcome::AlreadyRunning);

        assert!(wait_for(|| server.client_count() == 1));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(server.client_count(), 1);
    }

    #[test]
    fn stop_twice_is_fine_and_freezes_values() {
        let server = spawn_server(4);
        let channel = channel_for(&server);
        channel.start(4).unwrap();
        assert!(wait_for(|| server.client_count() == 1));

        server.set_all(&[1, 2, 3, 4]).unwrap();
        assert!(wait_for(|| channel.snapshot().as_bytes() == [1, 2, 3, 4]));
        let before = channel.snapshot().sequence();

        channel.stop();
        channel.stop();
        assert_eq!(channel.state(), ChannelState::Stopped);

        let _ = server.set_all(&[9, 9, 9, 9]);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(channel.snapshot().as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(channel.snapshot().sequence(), before);
    }

    #[test]
    fn index_past_capacity_is_rejected() {
        let server = spawn_server(3);
        let channel = channel_for(&server);
        channel.start(3).unwrap();

        let err = channel.get(3).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::IndexOutOfBounds {
                index: 3,
                capacity: 3
            }
        ));
        assert!(channel.get_range(usize::MAX, 0.0, 1.0).is_err());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let channel = KnobChannel::new(ChannelConfig::default().with_endpoint(dead_endpoint()));
        assert!(matches!(
            channel.start(0),
            Err(ChannelError::InvalidCapacity)
        ));
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn connect_failure_leaves_channel_stopped() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let channel = KnobChannel::new(ChannelConfig::default().with_endpoint(dead_endpoint()))
            .with_observer(move |event| sink.lock().unwrap().push(event.clone()));

        let err = channel.start(6).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Transport(TransportError::Connect { .. })
        ));
        assert_eq!(channel.state(), ChannelState::Failed);
        assert!(!channel.is_running());
        assert_eq!(channel.get(5).unwrap(), 0.0);

        let status = channel.status();
        assert_eq!(status.capacity, 6);
        assert!(status.last_error.is_some());

        let events = events.lock().unwrap();
        assert!(matches!(events.as_slice(), [ChannelEvent::ConnectFailed { .. }]));
    }

    #[test]
    fn server_close_clears_running_and_allows_restart() {
        let server = spawn_server(2);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let channel = channel_for(&server).with_observer(move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        channel.start(2).unwrap();
        assert!(wait_for(|| server.client_count() == 1));

        server.disconnect_clients();
        assert!(wait_for(|| channel.state() == ChannelState::Disconnected));
        assert!(!channel.is_running());

        assert_eq!(channel.start(2).unwrap(), StartOutcome::Started);
        assert!(wait_for(|| server.client_count() == 1));
        assert!(channel.is_running());

        let events = events.lock().unwrap();
        assert!(matches!(events[0], ChannelEvent::Connected { .. }));
        assert!(matches!(
            events[1],
            ChannelEvent::Disconnected {
                reason: DisconnectReason::PeerClosed
            }
        ));
        assert!(matches!(events[2], ChannelEvent::Connected { .. }));
    }

    #[test]
    fn observer_sees_connect_and_stop() {
        let server = spawn_server(2);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let channel = channel_for(&server).with_observer(move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        channel.start(2).unwrap();
        channel.stop();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ChannelEvent::Connected {
                endpoint: server.endpoint().to_string()
            }
        );
        assert_eq!(events[1], ChannelEvent::Stopped);
    }

    #[test]
    fn status_reports_frames_and_endpoint() {
        let server = spawn_server(3);
        let channel = channel_for(&server);
        channel.start(3).unwrap();
        assert!(wait_for(|| server.client_count() == 1));

        server.set(1, 50).unwrap();
        assert!(wait_for(|| channel.raw(1).unwrap() == 50));

        let status = channel.status();
        assert_eq!(status.state, ChannelState::Running);
        assert_eq!(status.endpoint, server.endpoint().to_string());
        assert!(status.frames_received >= 1);
        assert_eq!(channel.snapshot().sequence(), status.frames_received);
    }

    #[test]
    fn sampled_snapshots_are_never_torn() {
        const KNOBS: usize = 16;
        let server = spawn_server(KNOBS);
        let channel = channel_for(&server);
        channel.start(KNOBS).unwrap();
        assert!(wait_for(|| server.client_count() == 1));

        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let sampler = {
            let done = Arc::clone(&done);
            let snapshots = channel.shared.clone();
            thread::spawn(move || {
                let mut samples = 0usize;
                while !done.load(std::sync::atomic::Ordering::Acquire) {
                    let snap = snapshots.values.load_full();
                    let first = snap.as_bytes()[0];
                    assert!(
                        snap.as_bytes().iter().all(|&b| b == first),
                        "torn frame: {:?}",
                        snap.as_bytes()
                    );
                    samples += 1;
                }
                samples
            })
        };

        for value in 0..=127u8 {
            server.set_all(&[value; KNOBS]).unwrap();
        }
        assert!(wait_for(|| channel.raw(0).unwrap() == 127));

        done.store(true, std::sync::atomic::Ordering::Release);
        let samples = sampler.join().unwrap();
        assert!(samples > 0);
    }

    #[test]
    fn drop_stops_the_channel() {
        let server = spawn_server(2);
        {
            let channel = channel_for(&server);
            channel.start(2).unwrap();
            assert!(wait_for(|| server.client_count() == 1));
        }
        // The server notices the closed client on its next push.
        assert!(wait_for(|| {
            let _ = server.set(0, 1);
            server.client_count() == 0
        }));
    }

    #[cfg(unix)]
    mod injected {
        use std::io::{Read, Write};
        use std::sync::mpsc;

        use knobs_transport::Connector;

        use super::*;

        /// Hands out pre-made streams, one per connect.
        struct PairConnector {
            streams: Mutex<Vec<KnobStream>>,
        }

        impl Connector for PairConnector {
            fn connect(&self) -> knobs_transport::Result<KnobStream> {
                self.streams
                    .lock()
                    .unwrap()
                    .pop()
                    .ok_or(TransportError::Shutdown)
            }

            fn describe(&self) -> String {
                "socket-pair".to_string()
            }
        }

        /// Blocks in `connect` until the test releases it.
        struct GatedConnector {
            gate: Mutex<mpsc::Receiver<()>>,
            stream: Mutex<Option<KnobStream>>,
        }

        impl Connector for GatedConnector {
            fn connect(&self) -> knobs_transport::Result<KnobStream> {
                let _ = self.gate.lock().unwrap().recv();
                self.stream
                    .lock()
                    .unwrap()
                    .take()
                    .ok_or(TransportError::Shutdown)
            }

            fn describe(&self) -> String {
                "gated".to_string()
            }
        }

        fn gated(stream: Option<KnobStream>) -> (Arc<KnobChannel>, mpsc::Sender<()>) {
            let (release, gate) = mpsc::channel();
            let connector = GatedConnector {
                gate: Mutex::new(gate),
                stream: Mutex::new(stream),
            };
            let channel = KnobChannel::with_connector(ChannelConfig::default(), connector);
            (Arc::new(channel), release)
        }

        fn start_in_background(
            channel: &Arc<KnobChannel>,
            capacity: usize,
        ) -> thread::JoinHandle<Result<StartOutcome>> {
            let channel = Arc::clone(channel);
            thread::spawn(move || channel.start(capacity))
        }

        fn paired(config: ChannelConfig) -> (KnobChannel, KnobStream) {
            let (client, server) = KnobStream::pair().unwrap();
            let connector = PairConnector {
                streams: Mutex::new(vec![client]),
            };
            (KnobChannel::with_connector(config, connector), server)
        }

        #[test]
        fn accumulate_publishes_only_whole_frames() {
            let (channel, mut server) = paired(ChannelConfig::default());
            channel.start(4).unwrap();

            server.write_all(&[10, 20]).unwrap();
            thread::sleep(Duration::from_millis(30));
            assert_eq!(channel.snapshot().sequence(), 0);
            assert_eq!(channel.snapshot().as_bytes(), &[0, 0, 0, 0]);

            server.write_all(&[30, 40]).unwrap();
            assert!(wait_for(|| channel.snapshot().sequence() == 1));
            assert_eq!(channel.snapshot().as_bytes(), &[10, 20, 30, 40]);
        }

        #[test]
        fn overwrite_publishes_partial_frames_over_stale_bytes() {
            let config = ChannelConfig::default().with_short_read(ShortReadPolicy::Overwrite);
            let (channel, mut server) = paired(config);
            channel.start(4).unwrap();

            server.write_all(&[1, 2, 3, 4]).unwrap();
            assert!(wait_for(|| channel.snapshot().sequence() == 1));

            server.write_all(&[9]).unwrap();
            assert!(wait_for(|| channel.snapshot().sequence() == 2));
            assert_eq!(channel.snapshot().as_bytes(), &[9, 2, 3, 4]);
        }

        #[test]
        fn clamp_policy_applies_to_channel_reads() {
            let config = ChannelConfig::default().with_clamp(ClampPolicy::Clamp);
            let (channel, mut server) = paired(config);
            channel.start(2).unwrap();

            server.write_all(&[200, 255]).unwrap();
            assert!(wait_for(|| channel.snapshot().sequence() == 1));
            assert_eq!(channel.get(0).unwrap(), 1.0);
            assert_eq!(channel.get_to(1, 8.0).unwrap(), 8.0);
            assert_eq!(channel.raw(1).unwrap(), 255);
        }

        #[test]
        fn restart_zero_fills_and_resizes() {
            let (client_a, mut server_a) = KnobStream::pair().unwrap();
            let (client_b, _server_b) = KnobStream::pair().unwrap();
            let connector = PairConnector {
                streams: Mutex::new(vec![client_b, client_a]),
            };
            let channel = KnobChannel::with_connector(ChannelConfig::default(), connector);

            channel.start(2).unwrap();
            server_a.write_all(&[127, 127]).unwrap();
            assert!(wait_for(|| channel.raw(0).unwrap() == 127));
            channel.stop();
            assert_eq!(channel.raw(0).unwrap(), 127, "values survive stop");

            channel.start(3).unwrap();
            assert_eq!(channel.capacity(), 3);
            assert_eq!(channel.snapshot().as_bytes(), &[0, 0, 0]);
            assert_eq!(channel.status().endpoint, "socket-pair");
        }

        #[test]
        fn read_timeout_counts_as_disconnect() {
            let config = ChannelConfig::default().with_read_timeout(Duration::from_millis(20));
            let (channel, _server) = paired(config);
            channel.start(2).unwrap();

            assert!(wait_for(|| channel.state() == ChannelState::Disconnected));
            assert!(channel.status().last_error.is_some());
        }

        #[test]
        fn status_answers_while_connect_is_in_flight() {
            let (client, _server) = KnobStream::pair().unwrap();
            let (channel, release) = gated(Some(client));
            let starter = start_in_background(&channel, 4);
            assert!(wait_for(|| channel.state() == ChannelState::Connecting));

            let began = Instant::now();
            assert!(!channel.is_running());
            assert_eq!(channel.status().state, ChannelState::Connecting);
            assert_eq!(channel.start(4).unwrap(), StartOutcome::AlreadyRunning);
            assert_eq!(channel.get(3).unwrap(), 0.0);
            assert!(began.elapsed() < Duration::from_millis(250));

            release.send(()).unwrap();
            assert_eq!(starter.join().unwrap().unwrap(), StartOutcome::Started);
            assert!(channel.is_running());
            channel.stop();
        }

        #[test]
        fn stop_during_connect_cancels_the_start() {
            let (client, mut server) = KnobStream::pair().unwrap();
            let (channel, release) = gated(Some(client));
            let starter = start_in_background(&channel, 4);
            assert!(wait_for(|| channel.state() == ChannelState::Connecting));

            channel.stop();
            assert_eq!(channel.state(), ChannelState::Stopped);

            release.send(()).unwrap();
            assert_eq!(starter.join().unwrap().unwrap(), StartOutcome::Cancelled);
            assert_eq!(channel.state(), ChannelState::Stopped);

            // The late stream was closed and nothing reads from it.
            server.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
            let mut buf = [0u8; 1];
            assert_eq!(server.read(&mut buf).unwrap(), 0);
            assert_eq!(channel.snapshot().sequence(), 0);
        }

        #[test]
        fn failed_connect_after_stop_keeps_stopped_state() {
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&events);
            let (release, gate) = mpsc::channel();
            let connector = GatedConnector {
                gate: Mutex::new(gate),
                stream: Mutex::new(None),
            };
            let channel = Arc::new(
                KnobChannel::with_connector(ChannelConfig::default(), connector)
                    .with_observer(move |event| sink.lock().unwrap().push(event.clone())),
            );
            let starter = start_in_background(&channel, 2);
            assert!(wait_for(|| channel.state() == ChannelState::Connecting));

            channel.stop();
            release.send(()).unwrap();
            assert!(starter.join().unwrap().is_err());
            assert_eq!(channel.state(), ChannelState::Stopped);
            assert_eq!(*events.lock().unwrap(), vec![ChannelEvent::Stopped]);
        }

        #[test]
        fn abandoned_session_pairs_connected_with_disconnected() {
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&events);
            let (client, mut server) = KnobStream::pair().unwrap();
            let connector = PairConnector {
                streams: Mutex::new(vec![client]),
            };
            let channel = KnobChannel::with_connector(ChannelConfig::default(), connector)
                .with_observer(move |event| sink.lock().unwrap().push(event.clone()));
            channel.start(2).unwrap();

            let session = channel.shared.lock().session;
            let err = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no threads");
            channel.abandon_session(session, &err);

            assert_eq!(channel.state(), ChannelState::Failed);
            assert_eq!(channel.status().last_error.as_deref(), Some("no threads"));
            server.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
            let mut buf = [0u8; 1];
            assert_eq!(server.read(&mut buf).unwrap(), 0);

            let events = events.lock().unwrap();
            assert!(matches!(events[0], ChannelEvent::Connected { .. }));
            assert_eq!(
                events[1],
                ChannelEvent::Disconnected {
                    reason: DisconnectReason::Error("no threads".to_string())
                }
            );
        }
    }
}
