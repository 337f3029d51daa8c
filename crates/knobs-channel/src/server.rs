use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use knobs_frame::{FrameError, FrameWriter};
use knobs_transport::{Endpoint, KnobListener, KnobStream};
use tracing::{debug, info, warn};

use crate::error::{ChannelError, Result};

/// A slow client gets this long per frame before it is dropped.
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const WAKE_TIMEOUT: Duration = Duration::from_millis(200);

/// Holds the authoritative knob bytes and pushes them to connected clients.
///
/// Every client gets the current values as soon as it connects, then a full
/// frame each time a value changes.
pub struct KnobServer {
    shared: Arc<ServerShared>,
    local_addr: SocketAddr,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

struct ServerShared {
    capacity: usize,
    // Lock order: values, then clients.
    values: Mutex<Vec<u8>>,
    clients: Mutex<Vec<Client>>,
    running: AtomicBool,
    next_id: AtomicU64,
}

struct Client {
    id: u64,
    addr: SocketAddr,
    writer: FrameWriter<KnobStream>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ServerShared {
    fn register(&self, stream: KnobStream, addr: SocketAddr) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = stream.set_write_timeout(Some(CLIENT_WRITE_TIMEOUT)) {
            debug!(client_id = id, %addr, error = %err, "could not set write timeout");
        }
        let mut writer = match FrameWriter::new(stream, self.capacity) {
            Ok(writer) => writer,
            Err(err) => {
                warn!(client_id = id, %addr, error = %err, "rejecting knob client");
                return;
            }
        };

        let values = lock(&self.values);
        if let Err(err) = writer.send(&values) {
            debug!(client_id = id, %addr, error = %err, "client dropped before first frame");
            return;
        }
        lock(&self.clients).push(Client { id, addr, writer });
        drop(values);

        info!(client_id = id, %addr, "knob client connected");
    }

    /// Push `values` to every client, dropping the ones that fail.
    fn broadcast(&self, values: &[u8]) {
        lock(&self.clients).retain_mut(|client| match client.writer.send(values) {
            Ok(()) => true,
            Err(err) => {
                debug!(
                    client_id = client.id,
                    addr = %client.addr,
                    error = %err,
                    "dropping knob client"
                );
                let _ = client.writer.get_ref().shutdown();
                false
            }
        });
    }
}

impl KnobServer {
    /// Bind `addr` and serve `capacity` knobs, all starting at zero.
    pub fn spawn(addr: &str, capacity: usize) -> Result<Self> {
        Self::spawn_with_values(addr, vec![0u8; capacity])
    }

    /// Bind `addr` and serve `values`; the knob count is `values.len()`.
    pub fn spawn_with_values(addr: &str, values: Vec<u8>) -> Result<Self> {
        if values.is_empty() {
            return Err(ChannelError::InvalidCapacity);
        }

        let listener = KnobListener::bind(addr)?;
        let local_addr = listener.local_addr();
        let shared = Arc::new(ServerShared {
            capacity: values.len(),
            values: Mutex::new(values),
            clients: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        });

        let accept_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("knobs-accept".to_string())
            .spawn(move || accept_loop(listener, accept_shared))
            .map_err(ChannelError::Spawn)?;

        info!(%local_addr, capacity = shared.capacity, "knob server started");
        Ok(Self {
            shared,
            local_addr,
            accept_thread: Mutex::new(Some(handle)),
        })
    }

    /// Set one knob and push the new frame.
    pub fn set(&self, index: usize, raw: u8) -> Result<()> {
        let mut values = lock(&self.shared.values);
        let slot = values
            .get_mut(index)
            .ok_or_else(|| ChannelError::IndexOutOfBounds {
                index,
                capacity: self.shared.capacity,
            })?;
        *slot = raw;
        self.shared.broadcast(&values);
        Ok(())
    }

    /// Replace every knob and push the new frame.
    pub fn set_all(&self, raw: &[u8]) -> Result<()> {
        if raw.len() != self.shared.capacity {
            return Err(FrameError::CapacityMismatch {
                expected: self.shared.capacity,
                actual: raw.len(),
            }
            .into());
        }
        let mut values = lock(&self.shared.values);
        values.copy_from_slice(raw);
        self.shared.broadcast(&values);
        Ok(())
    }

    /// Current knob bytes.
    pub fn values(&self) -> Vec<u8> {
        lock(&self.shared.values).clone()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn client_count(&self) -> usize {
        lock(&self.shared.clients).len()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address a client on this machine should connect to.
    pub fn endpoint(&self) -> Endpoint {
        let ip = connectable_ip(self.local_addr.ip());
        Endpoint::new(ip.to_string(), self.local_addr.port())
    }

    /// Close every client connection; the server keeps accepting.
    pub fn disconnect_clients(&self) {
        let clients = std::mem::take(&mut *lock(&self.shared.clients));
        for client in &clients {
            let _ = client.writer.get_ref().shutdown();
        }
        if !clients.is_empty() {
            info!(count = clients.len(), "disconnected knob clients");
        }
    }

    /// Stop accepting, close every client and wait for the accept thread.
    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }

        // Unblock accept() with a throwaway connection.
        if let Err(err) = self.endpoint().connect(Some(WAKE_TIMEOUT)) {
            debug!(error = %err, "wake connection failed");
        }
        self.disconnect_clients();

        if let Some(handle) = lock(&self.accept_thread).take() {
            if handle.join().is_err() {
                warn!("knob accept thread panicked");
            }
        }
        info!(local_addr = %self.local_addr, "knob server stopped");
    }
}

impl Drop for KnobServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for KnobServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnobServer")
            .field("local_addr", &self.local_addr)
            .field("capacity", &self.shared.capacity)
            .field("clients", &self.client_count())
            .finish()
    }
}

fn connectable_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) if v4.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) if v6.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        other => other,
    }
}

fn accept_loop(listener: KnobListener, shared: Arc<ServerShared>) {
    while shared.running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, addr)) => {
                if !shared.running.load(Ordering::Acquire) {
                    let _ = stream.shutdown();
                    break;
                }
                shared.register(stream, addr);
            }
            Err(err) => {
                if !shared.running.load(Ordering::Acquire) {
                    break;
                }
                warn!(error = %err, "accept failed");
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
    debug!("knob accept loop exiting");
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use knobs_frame::FrameReader;

    use super::*;

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

    fn client(server: &KnobServer) -> FrameReader<KnobStream> {
        let stream = server
            .endpoint()
            .connect(Some(Duration::from_secs(1)))
            .unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        FrameReader::new(stream, server.capacity()).unwrap()
    }

    #[test]
    fn new_client_gets_current_values() {
        let server = KnobServer::spawn_with_values("127.0.0.1:0", vec![5, 6, 7]).unwrap();
        let mut reader = client(&server);
        assert_eq!(reader.read_frame().unwrap().as_bytes(), &[5, 6, 7]);
    }

    #[test]
    fn set_pushes_to_every_client() {
        let server = KnobServer::spawn("127.0.0.1:0", 3).unwrap();
        let mut first = client(&server);
        let mut second = client(&server);
        assert!(wait_for(|| server.client_count() == 2));

        server.set(1, 99).unwrap();
        for reader in [&mut first, &mut second] {
            assert_eq!(reader.read_frame().unwrap().as_bytes(), &[0, 0, 0]);
            assert_eq!(reader.read_frame().unwrap().as_bytes(), &[0, 99, 0]);
        }
        assert_eq!(server.values(), vec![0, 99, 0]);
    }

    #[test]
    fn bad_updates_are_rejected() {
        let server = KnobServer::spawn("127.0.0.1:0", 2).unwrap();
        assert!(matches!(
            server.set(2, 1),
            Err(ChannelError::IndexOutOfBounds {
                index: 2,
                capacity: 2
            })
        ));
        assert!(matches!(
            server.set_all(&[1, 2, 3]),
            Err(ChannelError::Frame(FrameError::CapacityMismatch {
                expected: 2,
                actual: 3
            }))
        ));
        assert_eq!(server.values(), vec![0, 0]);
    }

    #[test]
    fn zero_knobs_is_invalid() {
        assert!(matches!(
            KnobServer::spawn("127.0.0.1:0", 0),
            Err(ChannelError::InvalidCapacity)
        ));
    }

    #[test]
    fn disconnect_clients_closes_streams() {
        let server = KnobServer::spawn("127.0.0.1:0", 2).unwrap();
        let mut reader = client(&server);
        assert!(wait_for(|| server.client_count() == 1));
        reader.read_frame().unwrap();

        server.disconnect_clients();
        assert_eq!(server.client_count(), 0);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn shutdown_stops_accepting() {
        let server = KnobServer::spawn("127.0.0.1:0", 2).unwrap();
        let endpoint = server.endpoint();
        server.shutdown();
        server.shutdown();

        assert!(endpoint.connect(Some(Duration::from_millis(200))).is_err());
    }

    #[test]
    fn unspecified_bind_maps_to_loopback() {
        let server = KnobServer::spawn("0.0.0.0:0", 1).unwrap();
        assert_eq!(server.endpoint().host, "127.0.0.1");
        assert_eq!(server.endpoint().port, server.local_addr().port());
    }
}
