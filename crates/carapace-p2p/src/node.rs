//! The P2P node (C9): owns the ROUTER server and one DEALER client per
//! outbound connection, runs the per-remote handshake/keepalive/peer-exchange
//! state machine, and drives the connection manager and periodic broadcast
//! threads — grounded on `original_source/src/p2p/p2p_node.cpp`.
//!
//! Shutdown is cooperative: a single `running` flag flips once, every
//! worker thread observes it within one `THREAD_POLLING_INTERVAL_MS` tick
//! and exits on its own, and `Node::stop` joins them all.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use carapace_core::constants::{
    CONNECTION_MANAGER_INTERVAL_SECS, DEFAULT_CONNECTION_COUNT, KEEPALIVE_INTERVAL_SECS,
    MAXIMUM_PEERS_EXCHANGED, P2P_MINIMUM_VERSION, P2P_VERSION, PEER_EXCHANGE_INTERVAL_SECS,
};
use carapace_core::types::Hash;
use carapace_crypto::hash::domain_hash;
use tracing::{debug, trace, warn};

use crate::error::{P2pError, P2pResult};
use crate::fabric::{Client, Envelope, Outbound, Server};
use crate::message::{Packet, PeerAddr};
use crate::peer_db::{PeerDb, PeerRecord};
use crate::upnp::PortMapping;

fn host_port_key(host: &str, port: u16) -> String {
    let tag = domain_hash("p2p-dial-key", format!("{host}:{port}").as_bytes());
    hex::encode(tag.as_bytes())
}

struct OutboundConn {
    client: Client,
    host: String,
    port: u16,
}

/// Config the node is constructed with; kept intentionally small, matching
/// `Node::Node(logger, path, bind_port, seed_mode)`'s parameter list.
#[derive(Clone)]
pub struct NodeConfig {
    pub bind_port: u16,
    pub seed_mode: bool,
    pub seed_nodes: Vec<(String, u16)>,
}

pub struct Node {
    config: NodeConfig,
    zmq_ctx: zmq::Context,
    server: Mutex<Option<Server>>,
    clients: Mutex<HashMap<String, OutboundConn>>,
    peer_db: Arc<PeerDb>,
    /// Server-side: identities that have completed the HANDSHAKE exchange.
    established: Mutex<HashSet<Hash>>,
    running: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    /// Held only for its `Drop` impl, which tears down the port mapping;
    /// `None` until `start()` attempts discovery.
    port_mapping: Mutex<Option<PortMapping>>,
}

impl Node {
    pub fn new(peer_db: Arc<PeerDb>, config: NodeConfig) -> Self {
        peer_db.prune().ok();
        Self {
            config,
            zmq_ctx: zmq::Context::new(),
            server: Mutex::new(None),
            clients: Mutex::new(HashMap::new()),
            peer_db,
            established: Mutex::new(HashSet::new()),
            running: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
            port_mapping: Mutex::new(None),
        }
    }

    /// Whether a best-effort UPnP port forward for our bind port is
    /// currently active. Always `false` before `start()` and on gateways
    /// that don't support UPnP.
    pub fn upnp_active(&self) -> bool {
        self.port_mapping.lock().unwrap().as_ref().is_some_and(PortMapping::active)
    }

    pub fn peer_id(&self) -> Hash {
        self.peer_db.peer_id()
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn incoming_connections(&self) -> usize {
        self.server.lock().unwrap().as_ref().map(|s| s.connection_count()).unwrap_or(0)
    }

    pub fn outgoing_connections(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    fn build_peer_list(&self) -> Vec<PeerAddr> {
        let mut peers = self.peer_db.peers().unwrap_or_default();
        peers.truncate(MAXIMUM_PEERS_EXCHANGED);
        peers
            .into_iter()
            .map(|r| PeerAddr { host: r.ip.to_string(), port: r.port })
            .collect()
    }

    fn build_handshake(&self, server_port: u16) -> Packet {
        Packet::Handshake {
            version: P2P_VERSION,
            peer_id: self.peer_db.peer_id(),
            peer_port: server_port,
            peers: self.build_peer_list(),
        }
    }

    /// Dials `host:port`, sends our handshake, and registers the client.
    /// Matches `Node::connect`'s dedupe-by-hash and fire-handshake-first
    /// behavior.
    pub fn connect(&self, host: &str, port: u16) -> P2pResult<()> {
        let key = host_port_key(host, port);
        if self.clients.lock().unwrap().contains_key(&key) {
            return Err(P2pError::DupeConnect);
        }

        debug!(host, port, "dialing peer");
        let mut client = Client::new(&self.zmq_ctx)?;
        client.connect(host, port)?;

        let handshake = self.build_handshake(self.config.bind_port);
        client.send(handshake.encode());

        self.clients.lock().unwrap().insert(
            key,
            OutboundConn {
                client,
                host: host.to_string(),
                port,
            },
        );
        Ok(())
    }

    fn reply(&self, to: Hash, packet: &Packet) {
        if let Some(server) = self.server.lock().unwrap().as_ref() {
            server.send(Outbound { to: Some(to), payload: packet.encode() });
        }
    }

    fn broadcast(&self, packet: &Packet) {
        let payload = packet.encode();
        for conn in self.clients.lock().unwrap().values() {
            conn.client.send(payload.clone());
        }
        if let Some(server) = self.server.lock().unwrap().as_ref() {
            server.send(Outbound { to: None, payload });
        }
    }

    fn handle_envelope(&self, envelope: Envelope, is_server: bool) {
        let packet = match Packet::decode(&envelope.payload) {
            Ok(p) => p,
            Err(e) => {
                trace!(error = %e, "could not decode incoming p2p message");
                return;
            }
        };
        self.handle_packet(envelope.from, envelope.peer_address.as_deref().unwrap_or(""), packet, is_server);
    }

    fn handle_packet(&self, from: Hash, peer_address: &str, packet: Packet, is_server: bool) {
        match &packet {
            Packet::Handshake { version, peer_id, peer_port, peers } => {
                if is_server && self.established.lock().unwrap().contains(&from) {
                    warn!(?from, "duplicate handshake from established peer, protocol violation");
                    self.disconnect_server_peer(from);
                    return;
                }
                if from == self.peer_db.peer_id() || *peer_id == self.peer_db.peer_id() {
                    return;
                }
                if *version < P2P_MINIMUM_VERSION {
                    return;
                }
                if peers.len() > MAXIMUM_PEERS_EXCHANGED {
                    warn!("handshake carried too many peers, protocol violation");
                    return;
                }

                self.record_peer(peer_address, *peer_id, *peer_port);
                for peer in peers {
                    if peer.port != 0 {
                        self.record_peer(&peer.host, *peer_id, peer.port);
                    }
                }

                if is_server {
                    let reply_packet = self.build_handshake(self.config.bind_port);
                    self.reply(from, &reply_packet);
                    self.established.lock().unwrap().insert(from);
                }
            }
            Packet::PeerExchange { version, peer_id, peer_port, peers } => {
                if is_server && !self.established.lock().unwrap().contains(&from) {
                    trace!("peer exchange before handshake completed, dropping");
                    return;
                }
                if from == self.peer_db.peer_id() || *peer_id == self.peer_db.peer_id() {
                    return;
                }
                if *version < P2P_MINIMUM_VERSION {
                    return;
                }

                self.record_peer(peer_address, *peer_id, *peer_port);
                for peer in peers {
                    if peer.port != 0 {
                        self.record_peer(&peer.host, *peer_id, peer.port);
                    }
                }

                if is_server {
                    let reply_packet = Packet::PeerExchange {
                        version: P2P_VERSION,
                        peer_id: self.peer_db.peer_id(),
                        peer_port: self.config.bind_port,
                        peers: self.build_peer_list(),
                    };
                    self.reply(from, &reply_packet);
                }
            }
            Packet::Keepalive { version, peer_id } => {
                // Handshake guard:
                // a server-side peer must have completed the handshake
                // before anything else is honored.
                if is_server && !self.established.lock().unwrap().contains(&from) {
                    trace!("keepalive before handshake completed, dropping");
                    return;
                }
                if from == self.peer_db.peer_id() || *peer_id == self.peer_db.peer_id() {
                    return;
                }
                if *version < P2P_MINIMUM_VERSION {
                    return;
                }
                self.peer_db.touch(peer_id).ok();

                if !is_server {
                    return;
                }
                let reply_packet = Packet::Keepalive { version: P2P_VERSION, peer_id: self.peer_db.peer_id() };
                self.reply(from, &reply_packet);
            }
            Packet::Data { version, .. } => {
                if self.config.seed_mode {
                    return;
                }
                if is_server && !self.established.lock().unwrap().contains(&from) {
                    trace!("data packet before handshake completed, dropping");
                    return;
                }
                if from == self.peer_db.peer_id() {
                    return;
                }
                if *version < P2P_MINIMUM_VERSION {
                    return;
                }
                trace!(?from, "received data packet");
            }
        }
    }

    /// Forgets a server-side identity's ESTABLISHED state, the effect of
    /// "disconnect" on a ROUTER socket: the next packet from that identity
    /// is treated as coming from a fresh, unauthenticated peer and must
    /// re-handshake before anything else is honored.
    fn disconnect_server_peer(&self, from: Hash) {
        self.established.lock().unwrap().remove(&from);
    }

    fn record_peer(&self, address: &str, peer_id: Hash, port: u16) {
        // "Peer-Address" metadata comes back as `ip:ephemeral_port` for TCP
        // transports; we only want the host part, the listening port is
        // carried separately in the packet itself.
        let host = address.rsplit_once(':').map(|(h, _)| h).unwrap_or(address);
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let ip = match host.parse() {
            Ok(ip) => ip,
            Err(_) => return,
        };
        let record = PeerRecord { ip, port, peer_id, last_seen: now() };
        if let Err(e) = self.peer_db.add(record) {
            trace!(error = %e, "dropped peer record");
        }
    }

    fn poller(&self) {
        while self.running.load(Ordering::SeqCst) {
            if let Some(server) = self.server.lock().unwrap().as_ref() {
                while let Some(envelope) = server.try_recv() {
                    self.handle_envelope(envelope, true);
                }
            }
            let keys: Vec<String> = self.clients.lock().unwrap().keys().cloned().collect();
            for key in keys {
                let envelopes: Vec<Envelope> = {
                    let clients = self.clients.lock().unwrap();
                    let Some(conn) = clients.get(&key) else { continue };
                    std::iter::from_fn(|| conn.client.try_recv()).collect()
                };
                for envelope in envelopes {
                    self.handle_envelope(envelope, false);
                }
            }
            thread::sleep(Duration::from_millis(50));
        }
    }

    fn connection_manager(&self) {
        while self.running.load(Ordering::SeqCst) {
            let dead: Vec<String> = self
                .clients
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, c)| !c.client.connected())
                .map(|(k, _)| k.clone())
                .collect();
            for key in dead {
                self.clients.lock().unwrap().remove(&key);
            }

            let wanted = DEFAULT_CONNECTION_COUNT.saturating_sub(self.outgoing_connections());
            if wanted > 0 {
                if let Ok(candidates) = self.peer_db.sample(wanted) {
                    for candidate in candidates {
                        if candidate.peer_id == self.peer_db.peer_id() {
                            continue;
                        }
                        if let Err(e) = self.connect(&candidate.ip.to_string(), candidate.port) {
                            trace!(error = %e, "connection manager dial failed");
                        }
                    }
                }
            }

            if !sleep_cancelable(&self.running, Duration::from_secs(CONNECTION_MANAGER_INTERVAL_SECS)) {
                break;
            }
        }
    }

    fn keepalive_loop(&self) {
        while self.running.load(Ordering::SeqCst) {
            if !sleep_cancelable(&self.running, Duration::from_secs(KEEPALIVE_INTERVAL_SECS)) {
                break;
            }
            let packet = Packet::Keepalive { version: P2P_VERSION, peer_id: self.peer_db.peer_id() };
            self.broadcast(&packet);
        }
    }

    fn peer_exchange_loop(&self) {
        while self.running.load(Ordering::SeqCst) {
            if !sleep_cancelable(&self.running, Duration::from_secs(PEER_EXCHANGE_INTERVAL_SECS)) {
                break;
            }
            let packet = Packet::PeerExchange {
                version: P2P_VERSION,
                peer_id: self.peer_db.peer_id(),
                peer_port: self.config.bind_port,
                peers: self.build_peer_list(),
            };
            self.broadcast(&packet);
        }
    }

    /// Binds the server, spins up the poller, dials configured seed nodes,
    /// then (unless running in `seed_mode`, or at least one dial or an
    /// already-populated peer list succeeded) fails with
    /// `SeedConnectFailure` — matching `Node::start`'s bootstrap contract.
    pub fn start(self: &Arc<Self>) -> P2pResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let server = Server::bind(&self.zmq_ctx, self.config.bind_port)?;
        *self.server.lock().unwrap() = Some(server);
        self.running.store(true, Ordering::SeqCst);

        if let Some(local_addr) = local_ipv4() {
            let mapping = PortMapping::new(
                std::net::SocketAddrV4::new(local_addr, self.config.bind_port),
                self.config.bind_port,
            );
            if mapping.active() {
                debug!(port = self.config.bind_port, "upnp port forward active");
            }
            *self.port_mapping.lock().unwrap() = Some(mapping);
        }

        let poller_handle = spawn_loop(self.clone(), |n| n.poller());
        self.threads.lock().unwrap().push(poller_handle);

        let mut connected_to_seed = false;
        let seeds = self.config.seed_nodes.clone();
        for (host, port) in seeds {
            if self.connect(&host, port).is_ok() {
                connected_to_seed = true;
            }
        }

        if !self.config.seed_mode && !connected_to_seed && self.peer_db.count().unwrap_or(0) == 0 {
            self.running.store(false, Ordering::SeqCst);
            self.join_threads();
            return Err(P2pError::SeedConnectFailure);
        }

        self.threads.lock().unwrap().push(spawn_loop(self.clone(), |n| n.keepalive_loop()));
        self.threads.lock().unwrap().push(spawn_loop(self.clone(), |n| n.peer_exchange_loop()));
        self.threads.lock().unwrap().push(spawn_loop(self.clone(), |n| n.connection_manager()));

        Ok(())
    }

    fn join_threads(&self) {
        let mut threads = self.threads.lock().unwrap();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut server) = self.server.lock().unwrap().take() {
            server.shutdown();
        }
        self.clients.lock().unwrap().clear();
        self.join_threads();
        self.port_mapping.lock().unwrap().take();
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_loop(node: Arc<Node>, f: impl Fn(&Node) + Send + 'static) -> JoinHandle<()> {
    thread::spawn(move || f(&node))
}

/// Sleeps in small increments so shutdown is observed within one tick
/// instead of blocking for the full interval. Returns `false` if shutdown
/// fired during the sleep.
fn sleep_cancelable(running: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        thread::sleep(Duration::from_millis(50).min(deadline.saturating_duration_since(Instant::now())));
    }
    running.load(Ordering::SeqCst)
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs()
}

/// Best-effort discovery of our LAN-facing IPv4 address, used as the
/// mapping target for UPnP port forwarding. A UDP "connect" to a
/// non-routable address never sends a packet but still makes the OS pick
/// the outbound interface, which is the cheapest portable way to learn
/// this without parsing `ip addr`/`ifconfig` output.
fn local_ipv4() -> Option<std::net::Ipv4Addr> {
    use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(SocketAddr::from((Ipv4Addr::new(198, 51, 100, 1), 9))).ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(v4) => Some(v4),
        std::net::IpAddr::V6(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A `Node` with no bound server/clients — `handle_packet` only touches
    /// the peer DB and the in-memory `established` set, neither of which
    /// needs a live socket, so the state machine is testable directly.
    fn scratch_node() -> Arc<Node> {
        let dir = std::env::temp_dir().join(format!(
            "carapace-node-test-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        let env = KvEnv::open(&dir).unwrap();
        let peer_db = Arc::new(PeerDb::open(&env).unwrap());
        Arc::new(Node::new(
            peer_db,
            NodeConfig {
                bind_port: 0,
                seed_mode: false,
                seed_nodes: vec![],
            },
        ))
    }

    fn remote_handshake(peer_id: Hash) -> Packet {
        Packet::Handshake {
            version: P2P_VERSION,
            peer_id,
            peer_port: 12897,
            peers: vec![],
        }
    }

    #[test]
    fn s11_duplicate_handshake_disconnects_without_mutating_peer_list() {
        let node = scratch_node();
        let remote = Hash::from_bytes([1u8; 32]);

        node.handle_packet(remote, "203.0.113.5:1", remote_handshake(remote), true);
        assert!(node.established.lock().unwrap().contains(&remote));
        let peers_after_first = node.peer_db.peers().unwrap();

        node.handle_packet(remote, "203.0.113.5:1", remote_handshake(remote), true);
        assert!(
            !node.established.lock().unwrap().contains(&remote),
            "duplicate handshake must disconnect the sender"
        );
        assert_eq!(
            node.peer_db.peers().unwrap(),
            peers_after_first,
            "duplicate handshake must not mutate the peer list"
        );
    }

    #[test]
    fn s12_data_before_handshake_is_dropped_and_sender_stays_unestablished() {
        let node = scratch_node();
        let remote = Hash::from_bytes([2u8; 32]);

        node.handle_packet(
            remote,
            "203.0.113.6:1",
            Packet::Data {
                version: P2P_VERSION,
                network_id: Hash::from_bytes([9u8; 32]),
                payload: vec![1, 2, 3],
            },
            true,
        );

        assert!(!node.established.lock().unwrap().contains(&remote));
    }

    #[test]
    fn keepalive_before_handshake_is_dropped_server_side() {
        let node = scratch_node();
        let remote = Hash::from_bytes([3u8; 32]);

        node.handle_packet(
            remote,
            "203.0.113.7:1",
            Packet::Keepalive { version: P2P_VERSION, peer_id: remote },
            true,
        );

        assert!(!node.established.lock().unwrap().contains(&remote));
        assert!(node.peer_db.get(&remote).unwrap().is_none(), "keepalive must not touch an unestablished peer");
    }

    #[test]
    fn below_minimum_version_handshake_is_silently_dropped() {
        let node = scratch_node();
        let remote = Hash::from_bytes([4u8; 32]);

        node.handle_packet(
            remote,
            "203.0.113.8:1",
            Packet::Handshake {
                version: P2P_MINIMUM_VERSION - 1,
                peer_id: remote,
                peer_port: 12897,
                peers: vec![],
            },
            true,
        );

        assert!(!node.established.lock().unwrap().contains(&remote));
    }

    #[test]
    fn s13_empty_peer_db_and_unreachable_seeds_fails_without_seed_mode() {
        let node = scratch_node();
        assert_eq!(node.peer_db.count().unwrap(), 0);
        // Port 1 is a privileged port nothing in the sandbox listens on.
        let mut config = node.config.clone();
        config.seed_nodes = vec![("127.0.0.1".to_string(), 1)];
        let node = Arc::new(Node::new(node.peer_db.clone(), config));

        let result = node.start();
        assert!(matches!(result, Err(P2pError::SeedConnectFailure)));
        assert!(!node.running.load(Ordering::SeqCst));
    }

    #[test]
    fn s13_seed_mode_starts_despite_empty_peer_db_and_no_seeds() {
        let node = scratch_node();
        assert_eq!(node.peer_db.count().unwrap(), 0);
        let mut config = node.config.clone();
        config.seed_mode = true;
        let node = Arc::new(Node::new(node.peer_db.clone(), config));

        let result = node.start();
        assert!(result.is_ok());
        node.stop();
    }
}
