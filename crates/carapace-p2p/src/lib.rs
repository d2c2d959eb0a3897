//! carapace-p2p
//!
//! The peer-to-peer message fabric: a ZeroMQ ROUTER/DEALER transport, a
//! PUB/SUB notifier pair, a persisted peer database, and the node state
//! machine that drives handshakes, keepalives, and peer exchange over them.

pub mod error;
pub mod fabric;
pub mod message;
pub mod node;
pub mod peer_db;
pub mod upnp;

pub use error::{P2pError, P2pResult};
pub use fabric::{Client, Envelope, Outbound, Publisher, Server, Subscriber};
pub use message::{Packet, PeerAddr};
pub use node::{Node, NodeConfig};
pub use peer_db::{PeerDb, PeerRecord};
pub use upnp::PortMapping;
