//! Wire packets exchanged over the message fabric (§3/§6): `varint type`,
//! `varint version`, then kind-specific fields, all via the canonical codec.

use carapace_core::codec::{Reader, Writer};
use carapace_core::constants::MAXIMUM_PEERS_EXCHANGED;
use carapace_core::error::{CoreError, CoreResult};
use carapace_core::types::Hash;

pub const TAG_HANDSHAKE: u64 = 1000;
pub const TAG_PEER_EXCHANGE: u64 = 1001;
pub const TAG_KEEPALIVE: u64 = 1002;
pub const TAG_DATA: u64 = 2000;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    fn write(&self, w: &mut Writer) {
        w.write_bytes(self.host.as_bytes());
        w.write_varint(self.port as u64);
    }

    fn read(r: &mut Reader<'_>) -> CoreResult<Self> {
        let host_bytes = r.read_bytes()?;
        let host = String::from_utf8(host_bytes).map_err(|e| CoreError::Deserialization(e.to_string()))?;
        let port = r.read_varint()? as u16;
        Ok(Self { host, port })
    }

    fn write_list(w: &mut Writer, peers: &[PeerAddr]) {
        w.write_sequence_len(peers.len());
        for peer in peers {
            peer.write(w);
        }
    }

    fn read_list(r: &mut Reader<'_>) -> CoreResult<Vec<PeerAddr>> {
        let n = r.read_sequence_len()?;
        if n > MAXIMUM_PEERS_EXCHANGED {
            return Err(CoreError::Other(format!(
                "peer list of {n} exceeds MAXIMUM_PEERS_EXCHANGED ({MAXIMUM_PEERS_EXCHANGED})"
            )));
        }
        let mut peers = Vec::with_capacity(n);
        for _ in 0..n {
            peers.push(PeerAddr::read(r)?);
        }
        Ok(peers)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Handshake {
        version: u64,
        peer_id: Hash,
        peer_port: u16,
        peers: Vec<PeerAddr>,
    },
    PeerExchange {
        version: u64,
        peer_id: Hash,
        peer_port: u16,
        peers: Vec<PeerAddr>,
    },
    Keepalive {
        version: u64,
        peer_id: Hash,
    },
    Data {
        version: u64,
        network_id: Hash,
        payload: Vec<u8>,
    },
}

impl Packet {
    pub fn tag(&self) -> u64 {
        match self {
            Packet::Handshake { .. } => TAG_HANDSHAKE,
            Packet::PeerExchange { .. } => TAG_PEER_EXCHANGE,
            Packet::Keepalive { .. } => TAG_KEEPALIVE,
            Packet::Data { .. } => TAG_DATA,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Packet::Handshake { version, .. }
            | Packet::PeerExchange { version, .. }
            | Packet::Keepalive { version, .. }
            | Packet::Data { version, .. } => *version,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_varint(self.tag());
        w.write_varint(self.version());
        match self {
            Packet::Handshake {
                peer_id,
                peer_port,
                peers,
                ..
            }
            | Packet::PeerExchange {
                peer_id,
                peer_port,
                peers,
                ..
            } => {
                peer_id.write(&mut w);
                w.write_varint(*peer_port as u64);
                PeerAddr::write_list(&mut w, peers);
            }
            Packet::Keepalive { peer_id, .. } => {
                peer_id.write(&mut w);
            }
            Packet::Data { network_id, payload, .. } => {
                network_id.write(&mut w);
                w.write_bytes(payload);
            }
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let mut r = Reader::new(bytes);
        let tag = r.read_varint()?;
        let version = r.read_varint()?;
        match tag {
            TAG_HANDSHAKE | TAG_PEER_EXCHANGE => {
                let peer_id = Hash::read(&mut r)?;
                let peer_port = r.read_varint()? as u16;
                let peers = PeerAddr::read_list(&mut r)?;
                if tag == TAG_HANDSHAKE {
                    Ok(Packet::Handshake {
                        version,
                        peer_id,
                        peer_port,
                        peers,
                    })
                } else {
                    Ok(Packet::PeerExchange {
                        version,
                        peer_id,
                        peer_port,
                        peers,
                    })
                }
            }
            TAG_KEEPALIVE => {
                let peer_id = Hash::read(&mut r)?;
                Ok(Packet::Keepalive { version, peer_id })
            }
            TAG_DATA => {
                let network_id = Hash::read(&mut r)?;
                let payload = r.read_bytes()?;
                Ok(Packet::Data {
                    version,
                    network_id,
                    payload,
                })
            }
            other => Err(CoreError::Deserialization(format!("unknown packet tag {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trips() {
        let packet = Packet::Handshake {
            version: 1,
            peer_id: Hash::from_bytes([7u8; 32]),
            peer_port: 12897,
            peers: vec![PeerAddr {
                host: "127.0.0.1".into(),
                port: 12897,
            }],
        };
        let bytes = packet.encode();
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn oversized_peer_list_is_rejected() {
        let peers: Vec<PeerAddr> = (0..MAXIMUM_PEERS_EXCHANGED + 1)
            .map(|i| PeerAddr {
                host: format!("10.0.0.{}", i % 255),
                port: 1,
            })
            .collect();
        let packet = Packet::PeerExchange {
            version: 1,
            peer_id: Hash::from_bytes([1u8; 32]),
            peer_port: 1,
            peers,
        };
        let bytes = packet.encode();
        assert!(Packet::decode(&bytes).is_err());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut w = Writer::new();
        w.write_varint(9999);
        w.write_varint(1);
        assert!(Packet::decode(&w.into_bytes()).is_err());
    }
}
