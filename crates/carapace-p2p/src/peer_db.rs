//! The peer database (C7): address/peer-id records with liveness pruning,
//! built on the `carapace-ledger` KV façade exactly the way the stake
//! ledger and chain store are — one named sub-database plus a `local`
//! sentinel store for our own persisted `peer_id` (grounded
//! on `original_source/src/p2p/peer_database.cpp`).

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use carapace_core::constants::PEER_PRUNE_TIME_SECS;
use carapace_core::types::Hash;
use carapace_ledger::kv::{KvEnv, Store};
use serde::{Deserialize, Serialize};

use crate::error::{P2pError, P2pResult};

/// Sentinel key under the `local` sub-database holding our persisted
/// `peer_id`. Value matches `peer_database.cpp`'s `PEER_ID_IDENTIFIER`
/// constant in spirit: a fixed, well-known key distinct from any hash a
/// peer could legitimately submit.
const PEER_ID_SENTINEL: &[u8] = b"__local_peer_id__";

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub ip: IpAddr,
    pub port: u16,
    pub peer_id: Hash,
    pub last_seen: u64,
}

pub struct PeerDb {
    peerlist: Store,
    local: Store,
    peer_id: Hash,
}

impl PeerDb {
    /// Opens the peer list, loading our persisted `peer_id` or generating
    /// and persisting a fresh random one on first open, then pruning any
    /// records that have already gone stale.
    pub fn open(env: &Arc<KvEnv>) -> P2pResult<Self> {
        let peerlist = Store::open(env, "peerlist", false)?;
        let local = Store::open(env, "local", false)?;

        let peer_id = match local.get(PEER_ID_SENTINEL)? {
            Some(bytes) if bytes.len() == 32 => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Hash::from_bytes(arr)
            }
            _ => {
                let mut arr = [0u8; 32];
                rand::Rng::fill(&mut rand::thread_rng(), &mut arr);
                let fresh = Hash::from_bytes(arr);
                local.put(PEER_ID_SENTINEL, fresh.as_bytes())?;
                fresh
            }
        };

        let db = Self { peerlist, local, peer_id };
        db.prune()?;
        Ok(db)
    }

    pub fn peer_id(&self) -> Hash {
        self.peer_id
    }

    /// Rejects our own `peer_id` and records older than the liveness TTL;
    /// otherwise upserts.
    pub fn add(&self, record: PeerRecord) -> P2pResult<()> {
        if record.peer_id == self.peer_id {
            return Err(P2pError::ProtocolViolation("refusing to add our own peer_id".into()));
        }
        let prune_before = now().saturating_sub(PEER_PRUNE_TIME_SECS);
        if record.last_seen < prune_before {
            return Err(P2pError::ProtocolViolation("peer record is already stale".into()));
        }
        let value = bincode::serialize(&record).map_err(|e| P2pError::Codec(e.to_string()))?;
        self.peerlist.put(record.peer_id.as_bytes(), &value)?;
        Ok(())
    }

    pub fn get(&self, peer_id: &Hash) -> P2pResult<Option<PeerRecord>> {
        match self.peerlist.get(peer_id.as_bytes())? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| P2pError::Codec(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn exists(&self, peer_id: &Hash) -> P2pResult<bool> {
        Ok(self.peerlist.exists(peer_id.as_bytes())?)
    }

    pub fn delete(&self, peer_id: &Hash) -> P2pResult<()> {
        Ok(self.peerlist.delete(peer_id.as_bytes())?)
    }

    /// Sets `last_seen = now` for an existing record. No-op if unknown.
    pub fn touch(&self, peer_id: &Hash) -> P2pResult<()> {
        if let Some(mut record) = self.get(peer_id)? {
            record.last_seen = now();
            let value = bincode::serialize(&record).map_err(|e| P2pError::Codec(e.to_string()))?;
            self.peerlist.put(peer_id.as_bytes(), &value)?;
        }
        Ok(())
    }

    pub fn count(&self) -> P2pResult<usize> {
        Ok(self.peerlist.list_keys()?.len())
    }

    /// Every record currently stored.
    pub fn peers(&self) -> P2pResult<Vec<PeerRecord>> {
        self.peerlist
            .iter_all()?
            .into_iter()
            .map(|(_, v)| bincode::deserialize(&v).map_err(|e| P2pError::Codec(e.to_string())))
            .collect()
    }

    /// Up to `limit` records, for the connection manager's dial sampling.
    pub fn sample(&self, limit: usize) -> P2pResult<Vec<PeerRecord>> {
        let mut all = self.peers()?;
        all.truncate(limit);
        Ok(all)
    }

    /// Deletes every record older than `PEER_PRUNE_TIME_SECS`.
    pub fn prune(&self) -> P2pResult<()> {
        let prune_before = now().saturating_sub(PEER_PRUNE_TIME_SECS);
        for record in self.peers()? {
            if record.last_seen < prune_before {
                self.delete(&record.peer_id)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_db() -> PeerDb {
        let dir = std::env::temp_dir().join(format!("carapace-peerdb-test-{}-{}", std::process::id(), rand::random::<u64>()));
        let _ = std::fs::remove_dir_all(&dir);
        let env = KvEnv::open(&dir).unwrap();
        PeerDb::open(&env).unwrap()
    }

    fn sample_record(byte: u8) -> PeerRecord {
        PeerRecord {
            ip: IpAddr::from([127, 0, 0, 1]),
            port: 12897,
            peer_id: Hash::from_bytes([byte; 32]),
            last_seen: now(),
        }
    }

    #[test]
    fn peer_id_persists_across_reopen() {
        let dir = std::env::temp_dir().join("carapace-peerdb-test-singleton");
        let _ = std::fs::remove_dir_all(&dir);
        let env = KvEnv::open(&dir).unwrap();
        let a = PeerDb::open(&env).unwrap();
        let b = PeerDb::open(&env).unwrap();
        assert_eq!(a.peer_id(), b.peer_id());
    }

    #[test]
    fn adding_our_own_peer_id_fails() {
        let db = scratch_db();
        let mut record = sample_record(1);
        record.peer_id = db.peer_id();
        assert!(db.add(record).is_err());
    }

    #[test]
    fn s10_touch_updates_last_seen_and_prune_drops_stale() {
        let db = scratch_db();
        let record = sample_record(1);
        db.add(record.clone()).unwrap();

        let before = now();
        db.touch(&record.peer_id).unwrap();
        let touched = db.get(&record.peer_id).unwrap().unwrap();
        assert!(touched.last_seen >= before);

        // Manually force staleness past the TTL and confirm prune drops it.
        let mut stale = touched;
        stale.last_seen = now() - PEER_PRUNE_TIME_SECS - 10;
        let value = bincode::serialize(&stale).unwrap();
        db.peerlist.put(stale.peer_id.as_bytes(), &value).unwrap();

        db.prune().unwrap();
        assert!(db.get(&record.peer_id).unwrap().is_none());
    }

    #[test]
    fn rejects_already_stale_record_on_add() {
        let db = scratch_db();
        let mut record = sample_record(2);
        record.last_seen = now() - PEER_PRUNE_TIME_SECS - 100;
        assert!(db.add(record).is_err());
    }
}
