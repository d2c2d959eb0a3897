//! The stake ledger (C5): candidates registered for election, stakers who
//! back them, and the stake edges between the two that the election engine
//! weighs.

use std::sync::Arc;

use carapace_core::types::{BlockIndex, Hash, Point};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::kv::{KvEnv, Store};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub public_key: Point,
    pub registered_at: BlockIndex,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Staker {
    pub staker_id: Hash,
    pub public_view_key: Point,
    pub public_spend_key: Point,
}

/// One stake: `staker_id` backed `candidate_public_key` with `amount` via
/// `stake_txn`. Stored dup-sorted under the candidate's key so every vote for
/// a candidate sits together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StakeEdge {
    pub staker_id: Hash,
    pub stake_txn: Hash,
    pub amount: u64,
}

pub struct StakeLedger {
    candidates: Store,
    stakers: Store,
    stakes: Store,
}

impl StakeLedger {
    pub fn open(env: &Arc<KvEnv>) -> LedgerResult<Self> {
        Ok(Self {
            candidates: Store::open(env, "staking_candidates", false)?,
            stakers: Store::open(env, "staking_stakers", false)?,
            stakes: Store::open(env, "staking_stakes", true)?,
        })
    }

    // ── candidates ──────────────────────────────────────────────────────

    pub fn add_candidate(&self, candidate: &Candidate) -> LedgerResult<()> {
        let value = bincode::serialize(candidate).map_err(|e| LedgerError::Deserialization(e.to_string()))?;
        self.candidates.put(candidate.public_key.as_bytes(), &value)
    }

    pub fn delete_candidate(&self, public_key: &Point) -> LedgerResult<()> {
        self.candidates.delete(public_key.as_bytes())
    }

    pub fn get_candidate(&self, public_key: &Point) -> LedgerResult<Option<Candidate>> {
        match self.candidates.get(public_key.as_bytes())? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| LedgerError::Deserialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn get_candidates(&self) -> LedgerResult<Vec<Candidate>> {
        self.candidates
            .iter_all()?
            .into_iter()
            .map(|(_, v)| bincode::deserialize(&v).map_err(|e| LedgerError::Deserialization(e.to_string())))
            .collect()
    }

    // ── stakers ─────────────────────────────────────────────────────────

    pub fn add_staker(&self, staker: &Staker) -> LedgerResult<()> {
        let value = bincode::serialize(staker).map_err(|e| LedgerError::Deserialization(e.to_string()))?;
        self.stakers.put(staker.staker_id.as_bytes(), &value)
    }

    pub fn delete_staker(&self, staker_id: &Hash) -> LedgerResult<()> {
        self.stakers.delete(staker_id.as_bytes())
    }

    pub fn get_staker(&self, staker_id: &Hash) -> LedgerResult<Option<Staker>> {
        match self.stakers.get(staker_id.as_bytes())? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| LedgerError::Deserialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn get_stakers(&self) -> LedgerResult<Vec<Staker>> {
        self.stakers
            .iter_all()?
            .into_iter()
            .map(|(_, v)| bincode::deserialize(&v).map_err(|e| LedgerError::Deserialization(e.to_string())))
            .collect()
    }

    // ── stake edges ─────────────────────────────────────────────────────

    /// Records `staker` backing `candidate_public_key` with `amount` via
    /// `stake_txn`. The candidate must already be registered; the staker is
    /// upserted.
    pub fn record_stake(
        &self,
        candidate_public_key: &Point,
        staker: &Staker,
        stake_txn: Hash,
        amount: u64,
    ) -> LedgerResult<()> {
        if self.get_candidate(candidate_public_key)?.is_none() {
            return Err(LedgerError::StakingCandidateNotFound);
        }
        self.add_staker(staker)?;

        let edge = StakeEdge {
            staker_id: staker.staker_id,
            stake_txn,
            amount,
        };
        let value = bincode::serialize(&edge).map_err(|e| LedgerError::Deserialization(e.to_string()))?;
        self.stakes.put_dup(candidate_public_key.as_bytes(), &value)
    }

    /// Removes the exact stake edge previously recorded by `record_stake`.
    pub fn recall_stake(
        &self,
        candidate_public_key: &Point,
        staker_id: Hash,
        stake_txn: Hash,
        amount: u64,
    ) -> LedgerResult<()> {
        let edge = StakeEdge {
            staker_id,
            stake_txn,
            amount,
        };
        let value = bincode::serialize(&edge).map_err(|e| LedgerError::Deserialization(e.to_string()))?;
        let existing = self.stakes.get_all(candidate_public_key.as_bytes())?;
        if !existing.contains(&value) {
            return Err(LedgerError::StakeEdgeNotFound);
        }
        self.stakes.delete_dup(candidate_public_key.as_bytes(), &value)
    }

    pub fn get_candidate_stakes(&self, candidate_public_key: &Point) -> LedgerResult<Vec<StakeEdge>> {
        self.stakes
            .get_all(candidate_public_key.as_bytes())?
            .into_iter()
            .map(|v| bincode::deserialize(&v).map_err(|e| LedgerError::Deserialization(e.to_string())))
            .collect()
    }

    pub fn get_candidate_votes(&self, candidate_public_key: &Point) -> LedgerResult<u64> {
        Ok(self
            .get_candidate_stakes(candidate_public_key)?
            .iter()
            .map(|e| e.amount)
            .sum())
    }

    /// Every stake edge a given staker holds, across all candidates.
    pub fn get_staker_stakes(&self, staker_id: &Hash) -> LedgerResult<Vec<(Point, StakeEdge)>> {
        let mut out = Vec::new();
        for (key, value) in self.stakes.iter_all()? {
            let edge: StakeEdge =
                bincode::deserialize(&value).map_err(|e| LedgerError::Deserialization(e.to_string()))?;
            if &edge.staker_id == staker_id {
                if key.len() != 32 {
                    return Err(LedgerError::Deserialization("stake key is not 32 bytes".into()));
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&key);
                out.push((Point::from_bytes(arr), edge));
            }
        }
        Ok(out)
    }

    pub fn get_staker_candidate_votes(&self, staker_id: &Hash, candidate_public_key: &Point) -> LedgerResult<u64> {
        Ok(self
            .get_candidate_stakes(candidate_public_key)?
            .iter()
            .filter(|e| &e.staker_id == staker_id)
            .map(|e| e.amount)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carapace_core::types::Point;

    fn scratch_ledger() -> StakeLedger {
        let dir = std::env::temp_dir().join(format!("carapace-staking-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let env = KvEnv::open(&dir).unwrap();
        StakeLedger::open(&env).unwrap()
    }

    fn point(byte: u8) -> Point {
        Point::from_bytes([byte; 32])
    }

    fn hash(byte: u8) -> Hash {
        Hash::from_bytes([byte; 32])
    }

    #[test]
    fn record_stake_requires_registered_candidate() {
        let ledger = scratch_ledger();
        let staker = Staker {
            staker_id: hash(1),
            public_view_key: point(2),
            public_spend_key: point(3),
        };
        let err = ledger
            .record_stake(&point(9), &staker, hash(4), 100)
            .unwrap_err();
        assert!(matches!(err, LedgerError::StakingCandidateNotFound));
    }

    #[test]
    fn record_and_recall_round_trip() {
        let ledger = scratch_ledger();
        let candidate_key = point(9);
        ledger
            .add_candidate(&Candidate {
                public_key: candidate_key,
                registered_at: 0,
            })
            .unwrap();

        let staker = Staker {
            staker_id: hash(1),
            public_view_key: point(2),
            public_spend_key: point(3),
        };
        ledger
            .record_stake(&candidate_key, &staker, hash(4), 100)
            .unwrap();
        assert_eq!(ledger.get_candidate_votes(&candidate_key).unwrap(), 100);

        ledger
            .recall_stake(&candidate_key, staker.staker_id, hash(4), 100)
            .unwrap();
        assert_eq!(ledger.get_candidate_votes(&candidate_key).unwrap(), 0);
    }

    #[test]
    fn recall_without_matching_edge_fails() {
        let ledger = scratch_ledger();
        let candidate_key = point(9);
        ledger
            .add_candidate(&Candidate {
                public_key: candidate_key,
                registered_at: 0,
            })
            .unwrap();
        let err = ledger
            .recall_stake(&candidate_key, hash(1), hash(4), 100)
            .unwrap_err();
        assert!(matches!(err, LedgerError::StakeEdgeNotFound));
    }

    #[test]
    fn multiple_stakers_sum_votes() {
        let ledger = scratch_ledger();
        let candidate_key = point(9);
        ledger
            .add_candidate(&Candidate {
                public_key: candidate_key,
                registered_at: 0,
            })
            .unwrap();
        for i in 0..3u8 {
            let staker = Staker {
                staker_id: hash(i),
                public_view_key: point(i),
                public_spend_key: point(i),
            };
            ledger
                .record_stake(&candidate_key, &staker, hash(100 + i), 10)
                .unwrap();
        }
        assert_eq!(ledger.get_candidate_votes(&candidate_key).unwrap(), 30);
        assert_eq!(ledger.get_candidate_stakes(&candidate_key).unwrap().len(), 3);
    }
}
