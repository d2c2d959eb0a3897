//! The block envelope (C3): an ordered transaction set, a producer
//! signature, and a validator signature quorum, hashed in three nested
//! modes so producer/validator signing can build on a shared prefix.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;

use crate::codec::Writer;
use crate::error::{CoreError, CoreResult};
use crate::types::{BlockIndex, Hash, Point, Timestamp};

fn sha3(bytes: &[u8]) -> Hash {
    let digest = Sha3_256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}

/// `(staker_id, amount)`.
pub type StakerRewardOutput = (Hash, u64);

/// The coinbase-like payout vector credited to stakers each block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StakerRewardTx {
    pub version: u64,
    pub outputs: Vec<StakerRewardOutput>,
}

impl StakerRewardTx {
    fn write(&self, w: &mut Writer) {
        w.write_varint(self.version);
        w.write_sequence_len(self.outputs.len());
        for (staker_id, amount) in &self.outputs {
            staker_id.write(w);
            w.write_varint(*amount);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockDigestMode {
    /// Up to and including the ordered transaction set.
    Producer,
    /// `Producer` plus the producer's public key and signature.
    Validator,
    /// Everything, including the validator signature map.
    Full,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub version: u64,
    pub previous_blockhash: Hash,
    pub timestamp: Timestamp,
    pub block_index: BlockIndex,
    pub staker_reward_tx: StakerRewardTx,
    /// Ordered set of transaction hashes; must be sorted ascending.
    pub transactions: Vec<Hash>,
    pub producer: Option<(Point, crate::types::Signature)>,
    /// Stored in ascending key order (`BTreeMap` enforces this on iteration).
    pub validator_signatures: BTreeMap<Point, crate::types::Signature>,
}

impl Block {
    /// Bytes hashed for the given mode; see module docs.
    pub fn message_digest(&self, mode: BlockDigestMode) -> CoreResult<Vec<u8>> {
        let mut w = Writer::new();
        w.write_varint(self.version);
        self.previous_blockhash.write(&mut w);
        w.write_varint(self.timestamp);
        w.write_varint(self.block_index);
        self.staker_reward_tx.write(&mut w);
        w.write_sorted_set(&self.transactions.iter().map(|h| h.0).collect::<Vec<_>>());

        if mode == BlockDigestMode::Producer {
            return Ok(w.into_bytes());
        }

        let (producer_key, producer_sig) = self
            .producer
            .as_ref()
            .ok_or_else(|| CoreError::Other("producer signature required for this digest mode".into()))?;
        w.write_fixed(producer_key.as_bytes());
        producer_sig.write(&mut w);

        if mode == BlockDigestMode::Validator {
            return Ok(w.into_bytes());
        }

        w.write_sequence_len(self.validator_signatures.len());
        for (key, sig) in &self.validator_signatures {
            w.write_fixed(key.as_bytes());
            sig.write(&mut w);
        }

        Ok(w.into_bytes())
    }

    pub fn hash(&self) -> CoreResult<Hash> {
        Ok(sha3(&self.message_digest(BlockDigestMode::Full)?))
    }

    /// Sets `producer_public_key` and the producer signature over
    /// `message_digest(PRODUCER)`. `signer` maps a message to `(public_key, signature)`.
    pub fn producer_sign(&mut self, signer: impl FnOnce(&[u8]) -> (Point, crate::types::Signature)) -> CoreResult<()> {
        let message = self.message_digest(BlockDigestMode::Producer)?;
        self.producer = Some(signer(&message));
        Ok(())
    }

    /// Adds a validator signature over `message_digest(VALIDATOR)`. Idempotent:
    /// a repeat signature from a key already present is a no-op.
    pub fn validator_sign(&mut self, signer: impl FnOnce(&[u8]) -> (Point, crate::types::Signature)) -> CoreResult<()> {
        let message = self.message_digest(BlockDigestMode::Validator)?;
        let (key, sig) = signer(&message);
        self.validator_signatures.entry(key).or_insert(sig);
        Ok(())
    }

    /// Structural validation: invariants that don't require the election
    /// engine's authorization context (see `carapace-consensus` for that).
    pub fn validate_construction(&self, verify: impl Fn(&Point, &[u8], &crate::types::Signature) -> bool) -> CoreResult<bool> {
        if self.staker_reward_tx.outputs.is_empty() {
            return Err(CoreError::EmptyStakerReward);
        }

        let (producer_key, producer_sig) = match &self.producer {
            Some(p) => p,
            None => return Ok(false),
        };

        if self.validator_signatures.contains_key(producer_key) {
            return Err(CoreError::ProducerIsValidator);
        }

        let producer_message = self.message_digest(BlockDigestMode::Producer)?;
        if !verify(producer_key, &producer_message, producer_sig) {
            return Err(CoreError::InvalidProducerSignature);
        }

        if self.validator_signatures.is_empty() {
            return Err(CoreError::InvalidValidatorSignature);
        }

        let validator_message = self.message_digest(BlockDigestMode::Validator)?;
        for (key, sig) in &self.validator_signatures {
            if !verify(key, &validator_message, sig) {
                return Err(CoreError::InvalidValidatorSignature);
            }
        }

        let mut sorted = self.transactions.clone();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        if sorted != self.transactions {
            return Err(CoreError::BlockTxnOrder);
        }

        Ok(true)
    }
}
