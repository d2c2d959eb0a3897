//! The tagged transaction family (C2): a closed union over six kinds sharing
//! prefix/body/suffix helpers, modelled as a single enum rather than the
//! virtual-inheritance hierarchy of the original source (see DESIGN.md).

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::codec::{Reader, Writer};
use crate::constants::{MAX_EXTRA, MAX_INPUTS, MAX_OUTPUTS, MIN_OUTPUTS};
use crate::error::{CoreError, CoreResult};
use crate::types::{BlockIndex, Hash, KeyImage, Point, RangeProof, Scalar, Signature};

pub const TAG_GENESIS: u8 = 1;
pub const TAG_COINBASE: u8 = 2;
pub const TAG_NORMAL: u8 = 3;
pub const TAG_STAKE: u8 = 4;
pub const TAG_RECALL_STAKE: u8 = 5;
pub const TAG_STAKE_REFUND: u8 = 6;

/// `(one_time_key, amount, commitment)`.
pub type Output = (Point, u64, Point);

fn write_output(w: &mut Writer, out: &Output) {
    w.write_fixed(out.0.as_bytes());
    w.write_varint(out.1);
    w.write_fixed(out.2.as_bytes());
}

fn read_output(r: &mut Reader<'_>) -> CoreResult<Output> {
    let key = Point::read(r)?;
    let amount = r.read_varint()?;
    let commitment = Point::read(r)?;
    Ok((key, amount, commitment))
}

fn write_outputs(w: &mut Writer, outputs: &[Output]) {
    w.write_sequence_len(outputs.len());
    for out in outputs {
        write_output(w, out);
    }
}

fn read_outputs(r: &mut Reader<'_>) -> CoreResult<Vec<Output>> {
    let len = r.read_sequence_len()?;
    (0..len).map(|_| read_output(r)).collect()
}

fn sha3(bytes: &[u8]) -> Hash {
    let digest = Sha3_256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}

// ── Prefix ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prefix {
    pub version: u64,
    pub unlock_block: u64,
    pub tx_public_key: Point,
}

impl Prefix {
    fn write(&self, tag: u8, w: &mut Writer) {
        w.write_u8(tag);
        w.write_varint(self.version);
        w.write_varint(self.unlock_block);
        w.write_fixed(self.tx_public_key.as_bytes());
    }

    fn read(r: &mut Reader<'_>) -> CoreResult<Self> {
        let version = r.read_varint()?;
        let unlock_block = r.read_varint()?;
        let tx_public_key = Point::read(r)?;
        Ok(Self {
            version,
            unlock_block,
            tx_public_key,
        })
    }
}

// ── Body (normal / stake / recall-stake) ─────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxBody {
    pub nonce: u64,
    pub fee: u64,
    pub key_images: Vec<KeyImage>,
    pub outputs: Vec<Output>,
}

impl TxBody {
    fn validate(&self) -> CoreResult<()> {
        if self.key_images.is_empty() {
            return Err(CoreError::TooFewInputs(0));
        }
        if self.key_images.len() > MAX_INPUTS {
            return Err(CoreError::TooManyInputs {
                max: MAX_INPUTS,
                got: self.key_images.len(),
            });
        }
        if self.outputs.len() < MIN_OUTPUTS {
            return Err(CoreError::TooFewOutputs {
                min: MIN_OUTPUTS,
                got: self.outputs.len(),
            });
        }
        if self.outputs.len() > MAX_OUTPUTS {
            return Err(CoreError::TooManyOutputs {
                max: MAX_OUTPUTS,
                got: self.outputs.len(),
            });
        }
        Ok(())
    }

    fn write(&self, w: &mut Writer) {
        w.write_varint(self.nonce);
        w.write_varint(self.fee);
        w.write_sorted_set(&self.key_images.iter().map(|k| k.0).collect::<Vec<_>>());
        write_outputs(w, &self.outputs);
    }

    fn read(r: &mut Reader<'_>) -> CoreResult<Self> {
        let nonce = r.read_varint()?;
        let fee = r.read_varint()?;
        let n_images = r.read_sequence_len()?;
        let mut key_images = Vec::with_capacity(n_images);
        for _ in 0..n_images {
            key_images.push(KeyImage::read(r)?);
        }
        let outputs = read_outputs(r)?;
        let body = Self {
            nonce,
            fee,
            key_images,
            outputs,
        };
        body.validate()?;
        Ok(body)
    }
}

// ── Suffix ────────────────────────────────────────────────────────────────────

/// The two forms that share one identity — see `Transaction::hash`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Suffix {
    Uncommitted {
        offsets: Vec<u64>,
        signatures: Vec<Signature>,
        range_proof: RangeProof,
    },
    Committed {
        pruning_hash: Hash,
    },
}

impl Suffix {
    /// Canonical encoding of the *uncommitted* form: `offsets || signatures || range_proof`.
    fn write_uncommitted(w: &mut Writer, offsets: &[u64], signatures: &[Signature], range_proof: &RangeProof) {
        w.write_sequence_len(offsets.len());
        for o in offsets {
            w.write_varint(*o);
        }
        w.write_sequence_len(signatures.len());
        for s in signatures {
            s.write(w);
        }
        range_proof.write(w);
    }

    fn pruning_hash(&self) -> CoreResult<Hash> {
        match self {
            Suffix::Committed { pruning_hash } => Ok(*pruning_hash),
            Suffix::Uncommitted {
                offsets,
                signatures,
                range_proof,
            } => {
                let mut w = Writer::new();
                Self::write_uncommitted(&mut w, offsets, signatures, range_proof);
                Ok(sha3(&w.into_bytes()))
            }
        }
    }

    fn range_proof_hash(&self) -> CoreResult<Hash> {
        match self {
            Suffix::Uncommitted { range_proof, .. } => {
                let mut w = Writer::new();
                range_proof.write(&mut w);
                Ok(sha3(&w.into_bytes()))
            }
            Suffix::Committed { .. } => Err(CoreError::Other(
                "range proof unavailable on a committed (pruned) transaction".into(),
            )),
        }
    }

    fn write(&self, w: &mut Writer) {
        match self {
            Suffix::Uncommitted {
                offsets,
                signatures,
                range_proof,
            } => {
                w.write_u8(0);
                Self::write_uncommitted(w, offsets, signatures, range_proof);
            }
            Suffix::Committed { pruning_hash } => {
                w.write_u8(1);
                pruning_hash.write(w);
            }
        }
    }

    fn read(r: &mut Reader<'_>) -> CoreResult<Self> {
        let form = r.read_fixed(1)?[0];
        match form {
            0 => {
                let n_offsets = r.read_sequence_len()?;
                let mut offsets = Vec::with_capacity(n_offsets);
                for _ in 0..n_offsets {
                    offsets.push(r.read_varint()?);
                }
                let n_sigs = r.read_sequence_len()?;
                let mut signatures = Vec::with_capacity(n_sigs);
                for _ in 0..n_sigs {
                    signatures.push(Signature::read(r)?);
                }
                let range_proof = RangeProof::read(r)?;
                Ok(Suffix::Uncommitted {
                    offsets,
                    signatures,
                    range_proof,
                })
            }
            1 => Ok(Suffix::Committed {
                pruning_hash: Hash::read(r)?,
            }),
            _ => Err(CoreError::Deserialization("bad suffix form tag".into())),
        }
    }
}

// ── Transaction ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Transaction {
    Genesis {
        prefix: Prefix,
        tx_secret_key: Scalar,
        outputs: Vec<Output>,
    },
    Coinbase {
        prefix: Prefix,
        tx_secret_key: Scalar,
        block_index: BlockIndex,
        outputs: Vec<Output>,
    },
    Normal {
        prefix: Prefix,
        body: TxBody,
        tx_extra: Vec<u8>,
        suffix: Suffix,
    },
    Stake {
        prefix: Prefix,
        body: TxBody,
        stake_amount: u64,
        candidate_public_key: Point,
        staker_public_view_key: Point,
        staker_public_spend_key: Point,
        suffix: Suffix,
    },
    RecallStake {
        prefix: Prefix,
        body: TxBody,
        stake_amount: u64,
        candidate_public_key: Point,
        staker_id: Hash,
        view_signature: Signature,
        spend_signature: Signature,
        suffix: Suffix,
    },
    StakeRefund {
        prefix: Prefix,
        tx_secret_key: Scalar,
        recall_stake_tx: Hash,
        output: Output,
    },
}

impl Transaction {
    pub fn tag(&self) -> u8 {
        match self {
            Transaction::Genesis { .. } => TAG_GENESIS,
            Transaction::Coinbase { .. } => TAG_COINBASE,
            Transaction::Normal { .. } => TAG_NORMAL,
            Transaction::Stake { .. } => TAG_STAKE,
            Transaction::RecallStake { .. } => TAG_RECALL_STAKE,
            Transaction::StakeRefund { .. } => TAG_STAKE_REFUND,
        }
    }

    pub fn prefix(&self) -> &Prefix {
        match self {
            Transaction::Genesis { prefix, .. }
            | Transaction::Coinbase { prefix, .. }
            | Transaction::Normal { prefix, .. }
            | Transaction::Stake { prefix, .. }
            | Transaction::RecallStake { prefix, .. }
            | Transaction::StakeRefund { prefix, .. } => prefix,
        }
    }

    fn suffix(&self) -> Option<&Suffix> {
        match self {
            Transaction::Normal { suffix, .. }
            | Transaction::Stake { suffix, .. }
            | Transaction::RecallStake { suffix, .. } => Some(suffix),
            _ => None,
        }
    }

    fn suffix_mut(&mut self) -> Option<&mut Suffix> {
        match self {
            Transaction::Normal { suffix, .. }
            | Transaction::Stake { suffix, .. }
            | Transaction::RecallStake { suffix, .. } => Some(suffix),
            _ => None,
        }
    }

    fn body_mut(&mut self) -> Option<&mut TxBody> {
        match self {
            Transaction::Normal { body, .. }
            | Transaction::Stake { body, .. }
            | Transaction::RecallStake { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Bytes covered by `digest()`: prefix + body + kind-specific fields,
    /// excluding the suffix. Only meaningful for body-bearing kinds.
    fn digest_bytes(&self) -> Option<Vec<u8>> {
        let mut w = Writer::new();
        match self {
            Transaction::Normal {
                prefix,
                body,
                tx_extra,
                ..
            } => {
                prefix.write(self.tag(), &mut w);
                body.write(&mut w);
                w.write_bytes(tx_extra);
            }
            Transaction::Stake {
                prefix,
                body,
                stake_amount,
                candidate_public_key,
                staker_public_view_key,
                staker_public_spend_key,
                ..
            } => {
                prefix.write(self.tag(), &mut w);
                body.write(&mut w);
                w.write_varint(*stake_amount);
                w.write_fixed(candidate_public_key.as_bytes());
                w.write_fixed(staker_public_view_key.as_bytes());
                w.write_fixed(staker_public_spend_key.as_bytes());
            }
            Transaction::RecallStake {
                prefix,
                body,
                stake_amount,
                candidate_public_key,
                staker_id,
                view_signature,
                spend_signature,
                ..
            } => {
                prefix.write(self.tag(), &mut w);
                body.write(&mut w);
                w.write_varint(*stake_amount);
                w.write_fixed(candidate_public_key.as_bytes());
                staker_id.write(&mut w);
                view_signature.write(&mut w);
                spend_signature.write(&mut w);
            }
            _ => return None,
        }
        Some(w.into_bytes())
    }

    /// `digest = sha3(prefix || body || kind_data)`, excludes suffix.
    pub fn digest(&self) -> CoreResult<Hash> {
        self.digest_bytes()
            .map(|b| sha3(&b))
            .ok_or_else(|| CoreError::Other("digest is only defined for body-bearing kinds".into()))
    }

    /// `pruning_hash = sha3(canonical(uncommitted_suffix))`.
    pub fn pruning_hash(&self) -> CoreResult<Hash> {
        self.suffix()
            .ok_or_else(|| CoreError::Other("pruning_hash is only defined for body-bearing kinds".into()))?
            .pruning_hash()
    }

    /// `range_proof_hash = sha3(canonical(range_proof))`; only defined on the
    /// uncommitted form.
    pub fn range_proof_hash(&self) -> CoreResult<Hash> {
        self.suffix()
            .ok_or_else(|| CoreError::Other("range proof is only defined for body-bearing kinds".into()))?
            .range_proof_hash()
    }

    /// The identity hash. For body-bearing kinds: `sha3(digest || pruning_hash)`.
    /// For Genesis/Coinbase/StakeRefund: `sha3(canonical_encoding)`.
    pub fn hash(&self) -> CoreResult<Hash> {
        if self.suffix().is_some() {
            let digest = self.digest()?;
            let pruning_hash = self.pruning_hash()?;
            let mut buf = Vec::with_capacity(64);
            buf.extend_from_slice(digest.as_bytes());
            buf.extend_from_slice(pruning_hash.as_bytes());
            Ok(sha3(&buf))
        } else {
            Ok(sha3(&self.serialize()))
        }
    }

    /// `pow_input = digest || range_proof_hash`, a 64-byte blob handed to the
    /// Argon2id collaborator in `carapace-crypto`.
    pub fn pow_input(&self) -> CoreResult<[u8; 64]> {
        let digest = self.digest()?;
        let range_proof_hash = self.range_proof_hash()?;
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(digest.as_bytes());
        buf[32..].copy_from_slice(range_proof_hash.as_bytes());
        Ok(buf)
    }

    /// Mines by incrementing `body.nonce` from its current value until the
    /// Argon2id hash (computed by the injected `argon2` closure) meets `zeros`
    /// leading zero bits, or `nonce` saturates `u64::MAX`. Returns whether the
    /// target was met.
    pub fn mine(&mut self, zeros: u32, argon2: impl Fn(&[u8; 64]) -> [u8; 32]) -> CoreResult<bool> {
        loop {
            let input = self.pow_input()?;
            let pow_hash = argon2(&input);
            if leading_zero_bits(&pow_hash) >= zeros {
                return Ok(true);
            }
            let body = self
                .body_mut()
                .ok_or_else(|| CoreError::Other("mine() is only defined for body-bearing kinds".into()))?;
            if body.nonce == u64::MAX {
                return Ok(false);
            }
            body.nonce += 1;
        }
    }

    /// Same predicate as `mine()`, without mutation.
    pub fn pow_verify(&self, zeros: u32, argon2: impl Fn(&[u8; 64]) -> [u8; 32]) -> CoreResult<bool> {
        let input = self.pow_input()?;
        let pow_hash = argon2(&input);
        Ok(leading_zero_bits(&pow_hash) >= zeros)
    }

    /// Drops signatures and range proof from the suffix while preserving `hash()`.
    pub fn to_committed(&self) -> CoreResult<Self> {
        let pruning_hash = self.pruning_hash()?;
        let mut committed = self.clone();
        *committed
            .suffix_mut()
            .ok_or_else(|| CoreError::Other("to_committed() is only defined for body-bearing kinds".into()))? =
            Suffix::Committed { pruning_hash };
        Ok(committed)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            Transaction::Genesis {
                prefix,
                tx_secret_key,
                outputs,
            } => {
                prefix.write(self.tag(), &mut w);
                w.write_fixed(tx_secret_key.as_bytes());
                write_outputs(&mut w, outputs);
            }
            Transaction::Coinbase {
                prefix,
                tx_secret_key,
                block_index,
                outputs,
            } => {
                prefix.write(self.tag(), &mut w);
                w.write_fixed(tx_secret_key.as_bytes());
                w.write_varint(*block_index);
                write_outputs(&mut w, outputs);
            }
            Transaction::Normal {
                prefix,
                body,
                tx_extra,
                suffix,
            } => {
                prefix.write(self.tag(), &mut w);
                body.write(&mut w);
                w.write_bytes(tx_extra);
                suffix.write(&mut w);
            }
            Transaction::Stake {
                prefix,
                body,
                stake_amount,
                candidate_public_key,
                staker_public_view_key,
                staker_public_spend_key,
                suffix,
            } => {
                prefix.write(self.tag(), &mut w);
                body.write(&mut w);
                w.write_varint(*stake_amount);
                w.write_fixed(candidate_public_key.as_bytes());
                w.write_fixed(staker_public_view_key.as_bytes());
                w.write_fixed(staker_public_spend_key.as_bytes());
                suffix.write(&mut w);
            }
            Transaction::RecallStake {
                prefix,
                body,
                stake_amount,
                candidate_public_key,
                staker_id,
                view_signature,
                spend_signature,
                suffix,
            } => {
                prefix.write(self.tag(), &mut w);
                body.write(&mut w);
                w.write_varint(*stake_amount);
                w.write_fixed(candidate_public_key.as_bytes());
                staker_id.write(&mut w);
                view_signature.write(&mut w);
                spend_signature.write(&mut w);
                suffix.write(&mut w);
            }
            Transaction::StakeRefund {
                prefix,
                tx_secret_key,
                recall_stake_tx,
                output,
            } => {
                prefix.write(self.tag(), &mut w);
                w.write_fixed(tx_secret_key.as_bytes());
                recall_stake_tx.write(&mut w);
                write_output(&mut w, output);
            }
        }
        w.into_bytes()
    }

    pub fn deserialize(bytes: &[u8]) -> CoreResult<Self> {
        let mut r = Reader::new(bytes);
        let tag = r.read_fixed(1)?[0];
        let prefix = Prefix::read(&mut r)?;
        match tag {
            TAG_GENESIS => {
                let tx_secret_key = Scalar::read(&mut r)?;
                let outputs = read_outputs(&mut r)?;
                Ok(Transaction::Genesis {
                    prefix,
                    tx_secret_key,
                    outputs,
                })
            }
            TAG_COINBASE => {
                let tx_secret_key = Scalar::read(&mut r)?;
                let block_index = r.read_varint()?;
                let outputs = read_outputs(&mut r)?;
                Ok(Transaction::Coinbase {
                    prefix,
                    tx_secret_key,
                    block_index,
                    outputs,
                })
            }
            TAG_NORMAL => {
                let body = TxBody::read(&mut r)?;
                let tx_extra = r.read_bytes()?;
                if tx_extra.len() > MAX_EXTRA {
                    return Err(CoreError::ExtraTooLarge { max: MAX_EXTRA });
                }
                let suffix = Suffix::read(&mut r)?;
                Ok(Transaction::Normal {
                    prefix,
                    body,
                    tx_extra,
                    suffix,
                })
            }
            TAG_STAKE => {
                let body = TxBody::read(&mut r)?;
                let stake_amount = r.read_varint()?;
                let candidate_public_key = Point::read(&mut r)?;
                let staker_public_view_key = Point::read(&mut r)?;
                let staker_public_spend_key = Point::read(&mut r)?;
                let suffix = Suffix::read(&mut r)?;
                Ok(Transaction::Stake {
                    prefix,
                    body,
                    stake_amount,
                    candidate_public_key,
                    staker_public_view_key,
                    staker_public_spend_key,
                    suffix,
                })
            }
            TAG_RECALL_STAKE => {
                let body = TxBody::read(&mut r)?;
                let stake_amount = r.read_varint()?;
                let candidate_public_key = Point::read(&mut r)?;
                let staker_id = Hash::read(&mut r)?;
                let view_signature = Signature::read(&mut r)?;
                let spend_signature = Signature::read(&mut r)?;
                let suffix = Suffix::read(&mut r)?;
                Ok(Transaction::RecallStake {
                    prefix,
                    body,
                    stake_amount,
                    candidate_public_key,
                    staker_id,
                    view_signature,
                    spend_signature,
                    suffix,
                })
            }
            TAG_STAKE_REFUND => {
                let tx_secret_key = Scalar::read(&mut r)?;
                let recall_stake_tx = Hash::read(&mut r)?;
                let output = read_output(&mut r)?;
                Ok(Transaction::StakeRefund {
                    prefix,
                    tx_secret_key,
                    recall_stake_tx,
                    output,
                })
            }
            other => Err(CoreError::BadTag(other)),
        }
    }
}

fn leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut count = 0u32;
    for byte in bytes {
        if *byte == 0 {
            count += 8;
            continue;
        }
        count += byte.leading_zeros();
        break;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_prefix() -> Prefix {
        Prefix {
            version: 1,
            unlock_block: 0,
            tx_public_key: Point::from_bytes([1u8; 32]),
        }
    }

    fn sample_outputs() -> Vec<Output> {
        vec![
            (Point::from_bytes([2u8; 32]), 100, Point::from_bytes([3u8; 32])),
            (Point::from_bytes([4u8; 32]), 200, Point::from_bytes([5u8; 32])),
        ]
    }

    fn sample_normal() -> Transaction {
        Transaction::Normal {
            prefix: sample_prefix(),
            body: TxBody {
                nonce: 0,
                fee: 1,
                key_images: vec![KeyImage::from_bytes([6u8; 32])],
                outputs: sample_outputs(),
            },
            tx_extra: vec![9, 9, 9],
            suffix: Suffix::Uncommitted {
                offsets: vec![1, 2, 3],
                signatures: vec![Signature(vec![1, 2, 3, 4])],
                range_proof: RangeProof(vec![5, 6, 7, 8]),
            },
        }
    }

    #[test]
    fn normal_round_trips() {
        let tx = sample_normal();
        let bytes = tx.serialize();
        let back = Transaction::deserialize(&bytes).unwrap();
        assert_eq!(tx, back);
        assert_eq!(tx.hash().unwrap(), back.hash().unwrap());
    }

    #[test]
    fn s3_uncommitted_and_committed_share_hash() {
        let tx = sample_normal();
        let committed = tx.to_committed().unwrap();
        assert_eq!(tx.hash().unwrap(), committed.hash().unwrap());
        assert!(matches!(committed.suffix().unwrap(), Suffix::Committed { .. }));
    }

    #[test]
    fn genesis_hash_is_whole_encoding() {
        let tx = Transaction::Genesis {
            prefix: sample_prefix(),
            tx_secret_key: Scalar::from_bytes([7u8; 32]),
            outputs: sample_outputs(),
        };
        let direct = sha3(&tx.serialize());
        assert_eq!(tx.hash().unwrap(), direct);
    }

    #[test]
    fn bad_tag_is_rejected() {
        let mut bytes = sample_normal().serialize();
        bytes[0] = 200;
        assert!(matches!(
            Transaction::deserialize(&bytes),
            Err(CoreError::BadTag(200))
        ));
    }

    #[test]
    fn too_many_key_images_is_rejected() {
        let mut tx = sample_normal();
        if let Transaction::Normal { body, .. } = &mut tx {
            body.key_images = (0..20).map(|i| KeyImage::from_bytes([i as u8; 32])).collect();
        }
        let bytes = tx.serialize();
        assert!(Transaction::deserialize(&bytes).is_err());
    }

    #[test]
    fn json_round_trip_preserves_hash() {
        let tx = sample_normal();
        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, back);
        assert_eq!(tx.hash().unwrap(), back.hash().unwrap());
    }

    #[test]
    fn mine_meets_target_zero_bits() {
        let mut tx = sample_normal();
        let ok = tx
            .mine(4, |input| {
                let digest = Sha3_256::digest(input);
                let mut out = [0u8; 32];
                out.copy_from_slice(&digest);
                out
            })
            .unwrap();
        assert!(ok);
    }
}
