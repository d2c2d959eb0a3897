//! Persisted chain state: committed blocks, the height index over them, the
//! transactions they carry, and the key images they've spent.

use std::sync::Arc;

use carapace_core::transaction::Transaction;
use carapace_core::types::{BlockIndex, Hash, KeyImage};
use carapace_core::Block;

use crate::error::{LedgerError, LedgerResult};
use crate::kv::{KvEnv, Store};

const TIP_KEY: &[u8] = b"tip";

fn key_images_of(tx: &Transaction) -> &[KeyImage] {
    match tx {
        Transaction::Normal { body, .. }
        | Transaction::Stake { body, .. }
        | Transaction::RecallStake { body, .. } => &body.key_images,
        Transaction::Genesis { .. } | Transaction::Coinbase { .. } | Transaction::StakeRefund { .. } => &[],
    }
}

pub struct ChainStore {
    blocks: Store,
    block_heights: Store,
    transactions: Store,
    key_images: Store,
    meta: Store,
}

impl ChainStore {
    pub fn open(env: &Arc<KvEnv>) -> LedgerResult<Self> {
        Ok(Self {
            blocks: Store::open(env, "chain_blocks", false)?,
            block_heights: Store::open(env, "chain_block_heights", false)?,
            transactions: Store::open(env, "chain_transactions", false)?,
            key_images: Store::open(env, "chain_key_images", false)?,
            meta: Store::open(env, "chain_meta", false)?,
        })
    }

    pub fn tip(&self) -> LedgerResult<Option<(BlockIndex, Hash)>> {
        match self.meta.get(TIP_KEY)? {
            Some(bytes) => {
                if bytes.len() != 40 {
                    return Err(LedgerError::Deserialization("tip record must be 40 bytes".into()));
                }
                let mut index_bytes = [0u8; 8];
                index_bytes.copy_from_slice(&bytes[..8]);
                let mut hash_bytes = [0u8; 32];
                hash_bytes.copy_from_slice(&bytes[8..]);
                Ok(Some((u64::from_be_bytes(index_bytes), Hash::from_bytes(hash_bytes))))
            }
            None => Ok(None),
        }
    }

    fn set_tip(&self, index: BlockIndex, hash: Hash) -> LedgerResult<()> {
        let mut bytes = Vec::with_capacity(40);
        bytes.extend_from_slice(&index.to_be_bytes());
        bytes.extend_from_slice(hash.as_bytes());
        self.meta.put(TIP_KEY, &bytes)
    }

    pub fn get_block_by_hash(&self, hash: &Hash) -> LedgerResult<Option<Block>> {
        match self.blocks.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| LedgerError::Deserialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn get_block_by_height(&self, index: BlockIndex) -> LedgerResult<Option<Block>> {
        match self.block_heights.get(&index.to_be_bytes())? {
            Some(hash_bytes) => {
                if hash_bytes.len() != 32 {
                    return Err(LedgerError::Deserialization("height index value must be 32 bytes".into()));
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&hash_bytes);
                self.get_block_by_hash(&Hash::from_bytes(arr))
            }
            None => Ok(None),
        }
    }

    pub fn get_transaction(&self, hash: &Hash) -> LedgerResult<Option<Transaction>> {
        match self.transactions.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(
                Transaction::deserialize(&bytes).map_err(LedgerError::Core)?,
            )),
            None => Ok(None),
        }
    }

    pub fn is_key_image_spent(&self, key_image: &KeyImage) -> LedgerResult<bool> {
        self.key_images.exists(key_image.as_bytes())
    }

    /// Commits `block` (already validated and authorized by the caller)
    /// along with the transactions it references. Enforces that the block
    /// chains onto the current tip and that its transaction set matches
    /// `transactions` exactly.
    pub fn commit_block(&self, block: &Block, transactions: &[Transaction]) -> LedgerResult<()> {
        match self.tip()? {
            Some((_, tip_hash)) if tip_hash != block.previous_blockhash => {
                return Err(LedgerError::BlockDoesNotChain {
                    expected: tip_hash.to_hex(),
                    got: block.previous_blockhash.to_hex(),
                });
            }
            None if block.block_index != 0 => {
                return Err(LedgerError::BlockDoesNotChain {
                    expected: "genesis".into(),
                    got: block.previous_blockhash.to_hex(),
                });
            }
            _ => {}
        }

        let mut tx_hashes = Vec::with_capacity(transactions.len());
        for tx in transactions {
            tx_hashes.push(tx.hash().map_err(LedgerError::Core)?);
        }
        if tx_hashes != block.transactions {
            return Err(LedgerError::BlockTransactionsMismatch);
        }

        let block_hash = block.hash().map_err(LedgerError::Core)?;
        if self.blocks.exists(block_hash.as_bytes())? {
            return Err(LedgerError::BlockAlreadyExists(block_hash.to_hex()));
        }

        let encoded = bincode::serialize(block).map_err(|e| LedgerError::Deserialization(e.to_string()))?;
        self.blocks.put(block_hash.as_bytes(), &encoded)?;
        self.block_heights
            .put(&block.block_index.to_be_bytes(), block_hash.as_bytes())?;

        for tx in transactions {
            let committed = tx.to_committed().map_err(LedgerError::Core)?;
            let tx_hash = committed.hash().map_err(LedgerError::Core)?;
            self.transactions.put(tx_hash.as_bytes(), &committed.serialize())?;
            for key_image in key_images_of(tx) {
                self.key_images.put(key_image.as_bytes(), tx_hash.as_bytes())?;
            }
        }

        self.set_tip(block.block_index, block_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carapace_core::StakerRewardTx;
    use std::collections::BTreeMap;

    fn scratch_chain() -> ChainStore {
        let dir = std::env::temp_dir().join(format!("carapace-chain-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let env = KvEnv::open(&dir).unwrap();
        ChainStore::open(&env).unwrap()
    }

    fn genesis_block() -> Block {
        Block {
            version: 1,
            previous_blockhash: Hash::from_bytes([0u8; 32]),
            timestamp: 0,
            block_index: 0,
            staker_reward_tx: StakerRewardTx {
                version: 1,
                outputs: vec![(Hash::from_bytes([1u8; 32]), 1)],
            },
            transactions: vec![],
            producer: None,
            validator_signatures: BTreeMap::new(),
        }
    }

    #[test]
    fn commit_genesis_then_read_back() {
        let chain = scratch_chain();
        let block = genesis_block();
        chain.commit_block(&block, &[]).unwrap();

        let hash = block.hash().unwrap();
        assert_eq!(chain.tip().unwrap(), Some((0, hash)));
        assert_eq!(chain.get_block_by_hash(&hash).unwrap().unwrap().block_index, 0);
        assert_eq!(chain.get_block_by_height(0).unwrap().unwrap().block_index, 0);
    }

    #[test]
    fn non_chaining_block_is_rejected() {
        let chain = scratch_chain();
        chain.commit_block(&genesis_block(), &[]).unwrap();

        let mut next = genesis_block();
        next.block_index = 1;
        next.previous_blockhash = Hash::from_bytes([0xffu8; 32]);
        let err = chain.commit_block(&next, &[]).unwrap_err();
        assert!(matches!(err, LedgerError::BlockDoesNotChain { .. }));
    }

    #[test]
    fn duplicate_block_is_rejected() {
        let chain = scratch_chain();
        let block = genesis_block();
        chain.commit_block(&block, &[]).unwrap();
        let err = chain.commit_block(&block, &[]).unwrap_err();
        assert!(matches!(err, LedgerError::BlockAlreadyExists(_)));
    }
}
