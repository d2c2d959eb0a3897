//! carapace-genesis
//!
//! Builds the chain's single genesis transaction and block and commits
//! them directly to the chain store — genesis has no parent, no proof of
//! work, and no election round to authorize it, so it bypasses the normal
//! transaction/block pipeline entirely ("exactly one genesis transaction per chain
//! at height 0").

pub mod error;
pub mod params;

pub use error::{GenesisError, GenesisResult};
pub use params::{GenesisAllocation, GenesisParams};

use std::collections::BTreeMap;
use std::sync::Arc;

use carapace_core::block::StakerRewardTx;
use carapace_core::transaction::Transaction;
use carapace_core::types::{Hash, Scalar};
use carapace_core::Block;
use carapace_crypto::keypair::derive_public;
use carapace_crypto::rangeproof::commit;
use carapace_crypto::stealth::derive_output_key;
use carapace_crypto::KeyPair;
use carapace_ledger::chain::ChainStore;
use carapace_ledger::kv::KvEnv;
use carapace_ledger::staking::{Candidate, StakeLedger};
use tracing::info;

/// Builds the genesis `Transaction::Genesis` for `params`, deriving a fresh
/// per-output stealth key and a zero-knowledge-committed amount for every
/// allocation.
fn build_genesis_transaction(params: &GenesisParams) -> GenesisResult<Transaction> {
    if params.allocations.is_empty() {
        return Err(GenesisError::NoAllocations);
    }

    let tx_secret = KeyPair::generate();
    let tx_public_key = derive_public(tx_secret.secret());

    let mut outputs = Vec::with_capacity(params.allocations.len());
    for allocation in &params.allocations {
        let one_time_key =
            derive_output_key(tx_secret.secret(), &allocation.public_view_key, &allocation.public_spend_key)?;
        // Genesis allocations are public by construction — the chain's
        // entire initial supply is common knowledge — so the blinding
        // factor is fixed rather than secret; the commitment still lets
        // genesis outputs flow through the same spend path as any other.
        let blinding = Scalar::from_bytes([0u8; 32]);
        let commitment = commit(allocation.amount, &blinding);
        outputs.push((one_time_key, allocation.amount, commitment));
    }

    Ok(Transaction::Genesis {
        prefix: carapace_core::transaction::Prefix {
            version: 1,
            unlock_block: 0,
            tx_public_key,
        },
        tx_secret_key: *tx_secret.secret(),
        outputs,
    })
}

/// Registers every `initial_candidates` key with the stake ledger so the
/// chain's first election round has someone to elect.
fn register_initial_candidates(stake_ledger: &StakeLedger, params: &GenesisParams) -> GenesisResult<()> {
    for public_key in &params.initial_candidates {
        stake_ledger.add_candidate(&Candidate {
            public_key: *public_key,
            registered_at: 0,
        })?;
    }
    Ok(())
}

/// Builds the genesis block around `genesis_tx` and commits it. The
/// staker-reward output is a zero-amount placeholder crediting no one — the
/// invariant that every block carry at least one reward output must hold
/// even though no staker has produced anything yet.
fn build_and_commit_genesis_block(chain: &ChainStore, params: &GenesisParams, genesis_tx: &Transaction) -> GenesisResult<Block> {
    let genesis_hash = genesis_tx.hash()?;

    let block = Block {
        version: 1,
        previous_blockhash: Hash::from_bytes([0u8; 32]),
        timestamp: params.timestamp,
        block_index: 0,
        staker_reward_tx: StakerRewardTx {
            version: 1,
            outputs: vec![(Hash::from_bytes([0u8; 32]), 0)],
        },
        transactions: vec![genesis_hash],
        producer: None,
        validator_signatures: BTreeMap::new(),
    };

    chain.commit_block(&block, std::slice::from_ref(genesis_tx))?;
    Ok(block)
}

/// Applies genesis to a freshly opened `KvEnv`; fails with
/// `GenesisError::ChainNotEmpty` if the chain already has a tip.
pub fn apply_genesis(env: &Arc<KvEnv>, params: &GenesisParams) -> GenesisResult<Block> {
    let chain = ChainStore::open(env)?;
    let stake_ledger = StakeLedger::open(env)?;

    if chain.tip()?.is_some() {
        return Err(GenesisError::ChainNotEmpty);
    }

    info!(
        allocations = params.allocations.len(),
        candidates = params.initial_candidates.len(),
        "applying genesis"
    );

    let genesis_tx = build_genesis_transaction(params)?;
    register_initial_candidates(&stake_ledger, params)?;
    let block = build_and_commit_genesis_block(&chain, params, &genesis_tx)?;

    info!(block_hash = %block.hash()?, "genesis committed");
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carapace_crypto::keypair::derive_public as pub_of;

    fn scratch_env() -> Arc<KvEnv> {
        let dir = std::env::temp_dir().join(format!(
            "carapace-genesis-test-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        KvEnv::open(&dir).unwrap()
    }

    fn sample_params() -> GenesisParams {
        let view = KeyPair::generate();
        let spend = KeyPair::generate();
        let candidate = KeyPair::generate();
        GenesisParams {
            timestamp: 1_700_000_000,
            allocations: vec![GenesisAllocation {
                public_view_key: pub_of(view.secret()),
                public_spend_key: pub_of(spend.secret()),
                amount: 1_000_000,
            }],
            initial_candidates: vec![pub_of(candidate.secret())],
        }
    }

    #[test]
    fn genesis_commits_one_block_at_height_zero() {
        let env = scratch_env();
        let params = sample_params();
        let block = apply_genesis(&env, &params).unwrap();
        assert_eq!(block.block_index, 0);
        assert_eq!(block.transactions.len(), 1);

        let chain = ChainStore::open(&env).unwrap();
        assert_eq!(chain.tip().unwrap().unwrap().0, 0);
    }

    #[test]
    fn genesis_registers_initial_candidates() {
        let env = scratch_env();
        let params = sample_params();
        apply_genesis(&env, &params).unwrap();

        let stake_ledger = StakeLedger::open(&env).unwrap();
        assert_eq!(stake_ledger.get_candidates().unwrap().len(), 1);
    }

    #[test]
    fn genesis_cannot_be_applied_twice() {
        let env = scratch_env();
        let params = sample_params();
        apply_genesis(&env, &params).unwrap();
        let err = apply_genesis(&env, &params).unwrap_err();
        assert!(matches!(err, GenesisError::ChainNotEmpty));
    }

    #[test]
    fn empty_allocations_are_rejected() {
        let env = scratch_env();
        let mut params = sample_params();
        params.allocations.clear();
        let err = apply_genesis(&env, &params).unwrap_err();
        assert!(matches!(err, GenesisError::NoAllocations));
    }
}
