//! Persisted node state: the ordered key-value store façade (C4), the stake
//! ledger (C5), and the chain of committed blocks/transactions built on top
//! of it.

pub mod chain;
pub mod error;
pub mod kv;
pub mod staking;

pub use chain::ChainStore;
pub use error::{LedgerError, LedgerResult};
pub use kv::{KvEnv, Store};
pub use staking::{Candidate, StakeEdge, StakeLedger, Staker};
