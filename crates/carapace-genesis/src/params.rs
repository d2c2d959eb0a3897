use carapace_core::types::Point;
use serde::{Deserialize, Serialize};

/// One genesis output: `amount` payable to the address named by
/// `(public_view_key, public_spend_key)` (see `carapace-core::address`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub public_view_key: Point,
    pub public_spend_key: Point,
    pub amount: u64,
}

/// Everything needed to build the chain's single genesis transaction and
/// block. In production these come from a key ceremony; in tests, fresh
/// keypairs are generated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisParams {
    pub timestamp: u64,
    pub allocations: Vec<GenesisAllocation>,
    /// Candidate signing keys registered with the stake ledger before the
    /// chain's first election round, so there is always someone eligible
    /// to be elected producer/validator at height 1.
    pub initial_candidates: Vec<Point>,
}
