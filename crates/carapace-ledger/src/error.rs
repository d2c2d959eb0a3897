use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Db(String),

    #[error("database is empty")]
    DbEmpty,

    #[error("database key not found")]
    DbKeyNotFound,

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("block already exists: {0}")]
    BlockAlreadyExists(String),

    #[error("block does not chain: expected previous hash {expected}, got {got}")]
    BlockDoesNotChain { expected: String, got: String },

    #[error("block transactions mismatch")]
    BlockTransactionsMismatch,

    #[error("staking candidate not found")]
    StakingCandidateNotFound,

    #[error("staking staker not found")]
    StakingStakerNotFound,

    #[error("no matching stake edge for recall")]
    StakeEdgeNotFound,

    #[error("global index out of bounds")]
    GlobalIndexOutOfBounds,

    #[error("core codec error: {0}")]
    Core(#[from] carapace_core::error::CoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
