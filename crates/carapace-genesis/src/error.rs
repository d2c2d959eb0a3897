use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("genesis may only be applied to an empty chain")]
    ChainNotEmpty,

    #[error("genesis must allocate at least one output")]
    NoAllocations,

    #[error("core codec error: {0}")]
    Core(#[from] carapace_core::error::CoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] carapace_crypto::CryptoError),

    #[error("ledger error: {0}")]
    Ledger(#[from] carapace_ledger::LedgerError),
}

pub type GenesisResult<T> = Result<T, GenesisError>;
