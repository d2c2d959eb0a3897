use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("core codec error: {0}")]
    Core(#[from] carapace_core::error::CoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] carapace_ledger::LedgerError),

    #[error("no block hashes to seed an election with")]
    EmptyRound,
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;
