use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Codec errors ─────────────────────────────────────────────────────────
    #[error("short read: needed {needed} bytes, had {available}")]
    ShortRead { needed: usize, available: usize },

    #[error("overlong varint")]
    OverlongVarint,

    #[error("bad key: point is not on curve")]
    BadKey,

    // ── Transaction errors ───────────────────────────────────────────────────
    #[error("unknown transaction type tag: {0}")]
    BadTag(u8),

    #[error("invalid signature")]
    InvalidSig,

    #[error("too many outputs: max {max}, got {got}")]
    TooManyOutputs { max: usize, got: usize },

    #[error("too few outputs: min {min}, got {got}")]
    TooFewOutputs { min: usize, got: usize },

    #[error("too many inputs: max {max}, got {got}")]
    TooManyInputs { max: usize, got: usize },

    #[error("too few inputs: min 1, got {0}")]
    TooFewInputs(usize),

    #[error("tx_extra exceeds maximum size of {max} bytes")]
    ExtraTooLarge { max: usize },

    #[error("fee {got} below required minimum {required}")]
    FeeTooLow { required: u64, got: u64 },

    // ── Block errors ─────────────────────────────────────────────────────────
    #[error("block does not chain: expected previous hash {expected}, got {got}")]
    BlockDoesNotChain { expected: String, got: String },

    #[error("block already exists: {0}")]
    BlockAlreadyExists(String),

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("block transaction ordering violation")]
    BlockTxnOrder,

    #[error("block transactions mismatch")]
    BlockTransactionsMismatch,

    #[error("staker reward transaction must have at least one output")]
    EmptyStakerReward,

    #[error("producer public key must not appear in the validator signature map")]
    ProducerIsValidator,

    #[error("producer signature missing or does not verify")]
    InvalidProducerSignature,

    #[error("validator signature map is empty or contains an invalid signature")]
    InvalidValidatorSignature,

    // ── Address errors ───────────────────────────────────────────────────────
    #[error("base58 decode error: {0}")]
    Base58Decode(String),

    #[error("address prefix mismatch")]
    AddressPrefixMismatch,

    #[error("not a public key")]
    NotAPublicKey,

    // ── Storage errors ───────────────────────────────────────────────────────
    #[error("database error: {0}")]
    Db(String),

    #[error("database key not found")]
    DbKeyNotFound,

    #[error("database is empty")]
    DbEmpty,

    #[error("global index out of bounds")]
    GlobalIndexOutOfBounds,

    #[error("staking candidate not found")]
    StakingCandidateNotFound,

    #[error("staking staker not found")]
    StakingStakerNotFound,

    #[error("deserialization error: {0}")]
    Deserialization(String),

    // ── P2P errors ────────────────────────────────────────────────────────────
    #[error("duplicate connection")]
    P2pDupeConnect,

    #[error("failed to connect to any seed node")]
    P2pSeedConnect,

    #[error("connection attempt timed out")]
    ConnectFailure,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("UPnP is not supported on this network")]
    UpnpNotSupported,

    #[error("UPnP port mapping failed: {0}")]
    UpnpFailure(String),

    #[error("ZMQ bind failure: {0}")]
    ZmqBindFailure(String),

    #[error("ZMQ connect failure: {0}")]
    ZmqConnectFailure(String),

    // ── RPC / HTTP errors ─────────────────────────────────────────────────────
    #[error("request body required but not found")]
    HttpBodyRequired,

    #[error("JSON deserialization error: {0}")]
    JsonDeserialization(String),

    // ── General ───────────────────────────────────────────────────────────────
    #[error("generic failure: {0}")]
    GenericFailure(String),

    #[error("{0}")]
    Other(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
