use thiserror::Error;

#[derive(Debug, Error)]
pub enum P2pError {
    #[error("core codec error: {0}")]
    Core(#[from] carapace_core::error::CoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] carapace_ledger::LedgerError),

    #[error("zmq error: {0}")]
    Zmq(#[from] zmq::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("bind failure: {0}")]
    BindFailure(String),

    #[error("connect failure")]
    ConnectFailure,

    #[error("already connected to this peer")]
    DupeConnect,

    #[error("failed to connect to any seed node and the peer database is empty")]
    SeedConnectFailure,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("upnp is not supported on this gateway")]
    UpnpNotSupported,

    #[error("upnp failure: {0}")]
    UpnpFailure(String),
}

pub type P2pResult<T> = Result<T, P2pError>;
