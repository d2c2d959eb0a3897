use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("bad key: point is not on curve")]
    BadKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("ring signature size mismatch")]
    RingSizeMismatch,
}
