//! The ring-signature / range-proof / proof-of-work / hashing collaborator
//! `carapace-core` treats as an opaque black box: every group
//! operation the protocol needs lives here, behind small, typed functions.

pub mod error;
pub mod hash;
pub mod keypair;
pub mod pow;
pub mod rangeproof;
pub mod ring;
pub mod schnorr;
pub mod stealth;

pub use error::CryptoError;
pub use hash::{domain_hash, hash_to_point, merkle_root, sha3_256};
pub use keypair::KeyPair;
pub use pow::{leading_zero_bits, pow_hash, pow_verify};
pub use rangeproof::{commit, prove_range, verify_range};
pub use ring::{derive_key_image, sign as ring_sign, verify as ring_verify};
pub use schnorr::{sign as schnorr_sign, verify as schnorr_verify};
pub use stealth::{derive_output_key, derive_output_secret};
