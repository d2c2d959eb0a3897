//! Plain Schnorr signatures over Ristretto — used wherever the protocol
//! calls for a single-key signature rather than a ring signature: block
//! producer/validator signing (`Block::producer_sign`/`validator_sign`), and
//! the staker view/spend signatures on a `RecallStake` transaction.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar as DalekScalar;
use rand_core::OsRng;
use sha3::{Digest, Sha3_512};

use carapace_core::types::{Point, Scalar, Signature};

use crate::keypair::{decompress, scalar_to_dalek};

fn challenge(nonce: &RistrettoPoint, public: &Point, message: &[u8]) -> DalekScalar {
    let mut hasher = Sha3_512::new();
    hasher.update(b"carapace-schnorr-challenge");
    hasher.update(nonce.compress().as_bytes());
    hasher.update(public.as_bytes());
    hasher.update(message);
    DalekScalar::from_hash(hasher)
}

/// Signs `message` with `secret`. Returns `(public_key, signature)` so
/// callers that don't carry the public key separately (e.g. `Block::producer_sign`)
/// can store both.
pub fn sign(secret: &Scalar, message: &[u8]) -> (Point, Signature) {
    let x = scalar_to_dalek(secret);
    let public = crate::keypair::derive_public(secret);
    let k = DalekScalar::random(&mut OsRng);
    let r = k * RISTRETTO_BASEPOINT_POINT;
    let c = challenge(&r, &public, message);
    let s = k + c * x;

    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(r.compress().as_bytes());
    bytes.extend_from_slice(s.as_bytes());
    (public, Signature(bytes))
}

/// Verifies a signature produced by `sign`.
pub fn verify(public: &Point, message: &[u8], signature: &Signature) -> bool {
    if signature.0.len() != 64 {
        return false;
    }
    let r = match curve25519_dalek::ristretto::CompressedRistretto::from_slice(&signature.0[0..32])
        .ok()
        .and_then(|c| c.decompress())
    {
        Some(p) => p,
        None => return false,
    };
    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&signature.0[32..64]);
    let s = DalekScalar::from_bytes_mod_order(s_bytes);

    let public_point = match decompress(public) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let c = challenge(&r, public, message);
    s * RISTRETTO_BASEPOINT_POINT == r + c * public_point
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::KeyPair;

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = KeyPair::generate();
        let (public, sig) = sign(kp.secret(), b"producer message");
        assert_eq!(public, kp.public);
        assert!(verify(&public, b"producer message", &sig));
    }

    #[test]
    fn tampered_message_fails() {
        let kp = KeyPair::generate();
        let (public, sig) = sign(kp.secret(), b"original");
        assert!(!verify(&public, b"tampered", &sig));
    }
}
