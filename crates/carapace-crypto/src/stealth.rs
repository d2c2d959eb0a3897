//! One-time output keys: the CryptoNote-style Diffie-Hellman stealth
//! address scheme `address.rs`'s spend/view key pair exists to support.
//! `P = Hs(r·A) · G + B` on the sender side, `p = Hs(r·A) + b` on the
//! recipient side once they learn `r·A` by computing `a·R`.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::scalar::Scalar as DalekScalar;
use sha3::{Digest, Sha3_512};

use carapace_core::types::{Point, Scalar};

use crate::keypair::{dalek_to_scalar, decompress, scalar_to_dalek};
use crate::CryptoError;

fn hash_to_scalar(point: &curve25519_dalek::ristretto::RistrettoPoint) -> DalekScalar {
    let mut hasher = Sha3_512::new();
    hasher.update(b"carapace-stealth-derivation");
    hasher.update(point.compress().as_bytes());
    DalekScalar::from_hash(hasher)
}

/// The sender side: derives the recipient's one-time output key from their
/// public view/spend keys and this output's per-transaction secret `r`.
pub fn derive_output_key(tx_secret: &Scalar, public_view: &Point, public_spend: &Point) -> Result<Point, CryptoError> {
    let view = decompress(public_view)?;
    let spend = decompress(public_spend)?;
    let r = scalar_to_dalek(tx_secret);
    let shared = r * view;
    let hs = hash_to_scalar(&shared);
    let one_time = hs * RISTRETTO_BASEPOINT_POINT + spend;
    Ok(Point::from_bytes(one_time.compress().to_bytes()))
}

/// The recipient side: recovers the one-time output's spending secret from
/// the transaction's public key `R = r·G` and the recipient's own
/// view/spend secrets.
pub fn derive_output_secret(tx_public: &Point, secret_view: &Scalar, secret_spend: &Scalar) -> Result<Scalar, CryptoError> {
    let r_point = decompress(tx_public)?;
    let a = scalar_to_dalek(secret_view);
    let shared = a * r_point;
    let hs = hash_to_scalar(&shared);
    let b = scalar_to_dalek(secret_spend);
    Ok(dalek_to_scalar(&(hs + b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::{derive_public, KeyPair};

    #[test]
    fn sender_and_recipient_derive_the_same_output_key() {
        let view = KeyPair::generate();
        let spend = KeyPair::generate();
        let tx_secret = KeyPair::generate();

        let public_view = derive_public(view.secret());
        let public_spend = derive_public(spend.secret());
        let tx_public = derive_public(tx_secret.secret());

        let one_time = derive_output_key(tx_secret.secret(), &public_view, &public_spend).unwrap();
        let recovered_secret = derive_output_secret(&tx_public, view.secret(), spend.secret()).unwrap();
        let recovered_public = derive_public(&recovered_secret);

        assert_eq!(one_time, recovered_public);
    }

    #[test]
    fn different_recipients_get_different_keys() {
        let view = KeyPair::generate();
        let spend_a = KeyPair::generate();
        let spend_b = KeyPair::generate();
        let tx_secret = KeyPair::generate();

        let public_view = derive_public(view.secret());
        let a = derive_output_key(tx_secret.secret(), &public_view, &derive_public(spend_a.secret())).unwrap();
        let b = derive_output_key(tx_secret.secret(), &public_view, &derive_public(spend_b.secret())).unwrap();
        assert_ne!(a, b);
    }
}
