//! Scalar/point keypair generation and the conversions between the opaque
//! 32-byte `carapace_core::types::{Scalar, Point}` blobs and the
//! `curve25519-dalek` types that actually do the group arithmetic.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar as DalekScalar;
use rand_core::OsRng;
use zeroize::Zeroize;

use carapace_core::types::{Point, Scalar};

use crate::CryptoError;

/// Decompresses a `Point` into a `RistrettoPoint`. Fails with `CryptoError::BadKey`
/// if the bytes don't decode to a valid curve point — the lazy on-curve check
/// the protocol describes.
pub fn decompress(point: &Point) -> Result<RistrettoPoint, CryptoError> {
    CompressedRistretto(*point.as_bytes())
        .decompress()
        .ok_or(CryptoError::BadKey)
}

pub fn compress(point: &RistrettoPoint) -> Point {
    Point::from_bytes(point.compress().to_bytes())
}

pub fn scalar_to_dalek(s: &Scalar) -> DalekScalar {
    DalekScalar::from_bytes_mod_order(*s.as_bytes())
}

pub fn dalek_to_scalar(s: &DalekScalar) -> Scalar {
    Scalar::from_bytes(s.to_bytes())
}

/// `public = secret * G`.
pub fn derive_public(secret: &Scalar) -> Point {
    let s = scalar_to_dalek(secret);
    compress(&(s * RISTRETTO_BASEPOINT_POINT))
}

/// A signing/staking keypair: a scalar secret and its derived point public key.
pub struct KeyPair {
    pub public: Point,
    secret: Scalar,
}

impl KeyPair {
    /// Generates a fresh keypair from the system CSPRNG.
    pub fn generate() -> Self {
        let secret = dalek_to_scalar(&DalekScalar::random(&mut OsRng));
        let public = derive_public(&secret);
        Self { public, secret }
    }

    pub fn from_secret(secret: Scalar) -> Self {
        let public = derive_public(&secret);
        Self { public, secret }
    }

    pub fn secret(&self) -> &Scalar {
        &self.secret
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret.0.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ public: {:?} }}", self.public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_is_deterministic_from_secret() {
        let kp = KeyPair::generate();
        let derived_again = derive_public(kp.secret());
        assert_eq!(kp.public, derived_again);
    }

    #[test]
    fn distinct_keypairs_have_distinct_publics() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public, b.public);
    }
}
