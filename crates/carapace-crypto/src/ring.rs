//! Linkable ring signature (CLSAG-style) and key image derivation.
//!
//! `carapace-core::transaction::Suffix::Uncommitted` carries an opaque
//! `Signature` blob per input; this module is the one place that knows how
//! to produce and check it. The scheme implemented here is a classic
//! Liu-Wei-Wong LSAG signature over Ristretto rather than the full CLSAG
//! construction `monero-clsag` implements (CLSAG folds the commitment ring
//! into the same signature to save space) — see DESIGN.md for why the
//! simpler two-ring-element form is the one built out here. Both give the
//! same security property the core needs: exactly one signer among `ring`,
//! unlinkable except through the key image.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar as DalekScalar;
use rand_core::OsRng;
use sha3::{Digest, Sha3_512};

use carapace_core::types::{KeyImage, Point, Scalar, Signature};

use crate::hash::hash_to_point;
use crate::keypair::{decompress, scalar_to_dalek};
use crate::CryptoError;

fn hp(public: &Point) -> RistrettoPoint {
    decompress(&hash_to_point(public.as_bytes())).expect("hash_to_point always lands on-curve")
}

fn challenge(message: &[u8], l: &RistrettoPoint, r: &RistrettoPoint) -> DalekScalar {
    let mut hasher = Sha3_512::new();
    hasher.update(b"carapace-clsag-challenge");
    hasher.update(message);
    hasher.update(l.compress().as_bytes());
    hasher.update(r.compress().as_bytes());
    DalekScalar::from_hash(hasher)
}

/// `I = x * Hp(P)`, the double-spend tag for the one-time key `(x, P)`.
pub fn derive_key_image(secret: &Scalar, public: &Point) -> KeyImage {
    let x = scalar_to_dalek(secret);
    let image = x * hp(public);
    KeyImage::from_bytes(image.compress().to_bytes())
}

/// Signs `message` on behalf of `ring[signing_index]`, given that member's
/// secret key. Returns the signature; the key image is computed separately
/// via `derive_key_image` and stored in the transaction body.
pub fn sign(
    ring: &[Point],
    signing_index: usize,
    secret: &Scalar,
    message: &[u8],
) -> Result<Signature, CryptoError> {
    let n = ring.len();
    if n == 0 || signing_index >= n {
        return Err(CryptoError::BadKey);
    }

    let points: Vec<RistrettoPoint> = ring
        .iter()
        .map(decompress)
        .collect::<Result<_, _>>()?;
    let x = scalar_to_dalek(secret);
    let image = x * hp(&ring[signing_index]);

    let mut c = vec![DalekScalar::ZERO; n];
    let mut s = vec![DalekScalar::ZERO; n];

    let alpha = DalekScalar::random(&mut OsRng);
    let next = (signing_index + 1) % n;
    c[next] = challenge(message, &(alpha * RISTRETTO_BASEPOINT_POINT), &(alpha * hp(&ring[signing_index])));

    let mut i = next;
    while i != signing_index {
        s[i] = DalekScalar::random(&mut OsRng);
        let l = s[i] * RISTRETTO_BASEPOINT_POINT + c[i] * points[i];
        let r = s[i] * hp(&ring[i]) + c[i] * image;
        let j = (i + 1) % n;
        c[j] = challenge(message, &l, &r);
        i = j;
    }

    s[signing_index] = alpha - c[signing_index] * x;

    let mut bytes = Vec::with_capacity(32 * (n + 1));
    bytes.extend_from_slice(c[0].as_bytes());
    for si in &s {
        bytes.extend_from_slice(si.as_bytes());
    }
    Ok(Signature(bytes))
}

/// Verifies a ring signature produced by `sign`. `ring` and `key_image` must
/// be supplied in the same order used when signing (the `offsets` field of
/// the transaction suffix resolves `ring` from the global output index).
pub fn verify(ring: &[Point], key_image: &KeyImage, message: &[u8], sig: &Signature) -> bool {
    let n = ring.len();
    if n == 0 || sig.0.len() != 32 * (n + 1) {
        return false;
    }
    let image = match decompress(&Point::from_bytes(*key_image.as_bytes())) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let points: Vec<RistrettoPoint> = match ring.iter().map(decompress).collect::<Result<_, _>>() {
        Ok(p) => p,
        Err(_) => return false,
    };

    let mut scalars = Vec::with_capacity(n + 1);
    for chunk in sig.0.chunks_exact(32) {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(chunk);
        match Option::<DalekScalar>::from(DalekScalar::from_canonical_bytes(arr)) {
            Some(v) => scalars.push(v),
            None => return false,
        }
    }
    let c0 = scalars[0];
    let s = &scalars[1..];

    let mut c = c0;
    for i in 0..n {
        let l = s[i] * RISTRETTO_BASEPOINT_POINT + c * points[i];
        let r = s[i] * hp(&ring[i]) + c * image;
        c = challenge(message, &l, &r);
    }
    c == c0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::KeyPair;

    #[test]
    fn sign_and_verify_round_trip() {
        let signer = KeyPair::generate();
        let decoys: Vec<Point> = (0..5).map(|_| KeyPair::generate().public).collect();
        let mut ring = decoys;
        ring.insert(2, signer.public);

        let message = b"transfer 10 coins";
        let sig = sign(&ring, 2, signer.secret(), message).unwrap();
        let image = derive_key_image(signer.secret(), &signer.public);

        assert!(verify(&ring, &image, message, &sig));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let signer = KeyPair::generate();
        let ring = vec![KeyPair::generate().public, signer.public, KeyPair::generate().public];
        let sig = sign(&ring, 1, signer.secret(), b"original").unwrap();
        let image = derive_key_image(signer.secret(), &signer.public);
        assert!(!verify(&ring, &image, b"tampered", &sig));
    }

    #[test]
    fn key_image_is_stable_for_same_keypair() {
        let signer = KeyPair::generate();
        let i1 = derive_key_image(signer.secret(), &signer.public);
        let i2 = derive_key_image(signer.secret(), &signer.public);
        assert_eq!(i1, i2);
    }
}
