//! Domain-separated sponge hash and hash-to-point, shared by every crate
//! that needs to turn bytes into a `Hash` or a group element.

use sha3::{Digest, Sha3_256, Sha3_512};

use carapace_core::types::{Hash, Point};

/// `sha3_256(domain || bytes)`. Every caller picks a short ASCII domain tag
/// so hashes computed for different purposes can never collide by accident.
pub fn domain_hash(domain: &str, bytes: &[u8]) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(domain.as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}

/// Plain `sha3_256(bytes)`, no domain tag — used where the caller already
/// encodes its own framing (canonical transaction/block encodings).
pub fn sha3_256(bytes: &[u8]) -> Hash {
    let digest = Sha3_256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}

/// Maps arbitrary bytes onto a group element by wide-reducing a 64-byte
/// SHA3-512 digest onto the curve, the same "hash-then-reduce" idiom Ristretto
/// and Ed25519 implementations use for hash-to-curve. Used by the election
/// engine (`hash_to_point(merkle_root)`) and by the ring signature layer
/// (`Hp(pubkey)` for key images).
pub fn hash_to_point(bytes: &[u8]) -> Point {
    let digest = Sha3_512::digest(bytes);
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    let point = curve25519_dalek::ristretto::RistrettoPoint::from_uniform_bytes(&wide);
    Point::from_bytes(point.compress().to_bytes())
}

/// The Merkle root of an ordered sequence of block hashes: a binary tree of
/// `sha3_256(left || right)`, duplicating the last node on odd levels.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash([0u8; 32]);
    }
    let mut level: Vec<Hash> = hashes.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().unwrap();
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = Vec::with_capacity(64);
                buf.extend_from_slice(pair[0].as_bytes());
                buf.extend_from_slice(pair[1].as_bytes());
                sha3_256(&buf)
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_to_point_is_deterministic() {
        let a = hash_to_point(b"round-7");
        let b = hash_to_point(b"round-7");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_to_point_differs_per_input() {
        assert_ne!(hash_to_point(b"a"), hash_to_point(b"b"));
    }

    #[test]
    fn merkle_root_single_hash_is_itself() {
        let h = Hash([3u8; 32]);
        assert_eq!(merkle_root(&[h]), h);
    }

    #[test]
    fn merkle_root_is_order_sensitive() {
        let a = Hash([1u8; 32]);
        let b = Hash([2u8; 32]);
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }
}
