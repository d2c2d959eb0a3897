//! The Argon2id proof-of-work predicate:
//! `argon2id(sha3(digest || range_proof_hash))` with the fixed cost
//! parameters from spec §6 (`POW_ITERATIONS`, `POW_MEMORY_KB`,
//! `POW_THREADS`). `carapace-core::Transaction::mine`/`pow_verify` take the
//! Argon2id closure as a parameter so the codec crate stays free of a direct
//! dependency on the crypto collaborator; this module is where that closure
//! is built.

use argon2::{Algorithm, Argon2, Params, Version};

use carapace_core::constants::{POW_ITERATIONS, POW_MEMORY_KB, POW_THREADS};

use crate::hash::sha3_256;

/// Fixed salt: the PoW predicate takes no salt parameter, so this
/// pins one constant value rather than leaving Argon2's default (which
/// requires a random salt of its own).
const POW_SALT: &[u8] = b"carapace-pow-v1-";

fn argon2() -> Argon2<'static> {
    let params = Params::new(POW_MEMORY_KB, POW_ITERATIONS, POW_THREADS, Some(32))
        .expect("fixed PoW parameters are always valid");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// `argon2id(sha3(input))` with the protocol's fixed cost parameters: the
/// inner SHA3 pass is spec.md §4.2's `sha3(digest || range_proof_hash)`.
pub fn pow_hash(input: &[u8; 64]) -> [u8; 32] {
    let inner = sha3_256(input);
    let mut out = [0u8; 32];
    argon2()
        .hash_password_into(inner.as_bytes(), POW_SALT, &mut out)
        .expect("fixed-size input/output never overflows Argon2's limits");
    out
}

pub fn leading_zero_bits(hash: &[u8; 32]) -> u32 {
    let mut count = 0u32;
    for byte in hash {
        if *byte == 0 {
            count += 8;
            continue;
        }
        count += byte.leading_zeros();
        break;
    }
    count
}

/// Predicate form: does `pow_hash(input)` meet `zeros` leading zero bits?
pub fn pow_verify(input: &[u8; 64], zeros: u32) -> bool {
    leading_zero_bits(&pow_hash(input)) >= zeros
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow_hash_is_deterministic() {
        let input = [7u8; 64];
        assert_eq!(pow_hash(&input), pow_hash(&input));
    }

    #[test]
    fn different_inputs_give_different_hashes() {
        assert_ne!(pow_hash(&[1u8; 64]), pow_hash(&[2u8; 64]));
    }

    #[test]
    fn verify_zero_target_always_passes() {
        assert!(pow_verify(&[5u8; 64], 0));
    }
}
