//! The election engine (C6): deterministic, stake-weighted selection of a
//! producer set and a disjoint validator set for a round, derived from the
//! previous round's block hashes and the current stake ledger.

use std::collections::BTreeMap;
use std::ops::Bound;

use carapace_core::constants::ELECTOR_TARGET_COUNT;
use carapace_core::types::{Hash, Point};
use carapace_crypto::{hash_to_point, merkle_root, sha3_256};
use num_bigint::BigUint;

use crate::error::{ConsensusError, ConsensusResult};

fn to_biguint_le(bytes: &[u8; 32]) -> BigUint {
    BigUint::from_bytes_le(bytes)
}

fn biguint_to_u64(value: &BigUint) -> u64 {
    let bytes = value.to_bytes_le();
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

/// Seed derived from the previous round's block hashes.
struct Seed {
    point: Point,
    value: BigUint,
    even: bool,
}

fn derive_seed(last_round_blocks: &[Hash]) -> Seed {
    let root = merkle_root(last_round_blocks);
    let point = hash_to_point(root.as_bytes());
    let value = to_biguint_le(point.as_bytes());
    let parity: u32 = point.as_bytes().iter().map(|b| *b as u32).sum();
    Seed {
        point,
        value,
        even: parity % 2 == 0,
    }
}

/// Resolves a tie between `incumbent` and `candidate` occupying the same
/// vote-count slot: `e = seed mod max(H(incumbent), H(candidate))`, then the
/// first of the two (by `H`) strictly greater than `e` wins. If neither
/// qualifies the incumbent is kept (see DESIGN.md).
fn tie_break(seed_value: &BigUint, incumbent: Point, candidate: Point) -> Point {
    let h_incumbent = to_biguint_le(sha3_256(incumbent.as_bytes()).as_bytes());
    let h_candidate = to_biguint_le(sha3_256(candidate.as_bytes()).as_bytes());
    let modulus = h_incumbent.clone().max(h_candidate.clone());
    if modulus == BigUint::from(0u8) {
        return incumbent;
    }
    let e = seed_value % &modulus;

    let mut ordered = [(h_incumbent, incumbent), (h_candidate, candidate)];
    ordered.sort_by(|a, b| a.0.cmp(&b.0));
    for (h, point) in ordered {
        if h > e {
            return point;
        }
    }
    incumbent
}

type House = BTreeMap<u64, Point>;

fn place(house: &mut House, seed_value: &BigUint, votes: u64, candidate: Point) {
    match house.get(&votes).copied() {
        Some(incumbent) => {
            let winner = tie_break(seed_value, incumbent, candidate);
            house.insert(votes, winner);
        }
        None => {
            house.insert(votes, candidate);
        }
    }
}

fn trim_extremes(house: &mut House) {
    if let Some(&min_key) = house.keys().next() {
        house.remove(&min_key);
    }
    if let Some(&max_key) = house.keys().next_back() {
        house.remove(&max_key);
    }
}

/// `upper_bound(e)`: the entry with the smallest key strictly greater than
/// `e`, per the tie-break rule's "silently keep nothing found" semantics
/// (the caller only invokes this when a qualifying key is guaranteed to
/// exist, since `e < V_max` and `V_max` is itself a key in the house).
fn upper_bound(house: &House, e: u64) -> Option<u64> {
    house
        .range((Bound::Excluded(e), Bound::Unbounded))
        .next()
        .map(|(k, _)| *k)
}

fn select(house: &mut House, seed_value: &BigUint, target: usize, already_elected: &[Point]) -> Vec<Point> {
    let mut elected = Vec::new();
    while elected.len() < target && !house.is_empty() {
        let v_max = *house.keys().next_back().unwrap();
        let e = biguint_to_u64(&(seed_value % BigUint::from(v_max)));
        let key = match upper_bound(house, e) {
            Some(k) => k,
            None => v_max,
        };
        let candidate = house.remove(&key).expect("upper_bound key must be present");
        if already_elected.contains(&candidate) {
            continue;
        }
        elected.push(candidate);
    }
    elected
}

/// The result of `run_election`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElectionResult {
    pub producers: Vec<Point>,
    pub validators: Vec<Point>,
}

/// Runs the election: `candidates` pairs each candidate's public key with
/// its vote total (`Σ stake edges`, already summed by the caller from the
/// stake ledger), `last_round_blocks` is the ordered set of block hashes
/// from the round just finished, and `permanent_candidates` are prepended
/// unconditionally to both output lists.
pub fn run_election(
    candidates: &[(Point, u64)],
    last_round_blocks: &[Hash],
    permanent_candidates: &[Point],
) -> ConsensusResult<ElectionResult> {
    if last_round_blocks.is_empty() {
        return Err(ConsensusError::EmptyRound);
    }

    let seed = derive_seed(last_round_blocks);

    let mut lower_house: House = BTreeMap::new();
    let mut upper_house: House = BTreeMap::new();

    for &(candidate, votes) in candidates {
        if votes == 0 {
            continue;
        }
        let candidate_value = to_biguint_le(candidate.as_bytes());
        if candidate_value <= seed.value {
            place(&mut lower_house, &seed.value, votes, candidate);
        } else {
            place(&mut upper_house, &seed.value, votes, candidate);
        }
    }

    trim_extremes(&mut lower_house);
    trim_extremes(&mut upper_house);

    let (mut producer_house, mut validator_house) = if seed.even {
        (lower_house, upper_house)
    } else {
        (upper_house, lower_house)
    };

    // Seed with the permanent candidates first, then only fill the
    // remaining slots up to `ELECTOR_TARGET_COUNT`: permanents consume
    // slots rather than riding on top of a full organic selection.
    let mut producers: Vec<Point> = Vec::new();
    for permanent in permanent_candidates {
        if !producers.contains(permanent) {
            producers.push(*permanent);
        }
    }
    let producer_target = ELECTOR_TARGET_COUNT.saturating_sub(producers.len());
    let selected_producers = select(&mut producer_house, &seed.value, producer_target, &producers);
    producers.extend(selected_producers);

    let mut validators: Vec<Point> = Vec::new();
    for permanent in permanent_candidates {
        if !validators.contains(permanent) {
            validators.push(*permanent);
        }
    }
    let validator_target = ELECTOR_TARGET_COUNT.saturating_sub(validators.len());
    let selected_validators = select(&mut validator_house, &seed.value, validator_target, &producers);
    validators.extend(selected_validators);

    producers.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
    validators.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

    tracing::debug!(
        producers = producers.len(),
        validators = validators.len(),
        seed_even = seed.even,
        "election round resolved"
    );

    Ok(ElectionResult { producers, validators })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(byte: u8) -> Point {
        Point::from_bytes([byte; 32])
    }

    fn hash(byte: u8) -> Hash {
        Hash::from_bytes([byte; 32])
    }

    #[test]
    fn s4_election_is_deterministic() {
        let candidates = vec![(point(1), 100), (point(2), 200), (point(3), 300)];
        let last_round = vec![hash(10), hash(11)];

        let a = run_election(&candidates, &last_round, &[]).unwrap();
        let b = run_election(&candidates, &last_round, &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn permanent_candidates_always_present() {
        let permanent = point(99);
        let candidates = vec![(point(1), 100), (point(2), 200)];
        let last_round = vec![hash(10)];

        let result = run_election(&candidates, &last_round, &[permanent]).unwrap();
        assert!(result.producers.contains(&permanent));
        assert!(result.validators.contains(&permanent));
    }

    #[test]
    fn producers_and_validators_are_disjoint_from_the_raw_selection() {
        let candidates: Vec<_> = (1..20u8).map(|i| (point(i), (i as u64) * 10)).collect();
        let last_round = vec![hash(42)];

        let result = run_election(&candidates, &last_round, &[]).unwrap();
        let producer_set: std::collections::HashSet<_> = result.producers.iter().collect();
        for validator in &result.validators {
            if producer_set.contains(validator) {
                panic!("validator {:?} also a producer outside permanent candidates", validator);
            }
        }
    }

    #[test]
    fn output_lists_are_sorted_ascending() {
        let candidates: Vec<_> = (1..10u8).map(|i| (point(i), (i as u64) * 5)).collect();
        let last_round = vec![hash(7)];

        let result = run_election(&candidates, &last_round, &[]).unwrap();
        assert!(result.producers.windows(2).all(|w| w[0].as_bytes() <= w[1].as_bytes()));
        assert!(result.validators.windows(2).all(|w| w[0].as_bytes() <= w[1].as_bytes()));
    }

    #[test]
    fn empty_round_is_rejected() {
        assert!(matches!(run_election(&[], &[], &[]), Err(ConsensusError::EmptyRound)));
    }

    #[test]
    fn trim_extremes_empties_a_one_or_two_entry_house() {
        let mut one: House = BTreeMap::new();
        one.insert(10, point(1));
        trim_extremes(&mut one);
        assert!(one.is_empty());

        let mut two: House = BTreeMap::new();
        two.insert(10, point(1));
        two.insert(20, point(2));
        trim_extremes(&mut two);
        assert!(two.is_empty());
    }

    #[test]
    fn permanent_candidates_cap_the_elected_lists_at_the_target_count() {
        // Three permanents plus a large organic pool: the selection step
        // must only fill the remaining seven slots, not a full ten on top
        // of the permanents.
        let permanents = vec![point(90), point(91), point(92)];
        let candidates: Vec<_> = (1..50u8).map(|i| (point(i), (i as u64) * 10)).collect();
        let last_round = vec![hash(5)];

        let result = run_election(&candidates, &last_round, &permanents).unwrap();
        assert_eq!(result.producers.len(), ELECTOR_TARGET_COUNT);
        assert_eq!(result.validators.len(), ELECTOR_TARGET_COUNT);
        for permanent in &permanents {
            assert!(result.producers.contains(permanent));
            assert!(result.validators.contains(permanent));
        }
    }
}
