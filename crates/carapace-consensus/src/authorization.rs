//! Per-round authorization: checking that a block's producer and validator
//! signatures were actually cast by the keys the election engine elected
//! for that round. `Block::validate_construction` only checks structural
//! well-formedness; this is the "caller" context it defers to (see
//! `carapace-core::block`).

use carapace_core::constants::VALIDATOR_THRESHOLD_PERCENT;
use carapace_core::types::Point;
use std::collections::BTreeMap;

use crate::election::ElectionResult;

/// `true` if `producer` was this round's elected producer.
pub fn producer_is_authorized(election: &ElectionResult, producer: &Point) -> bool {
    election.producers.contains(producer)
}

/// `true` if enough of `validator_signatures`' keys were elected validators
/// to meet `VALIDATOR_THRESHOLD_PERCENT` of the elected validator set.
pub fn validator_quorum_met<V>(election: &ElectionResult, validator_signatures: &BTreeMap<Point, V>) -> bool {
    if election.validators.is_empty() {
        return false;
    }
    let signed_and_elected = validator_signatures
        .keys()
        .filter(|key| election.validators.contains(key))
        .count();
    signed_and_elected * 100 >= election.validators.len() * VALIDATOR_THRESHOLD_PERCENT as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(byte: u8) -> Point {
        Point::from_bytes([byte; 32])
    }

    #[test]
    fn producer_must_be_elected() {
        let election = ElectionResult {
            producers: vec![point(1)],
            validators: vec![point(2), point(3)],
        };
        assert!(producer_is_authorized(&election, &point(1)));
        assert!(!producer_is_authorized(&election, &point(9)));
    }

    #[test]
    fn quorum_requires_sixty_percent() {
        let election = ElectionResult {
            producers: vec![point(1)],
            validators: vec![point(2), point(3), point(4), point(5), point(6)],
        };
        let mut sigs = BTreeMap::new();
        sigs.insert(point(2), ());
        sigs.insert(point(3), ());
        assert!(!validator_quorum_met(&election, &sigs));

        sigs.insert(point(4), ());
        assert!(validator_quorum_met(&election, &sigs));
    }
}
