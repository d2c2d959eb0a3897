//! Public wallet address codec: `Base58Check(varint(PREFIX) || spend || view)`.
//!
//! The upstream CryptoNote family encodes addresses block-wise (8-byte
//! chunks mapped to 11 Base58 characters each) rather than as one flat
//! Base58Check blob. `bs58` only implements the flat form, so this is a
//! deliberate simplification recorded in DESIGN.md: the checksum and prefix
//! framing match the upstream format exactly, only the block granularity differs.

use sha3::{Digest, Sha3_256};

use crate::codec::Writer;
use crate::constants::PUBLIC_ADDRESS_PREFIX;
use crate::error::{CoreError, CoreResult};
use crate::types::Point;

const CHECKSUM_LEN: usize = 4;

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha3_256::digest(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

/// Encodes a public spend/view key pair into a Base58Check address string.
pub fn encode(public_spend: &Point, public_view: &Point) -> String {
    let mut w = Writer::new();
    w.write_varint(PUBLIC_ADDRESS_PREFIX);
    w.write_fixed(public_spend.as_bytes());
    w.write_fixed(public_view.as_bytes());
    let payload = w.into_bytes();

    let mut full = payload.clone();
    full.extend_from_slice(&checksum(&payload));

    bs58::encode(full).into_string()
}

/// Decodes a Base58Check address string into `(public_spend, public_view)`.
pub fn decode(address: &str) -> CoreResult<(Point, Point)> {
    let full = bs58::decode(address)
        .into_vec()
        .map_err(|e| CoreError::Base58Decode(e.to_string()))?;

    if full.len() < CHECKSUM_LEN {
        return Err(CoreError::Base58Decode("address too short".into()));
    }

    let (payload, check) = full.split_at(full.len() - CHECKSUM_LEN);
    if checksum(payload) != check {
        return Err(CoreError::Base58Decode("checksum mismatch".into()));
    }

    let mut r = crate::codec::Reader::new(payload);
    let prefix = r.read_varint().map_err(|_| CoreError::AddressPrefixMismatch)?;
    if prefix != PUBLIC_ADDRESS_PREFIX {
        return Err(CoreError::AddressPrefixMismatch);
    }

    let spend = Point::read(&mut r).map_err(|_| CoreError::NotAPublicKey)?;
    let view = Point::read(&mut r).map_err(|_| CoreError::NotAPublicKey)?;

    Ok((spend, view))
}
