use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{Reader, Writer};
use crate::error::{CoreError, CoreResult};

/// Unix timestamp (seconds, UTC).
pub type Timestamp = u64;

/// Block height / round index.
pub type BlockIndex = u64;

macro_rules! fixed_hash_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn from_bytes(b: [u8; 32]) -> Self {
                Self(b)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> CoreResult<Self> {
                let bytes = hex::decode(s).map_err(|e| CoreError::Deserialization(e.to_string()))?;
                if bytes.len() != 32 {
                    return Err(CoreError::Deserialization(format!(
                        "{} must be 32 bytes, got {}",
                        stringify!($name),
                        bytes.len()
                    )));
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }

            pub fn write(&self, w: &mut Writer) {
                w.write_fixed(&self.0);
            }

            pub fn read(r: &mut Reader<'_>) -> CoreResult<Self> {
                Ok(Self(r.read_fixed_array::<32>()?))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}…)", stringify!($name), &self.to_hex()[..16])
            }
        }
    };
}

fixed_hash_type!(Hash, "32-byte opaque identifier: output of the domain-separated sponge hash.");
fixed_hash_type!(Point, "Compressed element of the prime-order group (public key, commitment, ...).");
fixed_hash_type!(Scalar, "Scalar value modulo the group order (secret key, blinding factor, ...).");
fixed_hash_type!(KeyImage, "Group element uniquely derived from a one-time secret; the double-spend tag.");

/// CLSAG-style ring signature. Treated as an opaque blob; verification is
/// delegated to `carapace-crypto`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    pub fn write(&self, w: &mut Writer) {
        w.write_bytes(&self.0);
    }

    pub fn read(r: &mut Reader<'_>) -> CoreResult<Self> {
        Ok(Self(r.read_bytes()?))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}b)", self.0.len())
    }
}

/// Bulletproofs+ aggregate range proof. Opaque blob; verification delegated
/// to `carapace-crypto`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeProof(pub Vec<u8>);

impl RangeProof {
    pub fn write(&self, w: &mut Writer) {
        w.write_bytes(&self.0);
    }

    pub fn read(r: &mut Reader<'_>) -> CoreResult<Self> {
        Ok(Self(r.read_bytes()?))
    }
}

impl fmt::Debug for RangeProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RangeProof({}b)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_hex_round_trips() {
        let h = Hash([7u8; 32]);
        let s = h.to_hex();
        assert_eq!(Hash::from_hex(&s).unwrap(), h);
    }

    #[test]
    fn hash_codec_round_trips() {
        let h = Hash([9u8; 32]);
        let mut w = Writer::new();
        h.write(&mut w);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(Hash::read(&mut r).unwrap(), h);
    }
}
