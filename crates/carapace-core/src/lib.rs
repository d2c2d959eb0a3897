pub mod address;
pub mod block;
pub mod codec;
pub mod constants;
pub mod error;
pub mod fee;
pub mod transaction;
pub mod types;

pub use block::{Block, BlockDigestMode, StakerRewardTx};
pub use constants::*;
pub use error::{CoreError, CoreResult};
pub use transaction::{
    Output, Prefix, Suffix, Transaction, TxBody, TAG_COINBASE, TAG_GENESIS, TAG_NORMAL,
    TAG_RECALL_STAKE, TAG_STAKE, TAG_STAKE_REFUND,
};
pub use types::{BlockIndex, Hash, KeyImage, Point, RangeProof, Scalar, Signature, Timestamp};
