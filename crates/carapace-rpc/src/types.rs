use serde::{Deserialize, Serialize};

/// Node and protocol status returned by `carapace_getStatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNodeStatus {
    pub protocol_version: u64,
    pub node_version: String,
    pub peer_id: String,
    pub height: u64,
    pub tip_hash: Option<String>,
    pub incoming_connections: usize,
    pub outgoing_connections: usize,
    pub peer_count: usize,
}

/// One block output committed to the staker-reward vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcStakerRewardOutput {
    pub staker_id: String,
    pub amount: u64,
}

/// JSON view of a committed block, returned by `carapace_getBlockByHash`
/// and `carapace_getBlockByHeight`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcBlock {
    pub hash: String,
    pub version: u64,
    pub previous_blockhash: String,
    pub timestamp: u64,
    pub block_index: u64,
    pub staker_reward_outputs: Vec<RpcStakerRewardOutput>,
    pub transactions: Vec<String>,
    pub producer_public_key: Option<String>,
    pub validator_count: usize,
}

/// JSON view of a committed transaction, returned by
/// `carapace_getTransaction`. Bodies are hex-encoded canonical bytes;
/// wallets decode with the same codec the node uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTransaction {
    pub hash: String,
    pub kind: String,
    pub encoded: String,
}

/// Result of `carapace_sendTransaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSubmitResult {
    pub tx_hash: String,
    pub accepted: bool,
}
