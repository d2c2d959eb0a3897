use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tracing::info;

use carapace_core::transaction::Transaction;
use carapace_core::types::Hash;
use carapace_ledger::ChainStore;

use crate::api::CarapaceApiServer;
use crate::types::{RpcBlock, RpcNodeStatus, RpcStakerRewardOutput, RpcSubmitResult, RpcTransaction};

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

fn transaction_kind(tx: &Transaction) -> &'static str {
    match tx {
        Transaction::Genesis { .. } => "genesis",
        Transaction::Coinbase { .. } => "coinbase",
        Transaction::Normal { .. } => "normal",
        Transaction::Stake { .. } => "stake",
        Transaction::RecallStake { .. } => "recall_stake",
        Transaction::StakeRefund { .. } => "stake_refund",
    }
}

fn tx_to_rpc(tx: &Transaction) -> RpcResult<RpcTransaction> {
    let hash = tx.hash().map_err(|e| rpc_err(-32603, e.to_string()))?;
    Ok(RpcTransaction {
        hash: hash.to_hex(),
        kind: transaction_kind(tx).to_string(),
        encoded: hex::encode(tx.serialize()),
    })
}

fn block_to_rpc(block: &carapace_core::Block) -> RpcResult<RpcBlock> {
    let hash = block.hash().map_err(|e| rpc_err(-32603, e.to_string()))?;
    Ok(RpcBlock {
        hash: hash.to_hex(),
        version: block.version,
        previous_blockhash: block.previous_blockhash.to_hex(),
        timestamp: block.timestamp,
        block_index: block.block_index,
        staker_reward_outputs: block
            .staker_reward_tx
            .outputs
            .iter()
            .map(|(staker_id, amount)| RpcStakerRewardOutput {
                staker_id: staker_id.to_hex(),
                amount: *amount,
            })
            .collect(),
        transactions: block.transactions.iter().map(|h| h.to_hex()).collect(),
        producer_public_key: block.producer.as_ref().map(|(key, _)| key.to_hex()),
        validator_count: block.validator_signatures.len(),
    })
}

/// Shared state passed to the RPC server.
pub struct RpcServerState {
    pub chain: Arc<ChainStore>,
    pub node_version: String,
    pub protocol_version: u64,
    /// Called on every `carapace_getStatus` request; owned by the binary so
    /// the RPC crate never has to depend on the P2P node directly.
    pub status_provider: Box<dyn Fn() -> RpcNodeStatus + Send + Sync>,
    /// Called with a freshly decoded transaction when submitted via
    /// `carapace_sendTransaction`; returns `true` if it was accepted into
    /// the pending pool.
    pub submit_transaction: Box<dyn Fn(Transaction) -> bool + Send + Sync>,
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Starts the JSON-RPC server on `addr`. Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let server = Server::builder().build(addr).await?;
        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

#[async_trait]
impl CarapaceApiServer for RpcServer {
    async fn get_status(&self) -> RpcResult<RpcNodeStatus> {
        let mut status = (self.state.status_provider)();
        status.node_version = self.state.node_version.clone();
        status.protocol_version = self.state.protocol_version;
        let tip = self
            .state
            .chain
            .tip()
            .map_err(|e| rpc_err(-32603, e.to_string()))?;
        status.height = tip.map(|(h, _)| h).unwrap_or(0);
        status.tip_hash = tip.map(|(_, h)| h.to_hex());
        Ok(status)
    }

    async fn get_block_by_hash(&self, hash: String) -> RpcResult<Option<RpcBlock>> {
        let hash = Hash::from_hex(&hash).map_err(|e| rpc_err(-32602, format!("invalid hash: {e}")))?;
        let block = self
            .state
            .chain
            .get_block_by_hash(&hash)
            .map_err(|e| rpc_err(-32603, e.to_string()))?;
        block.as_ref().map(block_to_rpc).transpose()
    }

    async fn get_block_by_height(&self, height: u64) -> RpcResult<Option<RpcBlock>> {
        let block = self
            .state
            .chain
            .get_block_by_height(height)
            .map_err(|e| rpc_err(-32603, e.to_string()))?;
        block.as_ref().map(block_to_rpc).transpose()
    }

    async fn get_transaction(&self, hash: String) -> RpcResult<Option<RpcTransaction>> {
        let hash = Hash::from_hex(&hash).map_err(|e| rpc_err(-32602, format!("invalid hash: {e}")))?;
        let tx = self
            .state
            .chain
            .get_transaction(&hash)
            .map_err(|e| rpc_err(-32603, e.to_string()))?;
        tx.as_ref().map(tx_to_rpc).transpose()
    }

    async fn send_transaction(&self, tx_hex: String) -> RpcResult<RpcSubmitResult> {
        let bytes = hex::decode(&tx_hex).map_err(|e| rpc_err(-32602, format!("invalid hex: {e}")))?;
        let tx = Transaction::deserialize(&bytes).map_err(|e| rpc_err(-32602, format!("invalid transaction: {e}")))?;
        let tx_hash = tx.hash().map_err(|e| rpc_err(-32603, e.to_string()))?;
        let accepted = (self.state.submit_transaction)(tx);
        Ok(RpcSubmitResult {
            tx_hash: tx_hash.to_hex(),
            accepted,
        })
    }
}
