use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{RpcBlock, RpcNodeStatus, RpcSubmitResult, RpcTransaction};

/// Carapace JSON-RPC 2.0 API definition.
///
/// All method names are prefixed with "carapace_" via `namespace = "carapace"`.
/// This is the minimal external-collaborator surface this node exposes:
/// node status, block/transaction lookup by hash, and transaction submission.
#[rpc(server, namespace = "carapace")]
pub trait CarapaceApi {
    /// Node identity, chain tip, and connection counts.
    #[method(name = "getStatus")]
    async fn get_status(&self) -> RpcResult<RpcNodeStatus>;

    /// Look up a committed block by its hash (hex).
    #[method(name = "getBlockByHash")]
    async fn get_block_by_hash(&self, hash: String) -> RpcResult<Option<RpcBlock>>;

    /// Look up a committed block by height.
    #[method(name = "getBlockByHeight")]
    async fn get_block_by_height(&self, height: u64) -> RpcResult<Option<RpcBlock>>;

    /// Look up a committed transaction by its hash (hex).
    #[method(name = "getTransaction")]
    async fn get_transaction(&self, hash: String) -> RpcResult<Option<RpcTransaction>>;

    /// Submit a transaction. `tx_hex` is hex-encoded canonical bytes
    /// (`Transaction::serialize`). Returns the transaction's hash on
    /// acceptance into the pending pool.
    #[method(name = "sendTransaction")]
    async fn send_transaction(&self, tx_hex: String) -> RpcResult<RpcSubmitResult>;
}
