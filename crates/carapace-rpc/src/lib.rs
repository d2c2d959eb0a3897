//! carapace-rpc
//!
//! JSON-RPC 2.0 server exposing the external-collaborator surface this node
//! needs: node status plus read-only block/transaction lookup and
//! transaction submission. Everything else (wallet UX, account balances,
//! peer-list management) stays inside the node and the P2P fabric.
//!
//! Namespace: "carapace"
//! Methods:
//!   carapace_getStatus         — protocol/node version, tip, peer counts
//!   carapace_getBlockByHash    — committed block by hash
//!   carapace_getBlockByHeight  — committed block by height
//!   carapace_getTransaction    — committed transaction by hash
//!   carapace_sendTransaction   — submit a hex-encoded canonical transaction

pub mod api;
pub mod server;
pub mod types;

pub use api::CarapaceApiServer;
pub use server::RpcServer;
pub use server::RpcServerState;
pub use types::{RpcBlock, RpcNodeStatus, RpcStakerRewardOutput, RpcSubmitResult, RpcTransaction};
