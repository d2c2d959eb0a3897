//! P2P integration test for carapace-node.
//!
//! Starts two node processes sharing the same genesis:
//!   Node A — seed node (never dials out)
//!   Node B — joins by dialing node A as its seed
//!
//! Verifies both reach the HANDSHAKE-established state by asserting each
//! side's connection counts via `carapace_getStatus`, and that both agree
//! on the genesis block hash.
//!
//! Run with:
//!   cargo test -p carapace-node --test p2p

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use carapace_crypto::keypair::derive_public;
use carapace_crypto::KeyPair;
use carapace_genesis::{GenesisAllocation, GenesisParams};

struct NodeGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

async fn rpc_call(client: &reqwest::Client, url: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
    let body = serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1});
    let resp = client.post(url).json(&body).send().await.unwrap_or_else(|e| panic!("RPC call {method} failed: {e}"));
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = json.get("error") {
        panic!("RPC error from {method}: {err}");
    }
    json["result"].clone()
}

async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let body = serde_json::json!({"jsonrpc": "2.0", "method": "carapace_getStatus", "params": [], "id": 1});
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.post(url).json(&body).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    false
}

/// Polls `carapace_getStatus` until `incoming + outgoing` connections is
/// nonzero, or the timeout elapses.
async fn wait_for_peer(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let status = rpc_call(client, url, "carapace_getStatus", serde_json::json!([])).await;
        let incoming = status["incoming_connections"].as_u64().unwrap_or(0);
        let outgoing = status["outgoing_connections"].as_u64().unwrap_or(0);
        if incoming + outgoing > 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    false
}

fn genesis_params_for(dir: &Path) -> PathBuf {
    let view = KeyPair::generate();
    let spend = KeyPair::generate();
    let candidate = KeyPair::generate();
    let params = GenesisParams {
        timestamp: 1_700_000_000,
        allocations: vec![GenesisAllocation {
            public_view_key: derive_public(view.secret()),
            public_spend_key: derive_public(spend.secret()),
            amount: 2_500_000,
        }],
        initial_candidates: vec![derive_public(candidate.secret())],
    };
    let path = dir.join("genesis-params.json");
    std::fs::write(&path, serde_json::to_string(&params).unwrap()).unwrap();
    path
}

fn spawn_node(data_dir: &Path, rpc_port: u16, p2p_port: u16, params_path: &Path, seed: Option<u16>, seed_mode: bool) -> Child {
    let node_bin = env!("CARGO_BIN_EXE_carapace-node");
    let mut cmd = Command::new(node_bin);
    cmd.args([
        "--db-path",
        data_dir.join("state").to_str().unwrap(),
        "--port",
        &p2p_port.to_string(),
        "--rpc-addr",
        &format!("127.0.0.1:{rpc_port}"),
        "--genesis-params",
        params_path.to_str().unwrap(),
        "--log-level",
        "1",
    ]);
    if seed_mode {
        cmd.arg("--seed-mode");
    }
    if let Some(seed_port) = seed {
        cmd.args(["--seed-node", &format!("127.0.0.1:{seed_port}")]);
    }
    cmd.stdout(Stdio::null()).stderr(Stdio::null()).spawn().expect("failed to spawn carapace-node")
}

#[tokio::test]
async fn p2p_handshake_establishes_between_two_nodes() {
    let http = reqwest::Client::new();

    let base_dir = std::env::temp_dir().join(format!("carapace_p2p_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&base_dir);
    let dir_a = base_dir.join("node_a");
    let dir_b = base_dir.join("node_b");
    std::fs::create_dir_all(&dir_a).unwrap();
    std::fs::create_dir_all(&dir_b).unwrap();

    let params_path_a = genesis_params_for(&dir_a);
    let params_path_b = dir_b.join("genesis-params.json");
    std::fs::copy(&params_path_a, &params_path_b).unwrap();

    let rpc_a = free_port();
    let p2p_a = free_port();
    let url_a = format!("http://127.0.0.1:{rpc_a}");
    let child_a = spawn_node(&dir_a, rpc_a, p2p_a, &params_path_a, None, true);
    let _guard_a = NodeGuard { child: child_a, data_dir: dir_a };

    assert!(wait_for_rpc(&http, &url_a, Duration::from_secs(20)).await, "node A did not become ready");

    let status_a = rpc_call(&http, &url_a, "carapace_getStatus", serde_json::json!([])).await;
    let genesis_hash_a = status_a["tip_hash"].as_str().unwrap().to_string();

    let rpc_b = free_port();
    let p2p_b = free_port();
    let url_b = format!("http://127.0.0.1:{rpc_b}");
    let child_b = spawn_node(&dir_b, rpc_b, p2p_b, &params_path_b, Some(p2p_a), false);
    let _guard_b = NodeGuard { child: child_b, data_dir: dir_b };

    assert!(wait_for_rpc(&http, &url_b, Duration::from_secs(20)).await, "node B did not become ready");

    let status_b = rpc_call(&http, &url_b, "carapace_getStatus", serde_json::json!([])).await;
    assert_eq!(status_b["tip_hash"].as_str().unwrap(), genesis_hash_a, "both nodes must agree on genesis");

    assert!(wait_for_peer(&http, &url_a, Duration::from_secs(10)).await, "node A never saw an incoming connection");
    assert!(wait_for_peer(&http, &url_b, Duration::from_secs(10)).await, "node B never saw an outgoing connection");
}
