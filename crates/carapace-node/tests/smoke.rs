//! End-to-end smoke test for carapace-node.
//!
//! Starts a real node process against a fresh genesis and exercises the
//! JSON-RPC façade: status, genesis block lookup, and transaction
//! submission.
//!
//! Run with:
//!   cargo test -p carapace-node --test smoke

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use carapace_core::transaction::{Prefix, Transaction};
use carapace_core::types::Scalar;
use carapace_crypto::keypair::derive_public;
use carapace_crypto::rangeproof::commit;
use carapace_crypto::stealth::derive_output_key;
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
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
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

fn sample_genesis_params(data_dir: &std::path::Path) -> PathBuf {
    let view = KeyPair::generate();
    let spend = KeyPair::generate();
    let candidate = KeyPair::generate();
    let params = GenesisParams {
        timestamp: 1_700_000_000,
        allocations: vec![GenesisAllocation {
            public_view_key: derive_public(view.secret()),
            public_spend_key: derive_public(spend.secret()),
            amount: 5_000_000,
        }],
        initial_candidates: vec![derive_public(candidate.secret())],
    };
    let path = data_dir.join("genesis-params.json");
    std::fs::write(&path, serde_json::to_string(&params).unwrap()).unwrap();
    path
}

/// Builds a standalone `Coinbase` transaction paying a fresh one-time
/// output — no ring signature or key images required, so it exercises the
/// submission path without needing a spendable input to reference.
fn build_coinbase(block_index: u64) -> Transaction {
    let tx_secret = KeyPair::generate();
    let recipient_view = KeyPair::generate();
    let recipient_spend = KeyPair::generate();

    let one_time_key = derive_output_key(
        tx_secret.secret(),
        &derive_public(recipient_view.secret()),
        &derive_public(recipient_spend.secret()),
    )
    .unwrap();
    let blinding = Scalar::from_bytes([0u8; 32]);
    let commitment = commit(42, &blinding);

    Transaction::Coinbase {
        prefix: Prefix {
            version: 1,
            unlock_block: 0,
            tx_public_key: derive_public(tx_secret.secret()),
        },
        tx_secret_key: *tx_secret.secret(),
        block_index,
        outputs: vec![(one_time_key, 42, commitment)],
    }
}

#[tokio::test]
async fn smoke_status_genesis_and_submit() {
    let data_dir = std::env::temp_dir().join(format!("carapace_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    std::fs::create_dir_all(&data_dir).unwrap();

    let params_path = sample_genesis_params(&data_dir);

    let rpc_port = free_port();
    let p2p_port = free_port();
    let rpc_url = format!("http://127.0.0.1:{rpc_port}");

    let node_bin = env!("CARGO_BIN_EXE_carapace-node");
    let child = Command::new(node_bin)
        .args([
            "--db-path",
            data_dir.join("state").to_str().unwrap(),
            "--port",
            &p2p_port.to_string(),
            "--seed-mode",
            "--rpc-addr",
            &format!("127.0.0.1:{rpc_port}"),
            "--genesis-params",
            params_path.to_str().unwrap(),
            "--log-level",
            "1",
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn carapace-node");

    let _guard = NodeGuard { child, data_dir };

    let http = reqwest::Client::new();
    assert!(
        wait_for_rpc(&http, &rpc_url, Duration::from_secs(20)).await,
        "carapace-node did not become ready within 20 seconds"
    );

    let status = rpc_call(&http, &rpc_url, "carapace_getStatus", serde_json::json!([])).await;
    assert_eq!(status["height"], 0);
    assert!(status["tip_hash"].is_string());
    assert_eq!(status["peer_id"].as_str().unwrap().len(), 64);

    let genesis_hash = status["tip_hash"].as_str().unwrap().to_string();

    let block = rpc_call(&http, &rpc_url, "carapace_getBlockByHeight", serde_json::json!([0])).await;
    assert_eq!(block["hash"], genesis_hash);
    assert_eq!(block["block_index"], 0);
    assert_eq!(block["transactions"].as_array().unwrap().len(), 1);

    let by_hash = rpc_call(&http, &rpc_url, "carapace_getBlockByHash", serde_json::json!([genesis_hash])).await;
    assert_eq!(by_hash["block_index"], 0);

    let tx = build_coinbase(1);
    let tx_hex = hex::encode(tx.serialize());
    let submit = rpc_call(&http, &rpc_url, "carapace_sendTransaction", serde_json::json!([tx_hex])).await;
    assert_eq!(submit["accepted"], true);
    assert_eq!(submit["tx_hash"], tx.hash().unwrap().to_hex());
}
