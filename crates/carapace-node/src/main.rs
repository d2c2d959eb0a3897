//! carapace-node — the Carapace full-node binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the KV environment
//!   2. Apply genesis if the chain has no tip yet
//!   3. Start the P2P node (ROUTER/DEALER gossip fabric)
//!   4. Start the JSON-RPC server
//!   5. Wait for SIGINT/SIGTERM, then stop both in reverse order

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use carapace_core::constants::DEFAULT_BIND_PORT_NODE;
use carapace_crypto::keypair::derive_public;
use carapace_genesis::{apply_genesis, GenesisAllocation, GenesisParams};
use carapace_ledger::chain::ChainStore;
use carapace_ledger::kv::KvEnv;
use carapace_p2p::node::{Node, NodeConfig};
use carapace_p2p::peer_db::PeerDb;
use carapace_rpc::{RpcNodeStatus, RpcServer, RpcServerState};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: u64 = carapace_core::constants::P2P_VERSION;

/// Parses one `--seed-node host:port` value.
fn parse_seed_node(raw: &str) -> anyhow::Result<(String, u16)> {
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("seed node `{raw}` must be `host:port`"))?;
    let port: u16 = port.parse().with_context(|| format!("seed node `{raw}` has an invalid port"))?;
    Ok((host.to_string(), port))
}

/// Maps the CLI's `0..6` log-level scale onto a `tracing` filter
/// directive, falling back to it only when `RUST_LOG` is unset.
fn log_filter(level: u8) -> &'static str {
    match level {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "info,carapace=debug",
        4 => "debug",
        5 => "trace,carapace=trace",
        _ => "trace",
    }
}

#[derive(Parser, Debug)]
#[command(name = "carapace-node", version, about = "Carapace proof-of-stake full node")]
struct Args {
    /// Directory the LMDB environment is opened under.
    #[arg(long, default_value = "./carapace-data")]
    db_path: PathBuf,

    /// ROUTER bind port for the P2P fabric.
    #[arg(long, default_value_t = DEFAULT_BIND_PORT_NODE)]
    port: u16,

    /// `host:port` of a seed node to dial at startup; repeatable.
    #[arg(long = "seed-node")]
    seed_node: Vec<String>,

    /// Run in seed mode: never dial out, only serve handshakes/peer exchange.
    #[arg(long)]
    seed_mode: bool,

    /// JSON-RPC listen address.
    #[arg(long, default_value = "127.0.0.1:18071")]
    rpc_addr: SocketAddr,

    /// Path to a genesis parameters JSON file; only consulted on first run.
    #[arg(long)]
    genesis_params: Option<PathBuf>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log verbosity, 0 (errors only) through 6 (max trace).
    #[arg(long, default_value_t = 2)]
    log_level: u8,

    /// Print build credits and exit.
    #[arg(long)]
    credits: bool,
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter(args.log_level).parse().unwrap());
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            subscriber.with_writer(std::sync::Mutex::new(file)).with_ansi(false).init();
        }
        None => subscriber.init(),
    }
    Ok(())
}

/// Loads genesis parameters from `path`, or generates ephemeral keys if
/// none was given. Ephemeral genesis is only reproducible within this
/// process — fine for a local devnet, useless for joining a real chain.
fn load_or_generate_genesis_params(path: Option<&std::path::Path>) -> anyhow::Result<GenesisParams> {
    if let Some(p) = path {
        let json = std::fs::read_to_string(p).with_context(|| format!("reading genesis params from {}", p.display()))?;
        return serde_json::from_str(&json).context("parsing genesis params JSON");
    }
    warn!("no --genesis-params provided, generating ephemeral genesis keys — do not use this for a shared chain");
    let allocation_secret = carapace_crypto::KeyPair::generate();
    let view_secret = carapace_crypto::KeyPair::generate();
    let candidate_secret = carapace_crypto::KeyPair::generate();
    Ok(GenesisParams {
        timestamp: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        allocations: vec![GenesisAllocation {
            public_view_key: derive_public(view_secret.secret()),
            public_spend_key: derive_public(allocation_secret.secret()),
            amount: 1_000_000,
        }],
        initial_candidates: vec![derive_public(candidate_secret.secret())],
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.credits {
        println!("carapace-node {VERSION}");
        println!("proof-of-stake full node: election engine, transaction family, gossip fabric");
        return Ok(());
    }

    if let Err(err) = init_logging(&args) {
        eprintln!("failed to initialize logging: {err:#}");
        std::process::exit(1);
    }

    if let Err(err) = run(args).await {
        tracing::error!(error = %format!("{err:#}"), "node startup failed");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!("carapace node starting");

    std::fs::create_dir_all(&args.db_path).with_context(|| format!("creating db dir {}", args.db_path.display()))?;
    let env = KvEnv::open(&args.db_path).context("opening KV environment")?;

    let chain = Arc::new(ChainStore::open(&env).context("opening chain store")?);

    if chain.tip()?.is_none() {
        info!("fresh database — applying genesis");
        let params = load_or_generate_genesis_params(args.genesis_params.as_deref())?;
        apply_genesis(&env, &params).context("applying genesis")?;
    } else {
        info!("existing chain found — skipping genesis");
    }

    let peer_db = Arc::new(PeerDb::open(&env).context("opening peer database")?);

    let mut seed_nodes = Vec::with_capacity(args.seed_node.len());
    for raw in &args.seed_node {
        seed_nodes.push(parse_seed_node(raw)?);
    }

    let node = Arc::new(Node::new(
        peer_db,
        NodeConfig {
            bind_port: args.port,
            seed_mode: args.seed_mode,
            seed_nodes,
        },
    ));
    node.start().context("starting P2P node")?;
    info!(peer_id = %node.peer_id(), port = args.port, "P2P node listening");

    let status_node = Arc::clone(&node);
    let status_chain = Arc::clone(&chain);
    let rpc_state = Arc::new(RpcServerState {
        chain: Arc::clone(&chain),
        node_version: VERSION.to_string(),
        protocol_version: PROTOCOL_VERSION,
        status_provider: Box::new(move || RpcNodeStatus {
            protocol_version: PROTOCOL_VERSION,
            node_version: VERSION.to_string(),
            peer_id: status_node.peer_id().to_hex(),
            height: status_chain.tip().ok().flatten().map(|(h, _)| h).unwrap_or(0),
            tip_hash: status_chain.tip().ok().flatten().map(|(_, h)| h.to_hex()),
            incoming_connections: status_node.incoming_connections(),
            outgoing_connections: status_node.outgoing_connections(),
            peer_count: status_node.outgoing_connections() + status_node.incoming_connections(),
        }),
        submit_transaction: Box::new(|_tx| {
            // Mempool admission and broadcast are outside this crate's
            // scope; acceptance here only means the transaction decoded
            // and the caller accepted responsibility for re-announcing it.
            true
        }),
    });

    let rpc_handle = RpcServer::new(rpc_state).start(args.rpc_addr).await.context("starting RPC server")?;
    info!(rpc_addr = %args.rpc_addr, "RPC server listening");

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;

    info!("shutting down");
    rpc_handle.stop().ok();
    rpc_handle.stopped().await;
    node.stop();

    Ok(())
}
