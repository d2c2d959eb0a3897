//! ─── Carapace Protocol Constants ────────────────────────────────────────────
//!
//! Process-wide, immutable configuration. Runtime-tunable values (data dir,
//! bind port, seed nodes, log level) live in `carapace-node`'s CLI args, not
//! here.

// ── Threading / timing ───────────────────────────────────────────────────────

/// Worker wake-up granularity for every blocking poll loop in the P2P layer.
pub const THREAD_POLLING_INTERVAL_MS: u64 = 50;

/// Outbound dial timeout for the dealer client.
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 2_000;

// ── Addressing ────────────────────────────────────────────────────────────────

/// Base58Check varint prefix for public wallet addresses.
pub const PUBLIC_ADDRESS_PREFIX: u64 = 0x6bb3b1d;

// ── P2P protocol ──────────────────────────────────────────────────────────────

pub const P2P_VERSION: u64 = 1;
pub const P2P_MINIMUM_VERSION: u64 = 1;

pub const KEEPALIVE_INTERVAL_SECS: u64 = 30;
pub const PEER_EXCHANGE_INTERVAL_SECS: u64 = 120;
pub const CONNECTION_MANAGER_INTERVAL_SECS: u64 = 30;

/// Maximum number of peer records exchanged in one HANDSHAKE/PEER_EXCHANGE packet.
pub const MAXIMUM_PEERS_EXCHANGED: usize = 200;

/// Liveness TTL for peer database records.
pub const PEER_PRUNE_TIME_SECS: u64 = 86_400;

pub const DEFAULT_BIND_PORT_P2P: u16 = 12897;
pub const DEFAULT_BIND_PORT_NODE: u16 = 12898;
pub const DEFAULT_BIND_PORT_WALLET: u16 = 18070;
pub const DEFAULT_BIND_PORT_NOTIFIER: u16 = 12899;

/// Target out-degree beyond the configured seed nodes.
pub const DEFAULT_CONNECTION_COUNT: usize = 8;

// ── Election ──────────────────────────────────────────────────────────────────

pub const ELECTOR_TARGET_COUNT: usize = 10;
pub const VALIDATOR_THRESHOLD_PERCENT: u64 = 60;

// ── Crypto / transaction bounds ──────────────────────────────────────────────

pub const RING_SIZE: usize = 512;

pub const MAX_INPUTS: usize = 8;
pub const MIN_OUTPUTS: usize = 2;
pub const MAX_OUTPUTS: usize = 8;
pub const MAX_EXTRA: usize = 1_024;

// ── Fee formula ───────────────────────────────────────────────────────────────

pub const MIN_FEE: u64 = 1;
pub const CHUNK_FEE: u64 = 1;
pub const CHUNK_SIZE: u64 = 64;
pub const BASE_CHUNK_SIZE: u64 = 256;

pub const MIN_POW_ZEROS: u32 = 1;
pub const MAX_POW_ZEROS: u32 = 16;
pub const POW_DISCOUNT_MULTIPLIER: u64 = 2;

// ── Proof of work (Argon2id) ──────────────────────────────────────────────────

pub const POW_ITERATIONS: u32 = 2_048;
pub const POW_MEMORY_KB: u32 = 1_024;
pub const POW_THREADS: u32 = 1;
