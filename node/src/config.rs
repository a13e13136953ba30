//! Node configuration with TOML file support.
//!
//! Every protocol tunable from the deployment environment lives here;
//! subsystem configs are derived via the `*_config()` helpers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use push_discovery::DiscoveryConfig;
use push_pipeline::PipelineConfig;
use push_rpc::RetryPolicy;
use push_websocket::{WsClientConfig, WsServerConfig};

use crate::error::NodeError;

/// Configuration for a Push validator node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hex-encoded 32-byte seed for the node's Ed25519 identity key.
    /// A fresh key is generated when absent (dev mode).
    #[serde(default)]
    pub key_seed_hex: Option<String>,

    /// Port for the downstream subscription WebSocket server.
    #[serde(default = "default_ws_port")]
    pub websocket_port: u16,

    // ── Block pipeline ──────────────────────────────────────────────────
    /// Debounce delay between the first accepted transaction and the batch.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Maximum transactions per block.
    #[serde(default = "default_max_block_transactions")]
    pub max_block_transactions: usize,

    /// Maximum cumulative serialized bytes per block.
    #[serde(default = "default_max_block_bytes")]
    pub max_block_bytes: usize,

    /// Maximum serialized size of one transaction.
    #[serde(default = "default_max_transaction_bytes")]
    pub max_transaction_bytes: usize,

    /// Attestors co-signing each block.
    #[serde(default = "default_attestor_count")]
    pub attestor_count: usize,

    /// Lifetime of issued submission API tokens (ms).
    #[serde(default = "default_api_token_ttl_ms")]
    pub api_token_ttl_ms: u64,

    /// Attestor-side block cache lifetime between rounds (ms).
    #[serde(default = "default_block_cache_ttl_ms")]
    pub block_cache_ttl_ms: u64,

    /// Attestor self-publish jitter bounds (ms).
    #[serde(default = "default_publish_jitter_min_ms")]
    pub publish_jitter_min_ms: u64,
    #[serde(default = "default_publish_jitter_max_ms")]
    pub publish_jitter_max_ms: u64,

    /// Capacity of the local append-only delivery queue.
    #[serde(default = "default_delivery_queue_capacity")]
    pub delivery_queue_capacity: usize,

    // ── Peer RPC ────────────────────────────────────────────────────────
    /// Per-call timeout against peer nodes (ms).
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Block-delivery hash-check retries (total attempts).
    #[serde(default = "default_delivery_retry_count")]
    pub delivery_retry_count: u32,

    /// Fixed delay between delivery retries (ms).
    #[serde(default = "default_delivery_retry_delay_ms")]
    pub delivery_retry_delay_ms: u64,

    // ── Sharding / reads ────────────────────────────────────────────────
    /// Total shards in the key space.
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,

    /// Minimum agreeing replicas for quorum reads.
    #[serde(default = "default_min_read_quorum")]
    pub min_read_quorum: usize,

    // ── Discovery ───────────────────────────────────────────────────────
    /// Refresh interval for the archival pool (seconds).
    #[serde(default = "default_discovery_refresh_secs")]
    pub discovery_refresh_secs: u64,

    /// Health-check round-trip timeout (ms).
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,

    /// Minimum healthy archival nodes before the block feed activates;
    /// also the confirmation quorum for downstream broadcast.
    #[serde(default = "default_min_archive_nodes")]
    pub min_archive_nodes: usize,

    // ── WebSocket server ────────────────────────────────────────────────
    /// Handshake deadline for new subscriber connections (ms).
    #[serde(default = "default_ws_handshake_timeout_ms")]
    pub ws_handshake_timeout_ms: u64,

    /// Minimum spacing between subscribe requests per connection (ms).
    #[serde(default = "default_ws_subscribe_min_interval_ms")]
    pub ws_subscribe_min_interval_ms: u64,

    /// Grace window retaining a disconnected subscriber's state (ms).
    #[serde(default = "default_ws_reconnect_grace_ms")]
    pub ws_reconnect_grace_ms: u64,

    // ── WebSocket client ────────────────────────────────────────────────
    /// Heartbeat ping interval (seconds).
    #[serde(default = "default_ws_heartbeat_secs")]
    pub ws_heartbeat_secs: u64,

    /// Connection considered stale after this long without traffic (seconds).
    #[serde(default = "default_ws_connection_timeout_secs")]
    pub ws_connection_timeout_secs: u64,

    /// Reconnect backoff base and ceiling (ms).
    #[serde(default = "default_ws_reconnect_base_ms")]
    pub ws_reconnect_base_ms: u64,
    #[serde(default = "default_ws_reconnect_max_ms")]
    pub ws_reconnect_max_ms: u64,

    /// Reconnect attempts before substituting a different archival node.
    #[serde(default = "default_ws_max_reconnect_attempts")]
    pub ws_max_reconnect_attempts: u32,

    // ── Housekeeping ────────────────────────────────────────────────────
    /// Interval for cache/token/tracker sweeps (seconds).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_ws_port() -> u16 {
    9447
}

fn default_batch_delay_ms() -> u64 {
    5_000
}

fn default_max_block_transactions() -> usize {
    128
}

fn default_max_block_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_max_transaction_bytes() -> usize {
    64 * 1024
}

fn default_attestor_count() -> usize {
    2
}

fn default_api_token_ttl_ms() -> u64 {
    60_000
}

fn default_block_cache_ttl_ms() -> u64 {
    120_000
}

fn default_publish_jitter_min_ms() -> u64 {
    500
}

fn default_publish_jitter_max_ms() -> u64 {
    5_000
}

fn default_delivery_queue_capacity() -> usize {
    1_024
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_delivery_retry_count() -> u32 {
    3
}

fn default_delivery_retry_delay_ms() -> u64 {
    2_000
}

fn default_shard_count() -> u32 {
    32
}

fn default_min_read_quorum() -> usize {
    2
}

fn default_discovery_refresh_secs() -> u64 {
    30
}

fn default_health_check_timeout_ms() -> u64 {
    5_000
}

fn default_min_archive_nodes() -> usize {
    1
}

fn default_ws_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_ws_subscribe_min_interval_ms() -> u64 {
    500
}

fn default_ws_reconnect_grace_ms() -> u64 {
    60_000
}

fn default_ws_heartbeat_secs() -> u64 {
    10
}

fn default_ws_connection_timeout_secs() -> u64 {
    30
}

fn default_ws_reconnect_base_ms() -> u64 {
    1_000
}

fn default_ws_reconnect_max_ms() -> u64 {
    60_000
}

fn default_ws_max_reconnect_attempts() -> u32 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_block_transactions: self.max_block_transactions,
            max_block_bytes: self.max_block_bytes,
            max_transaction_bytes: self.max_transaction_bytes,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            attestor_count: self.attestor_count,
            api_token_ttl: Duration::from_millis(self.api_token_ttl_ms),
            block_cache_ttl: Duration::from_millis(self.block_cache_ttl_ms),
            delivery_retry: RetryPolicy {
                attempts: self.delivery_retry_count,
                delay: Duration::from_millis(self.delivery_retry_delay_ms),
            },
            publish_jitter_min: Duration::from_millis(self.publish_jitter_min_ms),
            publish_jitter_max: Duration::from_millis(self.publish_jitter_max_ms),
            delivery_queue_capacity: self.delivery_queue_capacity,
        }
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            refresh_interval: Duration::from_secs(self.discovery_refresh_secs),
            min_archive_nodes: self.min_archive_nodes,
        }
    }

    pub fn ws_server_config(&self) -> WsServerConfig {
        WsServerConfig {
            handshake_timeout: Duration::from_millis(self.ws_handshake_timeout_ms),
            subscribe_min_interval: Duration::from_millis(self.ws_subscribe_min_interval_ms),
            reconnect_grace: Duration::from_millis(self.ws_reconnect_grace_ms),
        }
    }

    pub fn ws_client_config(&self) -> WsClientConfig {
        WsClientConfig {
            connection_timeout: Duration::from_secs(self.ws_connection_timeout_secs),
            heartbeat_interval: Duration::from_secs(self.ws_heartbeat_secs),
            reconnect_base_delay: Duration::from_millis(self.ws_reconnect_base_ms),
            reconnect_max_delay: Duration::from_millis(self.ws_reconnect_max_ms),
            max_reconnect_attempts: self.ws_max_reconnect_attempts,
            close_timeout: Duration::from_secs(5),
        }
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        // Round-trips through serde so the field defaults stay the single
        // source of truth.
        toml::from_str("").expect("empty config parses via serde defaults")
    }
}
