//! Push validator node — the central coordinator.
//!
//! Wires together:
//! - the block pipeline (assembly, attestation rounds, publication)
//! - the shard/node directory snapshots
//! - quorum reads across storage/archival replicas
//! - archive-node discovery and the WebSocket block feed
//! - the downstream subscription server and confirmation tracker

pub mod config;
pub mod error;
pub mod metrics;
pub mod node;
pub mod shutdown;

pub use config::NodeConfig;
pub use error::NodeError;
pub use metrics::NodeMetrics;
pub use node::ValidatorNode;
pub use shutdown::ShutdownController;
