//! On-chain node registry records.
//!
//! These are read-mostly snapshots parsed out of the validator/storage
//! registry contracts by external readers; the core only looks them up.

use serde::{Deserialize, Serialize};

use crate::keys::{NodeAddress, PublicKey};

/// Role a registered node plays in the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Validator,
    Storage,
    Archival,
}

/// Registration status of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Active,
    Disabled,
    Unregistered,
}

/// One node's registry entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub address: NodeAddress,
    /// Base URL for RPC and WebSocket endpoints, e.g. `https://v1.push.example`.
    pub url: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    /// The key this node signs with; peers verify signatures against it.
    pub public_key: PublicKey,
}

impl NodeInfo {
    /// Whether the node should be considered for protocol traffic.
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}
