//! Node registry — the parsed validator/storage/archival node tables.

use std::collections::HashMap;

use rand::seq::SliceRandom;

use push_types::{NodeAddress, NodeInfo, NodeType, PublicKey};

use crate::error::DirectoryError;

/// Read-mostly table of registered nodes, keyed by address.
///
/// Replaced wholesale via [`NodeRegistry::apply_snapshot`] whenever the
/// on-chain registry changes.
pub struct NodeRegistry {
    nodes: HashMap<NodeAddress, NodeInfo>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    pub fn from_snapshot(nodes: Vec<NodeInfo>) -> Self {
        let mut registry = Self::new();
        registry.apply_snapshot(nodes);
        registry
    }

    /// Replace the entire table with a freshly parsed registry snapshot.
    pub fn apply_snapshot(&mut self, nodes: Vec<NodeInfo>) {
        self.nodes = nodes
            .into_iter()
            .map(|info| (info.address.clone(), info))
            .collect();
        tracing::debug!(count = self.nodes.len(), "node registry replaced");
    }

    pub fn get(&self, address: &NodeAddress) -> Option<&NodeInfo> {
        self.nodes.get(address)
    }

    /// The signing key registered for an address, if the node is known.
    pub fn public_key_of(&self, address: &NodeAddress) -> Option<&PublicKey> {
        self.nodes.get(address).map(|info| &info.public_key)
    }

    /// Whether the address belongs to a registered, active validator or
    /// attestor (attestors are peer validator-role nodes).
    pub fn is_active_validator(&self, address: &NodeAddress) -> bool {
        self.nodes
            .get(address)
            .is_some_and(|info| info.node_type == NodeType::Validator && info.is_active())
    }

    /// All active nodes of the given role.
    pub fn active_of_type(&self, node_type: NodeType) -> Vec<&NodeInfo> {
        self.nodes
            .values()
            .filter(|info| info.node_type == node_type && info.is_active())
            .collect()
    }

    /// Sample `count` distinct active validators, excluding `exclude`
    /// (the calling node never attests its own block).
    pub fn sample_attestors(
        &self,
        count: usize,
        exclude: &NodeAddress,
    ) -> Result<Vec<NodeAddress>, DirectoryError> {
        let mut candidates: Vec<NodeAddress> = self
            .active_of_type(NodeType::Validator)
            .into_iter()
            .filter(|info| &info.address != exclude)
            .map(|info| info.address.clone())
            .collect();

        if candidates.len() < count {
            return Err(DirectoryError::NotEnoughAttestors {
                wanted: count,
                available: candidates.len(),
            });
        }

        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(count);
        Ok(candidates)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use push_types::NodeStatus;

    fn info(n: u8, node_type: NodeType, status: NodeStatus) -> NodeInfo {
        NodeInfo {
            address: NodeAddress::new(&format!("push_node{n}")),
            url: format!("http://node{n}.example"),
            node_type,
            status,
            public_key: PublicKey([n; 32]),
        }
    }

    #[test]
    fn snapshot_replaces_wholesale() {
        let mut registry = NodeRegistry::from_snapshot(vec![
            info(1, NodeType::Validator, NodeStatus::Active),
            info(2, NodeType::Storage, NodeStatus::Active),
        ]);
        assert_eq!(registry.len(), 2);

        registry.apply_snapshot(vec![info(3, NodeType::Archival, NodeStatus::Active)]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&NodeAddress::new("push_node1")).is_none());
        assert!(registry.get(&NodeAddress::new("push_node3")).is_some());
    }

    #[test]
    fn active_of_type_filters_status_and_role() {
        let registry = NodeRegistry::from_snapshot(vec![
            info(1, NodeType::Validator, NodeStatus::Active),
            info(2, NodeType::Validator, NodeStatus::Disabled),
            info(3, NodeType::Storage, NodeStatus::Active),
        ]);
        let validators = registry.active_of_type(NodeType::Validator);
        assert_eq!(validators.len(), 1);
        assert_eq!(validators[0].address.as_str(), "push_node1");
    }

    #[test]
    fn is_active_validator() {
        let registry = NodeRegistry::from_snapshot(vec![
            info(1, NodeType::Validator, NodeStatus::Active),
            info(2, NodeType::Validator, NodeStatus::Unregistered),
            info(3, NodeType::Archival, NodeStatus::Active),
        ]);
        assert!(registry.is_active_validator(&NodeAddress::new("push_node1")));
        assert!(!registry.is_active_validator(&NodeAddress::new("push_node2")));
        assert!(!registry.is_active_validator(&NodeAddress::new("push_node3")));
        assert!(!registry.is_active_validator(&NodeAddress::new("push_nobody")));
    }

    #[test]
    fn sample_attestors_excludes_self_and_bounds_count() {
        let registry = NodeRegistry::from_snapshot(
            (1..=5)
                .map(|n| info(n, NodeType::Validator, NodeStatus::Active))
                .collect(),
        );
        let me = NodeAddress::new("push_node1");

        let sampled = registry.sample_attestors(4, &me).unwrap();
        assert_eq!(sampled.len(), 4);
        assert!(!sampled.contains(&me));

        // Only 4 candidates besides node1; asking for 5 must fail.
        let err = registry.sample_attestors(5, &me).unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::NotEnoughAttestors {
                wanted: 5,
                available: 4
            }
        ));
    }

    #[test]
    fn sampled_attestors_are_distinct() {
        let registry = NodeRegistry::from_snapshot(
            (1..=10)
                .map(|n| info(n, NodeType::Validator, NodeStatus::Active))
                .collect(),
        );
        let sampled = registry
            .sample_attestors(9, &NodeAddress::new("push_node1"))
            .unwrap();
        let mut dedup = sampled.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), sampled.len());
    }
}
