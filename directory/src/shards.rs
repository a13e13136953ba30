//! Shard map — which storage nodes own which key-space partitions.

use std::collections::{BTreeSet, HashMap};

use push_crypto::blake2b_256;
use push_types::NodeAddress;

/// Bidirectional node↔shard map derived from the storage-registry contract.
///
/// Built from each node's shard bitmask via [`ShardMap::rebuild`]; every
/// registry "mapping changed" event triggers a full rebuild of both
/// directions rather than an incremental patch.
pub struct ShardMap {
    shard_count: u32,
    node_to_shards: HashMap<NodeAddress, BTreeSet<u32>>,
    shard_to_nodes: HashMap<u32, BTreeSet<NodeAddress>>,
}

impl ShardMap {
    pub fn empty(shard_count: u32) -> Self {
        Self {
            shard_count,
            node_to_shards: HashMap::new(),
            shard_to_nodes: HashMap::new(),
        }
    }

    /// Build a fresh map from per-node shard bitmasks.
    ///
    /// Bit `s` of a mask (little-endian bit order: `mask[s / 8] >> (s % 8)`)
    /// means the node owns shard `s`. Bits at or beyond `shard_count` are
    /// ignored.
    pub fn rebuild(shard_count: u32, masks: &[(NodeAddress, Vec<u8>)]) -> Self {
        let mut map = Self::empty(shard_count);
        for (node, mask) in masks {
            let mut shards = BTreeSet::new();
            for shard in 0..shard_count {
                let byte = (shard / 8) as usize;
                let bit = shard % 8;
                if mask.get(byte).is_some_and(|b| (b >> bit) & 1 == 1) {
                    shards.insert(shard);
                    map.shard_to_nodes
                        .entry(shard)
                        .or_default()
                        .insert(node.clone());
                }
            }
            map.node_to_shards.insert(node.clone(), shards);
        }
        tracing::debug!(
            nodes = map.node_to_shards.len(),
            shard_count,
            "shard map rebuilt"
        );
        map
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Storage nodes owning the given shard (empty set if unassigned).
    pub fn nodes_for_shard(&self, shard: u32) -> BTreeSet<NodeAddress> {
        self.shard_to_nodes.get(&shard).cloned().unwrap_or_default()
    }

    /// Shards owned by the given node (empty set if unknown).
    pub fn shards_for_node(&self, node: &NodeAddress) -> BTreeSet<u32> {
        self.node_to_shards.get(node).cloned().unwrap_or_default()
    }

    /// The shard responsible for an account address.
    pub fn shard_for(&self, account: &str) -> u32 {
        shard_for_address(account, self.shard_count)
    }
}

/// Deterministic hash-and-modulo mapping from a canonical account address
/// string to a shard id. Every node must compute the same value.
pub fn shard_for_address(account: &str, shard_count: u32) -> u32 {
    let digest = blake2b_256(account.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % shard_count as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u8) -> NodeAddress {
        NodeAddress::new(&format!("push_node{n}"))
    }

    #[test]
    fn rebuild_populates_both_directions() {
        // node1 owns shards 0 and 2 (mask 0b101), node2 owns shard 1 (0b010).
        let map = ShardMap::rebuild(
            8,
            &[(node(1), vec![0b0000_0101]), (node(2), vec![0b0000_0010])],
        );

        assert_eq!(
            map.shards_for_node(&node(1)),
            BTreeSet::from([0, 2])
        );
        assert_eq!(map.shards_for_node(&node(2)), BTreeSet::from([1]));
        assert_eq!(map.nodes_for_shard(0), BTreeSet::from([node(1)]));
        assert_eq!(map.nodes_for_shard(1), BTreeSet::from([node(2)]));
        assert_eq!(map.nodes_for_shard(2), BTreeSet::from([node(1)]));
        assert!(map.nodes_for_shard(3).is_empty());
    }

    #[test]
    fn bits_beyond_shard_count_ignored() {
        let map = ShardMap::rebuild(2, &[(node(1), vec![0b1111_1111])]);
        assert_eq!(map.shards_for_node(&node(1)), BTreeSet::from([0, 1]));
    }

    #[test]
    fn multi_byte_masks() {
        // Shard 9 lives in the second mask byte.
        let map = ShardMap::rebuild(16, &[(node(1), vec![0x00, 0b0000_0010])]);
        assert_eq!(map.shards_for_node(&node(1)), BTreeSet::from([9]));
    }

    #[test]
    fn unknown_node_and_shard_are_empty() {
        let map = ShardMap::empty(4);
        assert!(map.shards_for_node(&node(9)).is_empty());
        assert!(map.nodes_for_shard(3).is_empty());
    }

    #[test]
    fn shard_for_address_is_deterministic_and_bounded() {
        for count in [1u32, 2, 16, 97] {
            for account in ["eip155:1:0xAA", "eip155:137:0xBB", "solana:m:abc"] {
                let shard = shard_for_address(account, count);
                assert!(shard < count);
                assert_eq!(shard, shard_for_address(account, count));
            }
        }
    }

    #[test]
    fn shard_for_address_spreads_accounts() {
        let shards: BTreeSet<u32> = (0..64)
            .map(|i| shard_for_address(&format!("eip155:1:0x{i:02x}"), 16))
            .collect();
        // 64 accounts over 16 shards should hit well more than one shard.
        assert!(shards.len() > 4);
    }
}
