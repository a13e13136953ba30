//! Finalized-block delivery to storage and archival nodes.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use push_directory::{NodeRegistry, ShardMap};
use push_messages::{HashCheckReply, PutBlockStatus};
use push_rpc::{retry_with_fixed_delay, RetryPolicy, RpcClient};
use push_types::{Block, NodeAddress, NodeType};

use crate::queue::DeliveryQueue;

/// Outcome of delivering one block to one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The node accepted the block.
    Delivered,
    /// The node replied `DO_NOT_SEND` — it already has the block. Not retried.
    AlreadyHave,
    /// The node rejected the block with a reason. Not retried.
    Rejected(String),
    /// Transport failure after the bounded retries were exhausted.
    Failed(String),
}

/// Per-node delivery record returned by [`Publisher::publish`].
#[derive(Clone, Debug)]
pub struct NodeSendResult {
    pub node: NodeAddress,
    pub outcome: SendOutcome,
}

/// Delivers finalized blocks: shard-derived storage targets plus every
/// archival node, each independently and in parallel, with a two-step
/// hash-check/send RPC.
pub struct Publisher {
    rpc: RpcClient,
    registry: Arc<RwLock<NodeRegistry>>,
    shards: Arc<RwLock<ShardMap>>,
    queue: Arc<Mutex<DeliveryQueue>>,
    retry: RetryPolicy,
}

impl Publisher {
    pub fn new(
        rpc: RpcClient,
        registry: Arc<RwLock<NodeRegistry>>,
        shards: Arc<RwLock<ShardMap>>,
        queue: Arc<Mutex<DeliveryQueue>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            rpc,
            registry,
            shards,
            queue,
            retry,
        }
    }

    /// The local append-only queue of published blocks.
    pub fn queue(&self) -> Arc<Mutex<DeliveryQueue>> {
        self.queue.clone()
    }

    /// Deliver a finalized block to every target and report per-node outcomes.
    ///
    /// The block is appended to the local delivery queue up front; push
    /// failures never block that append.
    pub async fn publish(&self, block: &Block) -> Vec<NodeSendResult> {
        let hash = block.compute_hash();
        let bytes = block.to_bytes();

        self.queue.lock().await.append(hash, bytes.clone());

        let targets = self.resolve_targets(block).await;
        if targets.is_empty() {
            tracing::warn!(%hash, "no delivery targets for block");
            return Vec::new();
        }

        let hash_hex = hash.to_string();
        let bytes_hex = hex::encode(&bytes);

        let mut handles = Vec::with_capacity(targets.len());
        for (node, url) in targets {
            let rpc = self.rpc.clone();
            let retry = self.retry;
            let hash_hex = hash_hex.clone();
            let bytes_hex = bytes_hex.clone();
            handles.push(tokio::spawn(async move {
                let outcome = deliver_one(&rpc, &url, &hash_hex, &bytes_hex, retry).await;
                NodeSendResult { node, outcome }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => {
                    if let SendOutcome::Failed(reason) = &result.outcome {
                        tracing::warn!(node = %result.node, reason = %reason, "block delivery failed");
                    }
                    results.push(result);
                }
                Err(e) => tracing::warn!("delivery task panicked: {e}"),
            }
        }
        results
    }

    /// Union of storage nodes owning the block's affected shards plus every
    /// active archival node.
    async fn resolve_targets(&self, block: &Block) -> Vec<(NodeAddress, String)> {
        let shards = self.shards.read().await;
        let mut affected: BTreeSet<u32> = BTreeSet::new();
        for env in &block.envelopes {
            for recipient in &env.transaction.recipients {
                affected.insert(shards.shard_for(recipient));
            }
        }

        let mut nodes: BTreeSet<NodeAddress> = BTreeSet::new();
        for shard in affected {
            nodes.extend(shards.nodes_for_shard(shard));
        }
        drop(shards);

        let registry = self.registry.read().await;
        let mut targets: Vec<(NodeAddress, String)> = nodes
            .into_iter()
            .filter_map(|node| {
                registry
                    .get(&node)
                    .filter(|info| info.is_active() && info.node_type == NodeType::Storage)
                    .map(|info| (node.clone(), info.url.clone()))
            })
            .collect();
        for info in registry.active_of_type(NodeType::Archival) {
            targets.push((info.address.clone(), info.url.clone()));
        }
        targets
    }
}

/// One target: bounded-retry hash check, then the block itself if wanted.
async fn deliver_one(
    rpc: &RpcClient,
    url: &str,
    hash_hex: &str,
    bytes_hex: &str,
    retry: RetryPolicy,
) -> SendOutcome {
    let check = retry_with_fixed_delay(retry, |_| {
        rpc.put_block_hash(url, vec![hash_hex.to_string()])
    })
    .await;

    let replies = match check {
        Ok(replies) => replies,
        Err(e) => return SendOutcome::Failed(format!("hash check: {e}")),
    };
    match replies.first() {
        Some(HashCheckReply::Send) => {}
        Some(HashCheckReply::DoNotSend) => return SendOutcome::AlreadyHave,
        None => return SendOutcome::Failed("empty hash-check reply".into()),
    }

    match rpc.put_block(url, vec![bytes_hex.to_string()]).await {
        Ok(results) => match results.first() {
            Some(result) if result.status == PutBlockStatus::Accepted => SendOutcome::Delivered,
            Some(result) => SendOutcome::Rejected(
                result.reason.clone().unwrap_or_else(|| "rejected".into()),
            ),
            None => SendOutcome::Failed("empty put-block reply".into()),
        },
        Err(e) => SendOutcome::Failed(format!("put block: {e}")),
    }
}
