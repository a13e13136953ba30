//! Quorum-based reads across storage/archival replicas.
//!
//! Fans a read out to every replica responsible for the queried account,
//! records per-node outcomes, and lets the reply merger decide what is
//! trustworthy.

use std::sync::Arc;

use tokio::sync::RwLock;

use push_directory::{NodeRegistry, ShardMap};
use push_merger::{MergeOutput, Rec, ReplyMerger};
use push_messages::{AccountInfo, TransactionItem};
use push_rpc::{outcome_code, RpcClient};
use push_types::{NodeAddress, NodeType};

/// Aggregation point for multi-node reads.
pub struct QuorumReader {
    rpc: RpcClient,
    registry: Arc<RwLock<NodeRegistry>>,
    shards: Arc<RwLock<ShardMap>>,
    min_quorum: usize,
}

impl QuorumReader {
    pub fn new(
        rpc: RpcClient,
        registry: Arc<RwLock<NodeRegistry>>,
        shards: Arc<RwLock<ShardMap>>,
        min_quorum: usize,
    ) -> Self {
        Self {
            rpc,
            registry,
            shards,
            min_quorum,
        }
    }

    /// `push_accountInfo` across the account's replicas, quorum-merged.
    pub async fn account_info(&self, caip_or_did: &str) -> MergeOutput<AccountInfo> {
        let targets = self.replicas_for(caip_or_did).await;

        let mut handles = Vec::with_capacity(targets.len());
        for (node, url) in targets {
            let rpc = self.rpc.clone();
            let query = caip_or_did.to_string();
            handles.push(tokio::spawn(async move {
                let result = rpc.account_info(&url, &query).await;
                (node, result)
            }));
        }

        let mut merger = ReplyMerger::new();
        for handle in handles {
            let Ok((node, result)) = handle.await else {
                continue;
            };
            merger.append_http_code(&node, outcome_code(&result));
            if let Ok(Some(info)) = result {
                let rec = Rec::new(info.did.clone(), Some(info.attach_ts), info);
                merger.append_items(&node, vec![rec]);
            }
        }
        merger.group(self.min_quorum)
    }

    /// `push_getTransactions` across the account's replicas, quorum-merged
    /// per transaction hash.
    pub async fn transactions(
        &self,
        caip: &str,
        category: &str,
        since_ts: u64,
        sort_order: &str,
    ) -> MergeOutput<TransactionItem> {
        let targets = self.replicas_for(caip).await;

        let mut handles = Vec::with_capacity(targets.len());
        for (node, url) in targets {
            let rpc = self.rpc.clone();
            let caip = caip.to_string();
            let category = category.to_string();
            let sort_order = sort_order.to_string();
            handles.push(tokio::spawn(async move {
                let result = rpc
                    .get_transactions(&url, &caip, &category, since_ts, &sort_order)
                    .await;
                (node, result)
            }));
        }

        let mut merger = ReplyMerger::new();
        for handle in handles {
            let Ok((node, result)) = handle.await else {
                continue;
            };
            merger.append_http_code(&node, outcome_code(&result));
            if let Ok(page) = result {
                let recs = page
                    .items
                    .into_iter()
                    .map(|item| Rec::new(item.tx_hash.clone(), Some(item.ts), item))
                    .collect();
                merger.append_items(&node, recs);
            }
        }
        merger.group(self.min_quorum)
    }

    /// Storage nodes owning the account's shard; falls back to archival
    /// nodes when the shard has no assigned storage replicas.
    async fn replicas_for(&self, account: &str) -> Vec<(NodeAddress, String)> {
        let shards = self.shards.read().await;
        let shard = shards.shard_for(account);
        let owners = shards.nodes_for_shard(shard);
        drop(shards);

        let registry = self.registry.read().await;
        let mut targets: Vec<(NodeAddress, String)> = owners
            .into_iter()
            .filter_map(|node| {
                registry
                    .get(&node)
                    .filter(|info| info.is_active())
                    .map(|info| (node.clone(), info.url.clone()))
            })
            .collect();
        if targets.is_empty() {
            for info in registry.active_of_type(NodeType::Archival) {
                targets.push((info.address.clone(), info.url.clone()));
            }
        }
        targets
    }
}
