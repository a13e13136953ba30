//! Quorum reply merger.
//!
//! Generic aggregation of per-node replies for multi-node reads: callers
//! fan requests out, report each node's HTTP outcome and reply items here,
//! then call [`ReplyMerger::group`] to get the records that enough nodes
//! agree on. The merger performs no I/O and has no side effects.

use std::collections::HashMap;

use serde::Serialize;

use push_crypto::blake2b_256;
use push_types::NodeAddress;

/// A single node's reply item for one logical key.
///
/// Ephemeral — built per request, consumed by the merge, then discarded.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Rec<T> {
    /// Logical key this record belongs to (e.g. a DID or tx hash).
    pub skey: String,
    /// Record timestamp in milliseconds, if the source tracks one.
    pub ts: Option<u64>,
    pub payload: T,
}

impl<T> Rec<T> {
    pub fn new(skey: impl Into<String>, ts: Option<u64>, payload: T) -> Self {
        Self {
            skey: skey.into(),
            ts,
            payload,
        }
    }
}

/// Overall classification of one merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuorumResult {
    /// Every observed key reached quorum (or there were no keys at all).
    Ok,
    /// Some keys reached quorum, some were withheld.
    OkPartial,
    /// Too few nodes replied successfully; no key-level agreement counts.
    FailedNodeReplies,
    /// Enough nodes replied, but not a single key reached quorum.
    FailedByMinItems,
}

/// Output of [`ReplyMerger::group`].
#[derive(Clone, Debug)]
pub struct MergeOutput<T> {
    pub result: QuorumResult,
    /// Exactly one accepted instance per key that reached quorum.
    pub items: Vec<Rec<T>>,
    /// Keys observed but withheld for lack of agreement, in first-seen order.
    pub keys_without_quorum: Vec<String>,
    /// Latest timestamp among the accepted records.
    pub last_ts: Option<u64>,
}

/// Collects per-node outcomes and reply items for one logical read.
pub struct ReplyMerger<T> {
    /// HTTP/RPC outcome code per queried node.
    http_codes: HashMap<NodeAddress, u16>,
    /// All reported records in arrival order: (node, record).
    replies: Vec<(NodeAddress, Rec<T>)>,
    /// Keys in the order they were first observed.
    key_order: Vec<String>,
}

impl<T: Clone + Serialize> ReplyMerger<T> {
    pub fn new() -> Self {
        Self {
            http_codes: HashMap::new(),
            replies: Vec::new(),
            key_order: Vec::new(),
        }
    }

    /// Record the transport outcome for one queried node. Call once per node,
    /// before appending its items; a later call overwrites the earlier code.
    pub fn append_http_code(&mut self, node: &NodeAddress, code: u16) {
        self.http_codes.insert(node.clone(), code);
    }

    /// Append the records one node returned for this read.
    pub fn append_items(&mut self, node: &NodeAddress, items: Vec<Rec<T>>) {
        for item in items {
            if !self.key_order.iter().any(|k| k == &item.skey) {
                self.key_order.push(item.skey.clone());
            }
            self.replies.push((node.clone(), item));
        }
    }

    /// Number of nodes that reported a 2xx outcome.
    pub fn good_replies(&self) -> usize {
        self.http_codes
            .values()
            .filter(|code| (200..300).contains(*code))
            .count()
    }

    /// Merge everything reported so far.
    ///
    /// For each key, each node's record is hashed over `(skey, ts, payload)` —
    /// never the node identity — records are grouped by hash, and the
    /// best-represented hash wins if enough distinct nodes carry it. Exactly
    /// one instance of a winning record is returned (the first seen; all
    /// agreeing copies are equal by construction).
    pub fn group(&self, min_quorum: usize) -> MergeOutput<T> {
        if self.good_replies() < min_quorum {
            return MergeOutput {
                result: QuorumResult::FailedNodeReplies,
                items: Vec::new(),
                keys_without_quorum: Vec::new(),
                last_ts: None,
            };
        }

        let mut items = Vec::new();
        let mut keys_without_quorum = Vec::new();
        let mut last_ts: Option<u64> = None;

        for key in &self.key_order {
            // hash -> (distinct voting nodes, first-seen record)
            let mut groups: Vec<([u8; 32], Vec<&NodeAddress>, &Rec<T>)> = Vec::new();
            for (node, rec) in self.replies.iter().filter(|(_, r)| &r.skey == key) {
                let hash = record_hash(rec);
                match groups.iter_mut().find(|(h, _, _)| *h == hash) {
                    Some((_, nodes, _)) => {
                        if !nodes.contains(&node) {
                            nodes.push(node);
                        }
                    }
                    None => groups.push((hash, vec![node], rec)),
                }
            }

            // Best-represented hash; ties break to the first-seen group
            // (strict comparison keeps the earliest maximum).
            let mut best: Option<&([u8; 32], Vec<&NodeAddress>, &Rec<T>)> = None;
            for group in &groups {
                if best.is_none_or(|b| group.1.len() > b.1.len()) {
                    best = Some(group);
                }
            }
            let Some((_, nodes, rec)) = best else {
                continue;
            };

            if nodes.len() >= min_quorum {
                if let Some(ts) = rec.ts {
                    last_ts = Some(last_ts.map_or(ts, |prev| prev.max(ts)));
                }
                items.push((*rec).clone());
            } else {
                tracing::debug!(
                    key = %key,
                    agreeing = nodes.len(),
                    min_quorum,
                    "key withheld from merge result"
                );
                keys_without_quorum.push(key.clone());
            }
        }

        let result = if keys_without_quorum.is_empty() {
            QuorumResult::Ok
        } else if items.is_empty() {
            QuorumResult::FailedByMinItems
        } else {
            QuorumResult::OkPartial
        };

        MergeOutput {
            result,
            items,
            keys_without_quorum,
            last_ts,
        }
    }
}

impl<T: Clone + Serialize> Default for ReplyMerger<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Content hash of a record: key + timestamp + payload, excluding the
/// reporting node so identical replies from different nodes collide.
fn record_hash<T: Serialize>(rec: &Rec<T>) -> [u8; 32] {
    let bytes = bincode::serialize(rec).expect("reply record is always bincode-serializable");
    blake2b_256(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u8) -> NodeAddress {
        NodeAddress::new(&format!("push_node{n}"))
    }

    fn rec(key: &str, ts: u64, payload: &str) -> Rec<String> {
        Rec::new(key, Some(ts), payload.to_string())
    }

    #[test]
    fn not_enough_good_replies_fails_even_with_agreement() {
        let mut merger = ReplyMerger::new();
        merger.append_http_code(&node(1), 200);
        merger.append_http_code(&node(2), 500);
        merger.append_http_code(&node(3), 503);
        merger.append_items(&node(1), vec![rec("key1", 10, "v")]);

        let out = merger.group(2);
        assert_eq!(out.result, QuorumResult::FailedNodeReplies);
        assert!(out.items.is_empty());
        assert!(out.keys_without_quorum.is_empty());
    }

    #[test]
    fn two_identical_records_reach_quorum() {
        let mut merger = ReplyMerger::new();
        merger.append_http_code(&node(1), 200);
        merger.append_http_code(&node(2), 200);
        merger.append_items(&node(1), vec![rec("key1", 10, "v")]);
        merger.append_items(&node(2), vec![rec("key1", 10, "v")]);

        let out = merger.group(2);
        assert_eq!(out.result, QuorumResult::Ok);
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].skey, "key1");
        assert_eq!(out.last_ts, Some(10));
    }

    #[test]
    fn partial_quorum_reports_withheld_keys_in_first_seen_order() {
        let mut merger = ReplyMerger::new();
        for n in 1..=3 {
            merger.append_http_code(&node(n), 200);
        }
        // key1 agreed by all three nodes.
        for n in 1..=3 {
            merger.append_items(&node(n), vec![rec("key1", 5, "a")]);
        }
        // key2 agreed by only two.
        merger.append_items(&node(1), vec![rec("key2", 6, "b")]);
        merger.append_items(&node(2), vec![rec("key2", 6, "b")]);
        // key3 present on only one.
        merger.append_items(&node(3), vec![rec("key3", 7, "c")]);

        let out = merger.group(3);
        assert_eq!(out.result, QuorumResult::OkPartial);
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].skey, "key1");
        assert_eq!(out.keys_without_quorum, vec!["key2", "key3"]);
    }

    #[test]
    fn no_key_reaching_quorum_is_failed_by_min_items() {
        let mut merger = ReplyMerger::new();
        merger.append_http_code(&node(1), 200);
        merger.append_http_code(&node(2), 200);
        // Same key, disagreeing payloads.
        merger.append_items(&node(1), vec![rec("key1", 10, "a")]);
        merger.append_items(&node(2), vec![rec("key1", 10, "b")]);

        let out = merger.group(2);
        assert_eq!(out.result, QuorumResult::FailedByMinItems);
        assert!(out.items.is_empty());
        assert_eq!(out.keys_without_quorum, vec!["key1"]);
    }

    #[test]
    fn no_keys_at_all_is_ok() {
        let mut merger: ReplyMerger<String> = ReplyMerger::new();
        merger.append_http_code(&node(1), 200);
        merger.append_http_code(&node(2), 200);

        let out = merger.group(2);
        assert_eq!(out.result, QuorumResult::Ok);
        assert!(out.items.is_empty());
        assert_eq!(out.last_ts, None);
    }

    #[test]
    fn best_represented_hash_wins() {
        let mut merger = ReplyMerger::new();
        for n in 1..=3 {
            merger.append_http_code(&node(n), 200);
        }
        merger.append_items(&node(1), vec![rec("key1", 10, "majority")]);
        merger.append_items(&node(2), vec![rec("key1", 10, "majority")]);
        merger.append_items(&node(3), vec![rec("key1", 10, "outlier")]);

        let out = merger.group(2);
        assert_eq!(out.result, QuorumResult::Ok);
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].payload, "majority");
    }

    #[test]
    fn timestamp_differences_break_agreement() {
        let mut merger = ReplyMerger::new();
        merger.append_http_code(&node(1), 200);
        merger.append_http_code(&node(2), 200);
        // Same payload but different timestamps hash differently.
        merger.append_items(&node(1), vec![rec("key1", 10, "v")]);
        merger.append_items(&node(2), vec![rec("key1", 11, "v")]);

        let out = merger.group(2);
        assert_eq!(out.result, QuorumResult::FailedByMinItems);
    }

    #[test]
    fn last_ts_is_latest_accepted() {
        let mut merger = ReplyMerger::new();
        merger.append_http_code(&node(1), 200);
        merger.append_http_code(&node(2), 200);
        merger.append_items(&node(1), vec![rec("key1", 10, "a"), rec("key2", 99, "b")]);
        merger.append_items(&node(2), vec![rec("key1", 10, "a"), rec("key2", 99, "b")]);

        let out = merger.group(2);
        assert_eq!(out.result, QuorumResult::Ok);
        assert_eq!(out.last_ts, Some(99));
    }

    #[test]
    fn duplicate_report_from_one_node_counts_once() {
        let mut merger = ReplyMerger::new();
        merger.append_http_code(&node(1), 200);
        merger.append_http_code(&node(2), 200);
        // Node 1 reports the same record twice; still only one voting node.
        merger.append_items(&node(1), vec![rec("key1", 10, "v"), rec("key1", 10, "v")]);

        let out = merger.group(2);
        assert_eq!(out.result, QuorumResult::FailedByMinItems);
    }
}
