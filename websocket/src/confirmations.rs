//! Block confirmation tracker.
//!
//! Tallies `BLOCK` confirmations per block hash across archival nodes and
//! releases each block for downstream broadcast exactly once, when enough
//! distinct nodes have confirmed it. A periodic sweep bounds memory for
//! blocks that never reach quorum.

use std::collections::{HashMap, HashSet};

use push_messages::BlockUpdate;
use push_types::NodeAddress;

/// Tracking window for unconfirmed blocks: 30 minutes.
const DEFAULT_EXPIRY_MS: u64 = 30 * 60 * 1_000;

struct Confirmation {
    first_seen_ms: u64,
    nodes: HashSet<NodeAddress>,
    /// First received copy of the block; all confirmations carry the same
    /// content for a given hash.
    update: BlockUpdate,
}

/// Per-block confirmation tally keyed by block hash.
pub struct BlockConfirmationTracker {
    entries: HashMap<String, Confirmation>,
    min_confirmations: usize,
    expiry_ms: u64,
}

impl BlockConfirmationTracker {
    pub fn new(min_confirmations: usize) -> Self {
        Self::with_expiry(min_confirmations, DEFAULT_EXPIRY_MS)
    }

    pub fn with_expiry(min_confirmations: usize, expiry_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            min_confirmations: min_confirmations.max(1),
            expiry_ms,
        }
    }

    /// Record one archival node's confirmation.
    ///
    /// Returns the block update when this confirmation completes the quorum;
    /// the entry is discarded at that point, so a given block is released at
    /// most once even if late confirmations keep arriving.
    pub fn record(
        &mut self,
        node: NodeAddress,
        update: BlockUpdate,
        now_ms: u64,
    ) -> Option<BlockUpdate> {
        let hash = update.block_hash.clone();
        let entry = self
            .entries
            .entry(hash.clone())
            .or_insert_with(|| Confirmation {
                first_seen_ms: now_ms,
                nodes: HashSet::new(),
                update,
            });
        entry.nodes.insert(node);

        if entry.nodes.len() >= self.min_confirmations {
            let entry = self
                .entries
                .remove(&hash)
                .expect("entry was just inserted");
            tracing::debug!(
                block = %hash,
                confirmations = entry.nodes.len(),
                "block reached confirmation quorum"
            );
            Some(entry.update)
        } else {
            None
        }
    }

    /// Drop entries older than the expiry window.
    pub fn sweep(&mut self, now_ms: u64) {
        let expiry = self.expiry_ms;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now_ms.saturating_sub(entry.first_seen_ms) <= expiry);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::debug!(dropped, "expired unconfirmed blocks swept");
        }
    }

    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }
}
