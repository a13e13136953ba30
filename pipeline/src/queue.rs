//! Local append-only delivery queue for polling consumers.
//!
//! Finalized blocks land here regardless of push-delivery outcomes; a slow
//! or failing storage node never blocks the append. The queue is bounded —
//! when full, the oldest entry is evicted — and consumers poll with a
//! monotonically increasing sequence offset.

use std::collections::VecDeque;

use push_types::BlockHash;

/// One finalized block awaiting pickup.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    /// Monotonic sequence number, never reused.
    pub seq: u64,
    pub hash: BlockHash,
    /// Canonical serialized block bytes.
    pub bytes: Vec<u8>,
}

/// Bounded append-only queue of finalized blocks.
pub struct DeliveryQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
    next_seq: u64,
}

impl DeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1_024)),
            capacity,
            next_seq: 0,
        }
    }

    /// Append a finalized block; evicts the oldest entry when full.
    pub fn append(&mut self, hash: BlockHash, bytes: Vec<u8>) -> u64 {
        if self.capacity > 0 && self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(QueueEntry { seq, hash, bytes });
        seq
    }

    /// Entries with `seq >= offset`, oldest first. Returns the entries and
    /// the offset to pass on the next poll.
    pub fn drain_since(&self, offset: u64) -> (Vec<QueueEntry>, u64) {
        let items: Vec<QueueEntry> = self
            .entries
            .iter()
            .filter(|e| e.seq >= offset)
            .cloned()
            .collect();
        let next = items.last().map_or(offset, |e| e.seq + 1);
        (items, next)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
