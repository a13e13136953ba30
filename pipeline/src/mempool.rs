//! The pending block — exactly one open, mutable batch per node process.

use push_types::TransactionEnvelope;

use crate::error::BlockError;

/// Accumulates transaction envelopes until a batch boundary.
///
/// Bounded by a transaction count and a cumulative serialized-byte
/// watermark; a submission that would cross either bound is rejected before
/// any mutation, leaving the existing contents untouched. The owner swaps
/// the contents out atomically (under its lock) when a batch cycle starts.
pub struct Mempool {
    envelopes: Vec<TransactionEnvelope>,
    bytes: usize,
    max_transactions: usize,
    max_bytes: usize,
}

impl Mempool {
    pub fn new(max_transactions: usize, max_bytes: usize) -> Self {
        Self {
            envelopes: Vec::new(),
            bytes: 0,
            max_transactions,
            max_bytes,
        }
    }

    /// Append an envelope, or reject if either watermark would be crossed.
    ///
    /// An oversized submission is never split across two blocks; the caller
    /// must retry after the next batch drains the pending block.
    pub fn try_append(&mut self, envelope: TransactionEnvelope) -> Result<(), BlockError> {
        if self.envelopes.len() + 1 > self.max_transactions {
            return Err(BlockError::PendingBlockFull);
        }
        let size = envelope.serialized_size();
        if self.bytes + size > self.max_bytes {
            return Err(BlockError::PendingBlockFull);
        }
        self.bytes += size;
        self.envelopes.push(envelope);
        Ok(())
    }

    /// Swap out the accumulated envelopes, leaving a fresh empty batch.
    pub fn take(&mut self) -> Vec<TransactionEnvelope> {
        self.bytes = 0;
        std::mem::take(&mut self.envelopes)
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Cumulative serialized size of the pending envelopes.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use push_types::Transaction;

    fn envelope(salt: u8, data_len: usize) -> TransactionEnvelope {
        TransactionEnvelope::new(Transaction {
            tx_type: 0,
            category: "CUSTOM:test".into(),
            sender: "eip155:1:0xAA".into(),
            recipients: vec!["eip155:1:0xBB".into()],
            data: vec![0u8; data_len],
            salt: [salt; 32],
            api_token: vec![1, 2],
            fee: 0,
            signature: vec![0xDD; 64],
        })
    }

    #[test]
    fn append_and_take() {
        let mut pool = Mempool::new(10, 1 << 20);
        pool.try_append(envelope(1, 8)).unwrap();
        pool.try_append(envelope(2, 8)).unwrap();
        assert_eq!(pool.len(), 2);
        assert!(pool.bytes() > 0);

        let taken = pool.take();
        assert_eq!(taken.len(), 2);
        assert!(pool.is_empty());
        assert_eq!(pool.bytes(), 0);
    }

    #[test]
    fn rejects_at_transaction_count_limit() {
        let mut pool = Mempool::new(2, 1 << 20);
        pool.try_append(envelope(1, 8)).unwrap();
        pool.try_append(envelope(2, 8)).unwrap();

        let err = pool.try_append(envelope(3, 8)).unwrap_err();
        assert_eq!(err, BlockError::PendingBlockFull);
        // Existing contents unchanged.
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn rejects_at_byte_watermark_without_mutation() {
        let small = envelope(1, 16);
        let budget = small.serialized_size() + 10;
        let mut pool = Mempool::new(10, budget);
        pool.try_append(small).unwrap();
        let bytes_before = pool.bytes();

        let err = pool.try_append(envelope(2, 16)).unwrap_err();
        assert_eq!(err, BlockError::PendingBlockFull);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.bytes(), bytes_before);
    }

    #[test]
    fn take_resets_capacity() {
        let mut pool = Mempool::new(1, 1 << 20);
        pool.try_append(envelope(1, 8)).unwrap();
        assert!(pool.try_append(envelope(2, 8)).is_err());

        pool.take();
        pool.try_append(envelope(2, 8)).unwrap();
    }
}
