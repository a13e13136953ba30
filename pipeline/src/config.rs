//! Pipeline tunables.
//!
//! All limits are deployment configuration, never hard-coded at use sites.

use std::time::Duration;

use push_rpc::RetryPolicy;

/// Configuration for the block pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Maximum transactions per block.
    pub max_block_transactions: usize,
    /// Maximum cumulative serialized bytes per block.
    pub max_block_bytes: usize,
    /// Maximum serialized size of one transaction.
    pub max_transaction_bytes: usize,
    /// Debounce delay between the first accepted transaction and the batch.
    pub batch_delay: Duration,
    /// How many attestors co-sign each block.
    pub attestor_count: usize,
    /// Lifetime of issued API tokens.
    pub api_token_ttl: Duration,
    /// Lifetime of attestor-side cached blocks awaiting round 2.
    pub block_cache_ttl: Duration,
    /// Retry policy for the block-delivery hash check.
    pub delivery_retry: RetryPolicy,
    /// Bounds of the attestor self-publish jitter.
    pub publish_jitter_min: Duration,
    pub publish_jitter_max: Duration,
    /// Capacity of the local append-only delivery queue.
    pub delivery_queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_block_transactions: 128,
            max_block_bytes: 4 * 1024 * 1024,
            max_transaction_bytes: 64 * 1024,
            batch_delay: Duration::from_secs(5),
            attestor_count: 2,
            api_token_ttl: Duration::from_secs(60),
            block_cache_ttl: Duration::from_secs(120),
            delivery_retry: RetryPolicy {
                attempts: 3,
                delay: Duration::from_secs(2),
            },
            publish_jitter_min: Duration::from_millis(500),
            publish_jitter_max: Duration::from_millis(5_000),
            delivery_queue_capacity: 1_024,
        }
    }
}
