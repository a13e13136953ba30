//! Attestor role — voting on and co-signing peer validators' blocks.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{Mutex, RwLock};

use push_crypto::sign_message;
use push_directory::NodeRegistry;
use push_messages::AttestSignaturesRequest;
use push_types::{AttestorPatch, Block, BlockHash, KeyPair, NodeAddress, VoteVerdict};

use crate::api_token::token_bound_to;
use crate::attest::{
    apply_patch, block_validator, verify_patch_signature, verify_validator_signature,
};
use crate::config::PipelineConfig;
use crate::error::BlockError;
use crate::publisher::Publisher;
use crate::validation::validate_structure;

/// Upper bound on cached blocks awaiting round 2.
const MAX_CACHED_BLOCKS: usize = 256;

/// Validator-signed blocks cached between rounds, keyed by initial hash.
///
/// Entries expire after a TTL so a validator that never completes round 2
/// cannot pin memory; when full, the oldest entry is evicted.
pub struct BlockCache {
    entries: HashMap<BlockHash, (Block, u64)>,
    ttl_ms: u64,
}

impl BlockCache {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms,
        }
    }

    pub fn insert(&mut self, hash: BlockHash, block: Block, now_ms: u64) {
        if self.entries.len() >= MAX_CACHED_BLOCKS {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, inserted))| *inserted)
                .map(|(h, _)| *h)
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(hash, (block, now_ms));
    }

    /// Fetch a live entry; expired entries read as absent.
    pub fn get(&self, hash: &BlockHash, now_ms: u64) -> Option<&Block> {
        self.entries.get(hash).and_then(|(block, inserted)| {
            (now_ms.saturating_sub(*inserted) <= self.ttl_ms).then_some(block)
        })
    }

    pub fn remove(&mut self, hash: &BlockHash) {
        self.entries.remove(hash);
    }

    /// Drop expired entries. Called from the node's periodic sweep.
    pub fn purge_expired(&mut self, now_ms: u64) {
        let ttl = self.ttl_ms;
        self.entries
            .retain(|_, (_, inserted)| now_ms.saturating_sub(*inserted) <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Handles `v_attestBlock` and `v_attestSignatures` for blocks produced by
/// peer validators.
pub struct AttestorEngine {
    config: PipelineConfig,
    keypair: KeyPair,
    address: NodeAddress,
    registry: Arc<RwLock<NodeRegistry>>,
    cache: Mutex<BlockCache>,
    publisher: Arc<Publisher>,
}

impl AttestorEngine {
    pub fn new(
        config: PipelineConfig,
        keypair: KeyPair,
        address: NodeAddress,
        registry: Arc<RwLock<NodeRegistry>>,
        publisher: Arc<Publisher>,
    ) -> Self {
        let cache = Mutex::new(BlockCache::new(config.block_cache_ttl.as_millis() as u64));
        Self {
            config,
            keypair,
            address,
            registry,
            cache,
            publisher,
        }
    }

    /// Round 1: validate the validator-signed block, vote per transaction,
    /// cache the block for reconciliation, and return the signed patch.
    pub async fn attest_block(
        &self,
        block_bytes: &[u8],
        now_ms: u64,
    ) -> Result<AttestorPatch, BlockError> {
        let block =
            Block::from_bytes(block_bytes).map_err(|e| BlockError::Malformed(e.to_string()))?;
        if block.signers.len() != 1 {
            return Err(BlockError::Malformed(format!(
                "round-1 block must have exactly the validator signature, found {}",
                block.signers.len()
            )));
        }

        let validator = block_validator(&block)?;
        let registry = self.registry.read().await;
        if !registry.is_active_validator(&validator) {
            return Err(BlockError::UnknownSigner(validator.to_string()));
        }
        let validator_key = registry
            .public_key_of(&validator)
            .ok_or_else(|| BlockError::UnknownSigner(validator.to_string()))?;
        verify_validator_signature(&block, &validator, validator_key)?;
        drop(registry);

        if !block.attest_token.authorizes(&self.address) {
            return Err(BlockError::TokenViolation(self.address.to_string()));
        }

        // Vote per transaction: structural checks plus the API-token/validator
        // pairing. A bad transaction is a Reject vote, not a call failure.
        let votes: Vec<VoteVerdict> = block
            .envelopes
            .iter()
            .map(|env| {
                let tx = &env.transaction;
                let structurally_ok =
                    validate_structure(tx, self.config.max_transaction_bytes).is_ok();
                if structurally_ok && token_bound_to(&tx.api_token, &validator) {
                    VoteVerdict::Accept
                } else {
                    VoteVerdict::Reject
                }
            })
            .collect();

        let initial_hash = block.compute_hash();
        self.cache
            .lock()
            .await
            .insert(initial_hash, block, now_ms);

        let message = AttestorPatch::signing_bytes(&initial_hash, &self.address, &votes);
        let sig = sign_message(&message, &self.keypair.private);
        tracing::debug!(%initial_hash, votes = votes.len(), "attested block");
        Ok(AttestorPatch {
            voter: self.address.clone(),
            votes,
            sig,
        })
    }

    /// Round 2: rebuild the finalized block from the cached copy plus the
    /// full patch set, verify it, and schedule the jittered self-publish.
    pub async fn attest_signatures(
        &self,
        request: &AttestSignaturesRequest,
        now_ms: u64,
    ) -> Result<BlockHash, BlockError> {
        let mut cache = self.cache.lock().await;
        let cached = cache
            .get(&request.initial_hash, now_ms)
            .ok_or_else(|| BlockError::UnknownBlock(request.initial_hash.to_string()))?;

        let recomputed = cached.compute_hash();
        if recomputed != request.initial_hash {
            return Err(BlockError::HashMismatch {
                expected: request.initial_hash.to_string(),
                computed: recomputed.to_string(),
            });
        }
        let mut block = cached.clone();
        cache.remove(&request.initial_hash);
        drop(cache);

        let registry = self.registry.read().await;
        let mut own_patch_present = false;
        for patch in &request.patches {
            if !registry.is_active_validator(&patch.voter) {
                return Err(BlockError::UnknownSigner(patch.voter.to_string()));
            }
            if !block.attest_token.authorizes(&patch.voter) {
                return Err(BlockError::TokenViolation(patch.voter.to_string()));
            }
            let key = registry
                .public_key_of(&patch.voter)
                .ok_or_else(|| BlockError::UnknownSigner(patch.voter.to_string()))?;
            verify_patch_signature(patch, &request.initial_hash, key)?;
            apply_patch(&mut block, patch)?;
            if patch.voter == self.address {
                own_patch_present = true;
            }
        }
        drop(registry);

        if !own_patch_present {
            return Err(BlockError::OwnPatchMissing);
        }

        let final_hash = block.compute_hash();
        if final_hash != request.final_hash {
            return Err(BlockError::HashMismatch {
                expected: request.final_hash.to_string(),
                computed: final_hash.to_string(),
            });
        }

        self.schedule_self_publish(block);
        Ok(final_hash)
    }

    /// Fire-and-forget publication after a uniform random delay, so the
    /// attestor set does not flood storage/archival nodes simultaneously.
    fn schedule_self_publish(&self, block: Block) {
        let publisher = self.publisher.clone();
        let min = self.config.publish_jitter_min;
        let max = self.config.publish_jitter_max.max(min);
        let jitter = rand::thread_rng().gen_range(min..=max);
        let hash = block.compute_hash();
        tokio::spawn(async move {
            tokio::time::sleep(jitter).await;
            let results = publisher.publish(&block).await;
            tracing::debug!(%hash, targets = results.len(), "self-published attested block");
        });
    }

    /// Drop expired cached blocks; exposed for the node's periodic sweep.
    pub async fn sweep_cache(&self, now_ms: u64) {
        self.cache.lock().await.purge_expired(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u8) -> BlockHash {
        BlockHash::new([n; 32])
    }

    fn block(ts: u64) -> Block {
        Block {
            ts_millis: ts,
            attest_token: push_types::AttestToken {
                nonce: [0u8; 32],
                attestors: vec![],
            },
            envelopes: vec![],
            signers: vec![],
        }
    }

    #[test]
    fn cache_insert_get_expire() {
        let mut cache = BlockCache::new(1_000);
        cache.insert(hash(1), block(1), 100);

        assert!(cache.get(&hash(1), 100).is_some());
        assert!(cache.get(&hash(1), 1_100).is_some());
        assert!(cache.get(&hash(1), 1_101).is_none());
        assert!(cache.get(&hash(2), 100).is_none());
    }

    #[test]
    fn cache_purge_drops_expired() {
        let mut cache = BlockCache::new(1_000);
        cache.insert(hash(1), block(1), 0);
        cache.insert(hash(2), block(2), 900);

        cache.purge_expired(1_500);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&hash(2), 1_500).is_some());
    }

    #[test]
    fn cache_evicts_oldest_when_full() {
        let mut cache = BlockCache::new(u64::MAX);
        for n in 0..MAX_CACHED_BLOCKS {
            let mut bytes = [0u8; 32];
            bytes[..8].copy_from_slice(&(n as u64).to_le_bytes());
            cache.insert(BlockHash::new(bytes), block(n as u64), n as u64);
        }
        assert_eq!(cache.len(), MAX_CACHED_BLOCKS);

        cache.insert(hash(0xFF), block(9_999), 9_999);
        assert_eq!(cache.len(), MAX_CACHED_BLOCKS);
        // The entry inserted at t=0 was evicted.
        let mut first = [0u8; 32];
        first[..8].copy_from_slice(&0u64.to_le_bytes());
        assert!(cache.get(&BlockHash::new(first), 9_999).is_none());
    }
}
