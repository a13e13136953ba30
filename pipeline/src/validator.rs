//! Validator role — block assembly and the two-round attestation protocol.
//!
//! One `BlockProducer` per node process owns the pending block. Cycles are
//! strictly sequential: a produce lock serializes `produce_block` while the
//! debounce flag lets at most one timer be armed at a time.
//!
//! Round 1 and round 2 both treat any single attestor failure as fatal to
//! the whole cycle — there is no reserve-attestor substitution, so one bad
//! attestor can stall block production until the registry drops it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::RngCore;
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};

use push_crypto::sign_message;
use push_directory::NodeRegistry;
use push_messages::AttestSignaturesRequest;
use push_rpc::RpcClient;
use push_types::{
    AttestToken, AttestorPatch, Block, BlockHash, KeyPair, NodeAddress, Signer, Transaction,
    TransactionEnvelope, TxHash, ValidatorVote, VoteVerdict,
};

use crate::api_token::ApiTokenIssuer;
use crate::attest::{apply_patch, self_validate, verify_patch_signature};
use crate::config::PipelineConfig;
use crate::error::{BlockError, PipelineError, TransactionError};
use crate::mempool::Mempool;
use crate::publisher::Publisher;
use crate::validation::validate_structure;

/// Result delivered to blocking submitters: the finalized block's hash, or
/// the error that aborted the cycle their transaction was batched into.
pub type CycleNotice = Result<BlockHash, BlockError>;

/// Outcome of one produce cycle, published for observers (metrics, logs).
#[derive(Clone, Debug)]
pub enum CycleEvent {
    Produced(BlockHash),
    Aborted(String),
}

/// The validator-side block pipeline.
pub struct BlockProducer {
    config: PipelineConfig,
    keypair: KeyPair,
    address: NodeAddress,
    registry: Arc<RwLock<NodeRegistry>>,
    rpc: RpcClient,
    publisher: Arc<Publisher>,
    mempool: Mutex<Mempool>,
    tokens: Mutex<ApiTokenIssuer>,
    waiters: Mutex<HashMap<TxHash, Vec<oneshot::Sender<CycleNotice>>>>,
    /// Debounce flag — at most one pending batch timer per node.
    batch_armed: AtomicBool,
    /// Serializes produce cycles; only one in flight at a time.
    produce_lock: Mutex<()>,
    cycle_events: broadcast::Sender<CycleEvent>,
}

impl BlockProducer {
    pub fn new(
        config: PipelineConfig,
        keypair: KeyPair,
        address: NodeAddress,
        registry: Arc<RwLock<NodeRegistry>>,
        rpc: RpcClient,
        publisher: Arc<Publisher>,
    ) -> Self {
        let mempool = Mutex::new(Mempool::new(
            config.max_block_transactions,
            config.max_block_bytes,
        ));
        let tokens = Mutex::new(ApiTokenIssuer::new(
            address.clone(),
            config.api_token_ttl.as_millis() as u64,
        ));
        Self {
            config,
            keypair,
            address,
            registry,
            rpc,
            publisher,
            mempool,
            tokens,
            waiters: Mutex::new(HashMap::new()),
            batch_armed: AtomicBool::new(false),
            produce_lock: Mutex::new(()),
            cycle_events: broadcast::channel(16).0,
        }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// Subscribe to produce-cycle outcomes.
    pub fn subscribe_cycles(&self) -> broadcast::Receiver<CycleEvent> {
        self.cycle_events.subscribe()
    }

    /// Issue a fresh submission API token.
    pub async fn issue_api_token(&self, now_ms: u64) -> Vec<u8> {
        self.tokens.lock().await.issue(now_ms)
    }

    /// Drop expired API tokens; called from the node's periodic sweep.
    pub async fn sweep_api_tokens(&self, now_ms: u64) {
        self.tokens.lock().await.purge_expired(now_ms);
    }

    /// Validate a submission and append it to the pending block.
    ///
    /// Returns the transaction's content hash. Arms the batch debounce timer
    /// if this was the first acceptance since the previous batch.
    pub async fn submit(
        self: &Arc<Self>,
        tx_bytes: &[u8],
        require_api_token: bool,
        now_ms: u64,
    ) -> Result<TxHash, PipelineError> {
        let (hash, _) = self
            .submit_inner(tx_bytes, require_api_token, now_ms, false)
            .await?;
        Ok(hash)
    }

    /// Like [`submit`], but blocks until the transaction's block finalizes
    /// (or its cycle aborts).
    pub async fn submit_and_wait(
        self: &Arc<Self>,
        tx_bytes: &[u8],
        require_api_token: bool,
        now_ms: u64,
    ) -> Result<BlockHash, PipelineError> {
        let (_, rx) = self
            .submit_inner(tx_bytes, require_api_token, now_ms, true)
            .await?;
        let rx = rx.expect("waiter requested");
        match rx.await {
            Ok(Ok(block_hash)) => Ok(block_hash),
            Ok(Err(block_err)) => Err(block_err.into()),
            Err(_) => Err(BlockError::CycleFailed("pipeline shut down".into()).into()),
        }
    }

    async fn submit_inner(
        self: &Arc<Self>,
        tx_bytes: &[u8],
        require_api_token: bool,
        now_ms: u64,
        want_waiter: bool,
    ) -> Result<(TxHash, Option<oneshot::Receiver<CycleNotice>>), PipelineError> {
        let tx: Transaction = bincode::deserialize(tx_bytes)
            .map_err(|e| TransactionError::Malformed(e.to_string()))?;
        validate_structure(&tx, self.config.max_transaction_bytes)?;
        if require_api_token && !self.tokens.lock().await.validate(&tx.api_token, now_ms) {
            return Err(TransactionError::BadApiToken.into());
        }

        let hash = tx.compute_hash();
        let mut envelope = TransactionEnvelope::new(tx);
        envelope.validator_vote = Some(ValidatorVote {
            voter: self.address.clone(),
            verdict: VoteVerdict::Accept,
            did_mapping: None,
        });

        // Register the waiter before the envelope can be batched so a fast
        // cycle cannot complete between append and registration.
        let rx = if want_waiter {
            let (tx_notice, rx) = oneshot::channel();
            self.waiters.lock().await.entry(hash).or_default().push(tx_notice);
            Some(rx)
        } else {
            None
        };

        if let Err(e) = self.mempool.lock().await.try_append(envelope) {
            if want_waiter {
                let mut waiters = self.waiters.lock().await;
                if let Some(senders) = waiters.get_mut(&hash) {
                    senders.pop();
                    if senders.is_empty() {
                        waiters.remove(&hash);
                    }
                }
            }
            return Err(e.into());
        }

        self.arm_batch_timer();
        Ok((hash, rx))
    }

    /// Arm the debounce timer if no timer is pending. Later submissions do
    /// not reset a pending timer.
    fn arm_batch_timer(self: &Arc<Self>) {
        if self.batch_armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let producer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(producer.config.batch_delay).await;
            // Clear first: submissions arriving during the cycle arm a fresh
            // timer for the next block.
            producer.batch_armed.store(false, Ordering::Release);
            if let Err(e) = producer.produce_block().await {
                tracing::warn!(error = %e, "block cycle failed");
            }
        });
    }

    /// Run one batch cycle: assemble, attest (two rounds), self-validate,
    /// publish. Returns `None` when the pending block was empty.
    pub async fn produce_block(
        self: &Arc<Self>,
    ) -> Result<Option<BlockHash>, PipelineError> {
        let _cycle = self.produce_lock.lock().await;

        let envelopes = self.mempool.lock().await.take();
        if envelopes.is_empty() {
            return Ok(None);
        }
        let tx_hashes: Vec<TxHash> = envelopes
            .iter()
            .map(|env| env.transaction.compute_hash())
            .collect();

        match self.run_cycle(envelopes).await {
            Ok(final_hash) => {
                self.notify_waiters(&tx_hashes, Ok(final_hash)).await;
                let _ = self.cycle_events.send(CycleEvent::Produced(final_hash));
                Ok(Some(final_hash))
            }
            Err(e) => {
                // The block is lost; submitters must resubmit.
                let notice = BlockError::CycleFailed(e.to_string());
                self.notify_waiters(&tx_hashes, Err(notice)).await;
                let _ = self.cycle_events.send(CycleEvent::Aborted(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_cycle(
        self: &Arc<Self>,
        envelopes: Vec<TransactionEnvelope>,
    ) -> Result<BlockHash, PipelineError> {
        let tx_count = envelopes.len();

        // Fresh attest token: random nonce plus a sampled attestor set.
        let registry = self.registry.read().await;
        let attestors = registry.sample_attestors(self.config.attestor_count, &self.address)?;
        let attestor_urls: Vec<(NodeAddress, String)> = attestors
            .iter()
            .map(|addr| {
                let url = registry
                    .get(addr)
                    .map(|info| info.url.clone())
                    .ok_or_else(|| BlockError::UnknownSigner(addr.to_string()))?;
                Ok::<_, PipelineError>((addr.clone(), url))
            })
            .collect::<Result<_, _>>()?;
        drop(registry);

        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut block = Block {
            ts_millis: push_utils::now_millis(),
            attest_token: AttestToken {
                nonce,
                attestors: attestors.clone(),
            },
            envelopes,
            signers: Vec::new(),
        };

        // Signer slot 0: the validator, over the block without attestor votes.
        let sig = sign_message(&block.validator_signing_bytes(), &self.keypair.private);
        block.signers.push(Signer { sig });
        let initial_hash = block.compute_hash();
        tracing::debug!(%initial_hash, tx_count, attestors = attestors.len(), "starting attestation");

        // Round 1: every attestor, in parallel; any failure aborts the cycle.
        let patches = self.round_one(&block, &initial_hash, &attestor_urls).await?;
        for patch in &patches {
            apply_patch(&mut block, patch)?;
        }
        let final_hash = block.compute_hash();

        // Round 2: ship the complete signature set back to every attestor.
        self.round_two(&initial_hash, &final_hash, &patches, &attestor_urls)
            .await?;

        // Local self-validation gates publication.
        self_validate(&block, &final_hash, attestors.len())?;

        let results = self.publisher.publish(&block).await;
        tracing::info!(
            block = %final_hash,
            tx_count,
            signers = block.signers.len(),
            targets = results.len(),
            "block published"
        );
        Ok(final_hash)
    }

    /// Fan `v_attestBlock` out to every attestor and verify each patch
    /// locally before accepting it.
    async fn round_one(
        &self,
        block: &Block,
        initial_hash: &BlockHash,
        attestor_urls: &[(NodeAddress, String)],
    ) -> Result<Vec<AttestorPatch>, PipelineError> {
        let block_bytes = block.to_bytes();

        let mut handles = Vec::with_capacity(attestor_urls.len());
        for (addr, url) in attestor_urls {
            let rpc = self.rpc.clone();
            let url = url.clone();
            let addr = addr.clone();
            let bytes = block_bytes.clone();
            handles.push(tokio::spawn(async move {
                let result = rpc.attest_block(&url, &bytes).await;
                (addr, result)
            }));
        }

        let mut patches = Vec::with_capacity(handles.len());
        let registry = self.registry.read().await;
        for handle in handles {
            let (addr, result) = handle
                .await
                .map_err(|e| BlockError::CycleFailed(format!("attestor task: {e}")))?;
            let patch = result.map_err(|e| PipelineError::AttestorCall {
                node: addr.to_string(),
                source: e,
            })?;
            // The signature must recover to the attestor we actually called.
            if patch.voter != addr {
                return Err(BlockError::SignatureMismatch(addr.to_string()).into());
            }
            let key = registry
                .public_key_of(&addr)
                .ok_or_else(|| BlockError::UnknownSigner(addr.to_string()))?;
            verify_patch_signature(&patch, initial_hash, key)?;
            patches.push(patch);
        }
        Ok(patches)
    }

    /// Fan `v_attestSignatures` out to every attestor; all must confirm.
    async fn round_two(
        &self,
        initial_hash: &BlockHash,
        final_hash: &BlockHash,
        patches: &[AttestorPatch],
        attestor_urls: &[(NodeAddress, String)],
    ) -> Result<(), PipelineError> {
        let request = AttestSignaturesRequest {
            initial_hash: *initial_hash,
            final_hash: *final_hash,
            patches: patches.to_vec(),
        };

        let mut handles = Vec::with_capacity(attestor_urls.len());
        for (addr, url) in attestor_urls {
            let rpc = self.rpc.clone();
            let url = url.clone();
            let addr = addr.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move {
                let result = rpc.attest_signatures(&url, &request).await;
                (addr, result)
            }));
        }

        for handle in handles {
            let (addr, result) = handle
                .await
                .map_err(|e| BlockError::CycleFailed(format!("attestor task: {e}")))?;
            result.map_err(|e| PipelineError::AttestorCall {
                node: addr.to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    async fn notify_waiters(&self, tx_hashes: &[TxHash], notice: CycleNotice) {
        let mut waiters = self.waiters.lock().await;
        for hash in tx_hashes {
            if let Some(senders) = waiters.remove(hash) {
                for sender in senders {
                    let _ = sender.send(notice.clone());
                }
            }
        }
    }
}
