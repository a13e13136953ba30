//! The validator node — wires all subsystems together.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use push_crypto::derive_address;
use push_directory::{NodeRegistry, ShardMap};
use push_discovery::{DiscoveryService, MembershipEvent, WsHealthProbe};
use push_merger::MergeOutput;
use push_messages::{AccountInfo, AttestSignaturesRequest, BlockUpdate, TransactionItem};
use push_pipeline::{
    AttestorEngine, BlockError, BlockProducer, CycleEvent, DeliveryQueue, PipelineError,
    Publisher, QuorumReader,
};
use push_rpc::RpcClient;
use push_types::{
    AttestorPatch, BlockHash, NodeAddress, NodeInfo, PrivateKey, TxHash,
};
use push_utils::now_millis;
use push_websocket::{
    ArchivalClient, BlockConfirmationTracker, WsServer, WsServerState,
};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::metrics::NodeMetrics;
use crate::shutdown::ShutdownController;

/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
/// Capacity of the archival-confirmation channel.
const CONFIRMATION_CHANNEL_CAPACITY: usize = 256;

/// A running Push validator node.
pub struct ValidatorNode {
    pub config: NodeConfig,
    pub registry: Arc<RwLock<NodeRegistry>>,
    pub shards: Arc<RwLock<ShardMap>>,
    pub producer: Arc<BlockProducer>,
    pub attestor: Arc<AttestorEngine>,
    pub reader: Arc<QuorumReader>,
    pub discovery: Arc<DiscoveryService<WsHealthProbe>>,
    pub ws_state: Arc<WsServerState>,
    pub tracker: Arc<Mutex<BlockConfirmationTracker>>,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,

    address: NodeAddress,
    /// Ed25519 seed; subsystems get their own `PrivateKey` copies from it.
    key_seed: [u8; 32],
    /// Archival confirmations flow from client connections into the pump.
    blocks_tx: mpsc::Sender<(NodeAddress, BlockUpdate)>,
    blocks_rx: Option<mpsc::Receiver<(NodeAddress, BlockUpdate)>>,
    /// Handles for spawned background tasks (joined during shutdown).
    task_handles: Vec<JoinHandle<()>>,
}

impl ValidatorNode {
    /// Create and initialize a node. Call [`start`] to bring the background
    /// loops up.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let key_seed = resolve_key_seed(&config)?;
        let keypair = push_crypto::keypair_from_seed(&key_seed);
        let address = derive_address(&keypair.public);
        tracing::info!(%address, "node identity derived");

        let registry = Arc::new(RwLock::new(NodeRegistry::new()));
        let shards = Arc::new(RwLock::new(ShardMap::empty(config.shard_count)));
        let rpc = RpcClient::with_timeout(config.rpc_timeout());
        let queue = Arc::new(Mutex::new(DeliveryQueue::new(config.delivery_queue_capacity)));

        let pipeline_config = config.pipeline_config();
        let publisher = Arc::new(Publisher::new(
            rpc.clone(),
            registry.clone(),
            shards.clone(),
            queue,
            pipeline_config.delivery_retry,
        ));

        let producer = Arc::new(BlockProducer::new(
            pipeline_config.clone(),
            keypair,
            address.clone(),
            registry.clone(),
            rpc.clone(),
            publisher.clone(),
        ));

        let attestor = Arc::new(AttestorEngine::new(
            pipeline_config,
            push_crypto::keypair_from_seed(&key_seed),
            address.clone(),
            registry.clone(),
            publisher,
        ));

        let reader = Arc::new(QuorumReader::new(
            rpc,
            registry.clone(),
            shards.clone(),
            config.min_read_quorum,
        ));

        let probe = WsHealthProbe::new(
            address.clone(),
            PrivateKey(key_seed),
            config.health_check_timeout(),
        );
        let discovery = Arc::new(DiscoveryService::new(
            config.discovery_config(),
            registry.clone(),
            probe,
        ));

        let ws_state = Arc::new(WsServerState::new(config.ws_server_config()));
        let tracker = Arc::new(Mutex::new(BlockConfirmationTracker::new(
            config.min_archive_nodes,
        )));

        let (blocks_tx, blocks_rx) = mpsc::channel(CONFIRMATION_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            registry,
            shards,
            producer,
            attestor,
            reader,
            discovery,
            ws_state,
            tracker,
            metrics: Arc::new(NodeMetrics::new()),
            shutdown: Arc::new(ShutdownController::new()),
            address,
            key_seed,
            blocks_tx,
            blocks_rx: Some(blocks_rx),
            task_handles: Vec::new(),
        })
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    // ── Registry snapshots ──────────────────────────────────────────────

    /// Replace the node registry wholesale (registry change event).
    pub async fn apply_registry_snapshot(&self, nodes: Vec<NodeInfo>) {
        self.registry.write().await.apply_snapshot(nodes);
    }

    /// Rebuild the shard map wholesale from per-node bitmasks
    /// (storage-registry "mapping changed" event).
    pub async fn apply_shard_masks(&self, masks: &[(NodeAddress, Vec<u8>)]) {
        let rebuilt = ShardMap::rebuild(self.config.shard_count, masks);
        *self.shards.write().await = rebuilt;
    }

    // ── Submission API ──────────────────────────────────────────────────

    /// Issue a fresh submission API token.
    pub async fn issue_api_token(&self) -> Vec<u8> {
        self.producer.issue_api_token(now_millis()).await
    }

    /// Validate and enqueue a transaction; returns its content hash.
    pub async fn submit_transaction(
        &self,
        tx_bytes: &[u8],
        require_api_token: bool,
    ) -> Result<TxHash, PipelineError> {
        let result = self
            .producer
            .submit(tx_bytes, require_api_token, now_millis())
            .await;
        match &result {
            Ok(_) => self.metrics.transactions_accepted.inc(),
            Err(_) => self.metrics.transactions_rejected.inc(),
        }
        result
    }

    /// Blocking submission: resolves once the transaction's block finalizes.
    pub async fn submit_transaction_blocking(
        &self,
        tx_bytes: &[u8],
        require_api_token: bool,
    ) -> Result<BlockHash, PipelineError> {
        let result = self
            .producer
            .submit_and_wait(tx_bytes, require_api_token, now_millis())
            .await;
        match &result {
            Ok(_) => self.metrics.transactions_accepted.inc(),
            Err(_) => self.metrics.transactions_rejected.inc(),
        }
        result
    }

    // ── Attestor API (called by the RPC layer) ──────────────────────────

    /// `v_attestBlock` entry point.
    pub async fn attest_block(&self, block_bytes: &[u8]) -> Result<AttestorPatch, BlockError> {
        self.attestor.attest_block(block_bytes, now_millis()).await
    }

    /// `v_attestSignatures` entry point.
    pub async fn attest_signatures(
        &self,
        request: &AttestSignaturesRequest,
    ) -> Result<BlockHash, BlockError> {
        self.attestor.attest_signatures(request, now_millis()).await
    }

    // ── Quorum reads ────────────────────────────────────────────────────

    /// `push_accountInfo` aggregation across replicas.
    pub async fn account_info(&self, caip_or_did: &str) -> MergeOutput<AccountInfo> {
        self.reader.account_info(caip_or_did).await
    }

    /// `push_getTransactions` aggregation across replicas.
    pub async fn transactions(
        &self,
        caip: &str,
        category: &str,
        since_ts: u64,
        sort_order: &str,
    ) -> MergeOutput<TransactionItem> {
        self.reader
            .transactions(caip, category, since_ts, sort_order)
            .await
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Spawn every background loop: the subscription server, discovery
    /// refresh, feed activation, the confirmation pump, and housekeeping.
    pub fn start(&mut self) -> Result<(), NodeError> {
        let blocks_rx = self
            .blocks_rx
            .take()
            .ok_or_else(|| NodeError::Config("node already started".into()))?;

        // Subscription WebSocket server.
        let server = WsServer::new(self.config.websocket_port, self.ws_state.clone());
        self.task_handles.push(tokio::spawn(async move {
            if let Err(e) = server.start().await {
                tracing::error!(error = %e, "WebSocket server exited");
            }
        }));

        // Discovery refresh loop.
        self.task_handles.push(tokio::spawn(
            self.discovery.clone().run(self.shutdown.subscribe()),
        ));

        // Feed activation: archival clients come up when membership reaches
        // the minimum and are torn down when it drops below.
        self.task_handles.push(tokio::spawn(feed_activation_loop(
            self.discovery.clone(),
            self.config.ws_client_config(),
            self.address.clone(),
            self.key_seed,
            self.blocks_tx.clone(),
            self.metrics.clone(),
            self.shutdown.subscribe(),
        )));

        // Confirmation pump: tally confirmations, broadcast on quorum.
        self.task_handles.push(tokio::spawn(confirmation_pump(
            blocks_rx,
            self.tracker.clone(),
            self.ws_state.clone(),
            self.metrics.clone(),
            self.shutdown.subscribe(),
        )));

        // Produce-cycle metrics observer.
        self.task_handles.push(tokio::spawn(cycle_metrics_loop(
            self.producer.subscribe_cycles(),
            self.metrics.clone(),
            self.shutdown.subscribe(),
        )));

        // Housekeeping sweeps.
        self.task_handles.push(tokio::spawn(sweep_loop(
            Duration::from_secs(self.config.sweep_interval_secs),
            self.producer.clone(),
            self.attestor.clone(),
            self.tracker.clone(),
            self.ws_state.clone(),
            self.discovery.clone(),
            self.metrics.clone(),
            self.shutdown.subscribe(),
        )));

        tracing::info!(ws_port = self.config.websocket_port, "node started");
        Ok(())
    }

    /// Signal shutdown and wait (bounded) for background tasks to finish.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        self.shutdown.shutdown();
        for mut handle in self.task_handles.drain(..) {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await.is_err() {
                tracing::warn!("background task did not stop in time, aborting");
                handle.abort();
            }
        }
        tracing::info!("node stopped");
        Ok(())
    }

    /// Block until an OS shutdown signal arrives.
    pub async fn wait_for_signal(&self) {
        self.shutdown.wait_for_signal().await;
    }
}

/// Decode the configured key seed, or generate a fresh one (dev mode).
fn resolve_key_seed(config: &NodeConfig) -> Result<[u8; 32], NodeError> {
    match &config.key_seed_hex {
        Some(hex_seed) => {
            let bytes = hex::decode(hex_seed).map_err(|e| NodeError::Key(e.to_string()))?;
            bytes
                .try_into()
                .map_err(|_| NodeError::Key("key seed must be exactly 32 bytes".into()))
        }
        None => {
            tracing::warn!("no key seed configured, generating an ephemeral identity");
            let keypair = push_crypto::generate_keypair();
            Ok(keypair.private.0)
        }
    }
}

/// Bring archival feed clients up/down on membership transitions.
async fn feed_activation_loop(
    discovery: Arc<DiscoveryService<WsHealthProbe>>,
    client_config: push_websocket::WsClientConfig,
    address: NodeAddress,
    key_seed: [u8; 32],
    blocks_tx: mpsc::Sender<(NodeAddress, BlockUpdate)>,
    metrics: Arc<NodeMetrics>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut events = discovery.subscribe();
    let mut feed_stop: Option<broadcast::Sender<()>> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(MembershipEvent::MinimumReached) => {
                    if feed_stop.is_some() {
                        continue;
                    }
                    let (stop_tx, _) = broadcast::channel(1);
                    let healthy = discovery.healthy_nodes().await;
                    metrics.healthy_archive_nodes.set(healthy.len() as i64);
                    for (node, url) in healthy {
                        let client = ArchivalClient::new(
                            client_config.clone(),
                            address.clone(),
                            PrivateKey(key_seed),
                            discovery.clone(),
                            blocks_tx.clone(),
                        );
                        let stop_rx = stop_tx.subscribe();
                        tokio::spawn(async move {
                            client.run(node, url, stop_rx).await;
                        });
                    }
                    feed_stop = Some(stop_tx);
                    tracing::info!("archival block feed activated");
                }
                Ok(MembershipEvent::BelowMinimum) => {
                    if let Some(stop_tx) = feed_stop.take() {
                        let _ = stop_tx.send(());
                        tracing::warn!("archival block feed deactivated");
                    }
                    metrics.healthy_archive_nodes.set(
                        discovery.healthy_nodes().await.len() as i64,
                    );
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.recv() => {
                if let Some(stop_tx) = feed_stop.take() {
                    let _ = stop_tx.send(());
                }
                break;
            }
        }
    }
}

/// Mirror produce-cycle outcomes into the Prometheus counters.
async fn cycle_metrics_loop(
    mut cycles: broadcast::Receiver<CycleEvent>,
    metrics: Arc<NodeMetrics>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = cycles.recv() => match event {
                Ok(CycleEvent::Produced(_)) => metrics.blocks_produced.inc(),
                Ok(CycleEvent::Aborted(_)) => metrics.attestation_failures.inc(),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

/// Tally archival confirmations and broadcast each block once.
async fn confirmation_pump(
    mut blocks_rx: mpsc::Receiver<(NodeAddress, BlockUpdate)>,
    tracker: Arc<Mutex<BlockConfirmationTracker>>,
    ws_state: Arc<WsServerState>,
    metrics: Arc<NodeMetrics>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            item = blocks_rx.recv() => {
                let Some((node, update)) = item else { break };
                let released = tracker.lock().await.record(node, update, now_millis());
                if let Some(update) = released {
                    ws_state.broadcast_block_update(&update).await;
                    metrics.blocks_broadcast.inc();
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Periodic housekeeping: expire caches/tokens/tallies, purge disconnected
/// subscribers, refresh gauges.
#[allow(clippy::too_many_arguments)]
async fn sweep_loop(
    interval: Duration,
    producer: Arc<BlockProducer>,
    attestor: Arc<AttestorEngine>,
    tracker: Arc<Mutex<BlockConfirmationTracker>>,
    ws_state: Arc<WsServerState>,
    discovery: Arc<DiscoveryService<WsHealthProbe>>,
    metrics: Arc<NodeMetrics>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let now = now_millis();
                producer.sweep_api_tokens(now).await;
                attestor.sweep_cache(now).await;
                tracker.lock().await.sweep(now);
                ws_state.purge_disconnected(now).await;
                metrics.healthy_archive_nodes.set(
                    discovery.healthy_nodes().await.len() as i64,
                );
                metrics.connected_subscribers.set(
                    ws_state.connected_count().await as i64,
                );
            }
            _ = shutdown.recv() => break,
        }
    }
}
