//! The discovery service proper — tracked pool, refresh loop, events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::{broadcast, Mutex, RwLock};

use push_directory::NodeRegistry;
use push_types::{NodeAddress, NodeType};

use crate::probe::HealthProbe;

/// Discovery tunables.
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// How often the tracked pool is re-checked.
    pub refresh_interval: Duration,
    /// Minimum healthy archival nodes before the block feed activates.
    pub min_archive_nodes: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            min_archive_nodes: 1,
        }
    }
}

/// Edge-triggered membership transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipEvent {
    /// The pool crossed up through the minimum.
    MinimumReached,
    /// The pool dropped back below the minimum.
    BelowMinimum,
}

/// Maintains the pool of healthy archival nodes.
pub struct DiscoveryService<P: HealthProbe> {
    config: DiscoveryConfig,
    registry: Arc<RwLock<NodeRegistry>>,
    probe: P,
    /// Currently healthy nodes and their base URLs.
    healthy: Mutex<HashMap<NodeAddress, String>>,
    /// Whether the last observed state was at-or-above minimum.
    at_minimum: AtomicBool,
    events_tx: broadcast::Sender<MembershipEvent>,
}

impl<P: HealthProbe> DiscoveryService<P> {
    pub fn new(config: DiscoveryConfig, registry: Arc<RwLock<NodeRegistry>>, probe: P) -> Self {
        let (events_tx, _) = broadcast::channel(16);
        Self {
            config,
            registry,
            probe,
            healthy: Mutex::new(HashMap::new()),
            at_minimum: AtomicBool::new(false),
            events_tx,
        }
    }

    /// Subscribe to membership transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events_tx.subscribe()
    }

    /// Whether the pool currently satisfies the minimum.
    pub fn has_minimum(&self) -> bool {
        self.at_minimum.load(Ordering::Acquire)
    }

    /// The configured minimum archival count (also the confirmation quorum).
    pub fn min_archive_nodes(&self) -> usize {
        self.config.min_archive_nodes
    }

    /// Snapshot of the healthy pool.
    pub async fn healthy_nodes(&self) -> Vec<(NodeAddress, String)> {
        self.healthy
            .lock()
            .await
            .iter()
            .map(|(node, url)| (node.clone(), url.clone()))
            .collect()
    }

    /// A healthy node not in `exclude`, if any — used by the WebSocket
    /// client to substitute a connection that gave up.
    pub async fn pick_untried(&self, exclude: &[NodeAddress]) -> Option<(NodeAddress, String)> {
        let healthy = self.healthy.lock().await;
        let mut candidates: Vec<(NodeAddress, String)> = healthy
            .iter()
            .filter(|(node, _)| !exclude.contains(node))
            .map(|(node, url)| (node.clone(), url.clone()))
            .collect();
        drop(healthy);
        candidates.shuffle(&mut rand::thread_rng());
        candidates.pop()
    }

    /// One refresh cycle: re-check tracked nodes, then dial shuffled untried
    /// candidates while below the minimum.
    pub async fn refresh(&self) {
        let mut tracked = self.healthy.lock().await;

        // Re-check everything currently tracked; drop what fails.
        let current: Vec<(NodeAddress, String)> = tracked
            .iter()
            .map(|(node, url)| (node.clone(), url.clone()))
            .collect();
        for (node, url) in current {
            if !self.probe.check(&url).await {
                tracing::info!(%node, "archival node dropped from pool");
                tracked.remove(&node);
            }
        }

        // Below minimum: try new candidates from a shuffled untried pool.
        if tracked.len() < self.config.min_archive_nodes {
            let registry = self.registry.read().await;
            let mut candidates: Vec<(NodeAddress, String)> = registry
                .active_of_type(NodeType::Archival)
                .into_iter()
                .filter(|info| !tracked.contains_key(&info.address))
                .map(|info| (info.address.clone(), info.url.clone()))
                .collect();
            drop(registry);
            candidates.shuffle(&mut rand::thread_rng());

            for (node, url) in candidates {
                if tracked.len() >= self.config.min_archive_nodes {
                    break;
                }
                if self.probe.check(&url).await {
                    tracing::info!(%node, "archival node joined pool");
                    tracked.insert(node, url);
                }
            }
        }

        let healthy_count = tracked.len();
        drop(tracked);
        self.update_state(healthy_count);
    }

    /// Edge-triggered state transition: events fire only on change.
    fn update_state(&self, healthy_count: usize) {
        let now_at_minimum = healthy_count >= self.config.min_archive_nodes;
        let was_at_minimum = self.at_minimum.swap(now_at_minimum, Ordering::AcqRel);
        if now_at_minimum && !was_at_minimum {
            tracing::info!(healthy_count, "archival membership minimum reached");
            let _ = self.events_tx.send(MembershipEvent::MinimumReached);
        } else if !now_at_minimum && was_at_minimum {
            tracing::warn!(healthy_count, "archival membership below minimum");
            let _ = self.events_tx.send(MembershipEvent::BelowMinimum);
        }
    }

    /// Periodic refresh loop; exits on shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.refresh_interval) => {
                    self.refresh().await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!("discovery refresh loop stopped");
                    break;
                }
            }
        }
    }
}
