use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::info;

use super::ClusterConfig;

/// Holder of the committed clusterwide document.
///
/// Readers get a cheap `Arc` snapshot that never changes under them; commit
/// swaps the whole document and notifies subscribers with the new snapshot.
pub struct TopologyStore {
    current: ArcSwap<ClusterConfig>,
    notify: watch::Sender<Arc<ClusterConfig>>,
}

impl TopologyStore {
    pub fn new(initial: ClusterConfig) -> Self {
        let initial = Arc::new(initial);
        let (notify, _) = watch::channel(initial.clone());
        Self {
            current: ArcSwap::new(initial),
            notify,
        }
    }

    /// Current committed snapshot
    pub fn current(&self) -> Arc<ClusterConfig> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// Replaces the committed document. Versions only move forward.
    pub fn commit(
        &self,
        config: Arc<ClusterConfig>,
    ) -> bool {
        let prev = self.current.load();
        if config.version <= prev.version {
            return false;
        }
        info!(from = prev.version, to = config.version, "config committed");
        self.current.store(config.clone());
        self.notify.send_replace(config);
        true
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ClusterConfig>> {
        self.notify.subscribe()
    }
}
