use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;

use super::ConfigApplier;
use crate::membership::Membership;
use crate::network::PeerTransport;
use crate::topology::TopologyStore;
use crate::utils::async_task::retry_with_backoff;
use crate::BackoffPolicy;
use crate::Result;

/// Lazy catch-up for nodes that missed a commit while unreachable.
///
/// Peers advertise their config version in membership payloads; when an
/// alive peer is ahead, its document is fetched and applied locally.
pub struct ConfigSync {
    self_uri: String,
    store: Arc<TopologyStore>,
    applier: Arc<ConfigApplier>,
    membership: Arc<dyn Membership>,
    transport: Arc<dyn PeerTransport>,
    fetch_timeout: Duration,
    policy: BackoffPolicy,
}

impl ConfigSync {
    pub fn new(
        self_uri: impl Into<String>,
        store: Arc<TopologyStore>,
        applier: Arc<ConfigApplier>,
        membership: Arc<dyn Membership>,
        transport: Arc<dyn PeerTransport>,
        fetch_timeout: Duration,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            self_uri: self_uri.into(),
            store,
            applier,
            membership,
            transport,
            fetch_timeout,
            policy,
        }
    }

    /// One catch-up attempt. Returns `true` if a newer document was applied.
    ///
    /// Unconfigured nodes never pull: they enter the cluster through a join.
    pub async fn sync_once(&self) -> Result<bool> {
        let local = self.store.version();
        if local == 0 {
            return Ok(false);
        }
        let newest = self
            .membership
            .members()
            .into_iter()
            .filter(|m| m.uri != self.self_uri && m.is_alive() && m.payload.config_version > local)
            .max_by_key(|m| m.payload.config_version);
        let Some(peer) = newest else {
            return Ok(false);
        };

        info!(uri = %peer.uri, from = local, to = peer.payload.config_version, "catching up config");
        let document = retry_with_backoff(
            || self.transport.fetch_config(&peer.uri, self.fetch_timeout),
            self.policy,
        )
        .await?;
        self.applier.apply_fetched(document).await
    }

    pub async fn run(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("config sync stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once().await {
                        debug!(error = %e, "config catch-up failed");
                    }
                }
            }
        }
    }
}
