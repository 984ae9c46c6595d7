//! A running topology controller instance.
//!
//! ## Key Responsibilities
//! - Owns every component of the controller and answers peer requests
//! - Runs the background loops: membership probing, failover, config catch-up
//!   and role re-application on leadership changes
//! - Serves the HTTP surface until the shutdown signal fires
//!
//! ## Example Usage
//! ```ignore
//! let node = NodeBuilder::new(settings, shutdown_rx).build().await?;
//! node.run().await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::routes;
use crate::auth::AuthGate;
use crate::failover::FailoverController;
use crate::membership::HealthProber;
use crate::membership::MemberPayload;
use crate::membership::Membership;
use crate::network::PeerHandler;
use crate::network::RpcRequest;
use crate::network::RpcResponse;
use crate::network::StageRequest;
use crate::replication::ConfigApplier;
use crate::replication::ConfigReplicator;
use crate::replication::ConfigSync;
use crate::roles::CallOptions;
use crate::roles::RoleRegistry;
use crate::roles::RpcRouter;
use crate::topology::TopologyStore;
use crate::utils::async_task::spawn_named;
use crate::NetworkError;
use crate::ReplicationError;
use crate::Result;
use crate::Settings;

pub struct Node {
    pub(crate) settings: Arc<Settings>,
    pub(crate) store: Arc<TopologyStore>,
    pub(crate) registry: Arc<RoleRegistry>,
    pub(crate) membership: Arc<dyn Membership>,
    /// Set when membership is the built-in ping prober, which needs its loop
    pub(crate) prober: Option<Arc<HealthProber>>,
    pub(crate) failover: Arc<FailoverController>,
    pub(crate) applier: Arc<ConfigApplier>,
    pub(crate) replicator: Arc<ConfigReplicator>,
    pub(crate) sync: Arc<ConfigSync>,
    pub(crate) router: Arc<RpcRouter>,
    pub(crate) gate: Arc<AuthGate>,
    pub(crate) shutdown_signal: watch::Receiver<()>,
}

impl Node {
    pub fn self_uri(&self) -> &str {
        &self.settings.node.advertise_uri
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<TopologyStore> {
        &self.store
    }

    pub fn failover(&self) -> &Arc<FailoverController> {
        &self.failover
    }

    pub fn gate(&self) -> &Arc<AuthGate> {
        &self.gate
    }

    /// Calls `method` of `role` on a node running it, see [`RpcRouter::call`].
    pub async fn call(
        &self,
        role: &str,
        method: &str,
        args: serde_json::Value,
        opts: CallOptions,
    ) -> Result<serde_json::Value> {
        self.router.call(role, method, args, opts).await
    }

    /// Uuid of this node once it is part of the topology
    pub(crate) fn self_uuid(&self) -> Option<String> {
        self.store
            .current()
            .server_by_uri(self.self_uri())
            .map(|s| s.uuid.clone())
    }

    fn is_self_leader(&self) -> bool {
        self.self_uuid()
            .map(|uuid| self.failover.is_leader(&uuid))
            .unwrap_or(false)
    }

    /// Spawns the background loops. They stop when the shutdown signal fires.
    pub fn start_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if let Some(prober) = self.prober.clone() {
            let shutdown = self.shutdown_signal.clone();
            spawn_named("membership prober", move || prober.run(shutdown), Some(&mut handles));
        }

        let failover = self.failover.clone();
        let shutdown = self.shutdown_signal.clone();
        spawn_named("failover controller", move || failover.run(shutdown), Some(&mut handles));

        let sync = self.sync.clone();
        let period = self.settings.network.sync_interval();
        let shutdown = self.shutdown_signal.clone();
        spawn_named("config sync", move || sync.run(period, shutdown), Some(&mut handles));

        let node = self.clone();
        let shutdown = self.shutdown_signal.clone();
        spawn_named(
            "leadership watcher",
            move || node.watch_leadership(shutdown),
            Some(&mut handles),
        );

        handles
    }

    /// Re-applies roles whenever this node gains or loses leadership without
    /// a config change.
    async fn watch_leadership(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let mut leaders = self.failover.subscribe();
        let mut was_leader = self.is_self_leader();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    return Ok(());
                }
                changed = leaders.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    let is_leader = self.is_self_leader();
                    if is_leader == was_leader {
                        continue;
                    }
                    was_leader = is_leader;
                    debug!(is_leader, "leadership changed, re-applying roles");
                    if let Err(e) = self.applier.reconcile_roles().await {
                        warn!(error = %e, "role re-apply failed");
                    }
                }
            }
        }
    }

    /// Serves HTTP and runs the background loops until shutdown, then stops
    /// every running role.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let handles = self.start_background();

        let listen_address = self.settings.node.listen_address;
        let mut shutdown = self.shutdown_signal.clone();
        let (addr, server) = warp::serve(routes(self.clone()))
            .try_bind_with_graceful_shutdown(listen_address, async move {
                let _ = shutdown.changed().await;
            })
            .map_err(|e| NetworkError::ServerBind(e.to_string()))?;
        info!(%addr, uri = %self.self_uri(), "node is serving");

        server.await;

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task did not finish cleanly");
            }
        }
        self.registry.stop_all().await;
        info!("node stopped");
        Ok(())
    }
}

#[async_trait]
impl PeerHandler for Node {
    async fn handle_ping(&self) -> MemberPayload {
        self.applier.local_payload()
    }

    async fn handle_stage(
        &self,
        req: StageRequest,
    ) -> Result<()> {
        self.applier.stage(req).await
    }

    async fn handle_commit(
        &self,
        version: u64,
    ) -> Result<()> {
        self.applier.commit(version).await
    }

    async fn handle_abort(
        &self,
        version: u64,
    ) -> Result<()> {
        self.applier.abort(version).await
    }

    async fn handle_fetch(&self) -> Result<Vec<u8>> {
        let current = self.store.current();
        if !current.is_bootstrapped() {
            return Err(ReplicationError::NotBootstrapped.into());
        }
        current.encode()
    }

    async fn handle_rpc(
        &self,
        req: RpcRequest,
    ) -> RpcResponse {
        self.router.serve(req).await
    }
}
