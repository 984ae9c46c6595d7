//! In-process clusters for integration tests.
//!
//! Nodes talk through one [`LoopbackTransport`]. Two flavors:
//! - static: liveness is set by hand on a [`StaticMembership`]
//! - probing: every node runs its own ping prober and background loops, so
//!   liveness changes are detected the way a deployed node detects them

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use d_topology::membership::Membership;
use d_topology::membership::StaticMembership;
use d_topology::network::LoopbackTransport;
use d_topology::network::PeerHandler;
use d_topology::network::PeerTransport;
use d_topology::replication::ConfigStorage;
use d_topology::replication::MemConfigStorage;
use d_topology::roles::RoleDefinition;
use d_topology::JoinServerRequest;
use d_topology::Node;
use d_topology::NodeBuilder;
use d_topology::ReplicasetView;
use d_topology::Result;
use d_topology::Settings;
use d_topology::StorageError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Upper bound for liveness-driven convergence
pub const CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(5);

pub const ARTIFICIAL_ERROR: &str = "Artificial error";

/// Memory storage whose `stage` can be made to fail or to hang
#[derive(Default)]
pub struct FaultyStorage {
    inner: MemConfigStorage,
    fail_stage: AtomicBool,
    stall_ms: AtomicU64,
}

impl FaultyStorage {
    pub fn set_failing(
        &self,
        failing: bool,
    ) {
        self.fail_stage.store(failing, Ordering::SeqCst);
    }

    /// The next stage persists the document, then hangs for `delay`
    pub fn stall_next_stage(
        &self,
        delay: Duration,
    ) {
        self.stall_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn has_staged(&self) -> bool {
        self.inner.has_staged()
    }
}

#[async_trait]
impl ConfigStorage for FaultyStorage {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        self.inner.load().await
    }

    async fn stage(
        &self,
        version: u64,
        document: &[u8],
    ) -> Result<()> {
        if self.fail_stage.load(Ordering::SeqCst) {
            return Err(StorageError::ConfigStorage(ARTIFICIAL_ERROR.to_string()).into());
        }
        self.inner.stage(version, document).await?;
        let stall = self.stall_ms.swap(0, Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(Duration::from_millis(stall)).await;
        }
        Ok(())
    }

    async fn commit(
        &self,
        version: u64,
    ) -> Result<()> {
        self.inner.commit(version).await
    }

    async fn abort(
        &self,
        version: u64,
    ) -> Result<()> {
        self.inner.abort(version).await
    }
}

pub struct ClusterNode {
    pub uri: String,
    pub node: Arc<Node>,
    pub storage: Arc<FaultyStorage>,
    /// Set for static clusters only
    pub membership: Option<Arc<StaticMembership>>,
}

pub struct Cluster {
    pub transport: Arc<LoopbackTransport>,
    pub nodes: Vec<ClusterNode>,
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<()>,
}

pub fn uri(i: usize) -> String {
    format!("localhost:{}", 13301 + i)
}

fn settings(i: usize) -> Settings {
    let mut settings = Settings::default();
    settings.node.advertise_uri = uri(i);
    settings.node.alias = format!("srv-{}", i + 1);
    settings.failover.probe_interval_ms = 20;
    settings.failover.suspect_threshold = 2;
    settings.failover.reconcile_interval_ms = 50;
    settings.network.ping_timeout_ms = 50;
    settings.network.stage_timeout_ms = 300;
    settings.network.commit_timeout_ms = 300;
    settings.network.sync_interval_ms = 100;
    settings
}

impl Cluster {
    /// Liveness is whatever [`Cluster::kill`]/[`Cluster::revive`] say
    pub async fn with_static_membership<F>(
        size: usize,
        roles: F,
    ) -> Self
    where
        F: Fn() -> Vec<RoleDefinition>,
    {
        Self::build(size, roles, false).await
    }

    /// Every node probes its peers and runs its background loops
    pub async fn with_probing<F>(
        size: usize,
        roles: F,
    ) -> Self
    where
        F: Fn() -> Vec<RoleDefinition>,
    {
        Self::build(size, roles, true).await
    }

    async fn build<F>(
        size: usize,
        roles: F,
        probing: bool,
    ) -> Self
    where
        F: Fn() -> Vec<RoleDefinition>,
    {
        let (shutdown, shutdown_rx) = watch::channel(());
        let transport = Arc::new(LoopbackTransport::new());
        let uris: Vec<String> = (0..size).map(uri).collect();

        let mut nodes = Vec::with_capacity(size);
        for (i, self_uri) in uris.iter().enumerate() {
            let storage = Arc::new(FaultyStorage::default());
            let mut builder = NodeBuilder::new(settings(i), shutdown_rx.clone())
                .roles(roles())
                .transport(transport.clone() as Arc<dyn PeerTransport>)
                .storage(storage.clone() as Arc<dyn ConfigStorage>);

            let membership = if probing {
                None
            } else {
                let membership = Arc::new(StaticMembership::new(self_uri.clone()));
                for other in uris.iter().filter(|u| *u != self_uri) {
                    membership.set_alive(other, true);
                }
                builder = builder.membership(membership.clone() as Arc<dyn Membership>);
                Some(membership)
            };

            let node = builder.build().await.expect("node builds");
            transport.register(self_uri.clone(), node.clone() as Arc<dyn PeerHandler>);
            nodes.push(ClusterNode {
                uri: self_uri.clone(),
                node,
                storage,
                membership,
            });
        }

        let mut handles = Vec::new();
        if probing {
            for n in &nodes {
                handles.extend(n.node.start_background());
            }
        }

        Self {
            transport,
            nodes,
            handles,
            shutdown,
        }
    }

    pub fn node(
        &self,
        i: usize,
    ) -> &Arc<Node> {
        &self.nodes[i].node
    }

    /// Joins node 0 first and then every other node into `replicaset_of(i)`,
    /// a replicaset created by the first member named with that alias.
    /// Returns the server uuids in node order.
    pub async fn join_all<F>(
        &self,
        replicaset_of: F,
    ) -> Vec<String>
    where
        F: Fn(usize) -> &'static str,
    {
        let first = self.node(0);
        let mut uuids = Vec::new();
        for (i, n) in self.nodes.iter().enumerate() {
            let alias = replicaset_of(i);
            let existing = first.replicasets(None).into_iter().find(|rs| rs.alias == alias);
            let req = JoinServerRequest {
                replicaset_uuid: existing.as_ref().map(|rs| rs.uuid.clone()),
                replicaset_alias: Some(alias.to_string()),
                ..JoinServerRequest::new(n.uri.clone())
            };
            uuids.push(first.join_server(req).await.expect("join succeeds"));
        }
        uuids
    }

    pub fn replicaset(
        &self,
        i: usize,
        alias: &str,
    ) -> ReplicasetView {
        self.node(i)
            .replicasets(None)
            .into_iter()
            .find(|rs| rs.alias == alias)
            .expect("replicaset exists")
    }

    /// Node vanishes. Static clusters also mark it dead everywhere else.
    pub fn kill(
        &self,
        i: usize,
    ) {
        let target = &self.nodes[i];
        self.transport.kill(&target.uri);
        self.set_liveness(i, false);
    }

    /// Node stays registered but stops answering
    pub fn pause(
        &self,
        i: usize,
    ) {
        self.transport.pause(&self.nodes[i].uri);
        self.set_liveness(i, false);
    }

    pub fn revive(
        &self,
        i: usize,
    ) {
        let target = &self.nodes[i];
        self.transport.resume(&target.uri);
        self.transport
            .register(target.uri.clone(), target.node.clone() as Arc<dyn PeerHandler>);
        self.set_liveness(i, true);
    }

    fn set_liveness(
        &self,
        i: usize,
        alive: bool,
    ) {
        let uri = &self.nodes[i].uri;
        for (j, n) in self.nodes.iter().enumerate() {
            if j == i {
                continue;
            }
            if let Some(membership) = &n.membership {
                membership.set_alive(uri, alive);
            }
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Polls `check` until it holds or [`CONVERGENCE_TIMEOUT`] elapses.
pub async fn eventually<F>(
    what: &str,
    check: F,
) where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + CONVERGENCE_TIMEOUT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "{what} did not happen within {CONVERGENCE_TIMEOUT:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
