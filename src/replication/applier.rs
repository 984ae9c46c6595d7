use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::ConfigStorage;
use crate::constants::SHARDING_STORAGE_ROLE;
use crate::failover::FailoverController;
use crate::membership::MemberPayload;
use crate::membership::Membership;
use crate::metrics::CONFIG_VERSION;
use crate::network::StageRequest;
use crate::roles::BucketSource;
use crate::roles::RoleContext;
use crate::roles::RoleRegistry;
use crate::topology::ClusterConfig;
use crate::topology::TopologyStore;
use crate::Error;
use crate::ReplicationError;
use crate::Result;

/// Participant side of the two-phase commit, and the only writer of the
/// node's [`TopologyStore`].
///
/// Holds at most one staged document. Activation swaps the store, then
/// recomputes failover, updates the membership payload and reconciles roles.
pub struct ConfigApplier {
    self_uri: String,
    alias: String,
    store: Arc<TopologyStore>,
    storage: Arc<dyn ConfigStorage>,
    registry: Arc<RoleRegistry>,
    failover: Arc<FailoverController>,
    membership: Arc<dyn Membership>,
    buckets: Arc<dyn BucketSource>,
    staged: Arc<Mutex<Option<Arc<ClusterConfig>>>>,
}

impl ConfigApplier {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_uri: impl Into<String>,
        alias: impl Into<String>,
        store: Arc<TopologyStore>,
        storage: Arc<dyn ConfigStorage>,
        registry: Arc<RoleRegistry>,
        failover: Arc<FailoverController>,
        membership: Arc<dyn Membership>,
        buckets: Arc<dyn BucketSource>,
    ) -> Self {
        Self {
            self_uri: self_uri.into(),
            alias: alias.into(),
            store,
            storage,
            registry,
            failover,
            membership,
            buckets,
            staged: Arc::new(Mutex::new(None)),
        }
    }

    /// Loads the persisted document and activates it. Without one the node
    /// stays unconfigured.
    pub async fn boot(&self) -> Result<()> {
        match self.storage.load().await? {
            Some(bytes) => {
                let cfg = ClusterConfig::decode(&bytes)?;
                info!(version = cfg.version, "active config loaded");
                self.activate(Arc::new(cfg)).await
            }
            None => {
                info!(uri = %self.self_uri, "no active config, instance is unconfigured");
                self.membership.set_local_payload(self.local_payload());
                Ok(())
            }
        }
    }

    /// Prepare phase on this node.
    ///
    /// # Errors
    /// - [`ReplicationError::TwoPhaseLocked`] if a document is already staged
    /// - [`ReplicationError::StaleVersion`] if the document is not newer than the active one
    /// - any veto returned by a role's `validate_config`
    #[instrument(skip(self, req), fields(version = req.version))]
    pub async fn stage(
        &self,
        req: StageRequest,
    ) -> Result<()> {
        let mut staged = self.staged.lock().await;
        if staged.is_some() {
            return Err(ReplicationError::TwoPhaseLocked.into());
        }

        let cfg = ClusterConfig::decode(&req.document)?;
        if cfg.version != req.version {
            return Err(Error::Validation(format!(
                "Config document has version {}, expected {}",
                cfg.version, req.version
            )));
        }
        let active = self.store.current();
        if cfg.version <= active.version {
            return Err(ReplicationError::StaleVersion {
                incoming: cfg.version,
                active: active.version,
            }
            .into());
        }

        self.registry.validate_config(&cfg, &active).await?;
        let mut release = StageRelease {
            staged: self.staged.clone(),
            storage: self.storage.clone(),
            version: cfg.version,
            armed: true,
        };
        let res = self.storage.stage(cfg.version, &req.document).await;
        release.armed = false;
        res?;
        *staged = Some(Arc::new(cfg));
        debug!("config staged");
        Ok(())
    }

    /// Commit phase on this node: persists and activates the staged document.
    #[instrument(skip(self))]
    pub async fn commit(
        &self,
        version: u64,
    ) -> Result<()> {
        let cfg = {
            let mut staged = self.staged.lock().await;
            let cfg = match staged.take() {
                Some(cfg) if cfg.version == version => cfg,
                other => {
                    *staged = other;
                    return Err(ReplicationError::NotStaged { version }.into());
                }
            };
            if let Err(e) = self.storage.commit(version).await {
                warn!(?e, "staged config could not be persisted, dropping it");
                self.storage.abort(version).await?;
                return Err(e);
            }
            cfg
        };
        self.activate(cfg).await
    }

    /// Drops the staged document. Aborting with nothing staged is a no-op.
    #[instrument(skip(self))]
    pub async fn abort(
        &self,
        version: u64,
    ) -> Result<()> {
        let mut staged = self.staged.lock().await;
        match staged.as_ref() {
            None => Ok(()),
            Some(cfg) if cfg.version == version => {
                staged.take();
                self.storage.abort(version).await?;
                info!("staged config aborted");
                Ok(())
            }
            Some(_) => Err(ReplicationError::NotStaged { version }.into()),
        }
    }

    /// Stages and commits a document fetched from a peer.
    ///
    /// Returns `false` when the document is not newer than the active one.
    pub async fn apply_fetched(
        &self,
        document: Vec<u8>,
    ) -> Result<bool> {
        let version = ClusterConfig::decode(&document)?.version;
        if version <= self.store.version() {
            return Ok(false);
        }
        self.stage(StageRequest { version, document }).await?;
        self.commit(version).await?;
        Ok(true)
    }

    pub async fn staged_version(&self) -> Option<u64> {
        self.staged.lock().await.as_ref().map(|c| c.version)
    }

    async fn activate(
        &self,
        cfg: Arc<ClusterConfig>,
    ) -> Result<()> {
        if !self.store.commit(cfg.clone()) {
            warn!(version = cfg.version, "config is not newer than the active one, ignored");
            return Ok(());
        }
        CONFIG_VERSION.set(cfg.version as i64);

        for server in cfg.active_servers() {
            self.membership.add_member(&server.uri);
        }
        self.failover.recompute();

        let res = self.reconcile_roles().await;
        self.membership.set_local_payload(self.local_payload());
        res
    }

    /// Brings running roles in line with the committed document and this
    /// node's current leadership.
    pub async fn reconcile_roles(&self) -> Result<()> {
        let cfg = self.store.current();
        let me = cfg.server_by_uri(&self.self_uri);
        let desired = me
            .and_then(|s| cfg.replicaset(&s.replicaset_uuid))
            .map(|rs| self.registry.closure(&rs.roles))
            .unwrap_or_default();

        let ctx = RoleContext {
            server_uuid: me.map(|s| s.uuid.clone()),
            replicaset_uuid: me.map(|s| s.replicaset_uuid.clone()),
            is_leader: me.map(|s| self.failover.is_leader(&s.uuid)).unwrap_or(false),
            config: cfg.clone(),
        };
        self.registry.reconcile(&desired, &ctx).await
    }

    /// What this node advertises through membership
    pub fn local_payload(&self) -> MemberPayload {
        let cfg = self.store.current();
        let me = cfg.server_by_uri(&self.self_uri);
        let buckets = if self.registry.is_running(SHARDING_STORAGE_ROLE) {
            self.buckets.bucket_count()
        } else {
            0
        };
        MemberPayload {
            uuid: me.map(|s| s.uuid.clone()),
            alias: me
                .map(|s| s.alias.clone())
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| self.alias.clone()),
            config_version: cfg.version,
            buckets,
        }
    }
}

/// Drops the storage-level staged document when [`ConfigApplier::stage`] is
/// cancelled while the storage write is in flight, e.g. by a peer timeout.
/// Otherwise the node would refuse every later stage with
/// [`ReplicationError::TwoPhaseLocked`].
struct StageRelease {
    staged: Arc<Mutex<Option<Arc<ClusterConfig>>>>,
    storage: Arc<dyn ConfigStorage>,
    version: u64,
    armed: bool,
}

impl Drop for StageRelease {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let staged = self.staged.clone();
        let storage = self.storage.clone();
        let version = self.version;
        runtime.spawn(async move {
            // runs once the interrupted stage released the lock; a stage
            // that completed since then owns the storage document
            let staged = staged.lock().await;
            if staged.is_some() {
                return;
            }
            match storage.abort(version).await {
                Ok(()) => info!(version, "interrupted stage released"),
                Err(e) => warn!(version, error = %e, "interrupted stage could not be released"),
            }
        });
    }
}
