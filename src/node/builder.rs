//! A builder pattern implementation for constructing a [`Node`].
//!
//! The [`NodeBuilder`] assembles the controller components around node-local
//! [`Settings`]. Every pluggable seam has a production default:
//! - transport: [`HttpTransport`]
//! - membership: [`HealthProber`] over the chosen transport
//! - config storage: [`FileConfigStorage`] in `node.workdir`
//! - bucket source: [`NoBuckets`]
//! - credentials: [`ClusterCredentials`] (replicated users plus `admin`)
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let node = NodeBuilder::new(settings, shutdown_rx)
//!     .role(RoleDefinition::new("app").depends_on("sharding-router"))
//!     .build()
//!     .await?;
//! node.run().await?;
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::Node;
use crate::auth::AuthGate;
use crate::auth::ClusterCredentials;
use crate::auth::CredentialCheck;
use crate::failover::FailoverController;
use crate::membership::HealthProber;
use crate::membership::Membership;
use crate::network::HttpTransport;
use crate::network::PeerTransport;
use crate::replication::ConfigApplier;
use crate::replication::ConfigReplicator;
use crate::replication::ConfigStorage;
use crate::replication::ConfigSync;
use crate::replication::FileConfigStorage;
use crate::roles::builtin_roles;
use crate::roles::BucketSource;
use crate::roles::NoBuckets;
use crate::roles::RoleDefinition;
use crate::roles::RoleRegistry;
use crate::roles::RpcRouter;
use crate::topology::ClusterConfig;
use crate::topology::TopologyStore;
use crate::Result;
use crate::Settings;

/// Credentials are built once the store exists
type CredentialsFactory = Box<dyn FnOnce(Arc<TopologyStore>) -> Arc<dyn CredentialCheck> + Send>;

pub struct NodeBuilder {
    settings: Settings,
    roles: Vec<RoleDefinition>,
    transport: Option<Arc<dyn PeerTransport>>,
    membership: Option<Arc<dyn Membership>>,
    storage: Option<Arc<dyn ConfigStorage>>,
    buckets: Option<Arc<dyn BucketSource>>,
    credentials: Option<CredentialsFactory>,
    shutdown_signal: watch::Receiver<()>,
}

impl NodeBuilder {
    /// `settings` must already be validated.
    pub fn new(
        settings: Settings,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            settings,
            roles: Vec::new(),
            transport: None,
            membership: None,
            storage: None,
            buckets: None,
            credentials: None,
            shutdown_signal,
        }
    }

    /// Registers an application role after the built-in ones
    pub fn role(
        mut self,
        role: RoleDefinition,
    ) -> Self {
        self.roles.push(role);
        self
    }

    pub fn roles(
        mut self,
        roles: impl IntoIterator<Item = RoleDefinition>,
    ) -> Self {
        self.roles.extend(roles);
        self
    }

    /// Sets a custom peer transport implementation
    pub fn transport(
        mut self,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets a custom membership implementation. The built-in prober loop is
    /// not started in that case.
    pub fn membership(
        mut self,
        membership: Arc<dyn Membership>,
    ) -> Self {
        self.membership = Some(membership);
        self
    }

    /// Sets a custom config storage implementation
    pub fn storage(
        mut self,
        storage: Arc<dyn ConfigStorage>,
    ) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn bucket_source(
        mut self,
        buckets: Arc<dyn BucketSource>,
    ) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Replaces the default credential check
    pub fn credentials<F>(
        mut self,
        factory: F,
    ) -> Self
    where
        F: FnOnce(Arc<TopologyStore>) -> Arc<dyn CredentialCheck> + Send + 'static,
    {
        self.credentials = Some(Box::new(factory));
        self
    }

    /// Assembles the node and activates the persisted document, if any.
    ///
    /// # Errors
    /// - role registration errors (duplicates, unknown dependencies, cycles)
    /// - the persisted document can't be read or its roles fail to start
    pub async fn build(self) -> Result<Arc<Node>> {
        let settings = Arc::new(self.settings);
        let self_uri = settings.node.advertise_uri.clone();

        let buckets = self.buckets.unwrap_or_else(|| Arc::new(NoBuckets));
        let mut roles = builtin_roles(buckets.clone());
        roles.extend(self.roles);
        let registry = Arc::new(RoleRegistry::new(roles)?);

        let store = Arc::new(TopologyStore::new(ClusterConfig::initial(
            &settings.sharding,
            &settings.auth,
        )));

        let transport = self.transport.unwrap_or_else(|| Arc::new(HttpTransport::new()));

        let (membership, prober): (Arc<dyn Membership>, Option<Arc<HealthProber>>) = match self.membership {
            Some(membership) => (membership, None),
            None => {
                let prober = Arc::new(HealthProber::new(
                    self_uri.clone(),
                    transport.clone(),
                    settings.failover.suspect_threshold,
                    settings.network.ping_timeout(),
                    settings.failover.probe_interval(),
                ));
                (prober.clone(), Some(prober))
            }
        };

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(FileConfigStorage::new(settings.node.workdir.clone())));

        let failover = Arc::new(FailoverController::new(
            self_uri.clone(),
            store.clone(),
            membership.clone(),
            settings.failover.reconcile_interval(),
        ));

        let applier = Arc::new(ConfigApplier::new(
            self_uri.clone(),
            settings.node.alias.clone(),
            store.clone(),
            storage,
            registry.clone(),
            failover.clone(),
            membership.clone(),
            buckets,
        ));

        let replicator = Arc::new(ConfigReplicator::new(
            self_uri.clone(),
            store.clone(),
            applier.clone(),
            membership.clone(),
            transport.clone(),
            settings.network.clone(),
        ));

        let sync = Arc::new(ConfigSync::new(
            self_uri.clone(),
            store.clone(),
            applier.clone(),
            membership.clone(),
            transport.clone(),
            settings.network.fetch_timeout(),
            settings.retry.config_sync,
        ));

        let router = Arc::new(RpcRouter::new(
            self_uri.clone(),
            registry.clone(),
            store.clone(),
            membership.clone(),
            failover.clone(),
            transport,
            settings.network.rpc_timeout(),
        ));

        let credentials = match self.credentials {
            Some(factory) => factory(store.clone()),
            None => Arc::new(ClusterCredentials::new(
                settings.auth.cluster_cookie.clone(),
                store.clone(),
            )),
        };
        let gate = Arc::new(AuthGate::new(credentials, store.clone()));

        applier.boot().await?;
        debug!(uri = %self_uri, version = store.version(), "node assembled");

        Ok(Arc::new(Node {
            settings,
            store,
            registry,
            membership,
            prober,
            failover,
            applier,
            replicator,
            sync,
            router,
            gate,
            shutdown_signal: self.shutdown_signal,
        }))
    }
}
