use std::sync::Arc;
use std::time::Duration;

use crate::failover::FailoverController;
use crate::membership::StaticMembership;
use crate::replication::ConfigApplier;
use crate::replication::MemConfigStorage;
use crate::roles::builtin_roles;
use crate::roles::NoBuckets;
use crate::roles::RoleDefinition;
use crate::roles::RoleRegistry;
use crate::topology::ClusterConfig;
use crate::topology::RawSection;
use crate::topology::TopologyStore;
use crate::Result;

/// One node's participant stack over in-memory storage and static membership
pub struct ApplierHarness {
    pub store: Arc<TopologyStore>,
    pub storage: Arc<MemConfigStorage>,
    pub registry: Arc<RoleRegistry>,
    pub membership: Arc<StaticMembership>,
    pub failover: Arc<FailoverController>,
    pub applier: Arc<ConfigApplier>,
}

impl ApplierHarness {
    pub fn new(
        self_uri: &str,
        initial: ClusterConfig,
        extra_roles: Vec<RoleDefinition>,
    ) -> Self {
        let mut roles = builtin_roles(Arc::new(NoBuckets));
        roles.extend(extra_roles);
        let registry = Arc::new(RoleRegistry::new(roles).unwrap());

        let store = Arc::new(TopologyStore::new(initial));
        let storage = Arc::new(MemConfigStorage::new());
        let membership = Arc::new(StaticMembership::new(self_uri));
        let failover = Arc::new(FailoverController::new(
            self_uri,
            store.clone(),
            membership.clone(),
            Duration::from_secs(1),
        ));
        let applier = Arc::new(ConfigApplier::new(
            self_uri,
            "test",
            store.clone(),
            storage.clone(),
            registry.clone(),
            failover.clone(),
            membership.clone(),
            Arc::new(NoBuckets),
        ));
        Self {
            store,
            storage,
            registry,
            membership,
            failover,
            applier,
        }
    }
}

/// Next version of `cfg` with a custom section marking the version
pub fn bump(cfg: &ClusterConfig) -> Result<ClusterConfig> {
    let mut next = cfg.clone();
    next.version += 1;
    next.custom.insert("marker".to_string(), RawSection::new(&next.version.to_string())?);
    Ok(next)
}
