use std::collections::BTreeSet;
use std::collections::HashMap;

use crate::constants::SHARDING_ROUTER_ROLE;
use crate::constants::SHARDING_STORAGE_ROLE;
use crate::topology::ClusterConfig;
use crate::topology::Replicaset;
use crate::topology::RoleCatalog;
use crate::topology::Server;
use crate::topology::ShardingGroup;
use crate::topology::TopologyContext;

/// Catalog with the built-in roles plus `myrole` depending on `myrole-dependency`
pub struct TestCatalog {
    roles: Vec<(String, Vec<String>)>,
}

impl Default for TestCatalog {
    fn default() -> Self {
        Self {
            roles: vec![
                (SHARDING_STORAGE_ROLE.to_string(), vec![]),
                (SHARDING_ROUTER_ROLE.to_string(), vec![]),
                ("myrole-dependency".to_string(), vec![]),
                ("myrole".to_string(), vec!["myrole-dependency".to_string()]),
            ],
        }
    }
}

impl RoleCatalog for TestCatalog {
    fn is_known(
        &self,
        role: &str,
    ) -> bool {
        self.roles.iter().any(|(name, _)| name == role)
    }

    fn closure(
        &self,
        roles: &BTreeSet<String>,
    ) -> Vec<String> {
        let mut wanted: BTreeSet<String> = BTreeSet::new();
        let mut stack: Vec<String> = roles.iter().cloned().collect();
        while let Some(role) = stack.pop() {
            if let Some((_, deps)) = self.roles.iter().find(|(name, _)| *name == role) {
                if wanted.insert(role) {
                    stack.extend(deps.iter().cloned());
                }
            }
        }
        self.roles
            .iter()
            .filter(|(name, _)| wanted.contains(name))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

pub fn uuid_of(n: char) -> String {
    format!("{}-{}", n.to_string().repeat(8), "0000-0000-0000-000000000000")
}

pub fn server(
    uuid: &str,
    uri: &str,
    replicaset_uuid: &str,
) -> Server {
    Server {
        uuid: uuid.to_string(),
        uri: uri.to_string(),
        alias: String::new(),
        labels: vec![],
        replicaset_uuid: replicaset_uuid.to_string(),
        disabled: false,
        expelled: false,
    }
}

/// Version 1 document:
/// - replicaset `A` (router): server `a` (localhost:3301)
/// - replicaset `B` (storage, weight 1): servers `b1` (leader, localhost:3302) and `b2` (localhost:3303)
pub fn two_replicasets() -> ClusterConfig {
    let mut cfg = ClusterConfig {
        version: 1,
        ..Default::default()
    };
    cfg.sharding_groups.insert("default".to_string(), ShardingGroup::with_bucket_count(3000));

    let (a, b) = (uuid_of('a'), uuid_of('b'));
    let (a1, b1, b2) = (uuid_of('1'), uuid_of('2'), uuid_of('3'));

    let mut rs_a = Replicaset::new(a.clone());
    rs_a.alias = "router".to_string();
    rs_a.roles.insert(SHARDING_ROUTER_ROLE.to_string());
    rs_a.leaders = vec![a1.clone()];

    let mut rs_b = Replicaset::new(b.clone());
    rs_b.alias = "storage".to_string();
    rs_b.roles.insert(SHARDING_STORAGE_ROLE.to_string());
    rs_b.weight = 1.0;
    rs_b.sharding_group = Some("default".to_string());
    rs_b.leaders = vec![b1.clone(), b2.clone()];

    cfg.topology.replicasets.insert(a.clone(), rs_a);
    cfg.topology.replicasets.insert(b.clone(), rs_b);
    cfg.topology.servers.insert(a1.clone(), server(&a1, "localhost:3301", &a));
    cfg.topology.servers.insert(b1.clone(), server(&b1, "localhost:3302", &b));
    cfg.topology.servers.insert(b2.clone(), server(&b2, "localhost:3303", &b));
    cfg
}

/// Context in which `localhost:3301..=3310` are known to membership
pub fn context(catalog: &TestCatalog) -> TopologyContext<'_> {
    TopologyContext::new(catalog)
        .with_known_uris((3301..=3310).map(|p| format!("localhost:{p}")))
        .with_bucket_counts(HashMap::new())
}
