//! Read models returned by the query API.
//!
//! Views are derived on demand from the committed document, the active
//! leaders and membership liveness; nothing here is stored.

use serde::Deserialize;
use serde::Serialize;

use crate::failover::ActiveLeaders;
use crate::topology::ClusterConfig;
use crate::topology::Label;
use crate::topology::Replicaset;
use crate::topology::Server;
use crate::topology::ShardingGroup;
use crate::topology::UserRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Healthy,
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicasetStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRef {
    pub uuid: String,
}

/// Replicaset as seen from one of its servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicasetSummary {
    pub uuid: String,
    pub alias: String,
    pub roles: Vec<String>,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerView {
    pub uri: String,
    /// `None` for members that are not part of the topology
    pub uuid: Option<String>,
    pub alias: Option<String>,
    pub labels: Vec<Label>,
    /// 1-based position in the replicaset's leader list
    pub priority: Option<usize>,
    pub disabled: Option<bool>,
    pub status: ServerStatus,
    pub replicaset: Option<ReplicasetSummary>,
}

impl ServerView {
    /// Member known to membership only
    pub(crate) fn unconfigured(
        uri: &str,
        alias: Option<String>,
        alive: bool,
    ) -> Self {
        Self {
            uri: uri.to_string(),
            uuid: None,
            alias,
            labels: Vec::new(),
            priority: None,
            disabled: None,
            status: status_of(alive),
            replicaset: None,
        }
    }

    pub(crate) fn configured(
        server: &Server,
        replicaset: Option<&Replicaset>,
        roles: Vec<String>,
        alive: bool,
    ) -> Self {
        let priority = replicaset
            .and_then(|rs| rs.leaders.iter().position(|l| *l == server.uuid))
            .map(|i| i + 1);
        Self {
            uri: server.uri.clone(),
            uuid: Some(server.uuid.clone()),
            alias: Some(server.alias.clone()),
            labels: server.labels.clone(),
            priority,
            disabled: Some(server.disabled),
            status: status_of(alive),
            replicaset: replicaset.map(|rs| ReplicasetSummary {
                uuid: rs.uuid.clone(),
                alias: rs.alias.clone(),
                roles,
                weight: rs.weight,
            }),
        }
    }
}

fn status_of(alive: bool) -> ServerStatus {
    if alive {
        ServerStatus::Healthy
    } else {
        ServerStatus::Unreachable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicasetView {
    pub uuid: String,
    pub alias: String,
    /// Effective roles, dependencies included
    pub roles: Vec<String>,
    pub status: ReplicasetStatus,
    /// Configured leader
    pub master: ServerRef,
    /// Leader elected by failover, absent when every candidate is down
    pub active_master: Option<ServerRef>,
    pub weight: f64,
    pub all_rw: bool,
    pub sharding_group: Option<String>,
    /// Members in priority order
    pub servers: Vec<ServerView>,
}

impl ReplicasetView {
    pub(crate) fn build<F>(
        cfg: &ClusterConfig,
        rs: &Replicaset,
        roles: Vec<String>,
        leaders: &ActiveLeaders,
        is_alive: F,
    ) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let servers: Vec<ServerView> = rs
            .leaders
            .iter()
            .filter_map(|uuid| cfg.server(uuid))
            .map(|s| ServerView::configured(s, Some(rs), roles.clone(), is_alive(&s.uri)))
            .collect();
        let status = if servers.iter().all(|s| s.status == ServerStatus::Healthy) {
            ReplicasetStatus::Healthy
        } else {
            ReplicasetStatus::Unhealthy
        };
        Self {
            uuid: rs.uuid.clone(),
            alias: rs.alias.clone(),
            roles,
            status,
            master: ServerRef {
                uuid: rs.leader().unwrap_or_default().to_string(),
            },
            active_master: leaders.get(&rs.uuid).map(|uuid| ServerRef { uuid: uuid.clone() }),
            weight: rs.weight,
            all_rw: rs.all_rw,
            sharding_group: rs.sharding_group.clone(),
            servers,
        }
    }
}

/// `cluster_self`: who answers the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfView {
    pub uri: String,
    pub uuid: Option<String>,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardingGroupView {
    pub name: String,
    pub bucket_count: u64,
    pub bootstrapped: bool,
    pub rebalancer_max_receiving: i64,
    pub sync_timeout: f64,
    pub collect_bucket_garbage_interval: f64,
    pub rebalancer_disbalance_threshold: f64,
    pub collect_garbage: bool,
}

impl ShardingGroupView {
    pub(crate) fn new(
        name: &str,
        group: &ShardingGroup,
    ) -> Self {
        Self {
            name: name.to_string(),
            bucket_count: group.bucket_count,
            bootstrapped: group.bootstrapped,
            rebalancer_max_receiving: group.rebalancer_max_receiving,
            sync_timeout: group.sync_timeout,
            collect_bucket_garbage_interval: group.collect_bucket_garbage_interval,
            rebalancer_disbalance_threshold: group.rebalancer_disbalance_threshold,
            collect_garbage: group.collect_garbage,
        }
    }
}

/// User as listed by the API; the password hash never leaves the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub username: String,
    pub fullname: Option<String>,
    pub email: Option<String>,
}

impl From<&UserRecord> for UserView {
    fn from(user: &UserRecord) -> Self {
        Self {
            username: user.username.clone(),
            fullname: user.fullname.clone(),
            email: user.email.clone(),
        }
    }
}
