use std::collections::BTreeMap;

use crate::topology::ClusterConfig;
use crate::topology::Server;

/// Replicaset uuid to the uuid of its active leader
pub type ActiveLeaders = BTreeMap<String, String>;

/// Picks the active leader of every replicaset.
///
/// With failover disabled the configured leader is kept whatever its health.
/// With failover enabled the first alive, enabled server of the priority list
/// wins; a replicaset without one has no entry.
pub fn compute_active_leaders<F>(
    cfg: &ClusterConfig,
    is_alive: F,
) -> ActiveLeaders
where
    F: Fn(&Server) -> bool,
{
    let mut leaders = ActiveLeaders::new();
    for (uuid, rs) in &cfg.topology.replicasets {
        let chosen = if cfg.topology.failover {
            rs.leaders
                .iter()
                .filter_map(|l| cfg.server(l))
                .find(|s| !s.expelled && !s.disabled && is_alive(s))
                .map(|s| s.uuid.clone())
        } else {
            rs.leader().map(str::to_string)
        };
        if let Some(leader) = chosen {
            leaders.insert(uuid.clone(), leader);
        }
    }
    leaders
}
