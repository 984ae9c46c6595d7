//! Leader switchover driven by the nodes' own liveness detection.
//!
//! The configured master never changes; the active master follows liveness
//! while failover is enabled and stays put while it is disabled.

use crate::common::eventually;
use crate::common::Cluster;

fn active_master(
    cluster: &Cluster,
    i: usize,
) -> Option<String> {
    cluster.replicaset(i, "storage").active_master.map(|m| m.uuid)
}

#[tokio::test]
async fn test_killed_master_is_replaced_and_restored() {
    crate::enable_logger();
    let cluster = Cluster::with_probing(2, Vec::new).await;
    let uuids = cluster.join_all(|_| "storage").await;
    assert!(cluster.node(0).set_failover(true).await.unwrap());
    assert_eq!(active_master(&cluster, 1), Some(uuids[0].clone()));

    cluster.kill(0);
    eventually("replica promoted", || active_master(&cluster, 1) == Some(uuids[1].clone())).await;
    assert_eq!(cluster.replicaset(1, "storage").master.uuid, uuids[0]);

    cluster.revive(0);
    eventually("master restored", || active_master(&cluster, 1) == Some(uuids[0].clone())).await;
    assert_eq!(cluster.replicaset(1, "storage").master.uuid, uuids[0]);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_paused_master_is_replaced_and_restored() {
    let cluster = Cluster::with_probing(2, Vec::new).await;
    let uuids = cluster.join_all(|_| "storage").await;
    cluster.node(0).set_failover(true).await.unwrap();

    cluster.pause(0);
    eventually("replica promoted", || active_master(&cluster, 1) == Some(uuids[1].clone())).await;

    cluster.revive(0);
    eventually("master restored", || active_master(&cluster, 1) == Some(uuids[0].clone())).await;

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_disabled_failover_keeps_configured_master() {
    let cluster = Cluster::with_static_membership(2, Vec::new).await;
    let uuids = cluster.join_all(|_| "storage").await;
    assert!(!cluster.node(1).failover_enabled());

    cluster.kill(0);
    cluster.node(1).failover().recompute();
    let rs = cluster.replicaset(1, "storage");
    assert_eq!(rs.master.uuid, uuids[0]);
    assert_eq!(rs.active_master.map(|m| m.uuid), Some(uuids[0].clone()));
}

#[tokio::test]
async fn test_no_alive_leader_leaves_active_master_empty() {
    let cluster = Cluster::with_static_membership(3, Vec::new).await;
    let uuids = cluster
        .join_all(|i| if i == 0 { "router" } else { "storage" })
        .await;
    cluster.node(0).set_failover(true).await.unwrap();

    cluster.kill(1);
    cluster.kill(2);
    cluster.node(0).failover().recompute();
    let rs = cluster.replicaset(0, "storage");
    assert_eq!(rs.master.uuid, uuids[1]);
    assert_eq!(rs.active_master, None);
}
