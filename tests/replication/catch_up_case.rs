//! A node that missed a commit while unreachable pulls the newer document
//! from a healthy peer once it is back.

use d_topology::ServerStatus;

use crate::common::eventually;
use crate::common::Cluster;

#[tokio::test]
async fn test_unreachable_node_catches_up_after_revival() {
    crate::enable_logger();
    let cluster = Cluster::with_probing(3, Vec::new).await;
    let uuids = cluster.join_all(|_| "storage").await;

    cluster.kill(2);
    eventually("node 3 declared unreachable", || {
        cluster.node(0).servers(Some(&uuids[2]))[0].status == ServerStatus::Unreachable
    })
    .await;

    cluster.node(0).set_failover(true).await.unwrap();
    let version = cluster.node(0).store().version();
    assert_eq!(cluster.node(1).store().version(), version);

    cluster.revive(2);
    eventually("node 3 catches up", || cluster.node(2).store().version() == version).await;
    assert!(cluster.node(2).failover_enabled());
    assert_eq!(
        cluster.node(2).store().current().topology,
        cluster.node(0).store().current().topology
    );

    cluster.shutdown().await;
}
