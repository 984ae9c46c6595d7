//! Joining fresh nodes: defaults reported everywhere, spare nodes visible
//! until they are joined.

use d_topology::ServerStatus;

use crate::common::uri;
use crate::common::Cluster;

#[tokio::test]
async fn test_fresh_node_joins_with_zero_weight() {
    crate::enable_logger();
    let cluster = Cluster::with_static_membership(2, Vec::new).await;
    let uuids = cluster
        .join_all(|i| if i == 0 { "router" } else { "storage" })
        .await;

    for i in 0..2 {
        let rs = cluster.replicaset(i, "storage");
        assert_eq!(rs.weight, 0.0);
        assert!(rs.roles.is_empty());
        assert_eq!(rs.master.uuid, uuids[1]);
        assert_eq!(rs.servers[0].priority, Some(1));
    }

    let me = cluster.node(1).cluster_self();
    assert_eq!(me.uuid.as_deref(), Some(uuids[1].as_str()));
    assert_eq!(me.alias, "srv-2");

    let servers = cluster.node(1).servers(None);
    assert_eq!(servers.len(), 2);
    assert!(servers.iter().all(|s| s.status == ServerStatus::Healthy));
}

#[tokio::test]
async fn test_spare_node_is_listed_without_uuid() {
    let cluster = Cluster::with_static_membership(3, Vec::new).await;
    let first = cluster.node(0);
    first
        .join_server(d_topology::JoinServerRequest::new(uri(0)))
        .await
        .unwrap();
    // membership knows node 3 although it is not part of the topology
    first.probe_server(&uri(2)).await.unwrap();

    let spare = first
        .servers(None)
        .into_iter()
        .find(|s| s.uri == uri(2))
        .expect("spare node listed");
    assert_eq!(spare.uuid, None);
    assert!(spare.replicaset.is_none());
    assert_eq!(cluster.node(2).store().version(), 0);
    assert!(cluster.node(2).replicasets(None).is_empty());
}
