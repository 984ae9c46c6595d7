use d_topology::topology::ReplicasetPatch;

use crate::common::Cluster;

#[tokio::test]
async fn test_master_of_non_empty_replicaset_cannot_be_expelled() {
    crate::enable_logger();
    let cluster = Cluster::with_static_membership(2, Vec::new).await;
    let uuids = cluster.join_all(|_| "storage").await;
    let version = cluster.node(0).store().version();

    let e = cluster.node(1).expel_server(&uuids[0]).await.unwrap_err();
    assert_eq!(
        e.to_string(),
        format!("Server \"{}\" is the master and can't be expelled", uuids[0])
    );
    assert_eq!(cluster.node(0).store().version(), version);
}

#[tokio::test]
async fn test_expelled_replica_leaves_every_view() {
    let cluster = Cluster::with_static_membership(3, Vec::new).await;
    let uuids = cluster.join_all(|_| "storage").await;

    cluster.node(0).expel_server(&uuids[2]).await.unwrap();

    for i in 0..2 {
        let rs = cluster.replicaset(i, "storage");
        let members: Vec<_> = rs.servers.iter().filter_map(|s| s.uuid.clone()).collect();
        assert_eq!(members, vec![uuids[0].clone(), uuids[1].clone()]);
        assert!(cluster.node(i).servers(Some(&uuids[2])).is_empty());
    }

    // an expelled uuid can't come back as a leader
    let rs_uuid = cluster.replicaset(0, "storage").uuid;
    let e = cluster
        .node(0)
        .edit_replicaset(ReplicasetPatch {
            uuid: rs_uuid.clone(),
            leaders: Some(vec![uuids[2].clone()]),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(
        e.to_string(),
        format!("replicasets[{rs_uuid}] leader \"{}\" doesn't exist", uuids[2])
    );
}
