//! Replicaset edits replicate to every member, and rejected edits leave
//! every member untouched.

use d_topology::topology::ReplicasetPatch;

use crate::common::Cluster;

#[tokio::test]
async fn test_negative_weight_is_rejected_everywhere() {
    crate::enable_logger();
    let cluster = Cluster::with_static_membership(2, Vec::new).await;
    cluster.join_all(|_| "storage").await;
    let rs_uuid = cluster.replicaset(0, "storage").uuid;
    let version = cluster.node(0).store().version();

    let e = cluster
        .node(1)
        .edit_replicaset(ReplicasetPatch {
            uuid: rs_uuid.clone(),
            weight: Some(-100.0),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(
        e.to_string(),
        format!("replicasets[{rs_uuid}].weight must be non-negative, got -100")
    );

    for i in 0..2 {
        assert_eq!(cluster.node(i).store().version(), version);
        assert_eq!(cluster.replicaset(i, "storage").weight, 0.0);
    }
}

#[tokio::test]
async fn test_repeated_edit_yields_same_content() {
    let cluster = Cluster::with_static_membership(2, Vec::new).await;
    cluster.join_all(|_| "storage").await;
    let rs_uuid = cluster.replicaset(0, "storage").uuid;
    let patch = ReplicasetPatch {
        uuid: rs_uuid,
        alias: Some("storage-renamed".to_string()),
        all_rw: Some(true),
        ..Default::default()
    };

    cluster.node(0).edit_replicaset(patch.clone()).await.unwrap();
    let first = cluster.node(1).store().current();
    cluster.node(1).edit_replicaset(patch).await.unwrap();
    let second = cluster.node(0).store().current();

    assert!(second.version > first.version);
    assert_eq!(second.topology, first.topology);
    assert!(cluster.replicaset(1, "storage-renamed").all_rw);
}

#[tokio::test]
async fn test_leader_change_replicates_and_reorders() {
    let cluster = Cluster::with_static_membership(3, Vec::new).await;
    let uuids = cluster.join_all(|_| "storage").await;
    let rs_uuid = cluster.replicaset(0, "storage").uuid;

    cluster
        .node(2)
        .edit_replicaset(ReplicasetPatch {
            uuid: rs_uuid.clone(),
            leaders: Some(vec![uuids[2].clone(), uuids[1].clone()]),
            ..Default::default()
        })
        .await
        .unwrap();

    for i in 0..3 {
        let rs = cluster.replicaset(i, "storage");
        assert_eq!(rs.master.uuid, uuids[2]);
        assert_eq!(rs.active_master.map(|m| m.uuid), Some(uuids[2].clone()));
        let order: Vec<_> = rs.servers.iter().filter_map(|s| s.uuid.clone()).collect();
        assert_eq!(order, vec![uuids[2].clone(), uuids[1].clone(), uuids[0].clone()]);
    }

    let e = cluster
        .node(0)
        .edit_replicaset(ReplicasetPatch {
            uuid: rs_uuid.clone(),
            leaders: Some(vec!["ghost".to_string()]),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(
        e.to_string(),
        format!("replicasets[{rs_uuid}] leader \"ghost\" doesn't exist")
    );
}
