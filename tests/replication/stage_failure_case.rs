//! A stage failure on one node aborts the change on every node; the same
//! change succeeds once the fault is gone.

use d_topology::ReplicationError;

use std::time::Duration;

use crate::common::eventually;
use crate::common::Cluster;
use crate::common::ARTIFICIAL_ERROR;

#[tokio::test]
async fn test_stage_failure_aborts_everywhere_and_retry_succeeds() {
    crate::enable_logger();
    let cluster = Cluster::with_static_membership(3, Vec::new).await;
    cluster.join_all(|i| if i == 0 { "router" } else { "storage" }).await;
    let version = cluster.node(0).store().version();
    let before = cluster.node(0).store().current();

    cluster.nodes[1].storage.set_failing(true);
    let e = cluster.node(0).set_failover(true).await.unwrap_err();
    assert_eq!(e.to_string(), ARTIFICIAL_ERROR);

    for (i, n) in cluster.nodes.iter().enumerate() {
        assert_eq!(n.node.store().version(), version, "node {i} moved on");
        assert!(!n.node.failover_enabled());
        assert!(!n.storage.has_staged(), "node {i} kept a staged document");
    }
    assert_eq!(cluster.node(2).store().current().topology, before.topology);

    cluster.nodes[1].storage.set_failing(false);
    assert!(cluster.node(0).set_failover(true).await.unwrap());
    for n in &cluster.nodes {
        assert_eq!(n.node.store().version(), version + 1);
        assert!(n.node.failover_enabled());
    }
}

#[tokio::test]
async fn test_stage_failure_on_coordinator_is_surfaced() {
    let cluster = Cluster::with_static_membership(2, Vec::new).await;
    cluster.join_all(|_| "storage").await;
    let version = cluster.node(1).store().version();

    cluster.nodes[1].storage.set_failing(true);
    let e = cluster.node(1).set_failover(true).await.unwrap_err();
    assert_eq!(e.to_string(), ARTIFICIAL_ERROR);
    assert_eq!(cluster.node(0).store().version(), version);
}

#[tokio::test]
async fn test_unreachable_peer_is_skipped() {
    let cluster = Cluster::with_static_membership(3, Vec::new).await;
    cluster.join_all(|_| "storage").await;
    let version = cluster.node(0).store().version();

    cluster.kill(2);
    cluster.node(0).set_failover(true).await.unwrap();
    assert_eq!(cluster.node(1).store().version(), version + 1);
    assert_eq!(cluster.node(2).store().version(), version);
}

#[tokio::test]
async fn test_paused_peer_times_out_stage() {
    let cluster = Cluster::with_static_membership(2, Vec::new).await;
    cluster.join_all(|_| "storage").await;
    let version = cluster.node(0).store().version();

    // still reported alive, but never answers
    cluster.transport.pause(&cluster.nodes[1].uri);
    let e = cluster.node(0).set_failover(true).await.unwrap_err();
    assert!(
        matches!(e, d_topology::Error::System(_) | d_topology::Error::Replication(ReplicationError::Peer { .. })),
        "unexpected error: {e}"
    );
    assert_eq!(cluster.node(0).store().version(), version);
    assert!(!cluster.node(0).failover_enabled());
}

#[tokio::test]
async fn test_peer_that_stages_too_slowly_accepts_the_retry() {
    let cluster = Cluster::with_static_membership(2, Vec::new).await;
    cluster.join_all(|_| "storage").await;
    let version = cluster.node(0).store().version();

    // the document lands in storage, the answer comes after the stage timeout
    cluster.nodes[1].storage.stall_next_stage(Duration::from_millis(600));
    let e = cluster.node(0).set_failover(true).await.unwrap_err();
    assert!(e.to_string().contains("timed out"), "unexpected error: {e}");
    eventually("slow peer releases its staged document", || {
        cluster.nodes.iter().all(|n| !n.storage.has_staged())
    })
    .await;
    for n in &cluster.nodes {
        assert_eq!(n.node.store().version(), version);
    }

    assert!(cluster.node(0).set_failover(true).await.unwrap());
    for n in &cluster.nodes {
        assert_eq!(n.node.store().version(), version + 1);
        assert!(n.node.failover_enabled());
    }
}

#[tokio::test]
async fn test_aborted_peer_takes_part_in_next_change() {
    let cluster = Cluster::with_static_membership(3, Vec::new).await;
    cluster.join_all(|_| "storage").await;
    let version = cluster.node(0).store().version();

    // node 2 stages fine and is aborted because of node 1
    cluster.nodes[1].storage.set_failing(true);
    cluster.node(0).set_failover(true).await.unwrap_err();
    cluster.nodes[1].storage.set_failing(false);

    // node 2 coordinates the next change itself
    assert!(cluster.node(2).set_failover(true).await.unwrap());
    for n in &cluster.nodes {
        assert_eq!(n.node.store().version(), version + 1);
    }
}
