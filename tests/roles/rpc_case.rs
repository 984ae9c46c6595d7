//! Calls are routed to alive nodes running the role; routing failures come
//! back as errors the caller can branch on.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use d_topology::roles::CallOptions;
use d_topology::roles::RoleDefinition;
use d_topology::topology::ReplicasetPatch;
use d_topology::Error;
use d_topology::RoutingError;
use serde_json::json;
use serde_json::Value;

use crate::common::Cluster;

/// `echo.whoami` answers with the node number it runs on
fn echo_roles() -> impl Fn() -> Vec<RoleDefinition> {
    let next = Arc::new(AtomicUsize::new(0));
    move || {
        let me = next.fetch_add(1, Ordering::SeqCst);
        vec![
            RoleDefinition::new("echo")
                .method("whoami", move |_args: Value| async move { Ok(json!(me)) })
                .method("add", |args: Value| async move {
                    let a = args["a"].as_i64().unwrap_or_default();
                    let b = args["b"].as_i64().unwrap_or_default();
                    Ok(json!(a + b))
                }),
            RoleDefinition::new("idle").method("noop", |_args: Value| async move { Ok(Value::Null) }),
        ]
    }
}

/// Node 1 alone in "router", nodes 2 and 3 in "storage" running `echo`
async fn cluster_with_echo() -> (Cluster, Vec<String>) {
    let cluster = Cluster::with_static_membership(3, echo_roles()).await;
    let uuids = cluster
        .join_all(|i| if i == 0 { "router" } else { "storage" })
        .await;
    let rs_uuid = cluster.replicaset(0, "storage").uuid;
    cluster
        .node(0)
        .edit_replicaset(ReplicasetPatch {
            uuid: rs_uuid,
            roles: Some(vec!["echo".to_string()]),
            ..Default::default()
        })
        .await
        .unwrap();
    (cluster, uuids)
}

#[tokio::test]
async fn test_call_reaches_remote_role() {
    crate::enable_logger();
    let (cluster, _) = cluster_with_echo().await;
    let router = cluster.node(0);

    let sum = router
        .call("echo", "add", json!({ "a": 2, "b": 3 }), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(sum, json!(5));

    for _ in 0..10 {
        let who = router
            .call("echo", "whoami", Value::Null, CallOptions::default())
            .await
            .unwrap();
        assert!(who == json!(1) || who == json!(2), "unexpected responder {who}");
    }
}

#[tokio::test]
async fn test_leader_only_call_follows_active_master() {
    let (cluster, _) = cluster_with_echo().await;
    cluster.node(0).set_failover(true).await.unwrap();
    let router = cluster.node(0);
    let leader_only = CallOptions {
        leader_only: true,
        ..Default::default()
    };

    for _ in 0..5 {
        let who = router.call("echo", "whoami", Value::Null, leader_only.clone()).await.unwrap();
        assert_eq!(who, json!(1));
    }

    cluster.kill(1);
    router.failover().recompute();
    let who = router.call("echo", "whoami", Value::Null, leader_only).await.unwrap();
    assert_eq!(who, json!(2));
}

#[tokio::test]
async fn test_prefer_local_runs_on_caller() {
    let (cluster, _) = cluster_with_echo().await;
    let opts = CallOptions {
        prefer_local: true,
        ..Default::default()
    };
    let who = cluster.node(2).call("echo", "whoami", Value::Null, opts).await.unwrap();
    assert_eq!(who, json!(2));
}

#[tokio::test]
async fn test_routing_failures_are_distinct() {
    let (cluster, _) = cluster_with_echo().await;
    let router = cluster.node(0);

    let e = router
        .call("echo", "missing", Value::Null, CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(e, Error::Routing(RoutingError::MethodNotFound { .. })));
    assert_eq!(e.to_string(), "Role \"echo\" has no method \"missing\"");

    let e = router
        .call("idle", "noop", Value::Null, CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(e, Error::Routing(RoutingError::NoRemotes { .. })));
    assert_eq!(e.to_string(), "No remotes with role \"idle\" available");

    cluster.kill(1);
    cluster.kill(2);
    let e = router
        .call("echo", "whoami", Value::Null, CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(e, Error::Routing(RoutingError::NoRemotes { .. })));
}
