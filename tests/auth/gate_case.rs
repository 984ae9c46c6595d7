//! Users and auth params are replicated; sessions stay on the node that
//! issued them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use d_topology::topology::AuthParamsPatch;
use d_topology::Error;
use d_topology::UserRequest;

use crate::common::Cluster;

fn basic(credentials: &str) -> String {
    format!("Basic {}", STANDARD.encode(credentials))
}

async fn cluster_with_auth() -> Cluster {
    let cluster = Cluster::with_static_membership(2, Vec::new).await;
    cluster.join_all(|_| "storage").await;
    cluster
        .node(0)
        .edit_auth_params(
            AuthParamsPatch {
                enabled: Some(true),
                ..Default::default()
            },
            Some("admin"),
        )
        .await
        .unwrap();
    cluster
}

#[tokio::test]
async fn test_enabled_auth_is_enforced_on_every_node() {
    crate::enable_logger();
    let cluster = cluster_with_auth().await;

    for i in 0..2 {
        let gate = cluster.node(i).gate();
        assert!(cluster.node(i).auth_params().enabled);
        assert!(matches!(gate.authorize(None, None), Err(Error::Unauthorized)));
        let outcome = gate
            .authorize(None, Some(&basic("admin:secret-cluster-cookie")))
            .unwrap();
        assert_eq!(outcome.username.as_deref(), Some("admin"));
    }
}

#[tokio::test]
async fn test_replicated_user_logs_in_anywhere() {
    let cluster = cluster_with_auth().await;
    cluster
        .node(0)
        .add_user(UserRequest {
            username: "alice".to_string(),
            password: Some("wonderland".to_string()),
            fullname: Some("Alice".to_string()),
            email: None,
        })
        .await
        .unwrap();

    let gate = cluster.node(1).gate();
    assert!(gate.authorize(None, Some(&basic("alice:wonderland"))).is_ok());
    assert!(gate.authorize(None, Some(&basic("alice:mirror"))).is_err());

    let session = gate.login("alice", "wonderland").unwrap();
    let outcome = gate.authorize(Some(&session.id), None).unwrap();
    assert_eq!(outcome.username.as_deref(), Some("alice"));
    // sessions are local to the issuing node
    assert!(cluster.node(0).gate().authorize(Some(&session.id), None).is_err());

    cluster.node(0).remove_user("alice", Some("admin")).await.unwrap();
    assert!(gate.authorize(Some(&session.id), None).is_err());
    assert!(gate.login("alice", "wonderland").is_err());
}

#[tokio::test]
async fn test_malformed_basic_header_is_rejected() {
    let cluster = cluster_with_auth().await;
    let gate = cluster.node(0).gate();

    for header in [
        basic("admin:secret-cluster-cookie:extra"),
        basic("admin"),
        basic(":secret-cluster-cookie"),
        format!("Bearer {}", STANDARD.encode("admin:secret-cluster-cookie")),
        "Basic not-base64!".to_string(),
    ] {
        assert!(
            matches!(gate.authorize(None, Some(&header)), Err(Error::Unauthorized)),
            "accepted {header}"
        );
    }
}

#[tokio::test]
async fn test_disabling_auth_lets_anonymous_requests_through() {
    let cluster = cluster_with_auth().await;
    cluster
        .node(1)
        .edit_auth_params(
            AuthParamsPatch {
                enabled: Some(false),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    let outcome = cluster.node(0).gate().authorize(None, None).unwrap();
    assert_eq!(outcome.username, None);
}
