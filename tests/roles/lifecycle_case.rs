//! Roles start dependencies first, stop dependents first, and a role veto
//! cancels a clusterwide change.

use std::sync::Arc;

use async_trait::async_trait;
use d_topology::roles::RoleContext;
use d_topology::roles::RoleDefinition;
use d_topology::roles::RoleHooks;
use d_topology::topology::ClusterConfig;
use d_topology::topology::ReplicasetPatch;
use d_topology::Error;
use d_topology::Result;
use parking_lot::Mutex;
use serde_json::json;

use crate::common::Cluster;

#[derive(Default)]
struct Journal(Mutex<Vec<String>>);

impl Journal {
    fn push(
        &self,
        entry: String,
    ) {
        self.0.lock().push(entry);
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}

struct Recorder {
    role: &'static str,
    journal: Arc<Journal>,
}

#[async_trait]
impl RoleHooks for Recorder {
    async fn validate_config(
        &self,
        new: &ClusterConfig,
        _old: &ClusterConfig,
    ) -> Result<()> {
        if new.custom.get("veto").and_then(|s| s.value().ok()) == Some(json!(self.role)) {
            return Err(Error::Validation(format!("{} refuses this config", self.role)));
        }
        Ok(())
    }

    async fn init(
        &self,
        _ctx: &RoleContext,
    ) -> Result<()> {
        self.journal.push(format!("init {}", self.role));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.journal.push(format!("stop {}", self.role));
        Ok(())
    }
}

fn recorded_roles(journal: Arc<Journal>) -> impl Fn() -> Vec<RoleDefinition> {
    move || {
        let hooks = |role| {
            Arc::new(Recorder {
                role,
                journal: journal.clone(),
            }) as Arc<dyn RoleHooks>
        };
        vec![
            RoleDefinition::new("app").depends_on("cache").with_hooks(hooks("app")),
            RoleDefinition::new("cache").with_hooks(hooks("cache")),
        ]
    }
}

fn set_roles(
    rs_uuid: &str,
    roles: &[&str],
) -> ReplicasetPatch {
    ReplicasetPatch {
        uuid: rs_uuid.to_string(),
        roles: Some(roles.iter().map(|r| r.to_string()).collect()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_roles_follow_dependency_order() {
    crate::enable_logger();
    let journal = Arc::new(Journal::default());
    let cluster = Cluster::with_static_membership(1, recorded_roles(journal.clone())).await;
    cluster.join_all(|_| "storage").await;
    let node = cluster.node(0);
    let rs_uuid = cluster.replicaset(0, "storage").uuid;

    node.edit_replicaset(set_roles(&rs_uuid, &["app"])).await.unwrap();
    assert_eq!(journal.take(), vec!["init cache", "init app"]);
    assert_eq!(cluster.replicaset(0, "storage").roles, vec!["cache", "app"]);

    // dependency stays while still listed on its own
    node.edit_replicaset(set_roles(&rs_uuid, &["cache"])).await.unwrap();
    assert_eq!(journal.take(), vec!["stop app"]);

    node.edit_replicaset(set_roles(&rs_uuid, &["app"])).await.unwrap();
    assert_eq!(journal.take(), vec!["init app"]);

    node.edit_replicaset(set_roles(&rs_uuid, &[])).await.unwrap();
    assert_eq!(journal.take(), vec!["stop app", "stop cache"]);
}

#[tokio::test]
async fn test_roles_start_on_every_member() {
    let journal = Arc::new(Journal::default());
    let cluster = Cluster::with_static_membership(2, recorded_roles(journal.clone())).await;
    cluster.join_all(|_| "storage").await;
    let rs_uuid = cluster.replicaset(0, "storage").uuid;

    cluster
        .node(1)
        .edit_replicaset(set_roles(&rs_uuid, &["cache"]))
        .await
        .unwrap();
    assert_eq!(journal.take(), vec!["init cache", "init cache"]);
}

#[tokio::test]
async fn test_role_veto_cancels_change_everywhere() {
    let journal = Arc::new(Journal::default());
    let cluster = Cluster::with_static_membership(2, recorded_roles(journal.clone())).await;
    cluster.join_all(|_| "storage").await;
    let version = cluster.node(0).store().version();

    let e = cluster
        .node(0)
        .upload_config(r#"{"veto": "cache"}"#)
        .await
        .unwrap_err();
    assert!(e.to_string().contains("cache refuses this config"), "unexpected error: {e}");
    for i in 0..2 {
        assert_eq!(cluster.node(i).store().version(), version);
        assert_eq!(cluster.node(i).get_config(), "{}");
    }

    cluster
        .node(0)
        .upload_config(r#"{"veto": "nobody"}"#)
        .await
        .unwrap();
    assert_eq!(cluster.node(1).get_config(), r#"{"veto":"nobody"}"#);
}
