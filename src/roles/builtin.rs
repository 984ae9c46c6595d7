use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;
use serde_json::Value;
use tracing::info;

use super::RoleContext;
use super::RoleDefinition;
use super::RoleHooks;
use crate::constants::SHARDING_ROUTER_ROLE;
use crate::constants::SHARDING_STORAGE_ROLE;
use crate::topology::ClusterConfig;
use crate::Result;

/// Number of buckets stored on this node.
///
/// The storage engine is external; it reports through this seam and the count
/// is advertised in the membership payload while `sharding-storage` runs.
pub trait BucketSource: Send + Sync + 'static {
    fn bucket_count(&self) -> u64;
}

/// Node without a storage engine attached
pub struct NoBuckets;

impl BucketSource for NoBuckets {
    fn bucket_count(&self) -> u64 {
        0
    }
}

#[derive(Default)]
struct ShardingState {
    ctx: RwLock<Option<RoleContext>>,
}

impl ShardingState {
    fn config(&self) -> Option<Arc<ClusterConfig>> {
        self.ctx.read().as_ref().map(|c| c.config.clone())
    }
}

struct ShardingHooks {
    role: &'static str,
    state: Arc<ShardingState>,
}

#[async_trait]
impl RoleHooks for ShardingHooks {
    async fn init(
        &self,
        ctx: &RoleContext,
    ) -> Result<()> {
        info!(role = self.role, replicaset = ?ctx.replicaset_uuid, "sharding role initialized");
        Ok(())
    }

    async fn apply_config(
        &self,
        ctx: &RoleContext,
    ) -> Result<()> {
        *self.state.ctx.write() = Some(ctx.clone());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        *self.state.ctx.write() = None;
        info!(role = self.role, "sharding role stopped");
        Ok(())
    }
}

/// `sharding-storage` and `sharding-router`, always registered first
pub fn builtin_roles(buckets: Arc<dyn BucketSource>) -> Vec<RoleDefinition> {
    let storage = Arc::new(ShardingState::default());
    let router = Arc::new(ShardingState::default());

    let storage_state = storage.clone();
    let storage_role = RoleDefinition::new(SHARDING_STORAGE_ROLE)
        .with_hooks(Arc::new(ShardingHooks {
            role: SHARDING_STORAGE_ROLE,
            state: storage,
        }))
        .method("bucket_count", move |_| {
            let count = buckets.bucket_count();
            async move { Ok(json!(count)) }
        })
        .method("info", move |_| {
            let info = storage_info(&storage_state);
            async move { Ok(info) }
        });

    let router_state = router.clone();
    let router_role = RoleDefinition::new(SHARDING_ROUTER_ROLE)
        .with_hooks(Arc::new(ShardingHooks {
            role: SHARDING_ROUTER_ROLE,
            state: router,
        }))
        .method("groups", move |_| {
            let groups = router_groups(&router_state);
            async move { Ok(groups) }
        });

    vec![storage_role, router_role]
}

fn storage_info(state: &ShardingState) -> Value {
    let ctx = state.ctx.read();
    let Some(ctx) = ctx.as_ref() else {
        return Value::Null;
    };
    let rs = ctx.replicaset_uuid.as_deref().and_then(|uuid| ctx.config.replicaset(uuid));
    json!({
        "replicaset_uuid": ctx.replicaset_uuid,
        "sharding_group": rs.and_then(|r| r.sharding_group.clone()),
        "weight": rs.map(|r| r.weight),
        "is_leader": ctx.is_leader,
    })
}

fn router_groups(state: &ShardingState) -> Value {
    let Some(cfg) = state.config() else {
        return Value::Null;
    };
    let groups: serde_json::Map<String, Value> = cfg
        .sharding_groups
        .iter()
        .map(|(name, g)| {
            (
                name.clone(),
                json!({ "bucket_count": g.bucket_count, "bootstrapped": g.bootstrapped }),
            )
        })
        .collect();
    Value::Object(groups)
}
