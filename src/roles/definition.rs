use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use crate::topology::ClusterConfig;
use crate::Result;

pub type RpcFuture = BoxFuture<'static, Result<Value>>;
pub type RpcMethod = Arc<dyn Fn(Value) -> RpcFuture + Send + Sync>;

/// What a role sees when it is started or reconfigured on this node
#[derive(Debug, Clone)]
pub struct RoleContext {
    pub server_uuid: Option<String>,
    pub replicaset_uuid: Option<String>,
    /// This node is the active leader of its replicaset
    pub is_leader: bool,
    pub config: Arc<ClusterConfig>,
}

/// Lifecycle hooks. Every hook is optional.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RoleHooks: Send + Sync + 'static {
    /// Runs on every node during the prepare phase; an error vetoes the
    /// whole clusterwide change.
    async fn validate_config(
        &self,
        _new: &ClusterConfig,
        _old: &ClusterConfig,
    ) -> Result<()> {
        Ok(())
    }

    async fn init(
        &self,
        _ctx: &RoleContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs after every commit while the role is active
    async fn apply_config(
        &self,
        _ctx: &RoleContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

pub struct NoopHooks;

impl RoleHooks for NoopHooks {}

/// Static capability entry: name, dependency edges, hooks and RPC methods
#[derive(Clone)]
pub struct RoleDefinition {
    pub name: String,
    pub dependencies: Vec<String>,
    pub hooks: Arc<dyn RoleHooks>,
    pub methods: HashMap<String, RpcMethod>,
}

impl Debug for RoleDefinition {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("RoleDefinition")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("methods", &methods)
            .finish()
    }
}

impl RoleDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            hooks: Arc::new(NoopHooks),
            methods: HashMap::new(),
        }
    }

    pub fn depends_on(
        mut self,
        role: impl Into<String>,
    ) -> Self {
        self.dependencies.push(role.into());
        self
    }

    pub fn with_hooks(
        mut self,
        hooks: Arc<dyn RoleHooks>,
    ) -> Self {
        self.hooks = hooks;
        self
    }

    /// Registers an RPC method callable through the router
    pub fn method<F, Fut>(
        mut self,
        name: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let method: RpcMethod = Arc::new(move |args| Box::pin(f(args)));
        self.methods.insert(name.into(), method);
        self
    }

    pub fn has_method(
        &self,
        name: &str,
    ) -> bool {
        self.methods.contains_key(name)
    }
}
