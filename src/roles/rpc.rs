use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde_json::Value;
use tracing::debug;
use tracing::instrument;

use super::RoleRegistry;
use crate::failover::FailoverController;
use crate::membership::Membership;
use crate::metrics::RPC_CALLS;
use crate::network::PeerTransport;
use crate::network::RpcRequest;
use crate::network::RpcResponse;
use crate::topology::TopologyStore;
use crate::Error;
use crate::Result;
use crate::RoutingError;

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Only active leaders are candidates
    pub leader_only: bool,
    /// Run locally when this node is a candidate
    pub prefer_local: bool,
    /// Overrides `network.rpc_timeout_ms`
    pub timeout: Option<Duration>,
}

/// Routes role method calls to a node running the role.
pub struct RpcRouter {
    self_uri: String,
    registry: Arc<RoleRegistry>,
    store: Arc<TopologyStore>,
    membership: Arc<dyn Membership>,
    failover: Arc<FailoverController>,
    transport: Arc<dyn PeerTransport>,
    default_timeout: Duration,
}

impl RpcRouter {
    pub fn new(
        self_uri: impl Into<String>,
        registry: Arc<RoleRegistry>,
        store: Arc<TopologyStore>,
        membership: Arc<dyn Membership>,
        failover: Arc<FailoverController>,
        transport: Arc<dyn PeerTransport>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            self_uri: self_uri.into(),
            registry,
            store,
            membership,
            failover,
            transport,
            default_timeout,
        }
    }

    /// Uris of alive, enabled servers whose replicaset runs `role`
    pub fn candidates(
        &self,
        role: &str,
        leader_only: bool,
    ) -> Vec<String> {
        let cfg = self.store.current();
        let leaders = self.failover.active_leaders();
        let mut uris = Vec::new();
        for rs in cfg.topology.replicasets.values() {
            if !self.registry.closure(&rs.roles).iter().any(|r| r == role) {
                continue;
            }
            for server in cfg.members_of(&rs.uuid) {
                if server.disabled || !self.membership.is_alive(&server.uri) {
                    continue;
                }
                if leader_only && leaders.get(&rs.uuid) != Some(&server.uuid) {
                    continue;
                }
                uris.push(server.uri.clone());
            }
        }
        uris
    }

    /// Calls `role.method(args)` on one candidate.
    ///
    /// # Errors
    /// Routing failures come back as [`Error::Routing`]; transport failures
    /// of the chosen peer are returned as they are.
    #[instrument(skip(self, args, opts))]
    pub async fn call(
        &self,
        role: &str,
        method: &str,
        args: Value,
        opts: CallOptions,
    ) -> Result<Value> {
        let res = self.route(role, method, args, opts).await;
        let outcome = if res.is_ok() { "ok" } else { "failed" };
        RPC_CALLS.with_label_values(&[role, outcome]).inc();
        res
    }

    async fn route(
        &self,
        role: &str,
        method: &str,
        args: Value,
        opts: CallOptions,
    ) -> Result<Value> {
        if let Some(definition) = self.registry.get(role) {
            if !definition.has_method(method) {
                return Err(RoutingError::MethodNotFound {
                    role: role.to_string(),
                    method: method.to_string(),
                }
                .into());
            }
        }

        let candidates = self.candidates(role, opts.leader_only);
        let uri = if opts.prefer_local && candidates.contains(&self.self_uri) {
            Some(self.self_uri.clone())
        } else {
            candidates.choose(&mut rand::thread_rng()).cloned()
        };
        let Some(uri) = uri else {
            return Err(RoutingError::NoRemotes { role: role.to_string() }.into());
        };
        debug!(%uri, "rpc target chosen");

        if uri == self.self_uri {
            return self.registry.invoke_local(role, method, args).await;
        }

        let req = RpcRequest {
            role: role.to_string(),
            method: method.to_string(),
            args: serde_json::to_vec(&args)?,
        };
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        match self.transport.rpc_call(&uri, req, timeout).await? {
            RpcResponse::Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            RpcResponse::Failed(e) => Err(e.into()),
        }
    }

    /// Serves a call that another node routed here.
    pub async fn serve(
        &self,
        req: RpcRequest,
    ) -> RpcResponse {
        let args: Value = match serde_json::from_slice(&req.args) {
            Ok(v) => v,
            Err(e) => {
                return RpcResponse::Failed(RoutingError::Remote {
                    message: format!("Decoding failed: {e}"),
                })
            }
        };
        let res = self.registry.invoke_local(&req.role, &req.method, args).await;
        match res.and_then(|v| Ok(serde_json::to_vec(&v)?)) {
            Ok(bytes) => RpcResponse::Ok(bytes),
            Err(Error::Routing(e)) => RpcResponse::Failed(e),
            Err(e) => RpcResponse::Failed(RoutingError::Remote { message: e.root_message() }),
        }
    }
}
