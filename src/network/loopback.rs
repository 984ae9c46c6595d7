use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::DashSet;
use tracing::trace;

use super::PeerHandler;
use super::PeerTransport;
use super::RpcRequest;
use super::RpcResponse;
use super::StageRequest;
use crate::membership::MemberPayload;
use crate::NetworkError;
use crate::ReplicationError;
use crate::Result;

/// In-process transport: requests go straight to the registered handler.
///
/// Faults are injected per uri:
/// - [`LoopbackTransport::kill`] removes the handler, requests fail at once
/// - [`LoopbackTransport::pause`] keeps the handler but lets requests hang
///   until their timeout
#[derive(Default)]
pub struct LoopbackTransport {
    handlers: DashMap<String, Arc<dyn PeerHandler>>,
    paused: DashSet<String>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        uri: impl Into<String>,
        handler: Arc<dyn PeerHandler>,
    ) {
        self.handlers.insert(uri.into(), handler);
    }

    /// Peer disappears, like a killed process
    pub fn kill(
        &self,
        uri: &str,
    ) -> Option<Arc<dyn PeerHandler>> {
        self.handlers.remove(uri).map(|(_, h)| h)
    }

    /// Peer stops answering, like a stopped process
    pub fn pause(
        &self,
        uri: &str,
    ) {
        self.paused.insert(uri.to_string());
    }

    pub fn resume(
        &self,
        uri: &str,
    ) {
        self.paused.remove(uri);
    }

    async fn call<T, F, Fut>(
        &self,
        uri: &str,
        timeout: Duration,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(Arc<dyn PeerHandler>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.paused.contains(uri) {
            tokio::time::sleep(timeout).await;
            return Err(NetworkError::Timeout {
                uri: uri.to_string(),
                duration: timeout,
            }
            .into());
        }
        let handler = self.handlers.get(uri).map(|h| h.value().clone()).ok_or_else(|| {
            NetworkError::Unreachable {
                uri: uri.to_string(),
                reason: "connection refused".to_string(),
            }
        })?;

        trace!(%uri, "loopback dispatch");
        match tokio::time::timeout(timeout, f(handler)).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(ReplicationError::Peer {
                uri: uri.to_string(),
                message: e.root_message(),
            }
            .into()),
            Err(_) => Err(NetworkError::Timeout {
                uri: uri.to_string(),
                duration: timeout,
            }
            .into()),
        }
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn ping(
        &self,
        uri: &str,
        timeout: Duration,
    ) -> Result<MemberPayload> {
        self.call(uri, timeout, |h| async move { Ok(h.handle_ping().await) }).await
    }

    async fn stage(
        &self,
        uri: &str,
        req: StageRequest,
        timeout: Duration,
    ) -> Result<()> {
        self.call(uri, timeout, |h| async move { h.handle_stage(req).await }).await
    }

    async fn commit(
        &self,
        uri: &str,
        version: u64,
        timeout: Duration,
    ) -> Result<()> {
        self.call(uri, timeout, |h| async move { h.handle_commit(version).await }).await
    }

    async fn abort(
        &self,
        uri: &str,
        version: u64,
        timeout: Duration,
    ) -> Result<()> {
        self.call(uri, timeout, |h| async move { h.handle_abort(version).await }).await
    }

    async fn fetch_config(
        &self,
        uri: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.call(uri, timeout, |h| async move { h.handle_fetch().await }).await
    }

    async fn rpc_call(
        &self,
        uri: &str,
        req: RpcRequest,
        timeout: Duration,
    ) -> Result<RpcResponse> {
        self.call(uri, timeout, |h| async move { Ok(h.handle_rpc(req).await) }).await
    }
}
