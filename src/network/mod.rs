//! Peer transport abstraction with timeout-aware implementations.
//!
//! Every peer request carries an explicit timeout; an elapsed timeout is
//! always reported as a failure. Two implementations are provided:
//! - [`HttpTransport`]: bincode envelopes over HTTP, served by [`peer_routes`]
//! - [`LoopbackTransport`]: in-process dispatch to registered handlers, with
//!   fault injection (killed and paused peers)
mod http;
mod loopback;
mod messages;

pub use http::*;
pub use loopback::*;
pub use messages::*;


// Trait definition of the current module
// -----------------------------------------------------------------------------
// Transport Definition
//

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::membership::MemberPayload;
use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Liveness probe; the peer answers with what it advertises.
    async fn ping(
        &self,
        uri: &str,
        timeout: Duration,
    ) -> Result<MemberPayload>;

    /// Prepare phase: the peer validates and persists the document without
    /// activating it.
    ///
    /// # Errors
    /// - [`crate::ReplicationError::Peer`] carrying the peer's raw error text
    /// - [`crate::NetworkError::Timeout`] once `timeout` elapses
    async fn stage(
        &self,
        uri: &str,
        req: StageRequest,
        timeout: Duration,
    ) -> Result<()>;

    /// Activates the document staged for `version`.
    async fn commit(
        &self,
        uri: &str,
        version: u64,
        timeout: Duration,
    ) -> Result<()>;

    /// Discards the document staged for `version`.
    async fn abort(
        &self,
        uri: &str,
        version: u64,
        timeout: Duration,
    ) -> Result<()>;

    /// Returns the peer's active document, encoded.
    async fn fetch_config(
        &self,
        uri: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>>;

    /// Invokes a role method on the peer. Routing failures come back as
    /// [`RpcResponse::Failed`], not as transport errors.
    async fn rpc_call(
        &self,
        uri: &str,
        req: RpcRequest,
        timeout: Duration,
    ) -> Result<RpcResponse>;
}

/// Server side of the peer protocol, implemented by the node.
#[async_trait]
pub trait PeerHandler: Send + Sync + 'static {
    async fn handle_ping(&self) -> MemberPayload;

    async fn handle_stage(
        &self,
        req: StageRequest,
    ) -> Result<()>;

    async fn handle_commit(
        &self,
        version: u64,
    ) -> Result<()>;

    async fn handle_abort(
        &self,
        version: u64,
    ) -> Result<()>;

    async fn handle_fetch(&self) -> Result<Vec<u8>>;

    async fn handle_rpc(
        &self,
        req: RpcRequest,
    ) -> RpcResponse;
}
