use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::constants::INTERNAL_PREFIX;
use crate::membership::MemberPayload;
use crate::network::PeerTransport;
use crate::network::RpcRequest;
use crate::network::RpcResponse;
use crate::network::StageRequest;
use crate::network::VersionRequest;
use crate::network::WireReply;
use crate::NetworkError;
use crate::ReplicationError;
use crate::Result;

/// Peer transport over HTTP: `POST http://<uri>/internal/<route>` with
/// bincode bodies.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn post<Req, Resp>(
        &self,
        uri: &str,
        route: &str,
        body: &Req,
        timeout: Duration,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("http://{uri}/{INTERNAL_PREFIX}/{route}");
        let payload = bincode::serialize(body)?;

        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("content-type", "application/octet-stream")
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                debug!(%url, error = %e, "peer request failed");
                if e.is_timeout() {
                    NetworkError::Timeout {
                        uri: uri.to_string(),
                        duration: timeout,
                    }
                } else {
                    NetworkError::Unreachable {
                        uri: uri.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let bytes = resp.bytes().await.map_err(NetworkError::Http)?;
        let reply: WireReply<Resp> = bincode::deserialize(&bytes)?;
        reply.map_err(|message| {
            ReplicationError::Peer {
                uri: uri.to_string(),
                message,
            }
            .into()
        })
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn ping(
        &self,
        uri: &str,
        timeout: Duration,
    ) -> Result<MemberPayload> {
        self.post(uri, "ping", &(), timeout).await
    }

    async fn stage(
        &self,
        uri: &str,
        req: StageRequest,
        timeout: Duration,
    ) -> Result<()> {
        self.post(uri, "stage", &req, timeout).await
    }

    async fn commit(
        &self,
        uri: &str,
        version: u64,
        timeout: Duration,
    ) -> Result<()> {
        self.post(uri, "commit", &VersionRequest { version }, timeout).await
    }

    async fn abort(
        &self,
        uri: &str,
        version: u64,
        timeout: Duration,
    ) -> Result<()> {
        self.post(uri, "abort", &VersionRequest { version }, timeout).await
    }

    async fn fetch_config(
        &self,
        uri: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.post(uri, "fetch", &(), timeout).await
    }

    async fn rpc_call(
        &self,
        uri: &str,
        req: RpcRequest,
        timeout: Duration,
    ) -> Result<RpcResponse> {
        self.post(uri, "rpc", &req, timeout).await
    }
}
