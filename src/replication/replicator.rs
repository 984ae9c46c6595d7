use std::sync::Arc;
use std::time::Instant;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::ConfigApplier;
use crate::config::NetworkConfig;
use crate::membership::Membership;
use crate::metrics::CONFIG_MUTATIONS;
use crate::metrics::CONFIG_MUTATION_LATENCY_MS;
use crate::network::PeerTransport;
use crate::network::StageRequest;
use crate::topology::ClusterConfig;
use crate::topology::TopologyStore;
use crate::Error;
use crate::NetworkError;
use crate::ReplicationError;
use crate::Result;
use crate::SystemError;

/// Coordinator side of the two-phase commit.
///
/// Only one clusterwide mutation may be in flight per node; a concurrent
/// request fails at once instead of queueing.
pub struct ConfigReplicator {
    self_uri: String,
    store: Arc<TopologyStore>,
    applier: Arc<ConfigApplier>,
    membership: Arc<dyn Membership>,
    transport: Arc<dyn PeerTransport>,
    network: NetworkConfig,
    lock: Mutex<()>,
}

impl ConfigReplicator {
    pub fn new(
        self_uri: impl Into<String>,
        store: Arc<TopologyStore>,
        applier: Arc<ConfigApplier>,
        membership: Arc<dyn Membership>,
        transport: Arc<dyn PeerTransport>,
        network: NetworkConfig,
    ) -> Self {
        Self {
            self_uri: self_uri.into(),
            store,
            applier,
            membership,
            transport,
            network,
            lock: Mutex::new(()),
        }
    }

    /// Builds a candidate from the committed snapshot with `build` and
    /// replicates it to the cluster.
    ///
    /// # Errors
    /// - [`ReplicationError::AlreadyPatching`] while another mutation runs
    /// - whatever `build` rejects with, nothing is sent in that case
    /// - the first prepare failure, after every node that staged or did not
    ///   answer in time was aborted
    pub async fn patch_clusterwide<F>(
        &self,
        build: F,
    ) -> Result<Arc<ClusterConfig>>
    where
        F: FnOnce(&ClusterConfig) -> Result<ClusterConfig>,
    {
        let _guard = self.lock.try_lock().map_err(|_| ReplicationError::AlreadyPatching)?;
        let current = self.store.current();
        let candidate = build(&current)?;
        self.replicate(Arc::new(candidate)).await
    }

    /// Self first, then every enabled, non-expelled server membership reports alive
    pub fn targets(
        &self,
        candidate: &ClusterConfig,
    ) -> Vec<String> {
        let mut uris = vec![self.self_uri.clone()];
        uris.extend(
            candidate
                .active_servers()
                .filter(|s| !s.disabled && s.uri != self.self_uri && self.membership.is_alive(&s.uri))
                .map(|s| s.uri.clone()),
        );
        uris
    }

    #[instrument(skip(self, candidate), fields(version = candidate.version))]
    async fn replicate(
        &self,
        candidate: Arc<ClusterConfig>,
    ) -> Result<Arc<ClusterConfig>> {
        let started = Instant::now();
        let version = candidate.version;
        let req = StageRequest {
            version,
            document: candidate.encode()?,
        };
        let targets = self.targets(&candidate);
        info!(?targets, "two-phase commit: prepare");

        let mut staged = Vec::with_capacity(targets.len());
        // staged, or no definite answer: the document may be persisted there
        let mut to_abort = Vec::with_capacity(targets.len());
        let mut failure: Option<Error> = None;
        let mut tasks: FuturesUnordered<_> = targets
            .into_iter()
            .map(|uri| self.stage_on(uri, req.clone()))
            .collect();
        while let Some((uri, res)) = tasks.next().await {
            match res {
                Ok(()) => {
                    staged.push(uri.clone());
                    to_abort.push(uri);
                }
                Err(e) => {
                    warn!(%uri, error = %e, "prepare failed");
                    if matches!(e, Error::System(SystemError::Network(_))) {
                        to_abort.push(uri);
                    }
                    failure.get_or_insert(e);
                }
            }
        }
        drop(tasks);

        if let Some(e) = failure {
            self.abort_on(to_abort, version).await;
            CONFIG_MUTATIONS.with_label_values(&["aborted"]).inc();
            return Err(e);
        }

        info!("two-phase commit: commit");
        let mut failure: Option<Error> = None;
        let mut tasks: FuturesUnordered<_> = staged.into_iter().map(|uri| self.commit_on(uri, version)).collect();
        while let Some((uri, res)) = tasks.next().await {
            if let Err(e) = res {
                error!(%uri, error = %e, "commit failed");
                failure.get_or_insert(e);
            }
        }
        drop(tasks);

        CONFIG_MUTATION_LATENCY_MS.observe(started.elapsed().as_secs_f64() * 1000.0);
        if let Some(e) = failure {
            CONFIG_MUTATIONS.with_label_values(&["commit_failed"]).inc();
            return Err(e);
        }
        CONFIG_MUTATIONS.with_label_values(&["committed"]).inc();
        info!("clusterwide config updated");
        Ok(candidate)
    }

    async fn stage_on(
        &self,
        uri: String,
        req: StageRequest,
    ) -> (String, Result<()>) {
        let timeout = self.network.stage_timeout();
        let res = if uri == self.self_uri {
            match tokio::time::timeout(timeout, self.applier.stage(req)).await {
                Ok(res) => res.map_err(|e| self.local_failure(e)),
                Err(_) => Err(NetworkError::Timeout {
                    uri: uri.clone(),
                    duration: timeout,
                }
                .into()),
            }
        } else {
            self.transport.stage(&uri, req, timeout).await
        };
        (uri, res)
    }

    async fn commit_on(
        &self,
        uri: String,
        version: u64,
    ) -> (String, Result<()>) {
        let res = if uri == self.self_uri {
            self.applier.commit(version).await.map_err(|e| self.local_failure(e))
        } else {
            self.transport.commit(&uri, version, self.network.commit_timeout()).await
        };
        (uri, res)
    }

    /// This node's own failure, reported the way a peer would report it
    fn local_failure(
        &self,
        e: Error,
    ) -> Error {
        match e {
            Error::System(SystemError::Storage(_)) | Error::System(SystemError::Serialization(_)) => {
                ReplicationError::Peer {
                    uri: self.self_uri.clone(),
                    message: e.root_message(),
                }
                .into()
            }
            other => other,
        }
    }

    async fn abort_on(
        &self,
        uris: Vec<String>,
        version: u64,
    ) {
        let mut tasks: FuturesUnordered<_> = uris
            .into_iter()
            .map(|uri| async move {
                let res = if uri == self.self_uri {
                    self.applier.abort(version).await
                } else {
                    self.transport.abort(&uri, version, self.network.commit_timeout()).await
                };
                (uri, res)
            })
            .collect();
        while let Some((uri, res)) = tasks.next().await {
            match res {
                Ok(()) => info!(%uri, "abort acknowledged"),
                Err(e) => warn!(%uri, error = %e, "abort failed"),
            }
        }
    }
}
