use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::is_valid_uri;
use super::MemberInfo;
use super::MemberPayload;
use super::MemberStatus;
use super::Membership;
use crate::network::PeerTransport;
use crate::MembershipError;
use crate::Result;

#[derive(Debug, Clone)]
struct MemberEntry {
    status: MemberStatus,
    payload: MemberPayload,
}

/// Ping-based liveness detector.
///
/// Every `probe_interval` each known member is pinged. A member is declared
/// dead after `suspect_threshold` consecutive failed pings and alive again on
/// the first successful one.
pub struct HealthProber {
    self_uri: String,
    transport: Arc<dyn PeerTransport>,
    members: DashMap<String, MemberEntry>,
    pub(crate) failure_counts: DashMap<String, u32>,
    pub(crate) suspect_threshold: u32,
    ping_timeout: Duration,
    probe_interval: Duration,
    local: ArcSwap<MemberPayload>,
    events: watch::Sender<u64>,
}

impl HealthProber {
    pub fn new(
        self_uri: impl Into<String>,
        transport: Arc<dyn PeerTransport>,
        suspect_threshold: u32,
        ping_timeout: Duration,
        probe_interval: Duration,
    ) -> Self {
        let (events, _) = watch::channel(0);
        Self {
            self_uri: self_uri.into(),
            transport,
            members: DashMap::new(),
            failure_counts: DashMap::new(),
            suspect_threshold: suspect_threshold.max(1),
            ping_timeout,
            probe_interval,
            local: ArcSwap::from_pointee(MemberPayload::default()),
            events,
        }
    }

    fn notify(&self) {
        self.events.send_modify(|tick| *tick += 1);
    }

    pub(crate) fn record_success(
        &self,
        uri: &str,
        payload: MemberPayload,
    ) {
        self.failure_counts.remove(uri);
        let previous = self.members.insert(
            uri.to_string(),
            MemberEntry {
                status: MemberStatus::Alive,
                payload,
            },
        );
        match previous.map(|e| e.status) {
            Some(MemberStatus::Alive) | Some(MemberStatus::Suspect) => {}
            Some(MemberStatus::Dead) => {
                info!(%uri, "member is alive again");
                self.notify();
            }
            None => {
                debug!(%uri, "new member");
                self.notify();
            }
        }
    }

    pub(crate) fn record_failure(
        &self,
        uri: &str,
    ) {
        let failures = {
            let mut count = self.failure_counts.entry(uri.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let mut became_dead = false;
        if let Some(mut entry) = self.members.get_mut(uri) {
            let next = if failures >= self.suspect_threshold {
                MemberStatus::Dead
            } else {
                MemberStatus::Suspect
            };
            if entry.status != MemberStatus::Dead && next == MemberStatus::Dead {
                became_dead = true;
            }
            if entry.status != MemberStatus::Dead {
                entry.status = next;
            }
        }
        if became_dead {
            warn!(%uri, failures, "member declared dead");
            self.notify();
        }
    }

    /// Pings every known member once, concurrently.
    pub async fn probe_round(&self) {
        let uris: Vec<String> = self
            .members
            .iter()
            .map(|e| e.key().clone())
            .filter(|uri| *uri != self.self_uri)
            .collect();

        let mut tasks = FuturesUnordered::new();
        for uri in uris {
            let transport = self.transport.clone();
            let timeout = self.ping_timeout;
            tasks.push(async move {
                let res = transport.ping(&uri, timeout).await;
                (uri, res)
            });
        }
        while let Some((uri, res)) = tasks.next().await {
            match res {
                Ok(payload) => self.record_success(&uri, payload),
                Err(e) => {
                    debug!(%uri, error = %e, "ping failed");
                    self.record_failure(&uri);
                }
            }
        }
    }

    /// Probe loop; returns when `shutdown` fires.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let mut ticker = interval(self.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("membership prober stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.probe_round().await;
                }
            }
        }
    }
}

#[async_trait]
impl Membership for HealthProber {
    async fn probe(
        &self,
        uri: &str,
    ) -> Result<()> {
        if !is_valid_uri(uri) {
            return Err(MembershipError::ProbeFailed {
                uri: uri.to_string(),
                reason: "ping was not sent".to_string(),
            }
            .into());
        }
        if uri == self.self_uri {
            return Ok(());
        }
        match self.transport.ping(uri, self.ping_timeout).await {
            Ok(payload) => {
                self.record_success(uri, payload);
                Ok(())
            }
            Err(e) => {
                debug!(%uri, error = %e, "probe failed");
                Err(MembershipError::ProbeFailed {
                    uri: uri.to_string(),
                    reason: "no response".to_string(),
                }
                .into())
            }
        }
    }

    fn is_alive(
        &self,
        uri: &str,
    ) -> bool {
        if uri == self.self_uri {
            return true;
        }
        self.members
            .get(uri)
            .map(|e| e.status != MemberStatus::Dead)
            .unwrap_or(false)
    }

    fn members(&self) -> Vec<MemberInfo> {
        let mut members: Vec<MemberInfo> = self
            .members
            .iter()
            .filter(|e| *e.key() != self.self_uri)
            .map(|e| MemberInfo {
                uri: e.key().clone(),
                status: e.status,
                payload: e.payload.clone(),
            })
            .collect();
        members.push(MemberInfo {
            uri: self.self_uri.clone(),
            status: MemberStatus::Alive,
            payload: self.local.load().as_ref().clone(),
        });
        members.sort_by(|a, b| a.uri.cmp(&b.uri));
        members
    }

    fn add_member(
        &self,
        uri: &str,
    ) {
        if uri == self.self_uri || self.members.contains_key(uri) {
            return;
        }
        // Unknown liveness until the first ping answers.
        self.members.insert(
            uri.to_string(),
            MemberEntry {
                status: MemberStatus::Suspect,
                payload: MemberPayload::default(),
            },
        );
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.events.subscribe()
    }

    fn set_local_payload(
        &self,
        payload: MemberPayload,
    ) {
        self.local.store(Arc::new(payload));
    }
}
