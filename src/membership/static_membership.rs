use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use super::is_valid_uri;
use super::MemberInfo;
use super::MemberPayload;
use super::MemberStatus;
use super::Membership;
use crate::MembershipError;
use crate::Result;

/// Membership whose liveness is set by hand.
///
/// Useful for embedding the controller under an external failure detector,
/// and for tests.
pub struct StaticMembership {
    self_uri: String,
    members: DashMap<String, (bool, MemberPayload)>,
    local: ArcSwap<MemberPayload>,
    events: watch::Sender<u64>,
}

impl StaticMembership {
    pub fn new(self_uri: impl Into<String>) -> Self {
        let (events, _) = watch::channel(0);
        Self {
            self_uri: self_uri.into(),
            members: DashMap::new(),
            local: ArcSwap::from_pointee(MemberPayload::default()),
            events,
        }
    }

    /// Marks `uri` alive or dead, registering it if needed.
    pub fn set_alive(
        &self,
        uri: &str,
        alive: bool,
    ) {
        let changed = {
            let mut entry = self
                .members
                .entry(uri.to_string())
                .or_insert((!alive, MemberPayload::default()));
            let changed = entry.0 != alive;
            entry.0 = alive;
            changed
        };
        if changed {
            debug!(%uri, alive, "liveness set");
            self.events.send_modify(|tick| *tick += 1);
        }
    }

    pub fn set_payload(
        &self,
        uri: &str,
        payload: MemberPayload,
    ) {
        self.members
            .entry(uri.to_string())
            .or_insert((true, MemberPayload::default()))
            .1 = payload;
    }
}

#[async_trait]
impl Membership for StaticMembership {
    async fn probe(
        &self,
        uri: &str,
    ) -> Result<()> {
        let reason = if !is_valid_uri(uri) {
            "ping was not sent"
        } else if uri == self.self_uri || self.is_alive(uri) {
            return Ok(());
        } else {
            "no response"
        };
        Err(MembershipError::ProbeFailed {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
        .into())
    }

    fn is_alive(
        &self,
        uri: &str,
    ) -> bool {
        uri == self.self_uri || self.members.get(uri).map(|e| e.0).unwrap_or(false)
    }

    fn members(&self) -> Vec<MemberInfo> {
        let mut members: Vec<MemberInfo> = self
            .members
            .iter()
            .filter(|e| *e.key() != self.self_uri)
            .map(|e| MemberInfo {
                uri: e.key().clone(),
                status: if e.0 {
                    MemberStatus::Alive
                } else {
                    MemberStatus::Dead
                },
                payload: e.1.clone(),
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
        if uri != self.self_uri && !self.members.contains_key(uri) {
            self.set_alive(uri, true);
        }
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
