//! Membership client: who is out there and who is alive.
//!
//! The controller never runs its own gossip. It consumes liveness through the
//! [`Membership`] trait; [`HealthProber`] is a ping-based implementation over
//! the peer transport and [`StaticMembership`] is driven by hand.

mod health_prober;
mod static_membership;

pub use health_prober::*;
pub use static_membership::*;


use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::watch;

use crate::Result;

/// What a node advertises about itself to the rest of the fleet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPayload {
    /// Server uuid once the node is part of the topology
    pub uuid: Option<String>,
    pub alias: String,
    /// Version of the node's active clusterwide document
    pub config_version: u64,
    /// Buckets stored locally, reported by sharding storages
    pub buckets: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Alive,
    /// Missed probes, still below the threshold
    Suspect,
    Dead,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub uri: String,
    pub status: MemberStatus,
    pub payload: MemberPayload,
}

impl MemberInfo {
    pub fn is_alive(&self) -> bool {
        self.status != MemberStatus::Dead
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Membership: Send + Sync + 'static {
    /// Pings `uri` once; on success the uri becomes a known member.
    async fn probe(
        &self,
        uri: &str,
    ) -> Result<()>;

    fn is_alive(
        &self,
        uri: &str,
    ) -> bool;

    /// Every known member, this node included
    fn members(&self) -> Vec<MemberInfo>;

    /// Starts tracking `uri` if it is not tracked yet
    fn add_member(
        &self,
        uri: &str,
    );

    /// Ticks on every liveness transition
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// Updates what this node advertises
    fn set_local_payload(
        &self,
        payload: MemberPayload,
    );
}

/// `host:port` with a numeric port
pub(crate) fn is_valid_uri(uri: &str) -> bool {
    matches!(uri.rsplit_once(':'), Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok())
}
