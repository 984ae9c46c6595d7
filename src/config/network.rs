use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Peer request timeouts (milliseconds). A timeout always counts as a failure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Prepare phase, per peer
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,

    /// Commit and abort phases, per peer
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,

    /// Membership ping
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Default role RPC timeout
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Catch-up fetch of a peer's active document
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Interval of the lazy catch-up loop
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            stage_timeout_ms: default_stage_timeout_ms(),
            commit_timeout_ms: default_commit_timeout_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            sync_interval_ms: default_sync_interval_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("stage_timeout_ms", self.stage_timeout_ms),
            ("commit_timeout_ms", self.commit_timeout_ms),
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("rpc_timeout_ms", self.rpc_timeout_ms),
            ("fetch_timeout_ms", self.fetch_timeout_ms),
            ("sync_interval_ms", self.sync_interval_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("network.{name} must be positive")));
            }
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

fn default_stage_timeout_ms() -> u64 {
    3000
}
fn default_commit_timeout_ms() -> u64 {
    3000
}
fn default_ping_timeout_ms() -> u64 {
    500
}
fn default_rpc_timeout_ms() -> u64 {
    10_000
}
fn default_fetch_timeout_ms() -> u64 {
    3000
}
fn default_sync_interval_ms() -> u64 {
    2000
}
