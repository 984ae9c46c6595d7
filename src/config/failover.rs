use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Liveness detection window and the failover backstop tick
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FailoverConfig {
    /// Interval between membership probe rounds
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Consecutive failed probes before a member is considered dead
    #[serde(default = "default_suspect_threshold")]
    pub suspect_threshold: u32,

    /// Periodic recomputation of active leaders, independent of events
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            suspect_threshold: default_suspect_threshold(),
            reconcile_interval_ms: default_reconcile_interval_ms(),
        }
    }
}

impl FailoverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.probe_interval_ms == 0 {
            return Err(invalid("failover.probe_interval_ms must be positive"));
        }
        if self.suspect_threshold == 0 {
            return Err(invalid("failover.suspect_threshold must be at least 1"));
        }
        if self.reconcile_interval_ms == 0 {
            return Err(invalid("failover.reconcile_interval_ms must be positive"));
        }
        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }
}

fn default_probe_interval_ms() -> u64 {
    500
}
fn default_suspect_threshold() -> u32 {
    3
}
fn default_reconcile_interval_ms() -> u64 {
    1000
}
