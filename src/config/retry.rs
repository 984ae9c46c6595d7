use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Retry schedule for one kind of outbound request
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct BackoffPolicy {
    /// Attempts before giving up, at least 1
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Deadline of a single attempt, ms
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// First pause between attempts, ms. Doubles after each failure
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the pause, ms
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.max_retries == 0 {
            return Err(invalid(format!("retry.{name}.max_retries must be positive")));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(invalid(format!(
                "retry.{name}.base_delay_ms must not exceed max_delay_ms"
            )));
        }
        Ok(())
    }
}

/// Retry schedules keyed by request kind
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    /// Lazy catch-up fetch of a newer document
    #[serde(default)]
    pub config_sync: BackoffPolicy,

    /// Probing a server before it joins
    #[serde(default)]
    pub join_probe: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            config_sync: BackoffPolicy {
                max_retries: 3,
                timeout_ms: 3000,
                base_delay_ms: 100,
                max_delay_ms: 1000,
            },
            join_probe: BackoffPolicy {
                max_retries: 3,
                timeout_ms: 500,
                base_delay_ms: 50,
                max_delay_ms: 500,
            },
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.config_sync.validate("config_sync")?;
        self.join_probe.validate("join_probe")?;
        Ok(())
    }
}

fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    100
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
