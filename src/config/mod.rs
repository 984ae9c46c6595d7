//! Node-local settings for the topology controller.
//!
//! Provides hierarchical settings loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`TOPOLOGY__` prefix)
//! - Component-wise validation
//!
//! These settings are per-process. The clusterwide document replicated between
//! nodes lives in [`crate::topology`].
mod auth;
mod failover;
mod network;
mod node;
mod retry;
mod sharding;
pub use auth::*;
pub use failover::*;
pub use network::*;
pub use node::*;
pub use retry::*;
pub use sharding::*;

#[cfg(test)]
mod config_test;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment prefix: `TOPOLOGY__NODE__ADVERTISE_URI=host:3301`
pub(crate) const ENV_PREFIX: &str = "TOPOLOGY";

/// Main settings container of a node
///
/// Combines all subsystem settings with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Identity, listen address and work directory
    #[serde(default)]
    pub node: NodeConfig,
    /// Peer request timeouts
    #[serde(default)]
    pub network: NetworkConfig,
    /// Liveness detection and failover reconciliation
    #[serde(default)]
    pub failover: FailoverConfig,
    /// Session gate defaults and the cluster cookie
    #[serde(default)]
    pub auth: AuthConfig,
    /// Sharding groups created at bootstrap
    #[serde(default)]
    pub sharding: ShardingConfig,
    /// Retry policies for background peer operations
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl Debug for Settings {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("node", &self.node)
            .field("network", &self.network)
            .field("failover", &self.failover)
            .finish()
    }
}

impl Settings {
    /// Loads settings from hierarchical sources without validation.
    ///
    /// Sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `TOPOLOGY__` prefix (highest priority)
    ///
    /// # Note
    /// Callers MUST call `validate()` before using the settings.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("TOPOLOGY__NODE__ADVERTISE_URI", "localhost:3302");
    /// let settings = Settings::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Applies additional overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.node.validate()?;
        self.network.validate()?;
        self.failover.validate()?;
        self.auth.validate()?;
        self.sharding.validate()?;
        self.retry.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

/// Shorthand for a `config::ConfigError::Message` wrapped in the crate error
pub(crate) fn invalid(msg: impl Into<String>) -> crate::Error {
    crate::Error::Config(config::ConfigError::Message(msg.into()))
}
