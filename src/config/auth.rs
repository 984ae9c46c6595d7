use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::constants::DEFAULT_COOKIE_MAX_AGE;
use crate::constants::DEFAULT_COOKIE_RENEW_AGE;
use crate::Result;

/// Session gate settings used until the cluster is bootstrapped.
///
/// Once a clusterwide document exists its `auth` section wins.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Password of the integrated superuser
    #[serde(default = "default_cluster_cookie")]
    pub cluster_cookie: String,

    /// Seconds
    #[serde(default = "default_cookie_max_age")]
    pub cookie_max_age: u64,

    /// Seconds before expiry at which a session is reissued
    #[serde(default = "default_cookie_renew_age")]
    pub cookie_renew_age: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cluster_cookie: default_cluster_cookie(),
            cookie_max_age: default_cookie_max_age(),
            cookie_renew_age: default_cookie_renew_age(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cluster_cookie.is_empty() {
            return Err(invalid("auth.cluster_cookie can't be empty"));
        }
        if self.cookie_renew_age > self.cookie_max_age {
            return Err(invalid(format!(
                "auth.cookie_renew_age ({}) must not exceed auth.cookie_max_age ({})",
                self.cookie_renew_age, self.cookie_max_age
            )));
        }
        Ok(())
    }
}

fn default_cluster_cookie() -> String {
    "secret-cluster-cookie".to_string()
}
fn default_cookie_max_age() -> u64 {
    DEFAULT_COOKIE_MAX_AGE
}
fn default_cookie_renew_age() -> u64 {
    DEFAULT_COOKIE_RENEW_AGE
}
