use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
#[cfg(test)]
use mockall::automock;
use tracing::warn;

use crate::constants::SUPERUSER;
use crate::topology::TopologyStore;
use crate::Error;
use crate::Result;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

/// Pluggable username/password verification
#[cfg_attr(test, automock)]
pub trait CredentialCheck: Send + Sync + 'static {
    fn check(
        &self,
        username: &str,
        password: &str,
    ) -> bool;

    fn user_exists(
        &self,
        username: &str,
    ) -> bool;
}

/// Checks against the replicated `users_acl` section, plus the integrated
/// superuser whose password is the cluster cookie.
pub struct ClusterCredentials {
    cluster_cookie: String,
    store: Arc<TopologyStore>,
}

impl ClusterCredentials {
    pub fn new(
        cluster_cookie: impl Into<String>,
        store: Arc<TopologyStore>,
    ) -> Self {
        Self {
            cluster_cookie: cluster_cookie.into(),
            store,
        }
    }
}

impl CredentialCheck for ClusterCredentials {
    fn check(
        &self,
        username: &str,
        password: &str,
    ) -> bool {
        if username == SUPERUSER {
            return password == self.cluster_cookie;
        }
        let cfg = self.store.current();
        let Some(user) = cfg.users_acl.get(username) else {
            return false;
        };
        bcrypt::verify(password, &user.password_hash).unwrap_or_else(|e| {
            warn!(username, error = %e, "stored password hash is unreadable");
            false
        })
    }

    fn user_exists(
        &self,
        username: &str,
    ) -> bool {
        username == SUPERUSER || self.store.current().users_acl.contains_key(username)
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, HASH_COST).map_err(|e| Error::Validation(format!("Password hashing failed: {e}")))
}

/// Parses `Basic <base64(user:password)>`.
///
/// Anything else, including empty fields or extra colons, is no credential.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let mut fields = decoded.split(':');
    let (username, password) = (fields.next()?, fields.next()?);
    if fields.next().is_some() || username.is_empty() || password.is_empty() {
        return None;
    }
    Some((username.to_string(), password.to_string()))
}
