// -
// Config document

/// Top-level sections owned by the controller; operators can't upload them.
pub const SYSTEM_SECTIONS: &[&str] = &["topology", "sharding", "sharding_groups", "auth", "users_acl"];

/// Active and staged document names inside the node's work directory
pub(crate) const ACTIVE_CONFIG_FILE: &str = "config.json";
pub(crate) const STAGED_CONFIG_FILE: &str = "config.staged.json";

// -
// Topology defaults

pub const DEFAULT_REPLICASET_ALIAS: &str = "unnamed";
pub const DEFAULT_SHARDING_GROUP: &str = "default";
pub const DEFAULT_BUCKET_COUNT: u64 = 3000;

// -
// Built-in roles

pub const SHARDING_STORAGE_ROLE: &str = "sharding-storage";
pub const SHARDING_ROUTER_ROLE: &str = "sharding-router";

// -
// Auth

/// Session cookie name
pub const SESSION_COOKIE: &str = "lsid";
/// Integrated superuser, authenticated with the cluster cookie
pub const SUPERUSER: &str = "admin";
/// 30 days
pub const DEFAULT_COOKIE_MAX_AGE: u64 = 30 * 24 * 3600;
/// 1 day
pub const DEFAULT_COOKIE_RENEW_AGE: u64 = 24 * 3600;

// -
// Peer routes

pub(crate) const INTERNAL_PREFIX: &str = "internal";
