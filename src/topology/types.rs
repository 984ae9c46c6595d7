use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::config::AuthConfig;
use crate::config::ShardingConfig;
use crate::constants::DEFAULT_COOKIE_MAX_AGE;
use crate::constants::DEFAULT_COOKIE_RENEW_AGE;
use crate::constants::DEFAULT_REPLICASET_ALIAS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub uuid: String,
    pub uri: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub replicaset_uuid: String,
    #[serde(default)]
    pub disabled: bool,
    /// Tombstone: the uuid stays reserved forever
    #[serde(default)]
    pub expelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replicaset {
    pub uuid: String,
    pub alias: String,
    /// Explicitly enabled roles. The running set is their dependency closure.
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub weight: f64,
    /// Server uuids in failover priority order
    pub leaders: Vec<String>,
    #[serde(default)]
    pub all_rw: bool,
    #[serde(default)]
    pub sharding_group: Option<String>,
}

impl Replicaset {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            alias: DEFAULT_REPLICASET_ALIAS.to_string(),
            roles: BTreeSet::new(),
            weight: 0.0,
            leaders: Vec::new(),
            all_rw: false,
            sharding_group: None,
        }
    }

    /// Configured leader, the head of the priority list
    pub fn leader(&self) -> Option<&str> {
        self.leaders.first().map(String::as_str)
    }
}

/// An independently bucketed partitioning scheme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardingGroup {
    pub bucket_count: u64,
    #[serde(default)]
    pub bootstrapped: bool,
    pub rebalancer_max_receiving: i64,
    pub sync_timeout: f64,
    pub collect_bucket_garbage_interval: f64,
    pub rebalancer_disbalance_threshold: f64,
    #[serde(default)]
    pub collect_garbage: bool,
}

impl ShardingGroup {
    pub fn with_bucket_count(bucket_count: u64) -> Self {
        Self {
            bucket_count,
            bootstrapped: false,
            rebalancer_max_receiving: 100,
            sync_timeout: 1.0,
            collect_bucket_garbage_interval: 0.5,
            rebalancer_disbalance_threshold: 1.0,
            collect_garbage: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthParams {
    pub enabled: bool,
    /// Seconds
    pub cookie_max_age: u64,
    /// Seconds
    pub cookie_renew_age: u64,
}

impl Default for AuthParams {
    fn default() -> Self {
        Self {
            enabled: false,
            cookie_max_age: DEFAULT_COOKIE_MAX_AGE,
            cookie_renew_age: DEFAULT_COOKIE_RENEW_AGE,
        }
    }
}

impl From<&AuthConfig> for AuthParams {
    fn from(cfg: &AuthConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            cookie_max_age: cfg.cookie_max_age,
            cookie_renew_age: cfg.cookie_renew_age,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// bcrypt hash
    pub password_hash: String,
    /// Bumped on every edit
    pub version: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub failover: bool,
    #[serde(default)]
    pub servers: BTreeMap<String, Server>,
    #[serde(default)]
    pub replicasets: BTreeMap<String, Replicaset>,
}

/// One immutable version of the clusterwide document.
///
/// `version == 0` means the node was never bootstrapped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub version: u64,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub sharding_groups: BTreeMap<String, ShardingGroup>,
    #[serde(default)]
    pub auth: AuthParams,
    #[serde(default)]
    pub users_acl: BTreeMap<String, UserRecord>,
    /// Operator sections, opaque to the controller
    #[serde(default)]
    pub custom: BTreeMap<String, RawSection>,
}

impl ClusterConfig {
    /// Seed for the very first document: groups and auth come from node settings.
    pub fn initial(
        sharding: &ShardingConfig,
        auth: &AuthConfig,
    ) -> Self {
        Self {
            version: 0,
            topology: Topology::default(),
            sharding_groups: sharding
                .groups
                .iter()
                .map(|(name, g)| (name.clone(), ShardingGroup::with_bucket_count(g.bucket_count)))
                .collect(),
            auth: AuthParams::from(auth),
            users_acl: BTreeMap::new(),
            custom: BTreeMap::new(),
        }
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.version > 0
    }

    pub fn server(
        &self,
        uuid: &str,
    ) -> Option<&Server> {
        self.topology.servers.get(uuid)
    }

    pub fn replicaset(
        &self,
        uuid: &str,
    ) -> Option<&Replicaset> {
        self.topology.replicasets.get(uuid)
    }

    /// Non-expelled servers
    pub fn active_servers(&self) -> impl Iterator<Item = &Server> {
        self.topology.servers.values().filter(|s| !s.expelled)
    }

    /// Non-expelled server advertising `uri`
    pub fn server_by_uri(
        &self,
        uri: &str,
    ) -> Option<&Server> {
        self.active_servers().find(|s| s.uri == uri)
    }

    /// Non-expelled members of a replicaset, in uuid order
    pub fn members_of<'a>(
        &'a self,
        replicaset_uuid: &'a str,
    ) -> impl Iterator<Item = &'a Server> + 'a {
        self.active_servers().filter(move |s| s.replicaset_uuid == replicaset_uuid)
    }

    /// Operator sections as one JSON object. Each section is emitted exactly
    /// as it was uploaded.
    pub fn custom_document(&self) -> String {
        let body: Vec<String> = self
            .custom
            .iter()
            .map(|(name, section)| format!("{}:{}", Value::String(name.clone()), section.as_str()))
            .collect();
        format!("{{{}}}", body.join(","))
    }

    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// One operator config section, kept as the exact JSON text it was uploaded
/// with. Key order and number formatting survive replication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection(String);

impl RawSection {
    /// Fails if `text` is not a single JSON value
    pub fn new(text: &str) -> crate::Result<Self> {
        let raw: &RawValue = serde_json::from_str(text)?;
        Ok(Self(raw.get().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> crate::Result<Value> {
        Ok(serde_json::from_str(&self.0)?)
    }

    pub fn parse<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_str(&self.0)?)
    }
}

impl Serialize for RawSection {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let raw = RawValue::from_string(self.0.clone()).map_err(serde::ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RawSection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Ok(Self(raw.get().to_string()))
    }
}

/// Splits an uploaded document into its top-level sections.
///
/// # Errors
/// - decode errors if `document` is not JSON
/// - `Config must be a table` if it is not an object
pub fn parse_sections(document: &str) -> crate::Result<BTreeMap<String, RawSection>> {
    let shape: Value = serde_json::from_str(document)?;
    if !shape.is_object() {
        return Err(crate::Error::Validation("Config must be a table".to_string()));
    }
    let sections: BTreeMap<String, RawSection> = serde_json::from_str(document)?;
    Ok(sections)
}
