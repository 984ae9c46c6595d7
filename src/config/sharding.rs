use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::constants::DEFAULT_BUCKET_COUNT;
use crate::constants::DEFAULT_SHARDING_GROUP;
use crate::Result;

/// Sharding groups written into the first clusterwide document
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ShardingConfig {
    #[serde(default = "default_groups")]
    pub groups: BTreeMap<String, ShardingGroupSettings>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ShardingGroupSettings {
    #[serde(default = "default_bucket_count")]
    pub bucket_count: u64,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            groups: default_groups(),
        }
    }
}

impl ShardingConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, group) in &self.groups {
            if name.is_empty() {
                return Err(invalid("sharding.groups can't contain an empty name"));
            }
            if group.bucket_count == 0 {
                return Err(invalid(format!(
                    "sharding.groups.{name}.bucket_count must be positive"
                )));
            }
        }
        Ok(())
    }
}

fn default_bucket_count() -> u64 {
    DEFAULT_BUCKET_COUNT
}
fn default_groups() -> BTreeMap<String, ShardingGroupSettings> {
    BTreeMap::from([(
        DEFAULT_SHARDING_GROUP.to_string(),
        ShardingGroupSettings {
            bucket_count: DEFAULT_BUCKET_COUNT,
        },
    )])
}
