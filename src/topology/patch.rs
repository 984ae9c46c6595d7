//! Mutation descriptions and their application to a committed document.
//!
//! [`TopologyPatch::apply`] resolves references (uuids, uris, group names) and
//! builds the candidate document. It reports lookup failures itself; every
//! structural invariant is then checked by [`super::validate`].

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::debug;

use super::ClusterConfig;
use super::Label;
use super::RawSection;
use super::Replicaset;
use super::Server;
use super::TopologyContext;
use super::UserRecord;
use crate::constants::DEFAULT_SHARDING_GROUP;
use crate::constants::SHARDING_STORAGE_ROLE;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerPatch {
    Join {
        uri: String,
        uuid: String,
        replicaset_uuid: String,
        alias: String,
        labels: Vec<Label>,
    },
    Edit {
        uuid: String,
        uri: Option<String>,
        labels: Option<Vec<Label>>,
        disabled: Option<bool>,
    },
    Expel {
        uuid: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReplicasetPatch {
    pub uuid: String,
    pub alias: Option<String>,
    pub roles: Option<Vec<String>>,
    pub weight: Option<f64>,
    /// New head of the priority list; remaining members follow in uuid order
    #[serde(alias = "master")]
    pub leaders: Option<Vec<String>>,
    pub all_rw: Option<bool>,
    pub sharding_group: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShardingGroupPatch {
    pub name: String,
    pub rebalancer_max_receiving: Option<i64>,
    pub sync_timeout: Option<f64>,
    pub collect_bucket_garbage_interval: Option<f64>,
    pub rebalancer_disbalance_threshold: Option<f64>,
    pub collect_garbage: Option<bool>,
    pub bootstrapped: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuthParamsPatch {
    pub enabled: Option<bool>,
    pub cookie_max_age: Option<u64>,
    pub cookie_renew_age: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserPatch {
    Add(UserRecord),
    Edit {
        username: String,
        fullname: Option<String>,
        email: Option<String>,
        password_hash: Option<String>,
    },
    Remove {
        username: String,
    },
}

/// A single clusterwide mutation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyPatch {
    pub servers: Vec<ServerPatch>,
    pub replicasets: Vec<ReplicasetPatch>,
    pub failover: Option<bool>,
    pub sharding_groups: Vec<ShardingGroupPatch>,
    pub auth: Option<AuthParamsPatch>,
    pub users: Vec<UserPatch>,
    /// Replaces every operator section when set
    pub custom: Option<BTreeMap<String, RawSection>>,
}

impl TopologyPatch {
    pub fn is_empty(&self) -> bool {
        self == &TopologyPatch::default()
    }

    /// Builds the next version of `current` with this patch applied.
    ///
    /// Server changes are applied before replicaset edits, so a join can
    /// create a replicaset that the same patch then configures.
    pub fn apply(
        &self,
        current: &ClusterConfig,
        ctx: &TopologyContext<'_>,
    ) -> Result<ClusterConfig> {
        let mut cfg = current.clone();
        cfg.version = current.version + 1;

        for patch in &self.servers {
            apply_server(&mut cfg, patch, ctx)?;
        }
        for patch in &self.replicasets {
            apply_replicaset(&mut cfg, patch, ctx)?;
        }
        if let Some(enabled) = self.failover {
            cfg.topology.failover = enabled;
        }
        for patch in &self.sharding_groups {
            apply_sharding_group(&mut cfg, patch)?;
        }
        if let Some(auth) = &self.auth {
            if let Some(enabled) = auth.enabled {
                cfg.auth.enabled = enabled;
            }
            if let Some(max_age) = auth.cookie_max_age {
                cfg.auth.cookie_max_age = max_age;
            }
            if let Some(renew_age) = auth.cookie_renew_age {
                cfg.auth.cookie_renew_age = renew_age;
            }
        }
        for patch in &self.users {
            apply_user(&mut cfg, patch)?;
        }
        if let Some(custom) = &self.custom {
            cfg.custom = custom.clone();
        }

        debug!(version = cfg.version, "candidate built");
        Ok(cfg)
    }
}

fn server_mut<'a>(
    cfg: &'a mut ClusterConfig,
    uuid: &str,
) -> Result<&'a mut Server> {
    let server = cfg
        .topology
        .servers
        .get_mut(uuid)
        .ok_or_else(|| Error::Validation(format!("Server \"{uuid}\" not in config")))?;
    if server.expelled {
        return Err(Error::Validation(format!("Server \"{uuid}\" is expelled")));
    }
    Ok(server)
}

fn ensure_uri_free(
    cfg: &ClusterConfig,
    uri: &str,
    ctx: &TopologyContext<'_>,
) -> Result<()> {
    if !ctx.is_member(uri) {
        return Err(Error::Validation(format!("Server \"{uri}\" is not in membership")));
    }
    if cfg.server_by_uri(uri).is_some() {
        return Err(Error::Validation(format!("Server \"{uri}\" is already joined")));
    }
    Ok(())
}

fn apply_server(
    cfg: &mut ClusterConfig,
    patch: &ServerPatch,
    ctx: &TopologyContext<'_>,
) -> Result<()> {
    match patch {
        ServerPatch::Join {
            uri,
            uuid,
            replicaset_uuid,
            alias,
            labels,
        } => {
            if cfg.topology.servers.contains_key(uuid) {
                return Err(Error::Validation(format!("Server \"{uuid}\" is already joined")));
            }
            ensure_uri_free(cfg, uri, ctx)?;

            let replicaset = cfg
                .topology
                .replicasets
                .entry(replicaset_uuid.clone())
                .or_insert_with(|| Replicaset::new(replicaset_uuid.clone()));
            replicaset.leaders.push(uuid.clone());

            cfg.topology.servers.insert(
                uuid.clone(),
                Server {
                    uuid: uuid.clone(),
                    uri: uri.clone(),
                    alias: alias.clone(),
                    labels: labels.clone(),
                    replicaset_uuid: replicaset_uuid.clone(),
                    disabled: false,
                    expelled: false,
                },
            );
        }
        ServerPatch::Edit {
            uuid,
            uri,
            labels,
            disabled,
        } => {
            let current_uri = server_mut(cfg, uuid)?.uri.clone();
            if let Some(uri) = uri.as_ref().filter(|u| **u != current_uri) {
                ensure_uri_free(cfg, uri, ctx)?;
            }
            let server = server_mut(cfg, uuid)?;
            if let Some(uri) = uri {
                server.uri = uri.clone();
            }
            if let Some(labels) = labels {
                server.labels = labels.clone();
            }
            if let Some(disabled) = disabled {
                server.disabled = *disabled;
            }
        }
        ServerPatch::Expel { uuid } => {
            let server = server_mut(cfg, uuid)?;
            server.expelled = true;
            let replicaset_uuid = server.replicaset_uuid.clone();

            let now_empty = match cfg.topology.replicasets.get_mut(&replicaset_uuid) {
                Some(rs) => {
                    rs.leaders.retain(|l| l != uuid);
                    rs.leaders.is_empty()
                }
                None => false,
            };
            if now_empty {
                cfg.topology.replicasets.remove(&replicaset_uuid);
            }
        }
    }
    Ok(())
}

fn apply_replicaset(
    cfg: &mut ClusterConfig,
    patch: &ReplicasetPatch,
    ctx: &TopologyContext<'_>,
) -> Result<()> {
    let uuid = &patch.uuid;
    let members: BTreeSet<String> = cfg.members_of(uuid).map(|s| s.uuid.clone()).collect();
    let groups = cfg.sharding_groups.clone();

    let rs = cfg
        .topology
        .replicasets
        .get_mut(uuid)
        .ok_or_else(|| Error::Validation(format!("Replicaset \"{uuid}\" not in config")))?;

    if let Some(alias) = &patch.alias {
        rs.alias = alias.clone();
    }
    if let Some(all_rw) = patch.all_rw {
        rs.all_rw = all_rw;
    }
    if let Some(group) = &patch.sharding_group {
        rs.sharding_group = Some(group.clone());
    }

    if let Some(roles) = &patch.roles {
        let had_storage = ctx.has_role(&rs.roles, SHARDING_STORAGE_ROLE);
        rs.roles = roles.iter().cloned().collect();
        let has_storage = ctx.has_role(&rs.roles, SHARDING_STORAGE_ROLE);

        if has_storage && rs.sharding_group.is_none() {
            rs.sharding_group = default_group(&groups);
        }
        if has_storage && !had_storage && patch.weight.is_none() {
            let bootstrapped = rs
                .sharding_group
                .as_ref()
                .and_then(|g| groups.get(g))
                .map(|g| g.bootstrapped)
                .unwrap_or(false);
            rs.weight = if bootstrapped { 0.0 } else { 1.0 };
        }
    }
    if let Some(weight) = patch.weight {
        rs.weight = weight;
    }

    if let Some(leaders) = &patch.leaders {
        let mut ordered: Vec<String> = Vec::with_capacity(members.len());
        for leader in leaders {
            if !members.contains(leader) {
                return Err(Error::Validation(format!(
                    "replicasets[{uuid}] leader \"{leader}\" doesn't exist"
                )));
            }
            if !ordered.contains(leader) {
                ordered.push(leader.clone());
            }
        }
        ordered.extend(members.iter().filter(|m| !leaders.contains(m)).cloned());
        rs.leaders = ordered;
    }
    Ok(())
}

/// `default` when present, otherwise the only group if there is exactly one
fn default_group(groups: &BTreeMap<String, super::ShardingGroup>) -> Option<String> {
    if groups.contains_key(DEFAULT_SHARDING_GROUP) {
        return Some(DEFAULT_SHARDING_GROUP.to_string());
    }
    if groups.len() == 1 {
        return groups.keys().next().cloned();
    }
    None
}

fn apply_sharding_group(
    cfg: &mut ClusterConfig,
    patch: &ShardingGroupPatch,
) -> Result<()> {
    let name = &patch.name;
    let group = cfg
        .sharding_groups
        .get_mut(name)
        .ok_or_else(|| Error::Validation(format!("sharding_groups[\"{name}\"] doesn't exist")))?;

    if let Some(v) = patch.rebalancer_max_receiving {
        group.rebalancer_max_receiving = v;
    }
    if let Some(v) = patch.sync_timeout {
        group.sync_timeout = v;
    }
    if let Some(v) = patch.collect_bucket_garbage_interval {
        group.collect_bucket_garbage_interval = v;
    }
    if let Some(v) = patch.rebalancer_disbalance_threshold {
        group.rebalancer_disbalance_threshold = v;
    }
    if let Some(v) = patch.collect_garbage {
        group.collect_garbage = v;
    }
    if let Some(v) = patch.bootstrapped {
        group.bootstrapped = v;
    }
    Ok(())
}

fn apply_user(
    cfg: &mut ClusterConfig,
    patch: &UserPatch,
) -> Result<()> {
    match patch {
        UserPatch::Add(user) => {
            if cfg.users_acl.contains_key(&user.username) {
                return Err(Error::Validation("User already exists".to_string()));
            }
            cfg.users_acl.insert(user.username.clone(), user.clone());
        }
        UserPatch::Edit {
            username,
            fullname,
            email,
            password_hash,
        } => {
            let user = cfg
                .users_acl
                .get_mut(username)
                .ok_or_else(|| Error::Validation("User not found".to_string()))?;
            if let Some(fullname) = fullname {
                user.fullname = Some(fullname.clone());
            }
            if let Some(email) = email {
                user.email = Some(email.clone());
            }
            if let Some(hash) = password_hash {
                user.password_hash = hash.clone();
            }
            user.version += 1;
        }
        UserPatch::Remove { username } => {
            if cfg.users_acl.remove(username).is_none() {
                return Err(Error::Validation("User not found".to_string()));
            }
        }
    }
    Ok(())
}
