use std::collections::BTreeSet;
use std::collections::HashSet;

use super::ClusterConfig;
use super::Replicaset;
use super::TopologyContext;
use crate::constants::SHARDING_STORAGE_ROLE;
use crate::constants::SYSTEM_SECTIONS;
use crate::Error;
use crate::Result;

fn fail<T>(msg: String) -> Result<T> {
    Err(Error::Validation(msg))
}

/// Checks `candidate` as a successor of `previous`.
///
/// Pure: it reads both documents and the context and never mutates anything.
/// The first violated rule is reported with its operator-facing message.
pub fn validate(
    candidate: &ClusterConfig,
    previous: &ClusterConfig,
    ctx: &TopologyContext<'_>,
) -> Result<()> {
    validate_servers(candidate, previous)?;
    validate_replicasets(candidate, previous, ctx)?;
    validate_removed_replicasets(candidate, previous, ctx)?;
    validate_sharding_groups(candidate, previous)?;
    validate_sections(candidate)?;
    validate_auth(candidate)?;
    Ok(())
}

fn validate_servers(
    candidate: &ClusterConfig,
    previous: &ClusterConfig,
) -> Result<()> {
    let mut uris = HashSet::new();
    for server in candidate.active_servers() {
        if !candidate.topology.replicasets.contains_key(&server.replicaset_uuid) {
            return fail(format!(
                "Server \"{}\" refers to nonexistent replicaset \"{}\"",
                server.uuid, server.replicaset_uuid
            ));
        }
        if !uris.insert(server.uri.as_str()) {
            return fail(format!("Server \"{}\" is already joined", server.uri));
        }
    }

    for (uuid, prev) in &previous.topology.servers {
        match candidate.topology.servers.get(uuid) {
            None => {
                return fail(format!("Server \"{uuid}\" can't be removed from config"));
            }
            Some(now) if prev.expelled && !now.expelled => {
                return fail(format!("Server \"{uuid}\" is expelled"));
            }
            Some(now) if now.expelled && !prev.expelled => {
                let Some(rs) = previous.replicaset(&prev.replicaset_uuid) else {
                    continue;
                };
                let has_others = previous.members_of(&rs.uuid).any(|s| s.uuid != *uuid);
                if rs.leader() == Some(uuid.as_str()) && has_others {
                    return fail(format!("Server \"{uuid}\" is the master and can't be expelled"));
                }
            }
            Some(now) if now.replicaset_uuid != prev.replicaset_uuid => {
                return fail(format!("Server \"{uuid}\" can't change its replicaset"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_replicasets(
    candidate: &ClusterConfig,
    previous: &ClusterConfig,
    ctx: &TopologyContext<'_>,
) -> Result<()> {
    for (uuid, rs) in &candidate.topology.replicasets {
        let prev = previous.replicaset(uuid);

        if !rs.weight.is_finite() || rs.weight < 0.0 {
            return fail(format!(
                "replicasets[{uuid}].weight must be non-negative, got {}",
                rs.weight
            ));
        }

        for role in &rs.roles {
            let was_enabled = prev.map(|p| p.roles.contains(role)).unwrap_or(false);
            if !ctx.roles.is_known(role) && !was_enabled {
                return fail(format!("replicasets[{uuid}] can not enable unknown role \"{role}\""));
            }
        }

        let members: BTreeSet<&str> = candidate.members_of(uuid).map(|s| s.uuid.as_str()).collect();
        if members.is_empty() {
            return fail(format!("replicasets[{uuid}] has no servers"));
        }
        let leaders: BTreeSet<&str> = rs.leaders.iter().map(String::as_str).collect();
        if leaders.len() != rs.leaders.len() || leaders != members {
            return fail(format!(
                "replicasets[{uuid}].leaders must list every member exactly once"
            ));
        }

        validate_sharding_group_ref(candidate, prev, rs)?;

        let had_storage = prev
            .map(|p| ctx.has_role(&p.roles, SHARDING_STORAGE_ROLE))
            .unwrap_or(false);
        let has_storage = ctx.has_role(&rs.roles, SHARDING_STORAGE_ROLE);
        if had_storage && !has_storage {
            check_storage_drained(uuid, rs.weight, ctx)?;
        }
    }
    Ok(())
}

fn validate_sharding_group_ref(
    candidate: &ClusterConfig,
    prev: Option<&Replicaset>,
    rs: &Replicaset,
) -> Result<()> {
    let uuid = &rs.uuid;
    if let Some(prev_group) = prev.and_then(|p| p.sharding_group.as_ref()) {
        if rs.sharding_group.as_ref() != Some(prev_group) {
            return fail(format!("replicasets[{uuid}].sharding_group can't be modified"));
        }
    }
    match &rs.sharding_group {
        Some(group) if candidate.sharding_groups.is_empty() => fail(format!(
            "replicasets[{uuid}] can't be added to sharding_group \"{group}\", cluster doesn't have any"
        )),
        Some(group) if !candidate.sharding_groups.contains_key(group) => fail(format!(
            "replicasets[{uuid}].sharding_group \"{group}\" doesn't exist"
        )),
        None if rs.roles.contains(SHARDING_STORAGE_ROLE) => {
            if candidate.sharding_groups.is_empty() {
                fail(format!(
                    "replicasets[{uuid}] can't be added to sharding_group \"default\", cluster doesn't have any"
                ))
            } else {
                fail(format!("replicasets[{uuid}].sharding_group must be specified"))
            }
        }
        _ => Ok(()),
    }
}

fn check_storage_drained(
    uuid: &str,
    weight: f64,
    ctx: &TopologyContext<'_>,
) -> Result<()> {
    if weight != 0.0 {
        return fail(format!("replicasets[{uuid}] is a sharding-storage which can't be removed"));
    }
    if ctx.buckets(uuid) > 0 {
        return fail(format!("replicasets[{uuid}] rebalancing isn't finished yet"));
    }
    Ok(())
}

fn validate_removed_replicasets(
    candidate: &ClusterConfig,
    previous: &ClusterConfig,
    ctx: &TopologyContext<'_>,
) -> Result<()> {
    for (uuid, prev) in &previous.topology.replicasets {
        if candidate.topology.replicasets.contains_key(uuid) {
            continue;
        }
        if ctx.has_role(&prev.roles, SHARDING_STORAGE_ROLE) {
            check_storage_drained(uuid, prev.weight, ctx)?;
        }
    }
    Ok(())
}

fn validate_sharding_groups(
    candidate: &ClusterConfig,
    previous: &ClusterConfig,
) -> Result<()> {
    for (name, prev) in &previous.sharding_groups {
        let Some(group) = candidate.sharding_groups.get(name) else {
            return fail(format!("sharding_groups[\"{name}\"] can't be removed"));
        };
        // A never-bootstrapped document may still carry seed groups.
        if previous.is_bootstrapped() && group.bucket_count != prev.bucket_count {
            return fail(format!("sharding_groups[\"{name}\"].bucket_count can't be modified"));
        }
        if prev.bootstrapped && !group.bootstrapped {
            return fail(format!("sharding_groups[\"{name}\"].bootstrapped can't be reverted"));
        }
    }

    for group in candidate.sharding_groups.values() {
        if group.bucket_count == 0 {
            return fail("sharding.bucket_count must be positive".to_string());
        }
        if group.rebalancer_max_receiving <= 0 {
            return fail("sharding.rebalancer_max_receiving must be positive".to_string());
        }
        if group.sync_timeout.is_nan() || group.sync_timeout < 0.0 {
            return fail("sharding.sync_timeout must be non-negative".to_string());
        }
        if group.collect_bucket_garbage_interval.is_nan() || group.collect_bucket_garbage_interval <= 0.0 {
            return fail("sharding.collect_bucket_garbage_interval must be positive".to_string());
        }
        if group.rebalancer_disbalance_threshold.is_nan() || group.rebalancer_disbalance_threshold < 0.0 {
            return fail("sharding.rebalancer_disbalance_threshold must be non-negative".to_string());
        }
    }
    Ok(())
}

fn validate_sections(candidate: &ClusterConfig) -> Result<()> {
    if let Some(name) = candidate
        .custom
        .keys()
        .find(|k| SYSTEM_SECTIONS.contains(&k.as_str()))
    {
        return fail(format!("uploading system section \"{name}\" is forbidden"));
    }
    Ok(())
}

fn validate_auth(candidate: &ClusterConfig) -> Result<()> {
    let auth = &candidate.auth;
    if auth.cookie_renew_age > auth.cookie_max_age {
        return fail(format!(
            "auth.cookie_renew_age ({}) must not exceed auth.cookie_max_age ({})",
            auth.cookie_renew_age, auth.cookie_max_age
        ));
    }
    Ok(())
}
