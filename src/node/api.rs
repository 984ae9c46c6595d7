//! Operator API of a node.
//!
//! Every mutation builds a [`TopologyPatch`], which the replicator applies to
//! the committed snapshot, validates and replicates clusterwide. Queries read
//! the committed snapshot, the active leaders and membership liveness.

use std::collections::HashMap;
use std::sync::Arc;

use autometrics::autometrics;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::views::ReplicasetView;
use super::views::SelfView;
use super::views::ServerView;
use super::views::ShardingGroupView;
use super::views::UserView;
use super::Node;
use crate::auth::hash_password;
use crate::constants::SHARDING_ROUTER_ROLE;
use crate::constants::SHARDING_STORAGE_ROLE;
use crate::constants::SUPERUSER;
use crate::roles::RoleInfo;
use crate::topology::parse_sections;
use crate::topology::validate;
use crate::topology::AuthParams;
use crate::topology::AuthParamsPatch;
use crate::topology::ClusterConfig;
use crate::topology::Label;
use crate::topology::ReplicasetPatch;
use crate::topology::ServerPatch;
use crate::topology::ShardingGroupPatch;
use crate::topology::TopologyContext;
use crate::topology::TopologyPatch;
use crate::topology::UserPatch;
use crate::topology::UserRecord;
use crate::utils::async_task::retry_with_backoff;
use crate::Error;
use crate::ReplicationError;
use crate::Result;
use crate::API_SLO;

const SUPERUSER_FULLNAME: &str = "Cluster Administrator";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JoinServerRequest {
    pub uri: String,
    /// Generated when absent
    pub instance_uuid: Option<String>,
    /// Generated when absent; an unknown uuid creates the replicaset
    pub replicaset_uuid: Option<String>,
    pub replicaset_alias: Option<String>,
    pub roles: Option<Vec<String>>,
    pub replicaset_weight: Option<f64>,
    pub sharding_group: Option<String>,
    pub labels: Vec<Label>,
}

impl JoinServerRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UserRequest {
    pub username: String,
    pub password: Option<String>,
    pub fullname: Option<String>,
    pub email: Option<String>,
}

impl Node {
    /// Validation context: known uris and per-replicaset bucket counts, both
    /// taken from membership
    fn topology_context(&self) -> TopologyContext<'_> {
        let cfg = self.store.current();
        let members = self.membership.members();

        let mut buckets: HashMap<String, u64> = HashMap::new();
        for member in &members {
            let Some(server) = member.payload.uuid.as_deref().and_then(|u| cfg.server(u)) else {
                continue;
            };
            let count = buckets.entry(server.replicaset_uuid.clone()).or_default();
            *count = (*count).max(member.payload.buckets);
        }

        TopologyContext::new(self.registry.as_ref())
            .with_known_uris(members.into_iter().map(|m| m.uri))
            .with_bucket_counts(buckets)
    }

    async fn patch_clusterwide(
        &self,
        patch: TopologyPatch,
    ) -> Result<Arc<ClusterConfig>> {
        let ctx = self.topology_context();
        self.replicator
            .patch_clusterwide(|current| {
                let candidate = patch.apply(current, &ctx)?;
                validate(&candidate, current, &ctx)?;
                Ok(candidate)
            })
            .await
    }

    fn ensure_bootstrapped(&self) -> Result<()> {
        if !self.store.current().is_bootstrapped() {
            return Err(ReplicationError::NotBootstrapped.into());
        }
        Ok(())
    }

    // -
    // Topology mutations

    /// Adds a server to the topology and returns its uuid.
    ///
    /// On an unconfigured node only its own advertise uri can be joined; doing
    /// so bootstraps the cluster with version 1.
    #[autometrics(objective = API_SLO)]
    pub async fn join_server(
        &self,
        req: JoinServerRequest,
    ) -> Result<String> {
        if !self.store.current().is_bootstrapped() && req.uri != self.self_uri() {
            return Err(Error::Validation(format!(
                "Invalid attempt to call join_server(). This instance isn't bootstrapped yet and advertises uri=\"{}\" while you are joining uri=\"{}\".",
                self.self_uri(),
                req.uri
            )));
        }

        retry_with_backoff(|| self.membership.probe(&req.uri), self.settings.retry.join_probe)
            .await?;

        let alias = self
            .membership
            .members()
            .into_iter()
            .find(|m| m.uri == req.uri)
            .map(|m| m.payload.alias)
            .unwrap_or_default();
        let uuid = req.instance_uuid.unwrap_or_else(|| Uuid::new_v4().to_string());
        let replicaset_uuid = req.replicaset_uuid.unwrap_or_else(|| Uuid::new_v4().to_string());

        let patch = TopologyPatch {
            servers: vec![ServerPatch::Join {
                uri: req.uri.clone(),
                uuid: uuid.clone(),
                replicaset_uuid: replicaset_uuid.clone(),
                alias,
                labels: req.labels,
            }],
            replicasets: vec![ReplicasetPatch {
                uuid: replicaset_uuid,
                alias: req.replicaset_alias,
                roles: req.roles,
                weight: req.replicaset_weight,
                sharding_group: req.sharding_group,
                ..Default::default()
            }],
            ..Default::default()
        };
        let cfg = self.patch_clusterwide(patch).await?;
        info!(%uuid, version = cfg.version, "server joined");
        Ok(uuid)
    }

    #[autometrics(objective = API_SLO)]
    pub async fn edit_server(
        &self,
        uuid: &str,
        uri: Option<String>,
        labels: Option<Vec<Label>>,
    ) -> Result<()> {
        self.ensure_bootstrapped()?;
        let patch = TopologyPatch {
            servers: vec![ServerPatch::Edit {
                uuid: uuid.to_string(),
                uri,
                labels,
                disabled: None,
            }],
            ..Default::default()
        };
        self.patch_clusterwide(patch).await?;
        Ok(())
    }

    /// Removes a server for good. Its uuid can never join again.
    #[autometrics(objective = API_SLO)]
    pub async fn expel_server(
        &self,
        uuid: &str,
    ) -> Result<()> {
        self.ensure_bootstrapped()?;
        let patch = TopologyPatch {
            servers: vec![ServerPatch::Expel { uuid: uuid.to_string() }],
            ..Default::default()
        };
        self.patch_clusterwide(patch).await?;
        info!(%uuid, "server expelled");
        Ok(())
    }

    #[autometrics(objective = API_SLO)]
    pub async fn edit_replicaset(
        &self,
        patch: ReplicasetPatch,
    ) -> Result<()> {
        self.ensure_bootstrapped()?;
        let patch = TopologyPatch {
            replicasets: vec![patch],
            ..Default::default()
        };
        self.patch_clusterwide(patch).await?;
        Ok(())
    }

    #[autometrics(objective = API_SLO)]
    pub async fn set_failover(
        &self,
        enabled: bool,
    ) -> Result<bool> {
        self.ensure_bootstrapped()?;
        let patch = TopologyPatch {
            failover: Some(enabled),
            ..Default::default()
        };
        self.patch_clusterwide(patch).await?;
        Ok(enabled)
    }

    /// Pings `uri` once; a successful probe makes it a known member.
    pub async fn probe_server(
        &self,
        uri: &str,
    ) -> Result<()> {
        self.membership.probe(uri).await
    }

    #[autometrics(objective = API_SLO)]
    pub async fn disable_servers(
        &self,
        uuids: &[String],
    ) -> Result<Vec<ServerView>> {
        self.set_disabled(uuids, true).await
    }

    #[autometrics(objective = API_SLO)]
    pub async fn enable_servers(
        &self,
        uuids: &[String],
    ) -> Result<Vec<ServerView>> {
        self.set_disabled(uuids, false).await
    }

    async fn set_disabled(
        &self,
        uuids: &[String],
        disabled: bool,
    ) -> Result<Vec<ServerView>> {
        self.ensure_bootstrapped()?;
        let patch = TopologyPatch {
            servers: uuids
                .iter()
                .map(|uuid| ServerPatch::Edit {
                    uuid: uuid.clone(),
                    uri: None,
                    labels: None,
                    disabled: Some(disabled),
                })
                .collect(),
            ..Default::default()
        };
        self.patch_clusterwide(patch).await?;
        Ok(self
            .servers(None)
            .into_iter()
            .filter(|s| s.uuid.as_ref().map(|u| uuids.contains(u)).unwrap_or(false))
            .collect())
    }

    #[autometrics(objective = API_SLO)]
    pub async fn edit_sharding_group(
        &self,
        patch: ShardingGroupPatch,
    ) -> Result<()> {
        self.ensure_bootstrapped()?;
        let patch = TopologyPatch {
            sharding_groups: vec![patch],
            ..Default::default()
        };
        self.patch_clusterwide(patch).await?;
        Ok(())
    }

    /// Marks every group that can be bootstrapped as bootstrapped.
    #[autometrics(objective = API_SLO)]
    pub async fn bootstrap_sharding(&self) -> Result<Vec<String>> {
        self.ensure_bootstrapped()?;
        let cfg = self.store.current();
        let groups = self.bootstrappable_groups(&cfg);
        if groups.is_empty() {
            if !cfg.sharding_groups.is_empty() && cfg.sharding_groups.values().all(|g| g.bootstrapped) {
                return Err(Error::Validation("Sharding is already bootstrapped".to_string()));
            }
            return Err(Error::Validation(
                "Sharding config is empty. Maybe you have no instances with sharding-storage role enabled?"
                    .to_string(),
            ));
        }
        let patch = TopologyPatch {
            sharding_groups: groups
                .iter()
                .map(|name| ShardingGroupPatch {
                    name: name.clone(),
                    bootstrapped: Some(true),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        self.patch_clusterwide(patch).await?;
        info!(?groups, "sharding bootstrapped");
        Ok(groups)
    }

    // -
    // Custom config sections

    /// Replaces every custom section with the top-level keys of `document`,
    /// a JSON object. Section bodies are stored as uploaded.
    #[autometrics(objective = API_SLO)]
    pub async fn upload_config(
        &self,
        document: &str,
    ) -> Result<()> {
        self.ensure_bootstrapped()?;
        let patch = TopologyPatch {
            custom: Some(parse_sections(document)?),
            ..Default::default()
        };
        self.patch_clusterwide(patch).await?;
        Ok(())
    }

    /// Custom sections of the committed document, as one JSON object
    pub fn get_config(&self) -> String {
        self.store.current().custom_document()
    }

    // -
    // Auth

    /// `actor` is the authenticated user, if any. Enabling auth requires one,
    /// so the operator can't lock themselves out.
    #[autometrics(objective = API_SLO)]
    pub async fn edit_auth_params(
        &self,
        params: AuthParamsPatch,
        actor: Option<&str>,
    ) -> Result<AuthParams> {
        self.ensure_bootstrapped()?;
        if params.enabled == Some(true) && actor.is_none() {
            return Err(Error::Validation("You must log in to enable authentication".to_string()));
        }
        let patch = TopologyPatch {
            auth: Some(params),
            ..Default::default()
        };
        let cfg = self.patch_clusterwide(patch).await?;
        Ok(cfg.auth.clone())
    }

    #[autometrics(objective = API_SLO)]
    pub async fn add_user(
        &self,
        req: UserRequest,
    ) -> Result<UserView> {
        self.ensure_bootstrapped()?;
        if req.username == SUPERUSER {
            return Err(Error::Validation(format!(
                "add_user() can't override integrated superuser '{SUPERUSER}'"
            )));
        }
        let password = req.password.unwrap_or_default();
        let user = UserRecord {
            username: req.username,
            fullname: req.fullname,
            email: req.email,
            password_hash: hash_password(&password)?,
            version: 1,
        };
        let view = UserView::from(&user);
        let patch = TopologyPatch {
            users: vec![UserPatch::Add(user)],
            ..Default::default()
        };
        self.patch_clusterwide(patch).await?;
        Ok(view)
    }

    #[autometrics(objective = API_SLO)]
    pub async fn edit_user(
        &self,
        req: UserRequest,
    ) -> Result<UserView> {
        self.ensure_bootstrapped()?;
        if req.username == SUPERUSER {
            return Err(Error::Validation(format!(
                "edit_user() can't change integrated superuser '{SUPERUSER}'"
            )));
        }
        let password_hash = match &req.password {
            Some(password) => Some(hash_password(password)?),
            None => None,
        };
        let patch = TopologyPatch {
            users: vec![UserPatch::Edit {
                username: req.username.clone(),
                fullname: req.fullname,
                email: req.email,
                password_hash,
            }],
            ..Default::default()
        };
        let cfg = self.patch_clusterwide(patch).await?;
        cfg.users_acl
            .get(&req.username)
            .map(UserView::from)
            .ok_or_else(|| Error::Validation("User not found".to_string()))
    }

    /// Removes a user and drops their sessions on this node. Sessions on other
    /// nodes are rejected on their next lookup.
    #[autometrics(objective = API_SLO)]
    pub async fn remove_user(
        &self,
        username: &str,
        actor: Option<&str>,
    ) -> Result<UserView> {
        self.ensure_bootstrapped()?;
        if username == SUPERUSER {
            return Err(Error::Validation(format!(
                "remove_user() can't delete integrated superuser '{SUPERUSER}'"
            )));
        }
        if actor == Some(username) {
            return Err(Error::Validation("user can not remove themselves".to_string()));
        }
        let view = self
            .store
            .current()
            .users_acl
            .get(username)
            .map(UserView::from)
            .ok_or_else(|| Error::Validation("User not found".to_string()))?;
        let patch = TopologyPatch {
            users: vec![UserPatch::Remove {
                username: username.to_string(),
            }],
            ..Default::default()
        };
        self.patch_clusterwide(patch).await?;
        self.gate.sessions().remove_user(username);
        Ok(view)
    }

    /// The integrated superuser first, then replicated users by name
    pub fn list_users(&self) -> Vec<UserView> {
        let cfg = self.store.current();
        let superuser = UserView {
            username: SUPERUSER.to_string(),
            fullname: Some(SUPERUSER_FULLNAME.to_string()),
            email: None,
        };
        std::iter::once(superuser)
            .chain(cfg.users_acl.values().map(UserView::from))
            .collect()
    }

    pub fn auth_params(&self) -> AuthParams {
        self.gate.params()
    }

    // -
    // Queries

    fn effective_roles<'a, I>(
        &self,
        roles: I,
    ) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.registry.closure(roles)
    }

    /// Configured servers, then members that are not part of the topology.
    /// With `uuid` set, only that configured server.
    pub fn servers(
        &self,
        uuid: Option<&str>,
    ) -> Vec<ServerView> {
        let cfg = self.store.current();
        let mut views: Vec<ServerView> = cfg
            .active_servers()
            .filter(|s| uuid.map(|u| u == s.uuid).unwrap_or(true))
            .map(|s| {
                let rs = cfg.replicaset(&s.replicaset_uuid);
                let roles = rs.map(|rs| self.effective_roles(&rs.roles)).unwrap_or_default();
                ServerView::configured(s, rs, roles, self.membership.is_alive(&s.uri))
            })
            .collect();

        if uuid.is_none() {
            let mut members = self.membership.members();
            members.sort_by(|a, b| a.uri.cmp(&b.uri));
            views.extend(
                members
                    .into_iter()
                    .filter(|m| cfg.server_by_uri(&m.uri).is_none())
                    .map(|m| {
                        let alias = Some(m.payload.alias.clone()).filter(|a| !a.is_empty());
                        ServerView::unconfigured(&m.uri, alias, m.is_alive())
                    }),
            );
        }
        views
    }

    pub fn replicasets(
        &self,
        uuid: Option<&str>,
    ) -> Vec<ReplicasetView> {
        let cfg = self.store.current();
        let leaders = self.failover.active_leaders();
        cfg.topology
            .replicasets
            .values()
            .filter(|rs| uuid.map(|u| u == rs.uuid).unwrap_or(true))
            .map(|rs| {
                ReplicasetView::build(&cfg, rs, self.effective_roles(&rs.roles), &leaders, |uri| {
                    self.membership.is_alive(uri)
                })
            })
            .collect()
    }

    pub fn cluster_self(&self) -> SelfView {
        let cfg = self.store.current();
        let server = cfg.server_by_uri(self.self_uri());
        let alias = server
            .map(|s| s.alias.clone())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| self.settings.node.alias.clone());
        SelfView {
            uri: self.self_uri().to_string(),
            uuid: server.map(|s| s.uuid.clone()),
            alias,
        }
    }

    pub fn failover_enabled(&self) -> bool {
        self.store.current().topology.failover
    }

    pub fn known_roles(&self) -> Vec<RoleInfo> {
        self.registry.known_roles()
    }

    /// Groups that are not bootstrapped yet and have a storage with weight
    /// in them, provided the cluster runs a router somewhere.
    fn bootstrappable_groups(
        &self,
        cfg: &ClusterConfig,
    ) -> Vec<String> {
        if !cfg.is_bootstrapped() {
            return Vec::new();
        }
        let replicasets: Vec<_> = cfg
            .topology
            .replicasets
            .values()
            .map(|rs| (rs, self.effective_roles(&rs.roles)))
            .collect();
        let has_router = replicasets
            .iter()
            .any(|(_, roles)| roles.iter().any(|r| r == SHARDING_ROUTER_ROLE));
        if !has_router {
            return Vec::new();
        }
        cfg.sharding_groups
            .iter()
            .filter(|(_, group)| !group.bootstrapped)
            .filter(|(name, _)| {
                replicasets.iter().any(|(rs, roles)| {
                    rs.sharding_group.as_ref() == Some(*name)
                        && rs.weight > 0.0
                        && roles.iter().any(|r| r == SHARDING_STORAGE_ROLE)
                })
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn can_bootstrap_sharding(&self) -> bool {
        !self.bootstrappable_groups(&self.store.current()).is_empty()
    }

    pub fn sharding_groups(&self) -> Vec<ShardingGroupView> {
        self.store
            .current()
            .sharding_groups
            .iter()
            .map(|(name, group)| ShardingGroupView::new(name, group))
            .collect()
    }

    /// Total buckets over every group
    pub fn sharding_bucket_count(&self) -> u64 {
        self.store
            .current()
            .sharding_groups
            .values()
            .map(|g| g.bucket_count)
            .sum()
    }

    pub fn sharding_known_groups(&self) -> Vec<String> {
        self.store.current().sharding_groups.keys().cloned().collect()
    }
}
