use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::RoleContext;
use super::RoleDefinition;
use crate::topology::ClusterConfig;
use crate::topology::RoleCatalog;
use crate::Error;
use crate::Result;
use crate::RoutingError;

/// Public view of a registered role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub name: String,
    pub dependencies: Vec<String>,
}

/// Static set of roles this node can run, plus the ones currently running.
///
/// Roles are kept in registration order; `order` holds their indexes sorted
/// so that every role comes after its dependencies.
pub struct RoleRegistry {
    roles: Vec<RoleDefinition>,
    index: HashMap<String, usize>,
    order: Vec<usize>,
    /// Running roles, in start order
    active: Mutex<Vec<String>>,
    running: RwLock<HashSet<String>>,
}

impl std::fmt::Debug for RoleRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RoleRegistry")
            .field("roles", &self.roles.iter().map(|r| &r.name).collect::<Vec<_>>())
            .finish()
    }
}

impl RoleRegistry {
    /// Registers `roles` in the given order.
    ///
    /// # Errors
    /// Duplicate names, dependencies on unregistered roles and dependency
    /// cycles are rejected with [`Error::Validation`].
    pub fn new(roles: Vec<RoleDefinition>) -> Result<Self> {
        let mut index = HashMap::with_capacity(roles.len());
        for (i, role) in roles.iter().enumerate() {
            if index.insert(role.name.clone(), i).is_some() {
                return Err(Error::Validation(format!("Role \"{}\" is registered twice", role.name)));
            }
        }
        for role in &roles {
            if let Some(dep) = role.dependencies.iter().find(|d| !index.contains_key(*d)) {
                return Err(Error::Validation(format!(
                    "Role \"{}\" depends on unknown role \"{dep}\"",
                    role.name
                )));
            }
        }

        let order = topological_order(&roles, &index)?;
        debug!(?order, "role order resolved");

        Ok(Self {
            roles,
            index,
            order,
            active: Mutex::new(Vec::new()),
            running: RwLock::new(HashSet::new()),
        })
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<&RoleDefinition> {
        self.index.get(name).map(|&i| &self.roles[i])
    }

    /// Registered roles in registration order
    pub fn known_roles(&self) -> Vec<RoleInfo> {
        self.roles
            .iter()
            .map(|r| RoleInfo {
                name: r.name.clone(),
                dependencies: r.dependencies.clone(),
            })
            .collect()
    }

    /// Explicit roles plus their transitive dependencies, dependencies first.
    /// Unknown names are dropped.
    pub fn closure<'a, I>(
        &self,
        roles: I,
    ) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut wanted: HashSet<usize> = HashSet::new();
        let mut stack: Vec<usize> = roles.into_iter().filter_map(|r| self.index.get(r).copied()).collect();
        while let Some(i) = stack.pop() {
            if wanted.insert(i) {
                stack.extend(self.roles[i].dependencies.iter().filter_map(|d| self.index.get(d).copied()));
            }
        }
        self.order
            .iter()
            .filter(|i| wanted.contains(i))
            .map(|&i| self.roles[i].name.clone())
            .collect()
    }

    pub fn is_running(
        &self,
        role: &str,
    ) -> bool {
        self.running.read().contains(role)
    }

    /// Running roles in start order
    pub async fn active_roles(&self) -> Vec<String> {
        self.active.lock().await.clone()
    }

    /// Asks every registered role whether `new` may replace `old`.
    pub async fn validate_config(
        &self,
        new: &ClusterConfig,
        old: &ClusterConfig,
    ) -> Result<()> {
        for &i in &self.order {
            self.roles[i].hooks.validate_config(new, old).await?;
        }
        Ok(())
    }

    /// Brings the running set to `desired` (a dependency-ordered closure).
    ///
    /// Removed roles are stopped in reverse start order; a failing stop is
    /// logged and the role is considered stopped. Added roles are started in
    /// dependency order, then every running role gets `apply_config`.
    pub async fn reconcile(
        &self,
        desired: &[String],
        ctx: &RoleContext,
    ) -> Result<()> {
        let mut active = self.active.lock().await;

        let removed: Vec<String> = active.iter().rev().filter(|r| !desired.contains(r)).cloned().collect();
        for name in removed {
            if let Some(role) = self.get(&name) {
                if let Err(e) = role.hooks.stop().await {
                    error!(role = %name, ?e, "role stop failed");
                }
            }
            active.retain(|r| *r != name);
            self.running.write().remove(&name);
            info!(role = %name, "role stopped");
        }

        for name in desired {
            if active.contains(name) {
                continue;
            }
            let Some(role) = self.get(name) else {
                continue;
            };
            role.hooks.init(ctx).await?;
            active.push(name.clone());
            self.running.write().insert(name.clone());
            info!(role = %name, "role started");
        }

        for name in active.iter() {
            if let Some(role) = self.get(name) {
                role.hooks.apply_config(ctx).await?;
            }
        }
        Ok(())
    }

    /// Stops every running role, dependents first.
    pub async fn stop_all(&self) {
        let mut active = self.active.lock().await;
        while let Some(name) = active.pop() {
            if let Some(role) = self.get(&name) {
                if let Err(e) = role.hooks.stop().await {
                    error!(role = %name, ?e, "role stop failed");
                }
            }
            self.running.write().remove(&name);
        }
    }

    /// Runs a method of a role on this node.
    pub async fn invoke_local(
        &self,
        role: &str,
        method: &str,
        args: Value,
    ) -> Result<Value> {
        let Some(definition) = self.get(role) else {
            return Err(RoutingError::RoleNotRunning { role: role.to_string() }.into());
        };
        let Some(handler) = definition.methods.get(method) else {
            return Err(RoutingError::MethodNotFound {
                role: role.to_string(),
                method: method.to_string(),
            }
            .into());
        };
        if !self.is_running(role) {
            return Err(RoutingError::RoleNotRunning { role: role.to_string() }.into());
        }
        handler(args).await
    }
}

impl RoleCatalog for RoleRegistry {
    fn is_known(
        &self,
        role: &str,
    ) -> bool {
        self.index.contains_key(role)
    }

    fn closure(
        &self,
        roles: &BTreeSet<String>,
    ) -> Vec<String> {
        RoleRegistry::closure(self, roles)
    }
}

/// Depth-first post-order over registration order: dependencies first,
/// independent roles keep their registration order.
fn topological_order(
    roles: &[RoleDefinition],
    index: &HashMap<String, usize>,
) -> Result<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Visiting,
        Done,
    }

    fn visit(
        i: usize,
        roles: &[RoleDefinition],
        index: &HashMap<String, usize>,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<()> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                let start = path.iter().position(|&p| p == i).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].iter().map(|&p| roles[p].name.as_str()).collect();
                cycle.push(roles[i].name.as_str());
                return Err(Error::Validation(format!(
                    "Role dependency cycle: {}",
                    cycle.join(" -> ")
                )));
            }
            Mark::New => {}
        }
        marks[i] = Mark::Visiting;
        path.push(i);
        for dep in &roles[i].dependencies {
            if let Some(&d) = index.get(dep) {
                visit(d, roles, index, marks, path, order)?;
            }
        }
        path.pop();
        marks[i] = Mark::Done;
        order.push(i);
        Ok(())
    }

    let mut marks = vec![Mark::New; roles.len()];
    let mut order = Vec::with_capacity(roles.len());
    let mut path = Vec::new();
    for i in 0..roles.len() {
        visit(i, roles, index, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}
