// Host Inventory
// Resolved hosts, role memberships and the per-host facts model

pub mod facts;

pub use facts::{Facts, InitSystem, OsInfo, PackageManager, FACTS_PROBE};

use crate::error::PlanningError;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Well-known role names
pub struct Role;

impl Role {
    pub const ETCD: &'static str = "etcd";
    pub const CONTROL_PLANE: &'static str = "control-plane";
    pub const WORKER: &'static str = "worker";
    pub const LOAD_BALANCER: &'static str = "loadbalancer";
    pub const REGISTRY: &'static str = "registry";

    /// Roles every inventory understands, even when no host carries them
    pub const STANDARD: [&'static str; 5] = [
        Self::ETCD,
        Self::CONTROL_PLANE,
        Self::WORKER,
        Self::LOAD_BALANCER,
        Self::REGISTRY,
    ];
}

/// How the engine reaches a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    #[default]
    Ssh,
    Local,
}

/// A single machine taking part in the cluster.
///
/// Hosts are immutable once the inventory is resolved and are shared as
/// `Arc<Host>` handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Inventory name, unique per run
    pub name: String,
    /// Network address used by connectors
    pub address: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user
    #[serde(default = "default_user")]
    pub user: String,
    /// Role memberships
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Transport used to reach the host
    #[serde(default)]
    pub connection: ConnectionKind,
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "root".to_string()
}

impl Host {
    /// Create a host reachable over SSH with default port and user
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port: default_port(),
            user: default_user(),
            roles: BTreeSet::new(),
            connection: ConnectionKind::Ssh,
        }
    }

    /// Create a host that runs commands on the local machine
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            connection: ConnectionKind::Local,
            ..Self::new(name, "127.0.0.1")
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The resolved set of hosts for one run
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    hosts: Vec<Arc<Host>>,
    by_name: HashMap<String, usize>,
    extra_roles: BTreeSet<String>,
    control_host: Option<String>,
}

impl Inventory {
    /// Build an inventory, rejecting duplicate host names
    pub fn new(hosts: Vec<Host>) -> Result<Self, PlanningError> {
        let mut inventory = Self::default();
        for host in hosts {
            if inventory.by_name.contains_key(&host.name) {
                return Err(PlanningError::invalid(format!(
                    "host '{}' is declared more than once",
                    host.name
                )));
            }
            inventory
                .by_name
                .insert(host.name.clone(), inventory.hosts.len());
            inventory.hosts.push(Arc::new(host));
        }
        Ok(inventory)
    }

    /// Declare additional roles that may legitimately match no host
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Pin the control host instead of deriving it from roles
    pub fn with_control_host(mut self, name: impl Into<String>) -> Result<Self, PlanningError> {
        let name = name.into();
        if !self.by_name.contains_key(&name) {
            return Err(PlanningError::invalid(format!(
                "control host '{}' is not in the inventory",
                name
            )));
        }
        self.control_host = Some(name);
        Ok(self)
    }

    pub fn hosts(&self) -> &[Arc<Host>] {
        &self.hosts
    }

    pub fn host(&self, name: &str) -> Option<&Arc<Host>> {
        self.by_name.get(name).map(|&idx| &self.hosts[idx])
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether a role name is known to this inventory
    pub fn is_known_role(&self, role: &str) -> bool {
        Role::STANDARD.contains(&role)
            || self.extra_roles.contains(role)
            || self.hosts.iter().any(|h| h.has_role(role))
    }

    /// Hosts carrying `role`, in declaration order.
    ///
    /// A known role with no members yields an empty list; an undeclared role
    /// is a planning error.
    pub fn hosts_with_role(&self, role: &str) -> Result<Vec<Arc<Host>>, PlanningError> {
        if !self.is_known_role(role) {
            return Err(PlanningError::UnresolvedRole {
                role: role.to_string(),
            });
        }
        Ok(self
            .hosts
            .iter()
            .filter(|h| h.has_role(role))
            .cloned()
            .collect())
    }

    /// Hosts carrying any of `roles`, deduplicated, in declaration order
    pub fn hosts_with_any_role<S: AsRef<str>>(
        &self,
        roles: &[S],
    ) -> Result<Vec<Arc<Host>>, PlanningError> {
        for role in roles {
            if !self.is_known_role(role.as_ref()) {
                return Err(PlanningError::UnresolvedRole {
                    role: role.as_ref().to_string(),
                });
            }
        }
        Ok(self
            .hosts
            .iter()
            .filter(|h| roles.iter().any(|r| h.has_role(r.as_ref())))
            .cloned()
            .collect())
    }

    /// The host used for cluster-wide, run-once operations
    pub fn control_host(&self) -> Option<&Arc<Host>> {
        if let Some(name) = &self.control_host {
            return self.host(name);
        }
        self.hosts
            .iter()
            .find(|h| h.has_role(Role::CONTROL_PLANE))
            .or_else(|| self.hosts.first())
    }
}
