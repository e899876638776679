// Configuration
// YAML configuration for cluster settings, engine limits, inventory and SSH

use crate::connector::{ConnectorRegistry, SshConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::execution::{EngineConfig, FailurePolicy, RetryPolicy, RuntimeContext};
use crate::inventory::{Host, Inventory};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub cluster: ClusterConfig,
    pub engine: EngineSettings,
    pub inventory: InventoryConfig,
    pub ssh: SshConfig,
}

/// Cluster-wide settings read by tasks while planning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub name: String,
    pub kubernetes_version: String,
    pub container_runtime: String,
    pub pod_cidr: String,
    pub service_cidr: String,
    pub cluster_domain: String,
    /// Remote directory for rendered artifacts
    pub work_dir: String,
    /// API server endpoint; defaults to the control host address
    pub control_plane_endpoint: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "kubeforge".to_string(),
            kubernetes_version: "v1.29.4".to_string(),
            container_runtime: "containerd".to_string(),
            pod_cidr: "10.244.0.0/16".to_string(),
            service_cidr: "10.96.0.0/12".to_string(),
            cluster_domain: "cluster.local".to_string(),
            work_dir: "/var/lib/kubeforge".to_string(),
            control_plane_endpoint: None,
        }
    }
}

/// Engine limits and policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// 0 = unlimited
    pub max_concurrency: usize,
    /// 0 = unlimited
    pub max_per_host: usize,
    pub failure_policy: FailurePolicy,
    pub rollback_on_failure: bool,
    pub retry: RetrySettings,
    /// Default per-attempt timeout; 0 disables it
    pub command_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            max_per_host: 2,
            failure_policy: FailurePolicy::FailFast,
            rollback_on_failure: false,
            retry: RetrySettings::default(),
            command_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
            .with_backoff(Duration::from_millis(self.initial_backoff_ms))
            .with_multiplier(self.multiplier)
            .with_max_backoff(Duration::from_millis(self.max_backoff_ms))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Pinned control host; otherwise the first control-plane host
    pub control_host: Option<String>,
    /// Extra roles that may be referenced without matching any host
    pub roles: Vec<String>,
    pub hosts: Vec<Host>,
}

impl FromStr for ForgeConfig {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: ForgeConfig = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl ForgeConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ServiceError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    pub fn parse_str(content: &str) -> ServiceResult<Self> {
        content.parse()
    }

    /// Reject inventories no run could use
    pub fn validate(&self) -> ServiceResult<()> {
        let mut seen = HashSet::new();
        for host in &self.inventory.hosts {
            if host.name.trim().is_empty() {
                return Err(ServiceError::config("host with an empty name"));
            }
            if !seen.insert(host.name.as_str()) {
                return Err(ServiceError::config(format!(
                    "duplicate host '{}'",
                    host.name
                )));
            }
            if host.address.trim().is_empty() {
                return Err(ServiceError::config(format!(
                    "host '{}' has an empty address",
                    host.name
                )));
            }
            if host.roles.is_empty() {
                return Err(ServiceError::config(format!(
                    "host '{}' has no roles",
                    host.name
                )));
            }
        }

        if let Some(control) = &self.inventory.control_host {
            if !seen.contains(control.as_str()) {
                return Err(ServiceError::config(format!(
                    "control host '{}' is not in the inventory",
                    control
                )));
            }
        }
        Ok(())
    }

    pub fn inventory(&self) -> ServiceResult<Inventory> {
        let mut inventory = Inventory::new(self.inventory.hosts.clone())?
            .with_roles(self.inventory.roles.iter().cloned());
        if let Some(control) = &self.inventory.control_host {
            inventory = inventory.with_control_host(control.clone())?;
        }
        Ok(inventory)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let settings = &self.engine;
        EngineConfig {
            max_concurrency: settings.max_concurrency,
            max_per_host: settings.max_per_host,
            default_retry: settings.retry.policy(),
            default_timeout: match settings.command_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            rollback_on_failure: settings.rollback_on_failure,
        }
    }

    /// Resolve the inventory and connectors into a run context
    pub fn runtime_context(&self) -> ServiceResult<RuntimeContext> {
        let inventory = self.inventory()?;
        let connectors = ConnectorRegistry::from_inventory(&inventory, &self.ssh);
        Ok(RuntimeContext::new(inventory, self.cluster.clone(), connectors))
    }
}

/// `~/.kubeforge/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kubeforge")
        .join("config.yaml")
}
