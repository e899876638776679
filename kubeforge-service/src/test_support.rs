// Test Fixtures
// In-memory hosts and runtime contexts shared by unit tests

use crate::config::ClusterConfig;
use crate::connector::{ConnectorRegistry, MemoryConnector};
use crate::execution::RuntimeContext;
use crate::inventory::{Facts, Host, Inventory, OsInfo, PackageManager, InitSystem};

use std::sync::Arc;

type Configure = Box<dyn FnOnce(MemoryConnector) -> MemoryConnector>;

pub(crate) struct MemoryHost {
    host: Host,
    configure: Configure,
}

impl MemoryHost {
    pub(crate) fn with_roles(mut self, roles: &[&str]) -> Self {
        self.host = self.host.with_roles(roles.iter().copied());
        self
    }
}

/// A host backed by a [`MemoryConnector`] customised by `configure`
pub(crate) fn memory_host(
    name: &str,
    configure: impl FnOnce(MemoryConnector) -> MemoryConnector + 'static,
) -> MemoryHost {
    MemoryHost {
        host: Host::new(name, format!("{}.test", name)),
        configure: Box::new(configure),
    }
}

pub(crate) fn plain_host(name: &str) -> MemoryHost {
    memory_host(name, |c| c)
}

pub(crate) fn runtime_with(hosts: Vec<MemoryHost>) -> (Arc<RuntimeContext>, Vec<Arc<MemoryConnector>>) {
    runtime_with_config(hosts, ClusterConfig::default())
}

pub(crate) fn runtime_with_config(
    hosts: Vec<MemoryHost>,
    cluster: ClusterConfig,
) -> (Arc<RuntimeContext>, Vec<Arc<MemoryConnector>>) {
    let mut registry = ConnectorRegistry::new();
    let mut connectors = Vec::new();
    let mut inventory_hosts = Vec::new();

    for MemoryHost { host, configure } in hosts {
        let connector = Arc::new(configure(MemoryConnector::new(host.clone())));
        registry.register(connector.clone());
        connectors.push(connector);
        inventory_hosts.push(host);
    }

    let inventory = Inventory::new(inventory_hosts).unwrap();
    let runtime = RuntimeContext::new(inventory, cluster, registry);
    (Arc::new(runtime), connectors)
}

pub(crate) fn sample_facts(hostname: &str) -> Facts {
    Facts {
        hostname: hostname.to_string(),
        os: OsInfo {
            id: "ubuntu".to_string(),
            version_id: "22.04".to_string(),
            pretty_name: "Ubuntu 22.04.4 LTS".to_string(),
        },
        kernel: "5.15.0-105-generic".to_string(),
        arch: "x86_64".to_string(),
        package_manager: PackageManager::Apt,
        init_system: InitSystem::Systemd,
        cpu_cores: 4,
        memory_mb: 7946,
    }
}
