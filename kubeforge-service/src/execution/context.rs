// Runtime Context
// Read-only run state shared by every task and step: inventory, cluster settings, connectors and facts

use crate::config::ClusterConfig;
use crate::connector::{Connector, ConnectorError, ConnectorRegistry};
use crate::error::PlanningError;
use crate::inventory::{Facts, Host, Inventory};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Span};

/// Run-wide state, constructed once per run and never mutated by tasks or
/// steps.
///
/// The facts cache is filled lazily: the first access for a host gathers
/// facts through its connector, concurrent first accesses wait on the same
/// per-host cell.
#[derive(Debug)]
pub struct RuntimeContext {
    inventory: Inventory,
    cluster: ClusterConfig,
    connectors: ConnectorRegistry,
    facts: HashMap<String, Arc<OnceCell<Facts>>>,
}

impl RuntimeContext {
    pub fn new(inventory: Inventory, cluster: ClusterConfig, connectors: ConnectorRegistry) -> Self {
        let facts = inventory
            .hosts()
            .iter()
            .map(|h| (h.name.clone(), Arc::new(OnceCell::new())))
            .collect();
        Self {
            inventory,
            cluster,
            connectors,
            facts,
        }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn cluster(&self) -> &ClusterConfig {
        &self.cluster
    }

    pub fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    pub fn host(&self, name: &str) -> Option<Arc<Host>> {
        self.inventory.host(name).cloned()
    }

    pub fn hosts_with_role(&self, role: &str) -> Result<Vec<Arc<Host>>, PlanningError> {
        self.inventory.hosts_with_role(role)
    }

    /// Host used for run-once cluster operations
    pub fn control_host(&self) -> Option<Arc<Host>> {
        self.inventory.control_host().cloned()
    }

    /// Endpoint the API server is reached at
    pub fn control_plane_endpoint(&self) -> Option<String> {
        self.cluster
            .control_plane_endpoint
            .clone()
            .or_else(|| self.control_host().map(|h| format!("{}:6443", h.address)))
    }

    pub fn connector(&self, host: &str) -> Result<Arc<dyn Connector>, ConnectorError> {
        self.connectors.get(host)
    }

    /// Facts for `host`, gathered once per run
    pub async fn facts(&self, host: &Host, cancel: &CancellationToken) -> Result<Facts, ConnectorError> {
        let cell = self
            .facts
            .get(&host.name)
            .ok_or_else(|| ConnectorError::UnknownHost(host.name.clone()))?;
        let facts = cell
            .get_or_try_init(|| async {
                debug!(host = %host, "gathering facts");
                self.connector(&host.name)?.gather_facts(cancel).await
            })
            .await?;
        Ok(facts.clone())
    }

    /// Facts already in the cache, without gathering
    pub fn cached_facts(&self, host: &str) -> Option<Facts> {
        self.facts.get(host).and_then(|cell| cell.get().cloned())
    }

    /// Span bound to task and step identity for step logging
    pub fn span(&self, task: &str, step: &str) -> Span {
        info_span!("step", cluster = %self.cluster.name, task = %task, step = %step)
    }
}
