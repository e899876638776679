// Connectors Module
// Per-host remote execution and file transport consumed by steps

pub mod local;
pub mod memory;
pub mod ssh;

// Re-export key types
pub use local::LocalConnector;
pub use memory::MemoryConnector;
pub use ssh::{SshConfig, SshConnector};

use crate::inventory::{ConnectionKind, Facts, Host, Inventory, FACTS_PROBE};

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised by connector calls
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("command `{command}` exited with {}: {stderr}", format_exit(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("path not found: {path}")]
    NotFound { path: String },

    #[error("no connector registered for host '{0}'")]
    UnknownHost(String),

    #[error("invalid facts output: {0}")]
    InvalidFacts(String),
}

fn format_exit(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Options applied to a single command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Run the command with elevated privileges (sudo)
    pub elevated: bool,
    /// Abort the command after this long
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    pub fn elevated() -> Self {
        Self {
            elevated: true,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convert a non-zero exit into [`ConnectorError::CommandFailed`]
    pub fn into_result(self, command: &str) -> Result<CommandOutput, ConnectorError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ConnectorError::CommandFailed {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Transport to one host.
///
/// Every call must honor the cancellation token and return promptly once it
/// fires.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Host this connector talks to
    fn host(&self) -> &Host;

    /// Execute a shell command. A non-zero exit is reported through
    /// `CommandOutput::exit_code`, not as an error.
    async fn execute(
        &self,
        command: &str,
        options: &ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ConnectorError>;

    async fn read_file(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ConnectorError>;

    async fn write_file(
        &self,
        contents: &[u8],
        path: &str,
        mode: u32,
        elevated: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectorError>;

    async fn path_exists(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, ConnectorError>;

    /// Collect OS and hardware facts by running the facts probe
    async fn gather_facts(&self, cancel: &CancellationToken) -> Result<Facts, ConnectorError> {
        let output = self
            .execute(FACTS_PROBE, &ExecOptions::default(), cancel)
            .await?
            .into_result("gather facts")?;
        Facts::parse_probe(&output.stdout).map_err(ConnectorError::InvalidFacts)
    }
}

/// Wrap a command for sudo, quoting it for `sh -c`
pub(crate) fn elevate(command: &str) -> String {
    format!("sudo -n sh -c {}", shell_quote(command))
}

/// Single-quote a string for POSIX shells
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Registry resolving the connector for each host
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build connectors for every inventory host from its connection kind
    pub fn from_inventory(inventory: &Inventory, ssh: &SshConfig) -> Self {
        let mut registry = Self::new();
        for host in inventory.hosts() {
            let connector: Arc<dyn Connector> = match host.connection {
                ConnectionKind::Local => Arc::new(LocalConnector::new(host.as_ref().clone())),
                ConnectionKind::Ssh => Arc::new(SshConnector::with_config(
                    host.as_ref().clone(),
                    ssh.clone(),
                )),
            };
            registry.connectors.insert(host.name.clone(), connector);
        }
        registry
    }

    /// Register (or replace) the connector for its host
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors
            .insert(connector.host().name.clone(), connector);
    }

    pub fn with(mut self, connector: Arc<dyn Connector>) -> Self {
        self.register(connector);
        self
    }

    pub fn get(&self, host: &str) -> Result<Arc<dyn Connector>, ConnectorError> {
        self.connectors
            .get(host)
            .cloned()
            .ok_or_else(|| ConnectorError::UnknownHost(host.to_string()))
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut hosts: Vec<_> = self.connectors.keys().collect();
        hosts.sort();
        f.debug_struct("ConnectorRegistry")
            .field("hosts", &hosts)
            .finish()
    }
}
