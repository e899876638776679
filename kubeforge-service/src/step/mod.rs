// Steps Module
// The leaf unit of work and the context it runs in

pub mod command;
pub mod facts;
pub mod file;
pub mod func;

// Re-export built-in steps
pub use command::CommandStep;
pub use facts::GatherFactsStep;
pub use file::{FileContents, WriteFileStep};
pub use func::FnStep;

use crate::connector::{CommandOutput, Connector, ConnectorError, ExecOptions};
use crate::execution::RuntimeContext;
use crate::inventory::{Facts, Host};
use crate::plan::NodeId;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Stable identity of a step, used for node naming and logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMeta {
    pub name: String,
    pub description: String,
}

impl StepMeta {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Errors a step reports from `run`, `check` or `rollback`
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{message}")]
    Failed { message: String },

    #[error("transport error: {0}")]
    Transport(#[from] ConnectorError),

    #[error("step timed out after {0:?}")]
    Timeout(Duration),

    #[error("step cancelled")]
    Cancelled,
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Whether another attempt may succeed. Cancellation never retries.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            StepError::Cancelled | StepError::Transport(ConnectorError::Cancelled)
        )
    }
}

/// What a successful `run` reports back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    /// Whether the host was modified
    pub changed: bool,
    /// Short human-readable outcome
    pub message: Option<String>,
}

impl StepOutput {
    pub fn changed() -> Self {
        Self {
            changed: true,
            message: None,
        }
    }

    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Per-invocation context handed to every step call.
///
/// Cheap to clone: it holds the shared [`RuntimeContext`], the run's
/// cancellation token and the span the step should log into.
#[derive(Clone)]
pub struct StepContext {
    runtime: Arc<RuntimeContext>,
    node: NodeId,
    cancel: CancellationToken,
    attempt: u32,
    span: Span,
}

impl StepContext {
    pub fn new(runtime: Arc<RuntimeContext>, node: NodeId, cancel: CancellationToken) -> Self {
        let span = runtime.span(node.task(), node.step());
        Self {
            runtime,
            node,
            cancel,
            attempt: 1,
            span,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// 1-based attempt number of the current `run`
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn connector(&self, host: &Host) -> Result<Arc<dyn Connector>, StepError> {
        Ok(self.runtime.connector(&host.name)?)
    }

    /// Cached facts for `host`, gathered on first access
    pub async fn facts(&self, host: &Host) -> Result<Facts, StepError> {
        Ok(self.runtime.facts(host, &self.cancel).await?)
    }

    /// Run a command on `host`, turning a non-zero exit into an error
    pub async fn exec(
        &self,
        host: &Host,
        command: &str,
        options: &ExecOptions,
    ) -> Result<CommandOutput, StepError> {
        let connector = self.connector(host)?;
        let output = connector.execute(command, options, &self.cancel).await?;
        Ok(output.into_result(command)?)
    }

    /// Run a command on `host` and report whether it exited 0
    pub async fn probe(&self, host: &Host, command: &str) -> Result<bool, StepError> {
        let connector = self.connector(host)?;
        let output = connector
            .execute(command, &ExecOptions::default(), &self.cancel)
            .await?;
        Ok(output.success())
    }
}

impl fmt::Debug for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("node", &self.node)
            .field("attempt", &self.attempt)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// One well-defined operation against one host.
///
/// Failure is reported only through the returned `Result`; `run` must return
/// promptly once the context's cancellation token fires.
#[async_trait::async_trait]
pub trait Step: Send + Sync + fmt::Debug {
    fn meta(&self) -> &StepMeta;

    async fn run(&self, ctx: &StepContext, host: &Host) -> Result<StepOutput, StepError>;

    /// Idempotency probe; `true` means the host is already in the desired state
    async fn check(&self, _ctx: &StepContext, _host: &Host) -> Result<bool, StepError> {
        Ok(false)
    }

    /// Best-effort compensation after a dependent node failed
    async fn rollback(&self, _ctx: &StepContext, _host: &Host) -> Result<(), StepError> {
        Ok(())
    }

    /// What `run` would do on `host`, shown in dry-run mode
    fn describe(&self, _host: &Host) -> Option<String> {
        None
    }
}
