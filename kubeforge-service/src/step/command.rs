// Command Step
// Runs a shell command on each target host

use crate::connector::ExecOptions;
use crate::inventory::Host;
use crate::step::{Step, StepContext, StepError, StepMeta, StepOutput};

use std::time::Duration;
use tracing::debug;

/// Shell command with optional idempotency probe and undo command
#[derive(Debug, Clone)]
pub struct CommandStep {
    meta: StepMeta,
    command: String,
    elevated: bool,
    check_command: Option<String>,
    rollback_command: Option<String>,
    timeout: Option<Duration>,
}

impl CommandStep {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            meta: StepMeta::new(name, format!("run `{}`", command)),
            command,
            elevated: false,
            check_command: None,
            rollback_command: None,
            timeout: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }

    /// Run through sudo
    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    /// Skip `run` when this command exits 0
    pub fn with_check(mut self, command: impl Into<String>) -> Self {
        self.check_command = Some(command.into());
        self
    }

    pub fn with_rollback(mut self, command: impl Into<String>) -> Self {
        self.rollback_command = Some(command.into());
        self
    }

    /// Per-command timeout passed to the connector
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn options(&self) -> ExecOptions {
        ExecOptions {
            elevated: self.elevated,
            timeout: self.timeout,
        }
    }
}

#[async_trait::async_trait]
impl Step for CommandStep {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> Result<StepOutput, StepError> {
        let output = ctx.exec(host, &self.command, &self.options()).await?;
        debug!(parent: ctx.span(), host = %host, stdout = %output.stdout.trim(), "command finished");
        Ok(StepOutput::changed())
    }

    async fn check(&self, ctx: &StepContext, host: &Host) -> Result<bool, StepError> {
        match &self.check_command {
            Some(check) => ctx.probe(host, check).await,
            None => Ok(false),
        }
    }

    async fn rollback(&self, ctx: &StepContext, host: &Host) -> Result<(), StepError> {
        if let Some(rollback) = &self.rollback_command {
            ctx.exec(host, rollback, &self.options()).await?;
        }
        Ok(())
    }

    fn describe(&self, host: &Host) -> Option<String> {
        let sudo = if self.elevated { "sudo " } else { "" };
        Some(format!("{}: {}{}", host, sudo, self.command))
    }
}
