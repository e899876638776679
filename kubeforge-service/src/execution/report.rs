// Run Report
// Per node-host outcomes and the aggregate status of one engine run

use crate::connector::ConnectorError;
use crate::plan::NodeId;
use crate::step::StepError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

/// Terminal state of a node-host pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeStatus::Succeeded => "succeeded",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Error recorded against a failed or skipped pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeError {
    #[error("execution failed: {message}")]
    Execution { message: String },

    #[error("transport failed: {message}")]
    Transport { message: String },

    #[error("timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("dependency '{dependency}' failed")]
    DependencyFailed { dependency: NodeId },

    #[error("cancelled")]
    Cancelled,

    #[error("aborted after an earlier failure")]
    Aborted,
}

impl NodeError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }
}

impl From<&StepError> for NodeError {
    fn from(err: &StepError) -> Self {
        match err {
            StepError::Failed { message } => NodeError::execution(message.clone()),
            StepError::Timeout(after) => NodeError::Timeout { after: *after },
            StepError::Cancelled => NodeError::Cancelled,
            StepError::Transport(inner) => match inner {
                ConnectorError::Cancelled => NodeError::Cancelled,
                ConnectorError::Timeout(after) => NodeError::Timeout { after: *after },
                // The command ran; a non-zero exit is the step's own failure
                ConnectorError::CommandFailed { .. } => NodeError::execution(inner.to_string()),
                other => NodeError::Transport {
                    message: other.to_string(),
                },
            },
        }
    }
}

/// Result of compensating a succeeded pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RollbackOutcome {
    RolledBack,
    Failed { message: String },
}

/// Outcome of one node on one host; produced exactly once per pair per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub node: NodeId,
    pub host: String,
    pub status: NodeStatus,
    pub error: Option<NodeError>,
    pub duration: Duration,
    /// `run` invocations; 0 when skipped, up to date, or dry-run
    pub attempts: u32,
    /// `Check` reported the desired state already held
    pub up_to_date: bool,
    pub message: Option<String>,
    pub rollback: Option<RollbackOutcome>,
}

impl NodeResult {
    pub fn skipped(node: NodeId, host: impl Into<String>, reason: NodeError) -> Self {
        Self {
            node,
            host: host.into(),
            status: NodeStatus::Skipped,
            error: Some(reason),
            duration: Duration::ZERO,
            attempts: 0,
            up_to_date: false,
            message: None,
            rollback: None,
        }
    }
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every node succeeded on every targeted host
    Success,
    /// Some pairs failed or were skipped; the rest of the graph ran
    PartialFailure,
    /// Fail-fast stopped the run after a failure
    Failed,
    /// The run was cancelled
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial failure",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Counts over a report's results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rolled_back: usize,
}

/// Structured outcome of one engine execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Graph order, then host order within a node
    pub results: Vec<NodeResult>,
    pub started_at: SystemTime,
    pub duration: Duration,
    pub dry_run: bool,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Every failed pair with its originating error
    pub fn failed_nodes(&self) -> Vec<(&NodeId, &str, Option<&NodeError>)> {
        self.with_status(NodeStatus::Failed)
    }

    /// Every skipped pair with the reason it never ran
    pub fn skipped_nodes(&self) -> Vec<(&NodeId, &str, Option<&NodeError>)> {
        self.with_status(NodeStatus::Skipped)
    }

    pub fn result(&self, node: &str, host: &str) -> Option<&NodeResult> {
        self.results
            .iter()
            .find(|r| r.node.as_str() == node && r.host == host)
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.results.len(),
            ..Default::default()
        };
        for result in &self.results {
            match result.status {
                NodeStatus::Succeeded => summary.succeeded += 1,
                NodeStatus::Failed => summary.failed += 1,
                NodeStatus::Skipped => summary.skipped += 1,
            }
            if result.up_to_date {
                summary.up_to_date += 1;
            }
            if result.rollback == Some(RollbackOutcome::RolledBack) {
                summary.rolled_back += 1;
            }
        }
        summary
    }

    fn with_status(&self, status: NodeStatus) -> Vec<(&NodeId, &str, Option<&NodeError>)> {
        self.results
            .iter()
            .filter(|r| r.status == status)
            .map(|r| (&r.node, r.host.as_str(), r.error.as_ref()))
            .collect()
    }
}
