// Execution Events
// Progress reporting and event types for graph execution

use crate::execution::report::{NodeError, NodeStatus, RunStatus};
use crate::plan::NodeId;

use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while the engine walks a graph
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Run started
    RunStarted {
        run_id: Uuid,
        total_nodes: usize,
        total_pairs: usize,
        dry_run: bool,
    },

    /// A node-host pair was dispatched
    NodeStarted { node: NodeId, host: String },

    /// An attempt failed and another will follow after `backoff`
    NodeRetrying {
        node: NodeId,
        host: String,
        attempt: u32,
        error: String,
        backoff: Duration,
    },

    /// A node-host pair reached `Succeeded` or `Failed`
    NodeCompleted {
        node: NodeId,
        host: String,
        status: NodeStatus,
        duration: Duration,
        attempts: u32,
        up_to_date: bool,
        error: Option<NodeError>,
        /// Dry-run description or step message
        message: Option<String>,
    },

    /// A node-host pair was never run
    NodeSkipped {
        node: NodeId,
        host: String,
        reason: NodeError,
    },

    /// Compensation ran for a succeeded pair
    RollbackCompleted {
        node: NodeId,
        host: String,
        success: bool,
        error: Option<String>,
    },

    /// Run finished
    RunCompleted {
        run_id: Uuid,
        status: RunStatus,
        duration: Duration,
    },

    /// Log message (info, warning)
    Log {
        level: LogLevel,
        message: String,
        node: Option<NodeId>,
    },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
}

impl ExecutionEvent {
    pub fn node_started(node: &NodeId, host: &str) -> Self {
        Self::NodeStarted {
            node: node.clone(),
            host: host.to_string(),
        }
    }

    pub fn node_skipped(node: &NodeId, host: &str, reason: NodeError) -> Self {
        Self::NodeSkipped {
            node: node.clone(),
            host: host.to_string(),
            reason,
        }
    }

    /// Create an info log event
    pub fn info(message: impl Into<String>, node: Option<NodeId>) -> Self {
        Self::Log {
            level: LogLevel::Info,
            message: message.into(),
            node,
        }
    }

    /// Create a warning log event
    pub fn warning(message: impl Into<String>, node: Option<NodeId>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
            node,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(ExecutionEvent::node_started(&"etcd:config".into(), "etcd1"));
        tx.send_event(ExecutionEvent::node_skipped(
            &"etcd:service".into(),
            "etcd1",
            NodeError::Aborted,
        ));

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(event1, ExecutionEvent::NodeStarted { .. }));

        let event2 = rx.recv().await.unwrap();
        if let ExecutionEvent::NodeSkipped { node, host, reason } = event2 {
            assert_eq!(node.as_str(), "etcd:service");
            assert_eq!(host, "etcd1");
            assert_eq!(reason, NodeError::Aborted);
        } else {
            panic!("wrong event type");
        }
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(ExecutionEvent::info("test", None));
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.send_event(ExecutionEvent::warning("nobody listening", None));
    }
}
