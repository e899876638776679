// Service Error Types
// Planning errors and the crate-level error returned by fallible entry points

use crate::plan::NodeId;

use std::io;
use thiserror::Error;

/// Errors raised while building fragments and graphs.
///
/// Every variant is fatal: planning errors surface to the caller before any
/// node is executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("duplicate node id '{id}'")]
    DuplicateNode { id: NodeId },

    #[error("node '{id}' targets no hosts")]
    EmptyHosts { id: NodeId },

    #[error("node '{id}' depends on itself")]
    SelfDependency { id: NodeId },

    #[error("node '{id}' depends on unknown node '{dependency}'")]
    UnknownDependency { id: NodeId, dependency: NodeId },

    #[error("circular dependency detected: {}", format_cycle(.path))]
    CyclicDependency { path: Vec<NodeId> },

    #[error("role '{role}' is not declared in the inventory")]
    UnresolvedRole { role: String },

    #[error("node '{id}' not found")]
    UnknownNode { id: NodeId },

    #[error("invalid plan: {message}")]
    Invalid { message: String },
}

impl PlanningError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

fn format_cycle(path: &[NodeId]) -> String {
    path.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Crate-level error for loading configuration and planning runs
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("planning error: {0}")]
    Planning(#[from] PlanningError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ServiceError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = PlanningError::CyclicDependency {
            path: vec![NodeId::new("a"), NodeId::new("b"), NodeId::new("a")],
        };
        assert_eq!(err.to_string(), "circular dependency detected: a -> b -> a");
    }

    #[test]
    fn test_planning_error_converts_into_service_error() {
        let err: ServiceError = PlanningError::invalid("empty pipeline").into();
        assert!(matches!(err, ServiceError::Planning(_)));
        assert!(err.to_string().contains("empty pipeline"));
    }
}
