// Kubeforge Service Library
// Execution-graph planning and scheduling for cluster bring-up

pub mod cluster;
pub mod config;
pub mod connector;
pub mod error;
pub mod execution;
pub mod inventory;
pub mod plan;
pub mod step;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use error::{PlanningError, ServiceError, ServiceResult};

pub use config::{ClusterConfig, EngineSettings, ForgeConfig, InventoryConfig};

pub use connector::{
    CommandOutput, Connector, ConnectorError, ConnectorRegistry, ExecOptions, LocalConnector,
    MemoryConnector, SshConfig, SshConnector,
};

pub use inventory::{ConnectionKind, Facts, Host, Inventory, Role};

// Re-export planning types
pub use plan::{
    ExecutionFragment, ExecutionGraph, ExecutionNode, HostSelector, MergePolicy, Module,
    ModulePipeline, NodeId, Pipeline, StepTask, Task, TaskModule,
};

pub use step::{Step, StepContext, StepError, StepMeta, StepOutput};

// Re-export execution types
pub use execution::{
    Engine, EngineConfig, ExecutionEvent, FailurePolicy, NodeError, NodeResult, NodeStatus,
    ProgressSender, RetryPolicy, RunOptions, RunReport, RunStatus, RuntimeContext,
};

pub use cluster::create_cluster_pipeline;
