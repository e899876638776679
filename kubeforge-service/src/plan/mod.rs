// Planning Module
// Graph model and the Task -> Module -> Pipeline composition rules

pub mod graph;
pub mod task;

// Re-export key types
pub use graph::{
    ExecutionFragment, ExecutionGraph, ExecutionNode, GraphSummary, MergePolicy, NodeId,
    NodeSummary,
};
pub use task::{hosts_for_roles, HostSelector, Module, ModulePipeline, Pipeline, StepTask, Task, TaskModule};
