// Execution Engine Module
// Runtime state, scheduling, retries and run reporting

pub mod context;
pub mod engine;
pub mod events;
pub mod report;
pub mod retry;

// Re-export key types
pub use context::RuntimeContext;
pub use engine::{Engine, EngineConfig, FailurePolicy, RunOptions};
pub use events::{progress_channel, EventSender, ExecutionEvent, LogLevel, ProgressReceiver, ProgressSender};
pub use report::{NodeError, NodeResult, NodeStatus, RollbackOutcome, RunReport, RunStatus, RunSummary};
pub use retry::RetryPolicy;
