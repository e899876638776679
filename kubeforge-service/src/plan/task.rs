// Planning Units
// Task, Module and Pipeline capabilities and their composable implementations

use crate::error::PlanningError;
use crate::execution::{RetryPolicy, RuntimeContext};
use crate::inventory::Host;
use crate::plan::graph::{ExecutionFragment, ExecutionGraph, ExecutionNode, MergePolicy, NodeId};
use crate::step::Step;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span};

/// Produces one fragment for one coherent piece of work
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    fn plan(&self, ctx: &RuntimeContext) -> Result<ExecutionFragment, PlanningError>;
}

/// Composes the fragments of its tasks
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    fn plan(&self, ctx: &RuntimeContext) -> Result<ExecutionFragment, PlanningError>;
}

/// Composes modules into the final graph for a run
pub trait Pipeline: Send + Sync {
    fn name(&self) -> &str;

    fn plan(&self, ctx: &RuntimeContext) -> Result<ExecutionGraph, PlanningError>;
}

/// Hosts carrying any of `roles`, deduplicated, in inventory order
pub fn hosts_for_roles<S: AsRef<str>>(
    ctx: &RuntimeContext,
    roles: &[S],
) -> Result<Vec<Arc<Host>>, PlanningError> {
    ctx.inventory().hosts_with_any_role(roles)
}

/// Which hosts a task targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSelector {
    /// Every inventory host
    All,
    /// Hosts carrying any of the roles
    Roles(Vec<String>),
    /// The designated control host only
    ControlHost,
    /// Named hosts
    Hosts(Vec<String>),
}

impl HostSelector {
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Roles(roles.into_iter().map(Into::into).collect())
    }

    pub fn resolve(&self, ctx: &RuntimeContext) -> Result<Vec<Arc<Host>>, PlanningError> {
        match self {
            HostSelector::All => Ok(ctx.inventory().hosts().to_vec()),
            HostSelector::Roles(roles) => hosts_for_roles(ctx, roles.as_slice()),
            HostSelector::ControlHost => Ok(ctx.control_host().into_iter().collect()),
            HostSelector::Hosts(names) => names
                .iter()
                .map(|name| {
                    ctx.inventory().host(name).cloned().ok_or_else(|| {
                        PlanningError::invalid(format!("host '{}' is not in the inventory", name))
                    })
                })
                .collect(),
        }
    }
}

/// A task running one or more steps on the selected hosts.
///
/// Steps are chained (each depends on the previous one) unless the task is
/// marked parallel. No matching hosts yields an empty fragment.
#[derive(Debug, Clone)]
pub struct StepTask {
    name: String,
    selector: HostSelector,
    steps: Vec<Arc<dyn Step>>,
    policy: MergePolicy,
    retry: Option<RetryPolicy>,
    timeout: Option<Duration>,
}

impl StepTask {
    pub fn new(name: impl Into<String>, selector: HostSelector) -> Self {
        Self {
            name: name.into(),
            selector,
            steps: Vec::new(),
            policy: MergePolicy::Sequential,
            retry: None,
            timeout: None,
        }
    }

    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn shared_step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    /// Steps do not depend on each other
    pub fn parallel(mut self) -> Self {
        self.policy = MergePolicy::Parallel;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Task for StepTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn plan(&self, ctx: &RuntimeContext) -> Result<ExecutionFragment, PlanningError> {
        let _span = info_span!("plan", task = %self.name).entered();
        let hosts = self.selector.resolve(ctx)?;
        if hosts.is_empty() {
            debug!(task = %self.name, "no hosts matched, planning nothing");
            return Ok(ExecutionFragment::new());
        }

        let mut fragment = ExecutionFragment::new();
        let mut previous: Option<NodeId> = None;
        for step in &self.steps {
            let mut node = ExecutionNode::new(
                NodeId::scoped(&self.name, &step.meta().name),
                step.clone(),
                hosts.iter().cloned(),
            );
            node.retry = self.retry.clone();
            node.timeout = self.timeout;
            if let (MergePolicy::Sequential, Some(prev)) = (self.policy, &previous) {
                node = node.depends_on(prev.clone());
            }
            previous = Some(fragment.add_node(node)?);
        }
        Ok(fragment)
    }
}

/// A module merging its tasks' fragments under one policy
pub struct TaskModule {
    name: String,
    policy: MergePolicy,
    tasks: Vec<Box<dyn Task>>,
}

impl TaskModule {
    pub fn new(name: impl Into<String>, policy: MergePolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            tasks: Vec::new(),
        }
    }

    pub fn sequential(name: impl Into<String>) -> Self {
        Self::new(name, MergePolicy::Sequential)
    }

    pub fn parallel(name: impl Into<String>) -> Self {
        Self::new(name, MergePolicy::Parallel)
    }

    pub fn task(mut self, task: impl Task + 'static) -> Self {
        self.tasks.push(Box::new(task));
        self
    }
}

impl Module for TaskModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn plan(&self, ctx: &RuntimeContext) -> Result<ExecutionFragment, PlanningError> {
        let _span = info_span!("plan", module = %self.name).entered();
        let mut merged = ExecutionFragment::new();
        for task in &self.tasks {
            merged = merged.merge(task.plan(ctx)?, self.policy)?;
        }
        debug!(module = %self.name, nodes = merged.len(), "module planned");
        Ok(merged)
    }
}

/// A pipeline merging its modules' fragments into one graph
pub struct ModulePipeline {
    name: String,
    policy: MergePolicy,
    modules: Vec<Box<dyn Module>>,
}

impl ModulePipeline {
    pub fn new(name: impl Into<String>, policy: MergePolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            modules: Vec::new(),
        }
    }

    pub fn sequential(name: impl Into<String>) -> Self {
        Self::new(name, MergePolicy::Sequential)
    }

    pub fn module(mut self, module: impl Module + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }
}

impl Pipeline for ModulePipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn plan(&self, ctx: &RuntimeContext) -> Result<ExecutionGraph, PlanningError> {
        let _span = info_span!("plan", pipeline = %self.name).entered();
        let mut merged = ExecutionFragment::new();
        for module in &self.modules {
            merged = merged.merge(module.plan(ctx)?, self.policy)?;
        }
        let graph = merged.into_graph()?;
        debug!(
            pipeline = %self.name,
            nodes = graph.len(),
            pairs = graph.pair_count(),
            "pipeline planned"
        );
        Ok(graph)
    }
}
