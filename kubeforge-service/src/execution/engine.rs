// Execution Engine
// Walks an execution graph node-host pair by pair with bounded concurrency

use crate::execution::context::RuntimeContext;
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::report::{
    NodeError, NodeResult, NodeStatus, RollbackOutcome, RunReport, RunStatus,
};
use crate::execution::retry::RetryPolicy;
use crate::inventory::Host;
use crate::plan::{ExecutionGraph, NodeId};
use crate::step::{Step, StepContext, StepError, StepOutput};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// What the engine does after the first failed pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop dispatching, let running pairs finish, report `Failed`
    #[default]
    FailFast,
    /// Keep running everything not downstream of a failure
    ContinueOnError,
}

/// Configuration for graph execution
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum pairs in flight across all hosts (0 = unlimited)
    pub max_concurrency: usize,
    /// Maximum pairs in flight per host (0 = unlimited)
    pub max_per_host: usize,
    /// Retry policy for nodes without their own
    pub default_retry: RetryPolicy,
    /// Attempt timeout for nodes without their own
    pub default_timeout: Option<Duration>,
    /// Roll back succeeded ancestors of failed nodes after the run
    pub rollback_on_failure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            max_per_host: 0,
            default_retry: RetryPolicy::none(),
            default_timeout: None,
            rollback_on_failure: false,
        }
    }
}

/// Per-run options chosen by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub policy: FailurePolicy,
    pub dry_run: bool,
}

impl RunOptions {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Scheduler for execution graphs
#[derive(Debug, Default)]
pub struct Engine {
    config: EngineConfig,
    event_tx: Option<ProgressSender>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            event_tx: None,
        }
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute without external cancellation
    pub async fn execute_with_policy(
        &self,
        graph: &ExecutionGraph,
        ctx: Arc<RuntimeContext>,
        policy: FailurePolicy,
        dry_run: bool,
    ) -> RunReport {
        let options = RunOptions { policy, dry_run };
        self.execute(graph, ctx, options, CancellationToken::new())
            .await
    }

    /// Execute `graph`, producing one result per node-host pair.
    ///
    /// Step failures never surface as an error here; they are recorded in
    /// the returned report.
    pub async fn execute(
        &self,
        graph: &ExecutionGraph,
        ctx: Arc<RuntimeContext>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> RunReport {
        self.execute_run(Uuid::new_v4(), graph, ctx, options, cancel)
            .await
    }

    #[instrument(
        name = "run",
        skip(self, graph, ctx, options, cancel),
        fields(run_id = %run_id, nodes = graph.len(), dry_run = options.dry_run)
    )]
    async fn execute_run(
        &self,
        run_id: Uuid,
        graph: &ExecutionGraph,
        ctx: Arc<RuntimeContext>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> RunReport {
        let started_at = SystemTime::now();
        let start = Instant::now();
        info!(pairs = graph.pair_count(), policy = ?options.policy, "run started");
        self.event_tx.send_event(ExecutionEvent::RunStarted {
            run_id,
            total_nodes: graph.len(),
            total_pairs: graph.pair_count(),
            dry_run: options.dry_run,
        });

        let run_token = cancel.child_token();
        let global = Arc::new(Semaphore::new(permits(self.config.max_concurrency)));
        let mut per_host: HashMap<String, Arc<Semaphore>> = HashMap::new();
        for node in graph.nodes() {
            for host in &node.hosts {
                per_host
                    .entry(host.name.clone())
                    .or_insert_with(|| Arc::new(Semaphore::new(permits(self.config.max_per_host))));
            }
        }

        let mut schedule = Schedule::new(graph, self.event_tx.clone());
        schedule.seed();

        let mut running: JoinSet<PairOutcome> = JoinSet::new();
        let mut in_flight: HashSet<PairKey> = HashSet::new();
        let mut stopping = false;
        let mut cancelled = false;

        loop {
            if !cancelled && cancel.is_cancelled() {
                cancelled = true;
                stopping = true;
                run_token.cancel();
                warn!("run cancelled before dispatch");
            }

            if !stopping {
                while let Some(key) = schedule.ready.pop_front() {
                    let Ok(global_permit) = global.clone().try_acquire_owned() else {
                        schedule.ready.push_front(key);
                        break;
                    };
                    let Some(host_permit) = try_host_permit(&per_host, graph, key) else {
                        schedule.deferred.push(key);
                        continue;
                    };

                    let job = self.pair_job(graph, key, &ctx, &run_token, run_id, options.dry_run);
                    self.event_tx
                        .send_event(ExecutionEvent::node_started(&job.node, &job.host.name));
                    in_flight.insert(key);
                    running.spawn(async move {
                        let _permits = (global_permit, host_permit);
                        let result = job.run().await;
                        PairOutcome { key, result }
                    });
                }
                schedule.restore_deferred();
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    stopping = true;
                    run_token.cancel();
                    warn!(in_flight = running.len(), "run cancelled, stopping dispatch");
                }
                joined = running.join_next() => match joined {
                    Some(Ok(PairOutcome { key, result })) => {
                        in_flight.remove(&key);
                        let failed = result.status == NodeStatus::Failed;
                        let node = result.node.clone();
                        self.event_tx.send_event(ExecutionEvent::NodeCompleted {
                            node: result.node.clone(),
                            host: result.host.clone(),
                            status: result.status,
                            duration: result.duration,
                            attempts: result.attempts,
                            up_to_date: result.up_to_date,
                            error: result.error.clone(),
                            message: result.message.clone(),
                        });
                        schedule.record(key, result);
                        schedule.process_activations();

                        if failed && options.policy == FailurePolicy::FailFast && !stopping {
                            stopping = true;
                            warn!(node = %node, "pair failed, fail-fast stops dispatch");
                            self.event_tx.send_event(ExecutionEvent::warning(
                                "failure under fail-fast, no further nodes will start",
                                Some(node),
                            ));
                        }
                    }
                    Some(Err(e)) => error!(error = %e, "pair task did not complete"),
                    None => {}
                },
            }
        }

        for key in in_flight {
            let node = &graph.nodes()[key.node];
            let result = NodeResult {
                status: NodeStatus::Failed,
                error: Some(NodeError::execution("pair task aborted")),
                ..NodeResult::skipped(node.id.clone(), node.hosts[key.host].name.clone(), NodeError::Aborted)
            };
            schedule.record(key, result);
        }
        schedule.finalize(if cancelled {
            NodeError::Cancelled
        } else {
            NodeError::Aborted
        });

        if self.config.rollback_on_failure && !options.dry_run && !cancelled && schedule.any_failed() {
            self.rollback(graph, &ctx, &mut schedule, &cancel).await;
        }

        let any_failed = schedule.any_failed();
        let results = schedule.into_results();
        let status = if cancelled {
            RunStatus::Cancelled
        } else if any_failed && options.policy == FailurePolicy::FailFast {
            RunStatus::Failed
        } else if results.iter().any(|r| r.status != NodeStatus::Succeeded) {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        };

        let duration = start.elapsed();
        let report = RunReport {
            run_id,
            status,
            results,
            started_at,
            duration,
            dry_run: options.dry_run,
        };
        let summary = report.summary();
        info!(
            status = %status,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            ?duration,
            "run finished"
        );
        self.event_tx.send_event(ExecutionEvent::RunCompleted {
            run_id,
            status,
            duration,
        });
        report
    }

    fn pair_job(
        &self,
        graph: &ExecutionGraph,
        key: PairKey,
        ctx: &Arc<RuntimeContext>,
        run_token: &CancellationToken,
        run_id: Uuid,
        dry_run: bool,
    ) -> PairJob {
        let node = &graph.nodes()[key.node];
        PairJob {
            run_id,
            node: node.id.clone(),
            step: node.step.clone(),
            host: node.hosts[key.host].clone(),
            retry: node
                .retry
                .clone()
                .unwrap_or_else(|| self.config.default_retry.clone()),
            timeout: node.timeout.or(self.config.default_timeout),
            dry_run,
            runtime: ctx.clone(),
            cancel: run_token.clone(),
            event_tx: self.event_tx.clone(),
        }
    }

    /// Compensate succeeded ancestors of failed nodes, latest completion first
    async fn rollback(
        &self,
        graph: &ExecutionGraph,
        ctx: &Arc<RuntimeContext>,
        schedule: &mut Schedule<'_>,
        cancel: &CancellationToken,
    ) {
        let failed: Vec<usize> = (0..graph.len()).filter(|&i| schedule.failed[i]).collect();
        let ancestors = graph.ancestors(&failed);
        let targets: Vec<PairKey> = schedule
            .succeeded
            .iter()
            .rev()
            .filter(|key| ancestors.contains(&key.node))
            .filter(|key| !schedule.is_up_to_date(**key))
            .copied()
            .collect();
        if targets.is_empty() {
            return;
        }
        info!(pairs = targets.len(), "rolling back");
        self.event_tx.send_event(ExecutionEvent::info(
            format!("rolling back {} succeeded pairs", targets.len()),
            None,
        ));

        for key in targets {
            if cancel.is_cancelled() {
                warn!("rollback interrupted by cancellation");
                break;
            }
            let node = &graph.nodes()[key.node];
            let host = node.hosts[key.host].clone();
            let step_ctx = StepContext::new(ctx.clone(), node.id.clone(), cancel.child_token());
            let span = info_span!("node_rollback", node = %node.id, host = %host.name);

            let outcome = match AssertUnwindSafe(node.step.rollback(&step_ctx, &host))
                .catch_unwind()
                .instrument(span)
                .await
            {
                Ok(Ok(())) => RollbackOutcome::RolledBack,
                Ok(Err(e)) => RollbackOutcome::Failed {
                    message: e.to_string(),
                },
                Err(panic) => RollbackOutcome::Failed {
                    message: panic_message(&*panic),
                },
            };

            let error = match &outcome {
                RollbackOutcome::RolledBack => {
                    info!(node = %node.id, host = %host.name, "rolled back");
                    None
                }
                RollbackOutcome::Failed { message } => {
                    warn!(node = %node.id, host = %host.name, error = %message, "rollback failed");
                    Some(message.clone())
                }
            };
            self.event_tx.send_event(ExecutionEvent::RollbackCompleted {
                node: node.id.clone(),
                host: host.name.clone(),
                success: error.is_none(),
                error,
            });
            schedule.set_rollback(key, outcome);
        }
    }
}

/// 0 means unlimited; anything past the semaphore ceiling is clamped to it
fn permits(limit: usize) -> usize {
    if limit == 0 {
        Semaphore::MAX_PERMITS
    } else {
        limit.min(Semaphore::MAX_PERMITS)
    }
}

/// `None` when the host is saturated; `Some(None)` when it has no cap
fn try_host_permit(
    per_host: &HashMap<String, Arc<Semaphore>>,
    graph: &ExecutionGraph,
    key: PairKey,
) -> Option<Option<OwnedSemaphorePermit>> {
    let host = &graph.nodes()[key.node].hosts[key.host];
    match per_host.get(&host.name) {
        Some(semaphore) => semaphore.clone().try_acquire_owned().ok().map(Some),
        None => Some(None),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("step panicked: {}", detail)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PairKey {
    node: usize,
    host: usize,
}

struct PairOutcome {
    key: PairKey,
    result: NodeResult,
}

/// Dependency bookkeeping for one run
struct Schedule<'g> {
    graph: &'g ExecutionGraph,
    event_tx: Option<ProgressSender>,
    /// Dependency nodes not yet terminal on all of their hosts
    remaining_deps: Vec<usize>,
    /// Pairs of the node not yet terminal
    pending_pairs: Vec<usize>,
    results: Vec<Vec<Option<NodeResult>>>,
    failed: Vec<bool>,
    /// Failed node that keeps this node from running
    blocked_by: Vec<Option<NodeId>>,
    /// Succeeded pairs in completion order
    succeeded: Vec<PairKey>,
    activations: VecDeque<usize>,
    ready: VecDeque<PairKey>,
    deferred: Vec<PairKey>,
}

impl<'g> Schedule<'g> {
    fn new(graph: &'g ExecutionGraph, event_tx: Option<ProgressSender>) -> Self {
        let n = graph.len();
        Self {
            graph,
            event_tx,
            remaining_deps: (0..n).map(|i| graph.dependencies_of(i).len()).collect(),
            pending_pairs: graph.nodes().iter().map(|node| node.hosts.len()).collect(),
            results: graph
                .nodes()
                .iter()
                .map(|node| vec![None; node.hosts.len()])
                .collect(),
            failed: vec![false; n],
            blocked_by: vec![None; n],
            succeeded: Vec::new(),
            activations: VecDeque::new(),
            ready: VecDeque::new(),
            deferred: Vec::new(),
        }
    }

    fn seed(&mut self) {
        for i in 0..self.graph.len() {
            if self.remaining_deps[i] == 0 {
                self.activations.push_back(i);
            }
        }
        self.process_activations();
    }

    /// Store a terminal result and release dependents whose dependencies
    /// are now all terminal
    fn record(&mut self, key: PairKey, result: NodeResult) {
        match result.status {
            NodeStatus::Failed => self.failed[key.node] = true,
            NodeStatus::Succeeded => self.succeeded.push(key),
            NodeStatus::Skipped => {}
        }
        self.results[key.node][key.host] = Some(result);
        self.pending_pairs[key.node] -= 1;

        let graph = self.graph;
        if self.pending_pairs[key.node] == 0 {
            for &dependent in graph.dependents_of(key.node) {
                self.remaining_deps[dependent] -= 1;
                if self.remaining_deps[dependent] == 0 {
                    self.activations.push_back(dependent);
                }
            }
        }
    }

    /// Move activated nodes to the ready queue, or skip them when a
    /// dependency failed
    fn process_activations(&mut self) {
        let graph = self.graph;
        while let Some(i) = self.activations.pop_front() {
            match self.blocking_dependency(i) {
                Some(root) => {
                    self.blocked_by[i] = Some(root.clone());
                    self.skip_node(
                        i,
                        NodeError::DependencyFailed {
                            dependency: root,
                        },
                    );
                }
                None => {
                    for host in 0..graph.nodes()[i].hosts.len() {
                        self.ready.push_back(PairKey { node: i, host });
                    }
                }
            }
        }
    }

    fn restore_deferred(&mut self) {
        for key in self.deferred.drain(..).rev() {
            self.ready.push_front(key);
        }
    }

    fn blocking_dependency(&self, i: usize) -> Option<NodeId> {
        for &dep in self.graph.dependencies_of(i) {
            if self.failed[dep] {
                return Some(self.graph.nodes()[dep].id.clone());
            }
            if let Some(root) = &self.blocked_by[dep] {
                return Some(root.clone());
            }
        }
        None
    }

    fn skip_node(&mut self, i: usize, reason: NodeError) {
        let graph = self.graph;
        let node = &graph.nodes()[i];
        for host in 0..node.hosts.len() {
            if self.results[i][host].is_some() {
                continue;
            }
            let key = PairKey { node: i, host };
            let host_name = node.hosts[host].name.clone();
            debug!(node = %node.id, host = %host_name, reason = %reason, "skipped");
            self.event_tx
                .send_event(ExecutionEvent::node_skipped(&node.id, &host_name, reason.clone()));
            self.record(key, NodeResult::skipped(node.id.clone(), host_name, reason.clone()));
        }
    }

    /// Record every pair that never ran. Walks in topological order so
    /// blocked status reaches every transitive dependent.
    fn finalize(&mut self, reason: NodeError) {
        self.ready.clear();
        self.activations.clear();
        for i in 0..self.graph.len() {
            if self.pending_pairs[i] == 0 {
                continue;
            }
            // Cancellation outranks failures that were not yet propagated
            if self.blocked_by[i].is_none() && reason != NodeError::Cancelled {
                self.blocked_by[i] = self.blocking_dependency(i);
            }
            let node_reason = match &self.blocked_by[i] {
                Some(root) => NodeError::DependencyFailed {
                    dependency: root.clone(),
                },
                None => reason.clone(),
            };
            self.skip_node(i, node_reason);
        }
        self.activations.clear();
        self.ready.clear();
    }

    fn any_failed(&self) -> bool {
        self.failed.iter().any(|&f| f)
    }

    fn is_up_to_date(&self, key: PairKey) -> bool {
        self.results[key.node][key.host]
            .as_ref()
            .map(|r| r.up_to_date)
            .unwrap_or(false)
    }

    fn set_rollback(&mut self, key: PairKey, outcome: RollbackOutcome) {
        if let Some(result) = self.results[key.node][key.host].as_mut() {
            result.rollback = Some(outcome);
        }
    }

    fn into_results(self) -> Vec<NodeResult> {
        self.results.into_iter().flatten().flatten().collect()
    }
}

/// Everything one spawned node-host execution needs
struct PairJob {
    run_id: Uuid,
    node: NodeId,
    step: Arc<dyn Step>,
    host: Arc<Host>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    dry_run: bool,
    runtime: Arc<RuntimeContext>,
    cancel: CancellationToken,
    event_tx: Option<ProgressSender>,
}

impl PairJob {
    async fn run(self) -> NodeResult {
        let span = info_span!(
            "node_execute",
            run_id = %self.run_id,
            node = %self.node,
            host = %self.host.name
        );
        self.execute().instrument(span).await
    }

    async fn execute(self) -> NodeResult {
        let started = Instant::now();
        let mut result = NodeResult {
            node: self.node.clone(),
            host: self.host.name.clone(),
            status: NodeStatus::Succeeded,
            error: None,
            duration: Duration::ZERO,
            attempts: 0,
            up_to_date: false,
            message: None,
            rollback: None,
        };

        if self.dry_run {
            result.message = self.step.describe(&self.host);
            debug!(would = ?result.message, "dry run");
            result.duration = started.elapsed();
            return result;
        }

        let ctx = StepContext::new(self.runtime.clone(), self.node.clone(), self.cancel.clone());

        // `None` when the check outlived the node timeout
        let check = async {
            let guarded = AssertUnwindSafe(self.step.check(&ctx, &self.host)).catch_unwind();
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, guarded).await.ok(),
                None => Some(guarded.await),
            }
        };
        let up_to_date = tokio::select! {
            checked = check => match checked {
                Some(Ok(Ok(up_to_date))) => up_to_date,
                Some(Ok(Err(e))) => {
                    warn!(error = %e, "check failed, running step");
                    false
                }
                Some(Err(panic)) => {
                    warn!(error = %panic_message(&*panic), "check panicked, running step");
                    false
                }
                None => {
                    warn!(timeout = ?self.timeout, "check timed out, running step");
                    false
                }
            },
            _ = self.cancel.cancelled() => {
                return self.finish(result, started, Some(NodeError::Cancelled));
            }
        };
        if up_to_date {
            debug!("already in desired state");
            result.up_to_date = true;
            result.message = Some("up to date".to_string());
            result.duration = started.elapsed();
            return result;
        }

        let max_attempts = self.retry.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            result.attempts = attempt;
            let attempt_ctx = ctx.clone().with_attempt(attempt);
            match self.attempt(&attempt_ctx).await {
                Ok(output) => {
                    debug!(attempt, changed = output.changed, "succeeded");
                    result.message = output.message;
                    result.duration = started.elapsed();
                    return result;
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(attempt, error = %err, ?backoff, "attempt failed, retrying");
                    self.event_tx.send_event(ExecutionEvent::NodeRetrying {
                        node: self.node.clone(),
                        host: self.host.name.clone(),
                        attempt,
                        error: err.to_string(),
                        backoff,
                    });
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.cancel.cancelled() => {
                            return self.finish(result, started, Some(NodeError::Cancelled));
                        }
                    }
                }
                Err(err) => {
                    warn!(attempt, error = %err, "failed");
                    let error = NodeError::from(&err);
                    return self.finish(result, started, Some(error));
                }
            }
        }
    }

    /// One bounded, cancellable `run` call with panics turned into failures
    async fn attempt(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let guarded = async {
            match AssertUnwindSafe(self.step.run(ctx, &self.host))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => Err(StepError::failed(panic_message(&*panic))),
            }
        };
        let bounded = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, guarded).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(StepError::Timeout(limit)),
                },
                None => guarded.await,
            }
        };

        tokio::select! {
            outcome = bounded => outcome,
            _ = self.cancel.cancelled() => Err(StepError::Cancelled),
        }
    }

    fn finish(&self, mut result: NodeResult, started: Instant, error: Option<NodeError>) -> NodeResult {
        if error.is_some() {
            result.status = NodeStatus::Failed;
        }
        result.error = error;
        result.duration = started.elapsed();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MemoryConnector;
    use crate::execution::events::progress_channel;
    use crate::plan::{ExecutionFragment, ExecutionNode};
    use crate::step::{CommandStep, FnStep, WriteFileStep};
    use crate::test_support::{memory_host, plain_host, runtime_with};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Interval {
        node: String,
        host: String,
        start: Instant,
        end: Instant,
    }

    type Log = Arc<Mutex<Vec<Interval>>>;

    fn tracked(name: &str, log: &Log, delay: Duration) -> FnStep {
        let label = name.to_string();
        let log = log.clone();
        FnStep::new(name, move |_ctx, host| {
            let label = label.clone();
            let log = log.clone();
            async move {
                let start = Instant::now();
                tokio::time::sleep(delay).await;
                log.lock().unwrap().push(Interval {
                    node: label,
                    host: host.name.clone(),
                    start,
                    end: Instant::now(),
                });
                Ok(StepOutput::changed())
            }
        })
    }

    fn noop(name: &str) -> FnStep {
        FnStep::new(name, |_ctx, _host| async { Ok(StepOutput::changed()) })
    }

    fn failing_on(name: &str, bad_host: &'static str) -> FnStep {
        FnStep::new(name, move |_ctx, host| async move {
            if host.name == bad_host {
                Err(StepError::failed("boom"))
            } else {
                Ok(StepOutput::changed())
            }
        })
    }

    fn node(ctx: &RuntimeContext, id: &str, step: impl Step + 'static, hosts: &[&str]) -> ExecutionNode {
        ExecutionNode::new(id, Arc::new(step), hosts.iter().filter_map(|h| ctx.host(h)))
    }

    fn graph(nodes: Vec<ExecutionNode>) -> ExecutionGraph {
        let mut fragment = ExecutionFragment::new();
        for n in nodes {
            fragment.add_node(n).unwrap();
        }
        fragment.into_graph().unwrap()
    }

    fn two_hosts() -> Arc<RuntimeContext> {
        runtime_with(vec![plain_host("h1"), plain_host("h2")]).0
    }

    fn scenario_graph(ctx: &RuntimeContext) -> ExecutionGraph {
        graph(vec![
            node(ctx, "A", failing_on("A", "h1"), &["h1"]),
            node(ctx, "B", noop("B"), &["h1", "h2"]).depends_on("A"),
            node(ctx, "C", noop("C"), &["h2"]).depends_on("A"),
        ])
    }

    fn assert_scenario_results(report: &RunReport) {
        let dep_a = Some(NodeError::DependencyFailed {
            dependency: "A".into(),
        });
        let a = report.result("A", "h1").unwrap();
        assert_eq!(a.status, NodeStatus::Failed);
        assert_eq!(a.error, Some(NodeError::execution("boom")));
        for (n, h) in [("B", "h1"), ("B", "h2"), ("C", "h2")] {
            let r = report.result(n, h).unwrap();
            assert_eq!(r.status, NodeStatus::Skipped, "{}@{}", n, h);
            assert_eq!(r.error, dep_a, "{}@{}", n, h);
            assert_eq!(r.attempts, 0);
        }
        assert_eq!(report.results.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependents_fail_fast() {
        let ctx = two_hosts();
        let graph = scenario_graph(&ctx);
        let report = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;

        assert_scenario_results(&report);
        assert_eq!(report.status, RunStatus::Failed);
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependents_continue_on_error() {
        let ctx = two_hosts();
        let graph = scenario_graph(&ctx);
        let report = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::ContinueOnError, false)
            .await;

        assert_scenario_results(&report);
        assert_eq!(report.status, RunStatus::PartialFailure);
        assert_eq!(report.failed_nodes().len(), 1);
        assert_eq!(report.skipped_nodes().len(), 3);
    }

    #[tokio::test]
    async fn test_continue_on_error_runs_independent_work() {
        let ctx = two_hosts();
        let graph = graph(vec![
            node(&ctx, "bad", failing_on("bad", "h1"), &["h1"]),
            node(&ctx, "after-bad", noop("after-bad"), &["h1"]).depends_on("bad"),
            node(&ctx, "grandchild", noop("grandchild"), &["h2"]).depends_on("after-bad"),
            node(&ctx, "other", noop("other"), &["h2"]),
            node(&ctx, "after-other", noop("after-other"), &["h2"]).depends_on("other"),
        ]);
        let report = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::ContinueOnError, false)
            .await;

        assert_eq!(report.result("other", "h2").unwrap().status, NodeStatus::Succeeded);
        assert_eq!(report.result("after-other", "h2").unwrap().status, NodeStatus::Succeeded);
        assert_eq!(
            report.result("grandchild", "h2").unwrap().error,
            Some(NodeError::DependencyFailed { dependency: "bad".into() })
        );
        assert_eq!(report.status, RunStatus::PartialFailure);
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_undispatched_pairs() {
        let ctx = two_hosts();
        let graph = graph(vec![
            node(&ctx, "first", failing_on("first", "h1"), &["h1"]),
            node(&ctx, "second", noop("second"), &["h2"]),
        ]);
        let engine = Engine::new(EngineConfig {
            max_concurrency: 1,
            ..Default::default()
        });
        let report = engine
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;

        assert_eq!(report.result("first", "h1").unwrap().status, NodeStatus::Failed);
        let second = report.result("second", "h2").unwrap();
        assert_eq!(second.status, NodeStatus::Skipped);
        assert_eq!(second.error, Some(NodeError::Aborted));
        assert_eq!(report.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_dependents_wait_for_every_host_of_dependency() {
        let ctx = two_hosts();
        let log: Log = Arc::default();
        let slow_on_h2 = {
            let log = log.clone();
            FnStep::new("fanout", move |_ctx, host| {
                let log = log.clone();
                async move {
                    let start = Instant::now();
                    let delay = if host.name == "h2" { 60 } else { 5 };
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    log.lock().unwrap().push(Interval {
                        node: "fanout".to_string(),
                        host: host.name.clone(),
                        start,
                        end: Instant::now(),
                    });
                    Ok(StepOutput::changed())
                }
            })
        };
        let graph = graph(vec![
            node(&ctx, "fanout", slow_on_h2, &["h1", "h2"]),
            node(&ctx, "after", tracked("after", &log, Duration::ZERO), &["h1"]).depends_on("fanout"),
        ]);

        let report = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;
        assert!(report.succeeded());

        let log = log.lock().unwrap();
        let after = log.iter().find(|i| i.node == "after").unwrap();
        for dep in log.iter().filter(|i| i.node == "fanout") {
            assert!(after.start >= dep.end, "after started before fanout@{}", dep.host);
        }
    }

    #[tokio::test]
    async fn test_per_host_cap_serializes_pairs() {
        let ctx = two_hosts();
        let log: Log = Arc::default();
        let graph = graph(vec![
            node(&ctx, "a", tracked("a", &log, Duration::from_millis(30)), &["h1"]),
            node(&ctx, "b", tracked("b", &log, Duration::from_millis(30)), &["h1"]),
            node(&ctx, "c", tracked("c", &log, Duration::from_millis(30)), &["h1", "h2"]),
        ]);
        let engine = Engine::new(EngineConfig {
            max_per_host: 1,
            ..Default::default()
        });
        let report = engine
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;
        assert!(report.succeeded());

        let mut on_h1: Vec<Interval> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.host == "h1")
            .cloned()
            .collect();
        assert_eq!(on_h1.len(), 3);
        on_h1.sort_by_key(|i| i.start);
        for pair in on_h1.windows(2) {
            assert!(pair[1].start >= pair[0].end, "{} overlapped {}", pair[1].node, pair[0].node);
        }
    }

    #[tokio::test]
    async fn test_independent_nodes_run_concurrently() {
        // Both steps must be in flight at once to pass the barrier
        let ctx = two_hosts();
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let waiting = |name: &str| {
            let barrier = barrier.clone();
            FnStep::new(name, move |_ctx, _host| {
                let barrier = barrier.clone();
                async move {
                    if tokio::time::timeout(Duration::from_secs(2), barrier.wait())
                        .await
                        .is_err()
                    {
                        return Err(StepError::failed("peer never started"));
                    }
                    Ok(StepOutput::changed())
                }
            })
        };
        let graph = graph(vec![
            node(&ctx, "left", waiting("left"), &["h1"]),
            node(&ctx, "right", waiting("right"), &["h1"]),
        ]);

        let report = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;
        assert!(report.succeeded(), "{:?}", report.failed_nodes());
    }

    fn command_graph(ctx: &RuntimeContext) -> ExecutionGraph {
        graph(vec![
            node(ctx, "prep:swap", CommandStep::new("swap", "swapoff -a").elevated(), &["h1", "h2"]),
            node(
                ctx,
                "prep:sysctl",
                WriteFileStep::new("sysctl", "/etc/sysctl.d/k8s.conf", "net.ipv4.ip_forward = 1\n"),
                &["h1", "h2"],
            )
            .depends_on("prep:swap"),
            node(ctx, "init:kubeadm", CommandStep::new("kubeadm", "kubeadm init"), &["h1"])
                .depends_on("prep:sysctl"),
        ])
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_connector_calls() {
        let (ctx, connectors) = runtime_with(vec![plain_host("h1"), plain_host("h2")]);
        let graph = command_graph(&ctx);

        let dry = Engine::default()
            .execute_with_policy(&graph, ctx.clone(), FailurePolicy::FailFast, true)
            .await;
        assert!(dry.dry_run);
        assert!(dry.succeeded());
        assert!(connectors.iter().all(|c| c.call_count() == 0));
        assert_eq!(
            dry.result("prep:swap", "h2").unwrap().message.as_deref(),
            Some("h2: sudo swapoff -a")
        );

        let real = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;
        let coverage = |r: &RunReport| -> Vec<(String, String)> {
            r.results.iter().map(|n| (n.node.to_string(), n.host.clone())).collect()
        };
        assert_eq!(coverage(&dry), coverage(&real));
        assert!(connectors.iter().any(|c| c.mutation_count() > 0));
    }

    #[tokio::test]
    async fn test_dry_run_keeps_skip_semantics_for_structure() {
        let ctx = two_hosts();
        let graph = scenario_graph(&ctx);
        let report = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, true)
            .await;
        // Steps are not executed, so nothing fails
        assert!(report.succeeded());
        assert_eq!(report.results.len(), 4);
    }

    #[tokio::test]
    async fn test_converged_hosts_see_no_mutations() {
        let converged = |c: MemoryConnector| c.with_file("/etc/sysctl.d/k8s.conf", "net.ipv4.ip_forward = 1\n");
        let (ctx, connectors) = runtime_with(vec![memory_host("h1", converged), memory_host("h2", converged)]);
        let graph = graph(vec![
            node(
                &ctx,
                "prep:sysctl",
                WriteFileStep::new("sysctl", "/etc/sysctl.d/k8s.conf", "net.ipv4.ip_forward = 1\n"),
                &["h1", "h2"],
            ),
            node(
                &ctx,
                "prep:modules",
                FnStep::new("modules", |_ctx, _host| async {
                    Err::<StepOutput, _>(StepError::failed("should not run"))
                })
                    .with_check(|_ctx, _host| async { Ok(true) }),
                &["h1", "h2"],
            )
            .depends_on("prep:sysctl"),
        ]);

        for _ in 0..2 {
            let report = Engine::default()
                .execute_with_policy(&graph, ctx.clone(), FailurePolicy::FailFast, false)
                .await;
            assert!(report.succeeded());
            assert!(report.results.iter().all(|r| r.up_to_date && r.attempts == 0));
            assert_eq!(report.summary().up_to_date, 4);
            assert!(connectors.iter().all(|c| c.mutation_count() == 0));
        }
    }

    #[tokio::test]
    async fn test_check_error_falls_back_to_run() {
        let ctx = two_hosts();
        let graph = graph(vec![node(
            &ctx,
            "probe",
            noop("probe").with_check(|_ctx, _host| async { Err(StepError::failed("probe broke")) }),
            &["h1"],
        )]);
        let report = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;
        let result = report.result("probe", "h1").unwrap();
        assert_eq!(result.status, NodeStatus::Succeeded);
        assert_eq!(result.attempts, 1);
        assert!(!result.up_to_date);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let ctx = two_hosts();
        let calls = Arc::new(AtomicU32::new(0));
        let flaky = {
            let calls = calls.clone();
            FnStep::new("flaky", move |_ctx, _host| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(StepError::failed("apt lock held"))
                    } else {
                        Ok(StepOutput::changed())
                    }
                }
            })
        };
        let graph = graph(vec![node(&ctx, "flaky", flaky, &["h1"])
            .with_retry(RetryPolicy::new(3).with_backoff(Duration::from_millis(1)))]);

        let (tx, mut rx) = progress_channel();
        let report = Engine::default()
            .with_progress(tx)
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;

        let result = report.result("flaky", "h1").unwrap();
        assert_eq!(result.status, NodeStatus::Succeeded);
        assert_eq!(result.attempts, 3);

        let mut retries = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ExecutionEvent::NodeRetrying { .. }) {
                retries += 1;
            }
        }
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let ctx = two_hosts();
        let engine = Engine::new(EngineConfig {
            default_retry: RetryPolicy::new(2).with_backoff(Duration::from_millis(1)),
            ..Default::default()
        });
        let graph = graph(vec![node(&ctx, "broken", failing_on("broken", "h1"), &["h1"])]);
        let report = engine
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;
        let result = report.result("broken", "h1").unwrap();
        assert_eq!(result.status, NodeStatus::Failed);
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let ctx = two_hosts();
        let log: Log = Arc::default();
        let graph = graph(vec![node(&ctx, "hang", tracked("hang", &log, Duration::from_secs(10)), &["h1"])
            .with_timeout(Duration::from_millis(20))]);

        let started = Instant::now();
        let report = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            report.result("hang", "h1").unwrap().error,
            Some(NodeError::Timeout {
                after: Duration::from_millis(20)
            })
        );
    }

    #[tokio::test]
    async fn test_stalled_check_is_bounded_by_node_timeout() {
        let ctx = two_hosts();
        let ran = Arc::new(AtomicU32::new(0));
        let step = {
            let ran = ran.clone();
            FnStep::new("probe-hangs", move |_ctx, _host| {
                let ran = ran.clone();
                async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(StepOutput::changed())
                }
            })
            .with_check(|_ctx, _host| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(true)
            })
        };
        let graph = graph(vec![
            node(&ctx, "probe-hangs", step, &["h1"]).with_timeout(Duration::from_millis(50))
        ]);

        let started = Instant::now();
        let report = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));

        let result = report.result("probe-hangs", "h1").unwrap();
        assert_eq!(result.status, NodeStatus::Succeeded);
        assert!(!result.up_to_date);
        assert_eq!(result.attempts, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_global_cap_bounds_pairs_in_flight() {
        let ctx = runtime_with(vec![
            plain_host("h1"),
            plain_host("h2"),
            plain_host("h3"),
            plain_host("h4"),
            plain_host("h5"),
        ])
        .0;
        let log: Log = Arc::default();
        let nodes = ["h1", "h2", "h3", "h4", "h5"]
            .into_iter()
            .map(|h| {
                let id = format!("work-{}", h);
                node(&ctx, &id, tracked(&id, &log, Duration::from_millis(30)), &[h])
            })
            .collect();
        let graph = graph(nodes);
        let engine = Engine::new(EngineConfig {
            max_concurrency: 2,
            ..Default::default()
        });
        let report = engine
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;
        assert!(report.succeeded());

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 5);
        for interval in log.iter() {
            let in_flight = log
                .iter()
                .filter(|other| other.start <= interval.start && interval.start < other.end)
                .count();
            assert!(in_flight <= 2, "{} pairs in flight when {} started", in_flight, interval.node);
        }
    }

    #[tokio::test]
    async fn test_limits_past_semaphore_ceiling_are_clamped() {
        let ctx = two_hosts();
        let graph = graph(vec![
            node(&ctx, "a", noop("a"), &["h1", "h2"]),
            node(&ctx, "b", noop("b"), &["h2"]).depends_on("a"),
        ]);
        let engine = Engine::new(EngineConfig {
            max_concurrency: usize::MAX,
            max_per_host: usize::MAX,
            ..Default::default()
        });
        let report = engine
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;

        assert!(report.succeeded());
        assert_eq!(report.results.len(), 3);
        assert_eq!(permits(usize::MAX), Semaphore::MAX_PERMITS);
        assert_eq!(permits(0), Semaphore::MAX_PERMITS);
        assert_eq!(permits(4), 4);
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_run() {
        let ctx = two_hosts();
        let log: Log = Arc::default();
        let graph = graph(vec![
            node(&ctx, "long", tracked("long", &log, Duration::from_secs(10)), &["h1"]),
            node(&ctx, "next", noop("next"), &["h1"]).depends_on("long"),
        ]);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let report = Engine::default()
            .execute(&graph, ctx, RunOptions::default(), cancel)
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.status, RunStatus::Cancelled);
        let long = report.result("long", "h1").unwrap();
        assert_eq!(long.status, NodeStatus::Failed);
        assert_eq!(long.error, Some(NodeError::Cancelled));
        let next = report.result("next", "h1").unwrap();
        assert_eq!(next.status, NodeStatus::Skipped);
        assert_eq!(next.error, Some(NodeError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let ctx = two_hosts();
        let graph = scenario_graph(&ctx);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = Engine::default()
            .execute(&graph, ctx, RunOptions::default(), cancel)
            .await;
        assert_eq!(report.status, RunStatus::Cancelled);
        assert!(report
            .results
            .iter()
            .all(|r| r.status == NodeStatus::Skipped && r.error == Some(NodeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_rollback_unwinds_ancestors_in_reverse_order() {
        let ctx = two_hosts();
        let undone: Arc<Mutex<Vec<String>>> = Arc::default();
        let undoable = |name: &str| {
            let undone = undone.clone();
            let label = name.to_string();
            noop(name).with_rollback(move |_ctx, host| {
                let undone = undone.clone();
                let label = label.clone();
                async move {
                    undone.lock().unwrap().push(format!("{}@{}", label, host.name));
                    Ok(())
                }
            })
        };
        let graph = graph(vec![
            node(&ctx, "certs", undoable("certs"), &["h1"]),
            node(&ctx, "config", undoable("config"), &["h1"]).depends_on("certs"),
            node(&ctx, "unrelated", undoable("unrelated"), &["h2"]),
            node(&ctx, "start", failing_on("start", "h1"), &["h1"]).depends_on("config"),
        ]);
        let engine = Engine::new(EngineConfig {
            rollback_on_failure: true,
            ..Default::default()
        });

        let report = engine
            .execute_with_policy(&graph, ctx, FailurePolicy::ContinueOnError, false)
            .await;

        assert_eq!(*undone.lock().unwrap(), vec!["config@h1", "certs@h1"]);
        assert_eq!(
            report.result("certs", "h1").unwrap().rollback,
            Some(RollbackOutcome::RolledBack)
        );
        assert_eq!(report.result("unrelated", "h2").unwrap().rollback, None);
        assert_eq!(report.summary().rolled_back, 2);
    }

    #[tokio::test]
    async fn test_rollback_failure_is_recorded_not_fatal() {
        let ctx = two_hosts();
        let graph = graph(vec![
            node(
                &ctx,
                "base",
                noop("base").with_rollback(|_ctx, _host| async { Err(StepError::failed("cannot undo")) }),
                &["h1"],
            ),
            node(&ctx, "top", failing_on("top", "h1"), &["h1"]).depends_on("base"),
        ]);
        let engine = Engine::new(EngineConfig {
            rollback_on_failure: true,
            ..Default::default()
        });
        let report = engine
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(
            report.result("base", "h1").unwrap().rollback,
            Some(RollbackOutcome::Failed {
                message: "cannot undo".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_panicking_step_is_recorded_as_failure() {
        let ctx = two_hosts();
        let graph = graph(vec![node(
            &ctx,
            "explode",
            FnStep::new("explode", |_ctx, _host| async {
                if true {
                    panic!("kaboom");
                }
                Ok(StepOutput::changed())
            }),
            &["h1"],
        )]);
        let report = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::ContinueOnError, false)
            .await;

        let result = report.result("explode", "h1").unwrap();
        assert_eq!(result.status, NodeStatus::Failed);
        match &result.error {
            Some(NodeError::Execution { message }) => assert!(message.contains("kaboom")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_progress_events_bracket_the_run() {
        let ctx = two_hosts();
        let graph = scenario_graph(&ctx);
        let (tx, mut rx) = progress_channel();
        let report = Engine::default()
            .with_progress(tx)
            .execute_with_policy(&graph, ctx, FailurePolicy::ContinueOnError, false)
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(ExecutionEvent::RunStarted { total_pairs: 4, .. })));
        assert!(matches!(
            events.last(),
            Some(ExecutionEvent::RunCompleted { status: RunStatus::PartialFailure, .. })
        ));
        let skipped = events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::NodeSkipped { .. }))
            .count();
        assert_eq!(skipped, 3);
        assert_eq!(report.summary().skipped, 3);
    }

    #[tokio::test]
    async fn test_results_follow_graph_then_host_order() {
        let ctx = two_hosts();
        let graph = graph(vec![
            node(&ctx, "first", noop("first"), &["h2", "h1"]),
            node(&ctx, "second", noop("second"), &["h1"]).depends_on("first"),
        ]);
        let report = Engine::default()
            .execute_with_policy(&graph, ctx, FailurePolicy::FailFast, false)
            .await;
        let order: Vec<(String, String)> = report
            .results
            .iter()
            .map(|r| (r.node.to_string(), r.host.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("first".to_string(), "h2".to_string()),
                ("first".to_string(), "h1".to_string()),
                ("second".to_string(), "h1".to_string()),
            ]
        );
    }
}
