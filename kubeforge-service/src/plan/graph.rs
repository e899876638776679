// Execution Graph (DAG) Model
// Nodes, composable fragments and the final immutable graph handed to the engine

use crate::error::PlanningError;
use crate::execution::RetryPolicy;
use crate::inventory::Host;
use crate::step::Step;

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Human-legible node identifier, conventionally `task:step`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id for `step` planned by `task`
    pub fn scoped(task: &str, step: &str) -> Self {
        Self(format!("{}:{}", task, step))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Task part of a scoped id (the whole id when unscoped)
    pub fn task(&self) -> &str {
        self.0.split_once(':').map(|(task, _)| task).unwrap_or(&self.0)
    }

    /// Step part of a scoped id (the whole id when unscoped)
    pub fn step(&self) -> &str {
        self.0.split_once(':').map(|(_, step)| step).unwrap_or(&self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A step bound to its target hosts and the nodes it depends on
#[derive(Debug, Clone)]
pub struct ExecutionNode {
    pub id: NodeId,
    pub step: Arc<dyn Step>,
    /// Target hosts in resolution order, without duplicates
    pub hosts: Vec<Arc<Host>>,
    pub dependencies: BTreeSet<NodeId>,
    /// Overrides the engine's default retry policy
    pub retry: Option<RetryPolicy>,
    /// Limit applied to each attempt
    pub timeout: Option<Duration>,
}

impl ExecutionNode {
    pub fn new<I>(id: impl Into<NodeId>, step: Arc<dyn Step>, hosts: I) -> Self
    where
        I: IntoIterator<Item = Arc<Host>>,
    {
        let mut seen = HashSet::new();
        let hosts = hosts
            .into_iter()
            .filter(|h| seen.insert(h.name.clone()))
            .collect();
        Self {
            id: id.into(),
            step,
            hosts,
            dependencies: BTreeSet::new(),
            retry: None,
            timeout: None,
        }
    }

    pub fn depends_on(mut self, id: impl Into<NodeId>) -> Self {
        self.dependencies.insert(id.into());
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

    pub fn targets(&self, host: &str) -> bool {
        self.hosts.iter().any(|h| h.name == host)
    }

    pub fn host_names(&self) -> Vec<String> {
        self.hosts.iter().map(|h| h.name.clone()).collect()
    }
}

/// How two fragments are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// The second fragment's entry nodes depend on the first's exit nodes
    #[default]
    Sequential,
    /// No cross wiring
    Parallel,
}

/// A partial graph produced by one planning unit.
///
/// Entry nodes have no dependency inside the fragment and exit nodes have no
/// dependent inside it. Both sets are recomputed after every mutation.
/// Dependencies on nodes outside the fragment are allowed until the graph is
/// built.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFragment {
    nodes: BTreeMap<NodeId, ExecutionNode>,
    order: Vec<NodeId>,
    entry_nodes: BTreeSet<NodeId>,
    exit_nodes: BTreeSet<NodeId>,
}

impl ExecutionFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragment holding a single node
    pub fn single(node: ExecutionNode) -> Result<Self, PlanningError> {
        let mut fragment = Self::new();
        fragment.add_node(node)?;
        Ok(fragment)
    }

    /// Add a node, rejecting empty host sets, self loops and id collisions
    pub fn add_node(&mut self, node: ExecutionNode) -> Result<NodeId, PlanningError> {
        if node.hosts.is_empty() {
            return Err(PlanningError::EmptyHosts { id: node.id });
        }
        if node.dependencies.contains(&node.id) {
            return Err(PlanningError::SelfDependency { id: node.id });
        }
        if self.nodes.contains_key(&node.id) {
            return Err(PlanningError::DuplicateNode { id: node.id });
        }

        let id = node.id.clone();
        self.order.push(id.clone());
        self.nodes.insert(id.clone(), node);

        if let Some(path) = self.find_cycle() {
            self.order.pop();
            self.nodes.remove(&id);
            return Err(PlanningError::CyclicDependency { path });
        }
        self.recompute_boundaries();
        Ok(id)
    }

    /// Make `node` depend on `dependency`
    pub fn add_dependency(
        &mut self,
        node: &NodeId,
        dependency: &NodeId,
    ) -> Result<(), PlanningError> {
        if node == dependency {
            return Err(PlanningError::SelfDependency { id: node.clone() });
        }
        let entry = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| PlanningError::UnknownNode { id: node.clone() })?;
        if !entry.dependencies.insert(dependency.clone()) {
            return Ok(());
        }

        if let Some(path) = self.find_cycle() {
            if let Some(entry) = self.nodes.get_mut(node) {
                entry.dependencies.remove(dependency);
            }
            return Err(PlanningError::CyclicDependency { path });
        }
        self.recompute_boundaries();
        Ok(())
    }

    /// Merge `other` into this fragment.
    ///
    /// An empty fragment on either side is the identity. Id collisions and
    /// cycles introduced by the merge are reported here, before any graph
    /// exists.
    pub fn merge(mut self, other: ExecutionFragment, policy: MergePolicy) -> Result<Self, PlanningError> {
        if other.is_empty() {
            return Ok(self);
        }
        if self.is_empty() {
            return Ok(other);
        }

        if let Some(id) = other.order.iter().find(|id| self.nodes.contains_key(*id)) {
            return Err(PlanningError::DuplicateNode { id: id.clone() });
        }

        let exits = self.exit_nodes.clone();
        let ExecutionFragment {
            mut nodes,
            order,
            entry_nodes,
            ..
        } = other;

        if policy == MergePolicy::Sequential {
            for entry in &entry_nodes {
                if let Some(node) = nodes.get_mut(entry) {
                    node.dependencies.extend(exits.iter().cloned());
                }
            }
        }

        for id in order {
            if let Some(node) = nodes.remove(&id) {
                self.nodes.insert(id.clone(), node);
                self.order.push(id);
            }
        }

        if let Some(path) = self.find_cycle() {
            return Err(PlanningError::CyclicDependency { path });
        }
        self.recompute_boundaries();
        Ok(self)
    }

    /// Fold `fragments` left to right under one policy
    pub fn merge_all<I>(fragments: I, policy: MergePolicy) -> Result<Self, PlanningError>
    where
        I: IntoIterator<Item = ExecutionFragment>,
    {
        fragments
            .into_iter()
            .try_fold(Self::new(), |acc, fragment| acc.merge(fragment, policy))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ExecutionNode> {
        self.nodes.get(id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &ExecutionNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn entry_nodes(&self) -> &BTreeSet<NodeId> {
        &self.entry_nodes
    }

    pub fn exit_nodes(&self) -> &BTreeSet<NodeId> {
        &self.exit_nodes
    }

    /// Validate and freeze into an [`ExecutionGraph`]
    pub fn into_graph(self) -> Result<ExecutionGraph, PlanningError> {
        ExecutionGraph::from_fragment(self)
    }

    fn recompute_boundaries(&mut self) {
        let mut depended_on = HashSet::new();
        self.entry_nodes.clear();

        for (id, node) in &self.nodes {
            let mut internal = false;
            for dep in &node.dependencies {
                if self.nodes.contains_key(dep) {
                    internal = true;
                    depended_on.insert(dep.clone());
                }
            }
            if !internal {
                self.entry_nodes.insert(id.clone());
            }
        }

        self.exit_nodes = self
            .nodes
            .keys()
            .filter(|id| !depended_on.contains(*id))
            .cloned()
            .collect();
    }

    /// Cycle among nodes of this fragment, as a closed path
    fn find_cycle(&self) -> Option<Vec<NodeId>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for id in &self.order {
            if !visited.contains(id) {
                if let Some(cycle) = self.dfs_cycle(id, &mut visited, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        id: &'a NodeId,
        visited: &mut HashSet<&'a NodeId>,
        stack: &mut Vec<&'a NodeId>,
    ) -> Option<Vec<NodeId>> {
        visited.insert(id);
        stack.push(id);

        if let Some(node) = self.nodes.get(id) {
            for dep in &node.dependencies {
                if !self.nodes.contains_key(dep) {
                    continue;
                }
                if let Some(pos) = stack.iter().position(|s| *s == dep) {
                    let mut cycle: Vec<NodeId> = stack[pos..].iter().map(|s| (*s).clone()).collect();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        stack.pop();
        None
    }
}

/// The fully merged, immutable DAG for one run.
///
/// Nodes live in an arena in topological order; dependency and dependent
/// edges are stored as arena indices.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    nodes: Vec<ExecutionNode>,
    indices: HashMap<NodeId, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    entry_nodes: BTreeSet<NodeId>,
    exit_nodes: BTreeSet<NodeId>,
}

impl ExecutionGraph {
    /// Build the graph, checking that every dependency exists and that the
    /// whole graph is acyclic
    pub fn from_fragment(fragment: ExecutionFragment) -> Result<Self, PlanningError> {
        for node in fragment.nodes() {
            for dep in &node.dependencies {
                if !fragment.contains(dep.as_str()) {
                    return Err(PlanningError::UnknownDependency {
                        id: node.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        if let Some(path) = fragment.find_cycle() {
            return Err(PlanningError::CyclicDependency { path });
        }

        let ExecutionFragment {
            mut nodes,
            order,
            entry_nodes,
            exit_nodes,
        } = fragment;

        // Kahn's algorithm, seeded and drained in insertion order
        let position: HashMap<&NodeId, usize> =
            order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut in_degree = vec![0usize; order.len()];
        let mut adj_list: Vec<Vec<usize>> = vec![Vec::new(); order.len()];
        for (i, id) in order.iter().enumerate() {
            if let Some(node) = nodes.get(id) {
                for dep in &node.dependencies {
                    if let Some(&d) = position.get(dep) {
                        adj_list[d].push(i);
                        in_degree[i] += 1;
                    }
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..order.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted = Vec::with_capacity(order.len());
        while let Some(i) = queue.pop_front() {
            sorted.push(i);
            for &next in &adj_list[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        if sorted.len() != order.len() {
            return Err(PlanningError::invalid("graph could not be ordered"));
        }

        let mut arena = Vec::with_capacity(sorted.len());
        let mut indices = HashMap::with_capacity(sorted.len());
        for i in sorted {
            if let Some(node) = nodes.remove(&order[i]) {
                indices.insert(node.id.clone(), arena.len());
                arena.push(node);
            }
        }

        let mut dependencies = vec![Vec::new(); arena.len()];
        let mut dependents = vec![Vec::new(); arena.len()];
        for (i, node) in arena.iter().enumerate() {
            for dep in &node.dependencies {
                if let Some(&d) = indices.get(dep) {
                    dependencies[i].push(d);
                    dependents[d].push(i);
                }
            }
        }

        Ok(Self {
            nodes: arena,
            indices,
            dependencies,
            dependents,
            entry_nodes,
            exit_nodes,
        })
    }

    /// Nodes in topological order
    pub fn nodes(&self) -> &[ExecutionNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&ExecutionNode> {
        self.indices.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.indices.get(id).copied()
    }

    /// Arena indices of the nodes `index` depends on
    pub fn dependencies_of(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Arena indices of the nodes that depend on `index`
    pub fn dependents_of(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Informational once the graph is built
    pub fn entry_nodes(&self) -> &BTreeSet<NodeId> {
        &self.entry_nodes
    }

    pub fn exit_nodes(&self) -> &BTreeSet<NodeId> {
        &self.exit_nodes
    }

    /// Number of node-host pairs the engine will schedule
    pub fn pair_count(&self) -> usize {
        self.nodes.iter().map(|n| n.hosts.len()).sum()
    }

    /// Indices of every node that transitively depends on one of `roots`
    pub fn descendants(&self, roots: &[usize]) -> BTreeSet<usize> {
        self.walk(roots, &self.dependents)
    }

    /// Indices of every node one of `roots` transitively depends on
    pub fn ancestors(&self, roots: &[usize]) -> BTreeSet<usize> {
        self.walk(roots, &self.dependencies)
    }

    fn walk(&self, roots: &[usize], edges: &[Vec<usize>]) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<usize> = roots.iter().copied().collect();
        while let Some(i) = queue.pop_front() {
            for &next in &edges[i] {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    /// Longest-path level of every node; nodes on one level are independent
    pub fn levels(&self) -> Vec<usize> {
        let mut levels = vec![0usize; self.nodes.len()];
        for i in 0..self.nodes.len() {
            levels[i] = self.dependencies[i]
                .iter()
                .map(|&d| levels[d] + 1)
                .max()
                .unwrap_or(0);
        }
        levels
    }

    /// Nodes grouped into levels that could run in parallel
    pub fn parallel_levels(&self) -> Vec<Vec<&ExecutionNode>> {
        let mut grouped: Vec<Vec<&ExecutionNode>> = Vec::new();
        for (i, level) in self.levels().into_iter().enumerate() {
            if level >= grouped.len() {
                grouped.resize(level + 1, Vec::new());
            }
            grouped[level].push(&self.nodes[i]);
        }
        grouped
    }

    /// Serializable view of the graph for diagnostics
    pub fn summary(&self) -> GraphSummary {
        let levels = self.levels();
        GraphSummary {
            nodes: self
                .nodes
                .iter()
                .zip(levels)
                .map(|(node, level)| NodeSummary {
                    id: node.id.clone(),
                    step: node.step.meta().name.clone(),
                    description: node.step.meta().description.clone(),
                    hosts: node.host_names(),
                    dependencies: node.dependencies.iter().cloned().collect(),
                    level,
                })
                .collect(),
            entry_nodes: self.entry_nodes.iter().cloned().collect(),
            exit_nodes: self.exit_nodes.iter().cloned().collect(),
            pairs: self.pair_count(),
        }
    }
}

/// Diagnostic dump of an [`ExecutionGraph`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: Vec<NodeSummary>,
    pub entry_nodes: Vec<NodeId>,
    pub exit_nodes: Vec<NodeId>,
    pub pairs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub step: String,
    pub description: String,
    pub hosts: Vec<String>,
    pub dependencies: Vec<NodeId>,
    pub level: usize,
}
