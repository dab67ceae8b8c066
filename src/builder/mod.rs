//! Graph construction surface
//!
//! [`FlowGraph`] is the public wrapper used to declare tasks and dependency
//! edges before handing the graph to an executor. [`Subflow`] is the
//! transient builder a running subflow payload receives to grow a nested
//! sub-graph mid-run. Both embed the same `GraphCore` capability by
//! composition, so the construction rules are identical in either place.
//!
//! Task handles are copyable `(graph, index)` pairs; they carry no payload
//! and are only valid against the graph that created them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::BuildError;
use crate::graph::arena::NodeArena;
use crate::graph::dump;
use crate::graph::node::{BranchSet, NodeKind, Work};
use crate::graph::node_id::NodeId;

/// Process-wide counter distinguishing graphs, so handles from one graph
/// are rejected by another.
static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(0);

/// A lightweight, copyable reference to a task within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    graph: u64,
    node: NodeId,
}

impl TaskHandle {
    /// The node id this handle refers to.
    #[inline]
    pub fn id(&self) -> NodeId {
        self.node
    }
}

/// The shared construction capability embedded by [`FlowGraph`] and
/// [`Subflow`].
#[derive(Debug)]
pub(crate) struct GraphCore {
    id: u64,
    arena: NodeArena,
}

impl GraphCore {
    fn new() -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            arena: NodeArena::new(),
        }
    }

    fn add_task(&mut self, name: impl Into<String>, mut payload: impl FnMut() + Send + 'static) -> TaskHandle {
        self.add_work(
            name,
            Work::Static(Box::new(move || {
                payload();
                Ok(())
            })),
        )
    }

    fn add_fallible_task(
        &mut self,
        name: impl Into<String>,
        payload: impl FnMut() -> anyhow::Result<()> + Send + 'static,
    ) -> TaskHandle {
        self.add_work(name, Work::Static(Box::new(payload)))
    }

    fn add_condition(
        &mut self,
        name: impl Into<String>,
        payload: impl FnMut() -> BranchSet + Send + 'static,
    ) -> TaskHandle {
        self.add_work(name, Work::Condition(Box::new(payload)))
    }

    fn add_subflow(
        &mut self,
        name: impl Into<String>,
        payload: impl FnMut(&mut Subflow) + Send + 'static,
    ) -> TaskHandle {
        self.add_work(name, Work::Subflow(Box::new(payload)))
    }

    fn add_work(&mut self, name: impl Into<String>, work: Work) -> TaskHandle {
        TaskHandle {
            graph: self.id,
            node: self.arena.push_node(name, work),
        }
    }

    /// Resolve a handle against this graph, rejecting foreign ones.
    fn resolve(&self, handle: TaskHandle) -> Result<NodeId, BuildError> {
        if handle.graph != self.id {
            return Err(BuildError::ForeignHandle);
        }
        Ok(handle.node)
    }

    fn add_dependency(
        &mut self,
        predecessor: TaskHandle,
        successor: TaskHandle,
    ) -> Result<(), BuildError> {
        let from = self.resolve(predecessor)?;
        let to = self.resolve(successor)?;
        self.arena.link(from, to)
    }

    fn precede<I>(&mut self, task: TaskHandle, successors: I) -> Result<(), BuildError>
    where
        I: IntoIterator<Item = TaskHandle>,
    {
        for succ in successors {
            self.add_dependency(task, succ)?;
        }
        Ok(())
    }

    fn succeed<I>(&mut self, task: TaskHandle, predecessors: I) -> Result<(), BuildError>
    where
        I: IntoIterator<Item = TaskHandle>,
    {
        for pred in predecessors {
            self.add_dependency(pred, task)?;
        }
        Ok(())
    }
}

/// A task graph under construction, ready to be run once built.
///
/// Build the topology with `&mut` access, wrap the graph in an `Arc`, and
/// submit it to an [`Executor`](crate::Executor). The same graph can be run
/// again once the previous run finished; each run re-initializes the
/// per-run counters and states.
#[derive(Debug)]
pub struct FlowGraph {
    name: String,
    core: GraphCore,
    running: AtomicBool,
}

impl FlowGraph {
    /// Create an empty graph with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            core: GraphCore::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Get the graph's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a task with an infallible payload.
    pub fn add_task(&mut self, name: impl Into<String>, payload: impl FnMut() + Send + 'static) -> TaskHandle {
        self.core.add_task(name, payload)
    }

    /// Add a task whose payload may fail.
    ///
    /// An `Err` is captured as a task failure on the run; siblings keep
    /// running and the failure surfaces when the run handle is awaited.
    pub fn add_fallible_task(
        &mut self,
        name: impl Into<String>,
        payload: impl FnMut() -> anyhow::Result<()> + Send + 'static,
    ) -> TaskHandle {
        self.core.add_fallible_task(name, payload)
    }

    /// Add a condition task.
    ///
    /// The payload returns the set of successor edges to take, indexed by
    /// the order in which the successor edges are declared. Any subset may
    /// be selected; successors not selected stay waiting for the rest of
    /// the run and are reported as skipped.
    pub fn add_condition(
        &mut self,
        name: impl Into<String>,
        payload: impl FnMut() -> BranchSet + Send + 'static,
    ) -> TaskHandle {
        self.core.add_condition(name, payload)
    }

    /// Add a subflow task.
    ///
    /// At run time the payload receives a [`Subflow`] builder; every node
    /// it adds joins the same run, and this task only completes once the
    /// whole nested graph (transitively) has.
    pub fn add_subflow(
        &mut self,
        name: impl Into<String>,
        payload: impl FnMut(&mut Subflow) + Send + 'static,
    ) -> TaskHandle {
        self.core.add_subflow(name, payload)
    }

    /// Declare that `successor` runs after `predecessor`.
    pub fn add_dependency(
        &mut self,
        predecessor: TaskHandle,
        successor: TaskHandle,
    ) -> Result<(), BuildError> {
        self.core.add_dependency(predecessor, successor)
    }

    /// Declare that every handle in `successors` runs after `task`.
    pub fn precede<I>(&mut self, task: TaskHandle, successors: I) -> Result<(), BuildError>
    where
        I: IntoIterator<Item = TaskHandle>,
    {
        self.core.precede(task, successors)
    }

    /// Declare that `task` runs after every handle in `predecessors`.
    pub fn succeed<I>(&mut self, task: TaskHandle, predecessors: I) -> Result<(), BuildError>
    where
        I: IntoIterator<Item = TaskHandle>,
    {
        self.core.succeed(task, predecessors)
    }

    /// Number of tasks declared so far.
    #[inline]
    pub fn num_tasks(&self) -> usize {
        self.core.arena.len()
    }

    /// Number of dependency edges declared so far.
    #[inline]
    pub fn num_dependencies(&self) -> usize {
        self.core.arena.num_edges()
    }

    /// Name of the task behind `handle`.
    pub fn task_name(&self, handle: TaskHandle) -> Result<&str, BuildError> {
        let id = self.core.resolve(handle)?;
        Ok(self.core.arena.get(id).name())
    }

    /// Kind of the task behind `handle`.
    pub fn task_kind(&self, handle: TaskHandle) -> Result<NodeKind, BuildError> {
        let id = self.core.resolve(handle)?;
        Ok(self.core.arena.get(id).kind())
    }

    /// Number of predecessors of the task behind `handle`.
    pub fn num_predecessors(&self, handle: TaskHandle) -> Result<usize, BuildError> {
        let id = self.core.resolve(handle)?;
        Ok(self.core.arena.get(id).num_dependencies())
    }

    /// Number of successors of the task behind `handle`.
    pub fn num_successors(&self, handle: TaskHandle) -> Result<usize, BuildError> {
        let id = self.core.resolve(handle)?;
        Ok(self.core.arena.get(id).num_dependents())
    }

    /// Render the graph topology as Graphviz DOT.
    pub fn dump(&self) -> String {
        dump::to_dot(&self.name, &self.core.arena)
    }

    /// The arena backing this graph.
    #[inline]
    pub(crate) fn arena(&self) -> &NodeArena {
        &self.core.arena
    }

    /// Claim the graph for a run. Fails if a run is still in flight.
    pub(crate) fn begin_run(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the graph after its run finished.
    pub(crate) fn end_run(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// The nested graph builder handed to a running subflow payload.
///
/// Offers the same construction surface as [`FlowGraph`]. Everything added
/// here becomes part of the spawning run; the spawning task completes only
/// after every node added here, including further nested subflows, has
/// completed.
#[derive(Debug)]
pub struct Subflow {
    core: GraphCore,
}

impl Subflow {
    pub(crate) fn new() -> Self {
        Self {
            core: GraphCore::new(),
        }
    }

    /// Add a task with an infallible payload.
    pub fn add_task(&mut self, name: impl Into<String>, payload: impl FnMut() + Send + 'static) -> TaskHandle {
        self.core.add_task(name, payload)
    }

    /// Add a task whose payload may fail.
    pub fn add_fallible_task(
        &mut self,
        name: impl Into<String>,
        payload: impl FnMut() -> anyhow::Result<()> + Send + 'static,
    ) -> TaskHandle {
        self.core.add_fallible_task(name, payload)
    }

    /// Add a condition task.
    pub fn add_condition(
        &mut self,
        name: impl Into<String>,
        payload: impl FnMut() -> BranchSet + Send + 'static,
    ) -> TaskHandle {
        self.core.add_condition(name, payload)
    }

    /// Add a nested subflow task.
    pub fn add_subflow(
        &mut self,
        name: impl Into<String>,
        payload: impl FnMut(&mut Subflow) + Send + 'static,
    ) -> TaskHandle {
        self.core.add_subflow(name, payload)
    }

    /// Declare that `successor` runs after `predecessor`.
    pub fn add_dependency(
        &mut self,
        predecessor: TaskHandle,
        successor: TaskHandle,
    ) -> Result<(), BuildError> {
        self.core.add_dependency(predecessor, successor)
    }

    /// Declare that every handle in `successors` runs after `task`.
    pub fn precede<I>(&mut self, task: TaskHandle, successors: I) -> Result<(), BuildError>
    where
        I: IntoIterator<Item = TaskHandle>,
    {
        self.core.precede(task, successors)
    }

    /// Declare that `task` runs after every handle in `predecessors`.
    pub fn succeed<I>(&mut self, task: TaskHandle, predecessors: I) -> Result<(), BuildError>
    where
        I: IntoIterator<Item = TaskHandle>,
    {
        self.core.succeed(task, predecessors)
    }

    /// Number of tasks declared so far.
    #[inline]
    pub fn num_tasks(&self) -> usize {
        self.core.arena.len()
    }

    /// Consume the builder, yielding the populated arena.
    pub(crate) fn into_arena(self) -> NodeArena {
        self.core.arena
    }
}

#[cfg(test)]
mod tests;
