//! Task node for the dependency graph
//!
//! Represents one unit of work: its payload, its edges, and the run-scoped
//! join counter and state the executor drives.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::node_id::NodeId;
use crate::builder::Subflow;

/// The set of successor indices a condition payload selects.
///
/// Indices refer to the order in which successor edges were declared on the
/// condition node. Any subset may be selected, including none or all.
pub type BranchSet = SmallVec<[usize; 4]>;

/// Kind of work a node carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A plain callable, run once per run.
    Static,
    /// A callable returning the set of successor edges to take.
    Condition,
    /// A callable that may spawn a nested sub-graph.
    Subflow,
}

/// The work payload stored inside a node.
///
/// Payloads are `FnMut` so a graph can be re-run; the executor invokes each
/// payload from exactly one worker at a time.
pub(crate) enum Work {
    /// Runs to completion; an `Err` is captured as a task failure.
    Static(Box<dyn FnMut() -> anyhow::Result<()> + Send>),
    /// Selects which successor edges are taken for this run.
    Condition(Box<dyn FnMut() -> BranchSet + Send>),
    /// May populate a nested sub-graph merged into the same run.
    Subflow(Box<dyn FnMut(&mut Subflow) + Send>),
}

impl Work {
    /// The kind tag matching this payload.
    #[inline]
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Work::Static(_) => NodeKind::Static,
            Work::Condition(_) => NodeKind::Condition,
            Work::Subflow(_) => NodeKind::Subflow,
        }
    }
}

/// Per-run node state.
///
/// States move in one direction only: Waiting -> Ready -> Running ->
/// Completed. A node left Waiting at the end of a run was skipped (its
/// predecessors never took the edge leading to it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Join counter above zero; not yet schedulable.
    Waiting,
    /// Join counter reached zero; queued for execution.
    Ready,
    /// Dequeued; payload is being invoked.
    Running,
    /// Terminal; the node finished this run.
    Completed,
}

impl NodeState {
    /// Convert from u8 (for atomic storage).
    #[inline]
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => NodeState::Waiting,
            1 => NodeState::Ready,
            2 => NodeState::Running,
            _ => NodeState::Completed,
        }
    }

    /// Convert to u8 (for atomic storage).
    #[inline]
    pub fn as_u8(&self) -> u8 {
        match self {
            NodeState::Waiting => 0,
            NodeState::Ready => 1,
            NodeState::Running => 2,
            NodeState::Completed => 3,
        }
    }
}

/// A node in the task graph.
///
/// Each node owns its payload and refers to predecessors and successors by
/// index within the same arena. The join counter and state are run-scoped
/// and re-initialized by the executor before every run.
pub struct Node {
    /// Human-readable name for introspection and failure reports.
    name: String,

    /// Kind tag, fixed at construction.
    kind: NodeKind,

    /// The payload, invoked by one worker at a time.
    work: Mutex<Work>,

    /// Nodes this node depends on (predecessors).
    dependencies: Vec<NodeId>,

    /// Nodes that depend on this node (successors), in declaration order.
    /// Condition payloads select branches by index into this list.
    dependents: Vec<NodeId>,

    /// Not-yet-completed predecessors, this run.
    join: AtomicUsize,

    /// Current state, this run.
    state: AtomicU8,
}

impl Node {
    /// Create a new node with the given name and payload.
    pub(crate) fn new(name: impl Into<String>, work: Work) -> Self {
        let kind = work.kind();
        Self {
            name: name.into(),
            kind,
            work: Mutex::new(work),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            join: AtomicUsize::new(0),
            state: AtomicU8::new(NodeState::Waiting.as_u8()),
        }
    }

    /// Get the node's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the kind of work this node carries.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Borrow the payload for invocation.
    #[inline]
    pub(crate) fn work(&self) -> &Mutex<Work> {
        &self.work
    }

    /// Get the list of nodes this node depends on.
    #[inline]
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Get the list of nodes that depend on this node.
    #[inline]
    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    /// Add a dependency edge (this node depends on `dependency`).
    #[inline]
    pub(crate) fn add_dependency(&mut self, dependency: NodeId) {
        self.dependencies.push(dependency);
    }

    /// Add a dependent edge (`dependent` depends on this node).
    #[inline]
    pub(crate) fn add_dependent(&mut self, dependent: NodeId) {
        self.dependents.push(dependent);
    }

    /// Get the number of dependencies.
    #[inline]
    pub fn num_dependencies(&self) -> usize {
        self.dependencies.len()
    }

    /// Get the number of dependents.
    #[inline]
    pub fn num_dependents(&self) -> usize {
        self.dependents.len()
    }

    /// Check if this node is a source (no dependencies).
    #[inline]
    pub fn is_source(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Check if this node is a sink (no dependents).
    #[inline]
    pub fn is_sink(&self) -> bool {
        self.dependents.is_empty()
    }

    /// Get the current run state.
    #[inline]
    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Re-initialize the run-scoped fields for a fresh run.
    ///
    /// Sources start Ready, everything else Waiting with a join counter
    /// equal to its predecessor count.
    pub(crate) fn reset_run_state(&self) {
        self.join
            .store(self.dependencies.len(), Ordering::Relaxed);
        let state = if self.dependencies.is_empty() {
            NodeState::Ready
        } else {
            NodeState::Waiting
        };
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Decrement the join counter by one.
    ///
    /// Returns true when the counter reached zero, i.e. the caller observed
    /// the last outstanding predecessor. The AcqRel ordering makes the
    /// decrementing thread's writes visible to whichever thread sees zero.
    #[inline]
    pub(crate) fn decrement_join(&self) -> bool {
        let prev = self.join.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "join counter underflow on '{}'", self.name);
        prev == 1
    }

    /// Transition Waiting -> Ready.
    #[inline]
    pub(crate) fn mark_ready(&self) {
        debug_assert_eq!(self.state(), NodeState::Waiting);
        self.state
            .store(NodeState::Ready.as_u8(), Ordering::Release);
    }

    /// Transition Ready -> Running.
    #[inline]
    pub(crate) fn mark_running(&self) {
        debug_assert_eq!(self.state(), NodeState::Ready);
        self.state
            .store(NodeState::Running.as_u8(), Ordering::Release);
    }

    /// Transition into the terminal Completed state.
    #[inline]
    pub(crate) fn mark_completed(&self) {
        debug_assert_ne!(self.state(), NodeState::Completed);
        self.state
            .store(NodeState::Completed.as_u8(), Ordering::Release);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}: {:?})", self.name, self.kind)
    }
}
