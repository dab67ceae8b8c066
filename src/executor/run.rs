//! Per-run bookkeeping and the run handle.
//!
//! A run owns fresh counters and states for one execution of a graph. The
//! scheduling domain can grow mid-run through subflows: every arena taking
//! part in the run gets a `Domain` tracking its in-flight nodes, linked
//! back to the node that spawned it. The run's completion signal fires when
//! the root domain drains, which by construction cannot happen while any
//! nested node is still pending.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::builder::FlowGraph;
use crate::error::{RunError, TaskFailure};
use crate::graph::arena::NodeArena;
use crate::graph::node_id::NodeId;

/// The arena a domain schedules over: either the submitted graph or a
/// nested arena spawned mid-run.
#[derive(Debug)]
pub(crate) enum ArenaRef {
    /// The top-level graph of the run.
    Root(Arc<FlowGraph>),
    /// A separately-owned nested arena, alive for as long as its domain.
    Nested(Arc<NodeArena>),
}

impl ArenaRef {
    /// The node storage behind this reference.
    #[inline]
    pub(crate) fn arena(&self) -> &NodeArena {
        match self {
            ArenaRef::Root(graph) => graph.arena(),
            ArenaRef::Nested(arena) => arena,
        }
    }
}

/// Completion accounting for one arena within a run.
///
/// `pending` counts nodes of this arena that have been scheduled but not
/// yet retired. It is primed with the arena's source count before any node
/// is pushed, incremented for every newly enabled successor before the
/// enabling node retires, and decremented on retirement, so it can only
/// reach zero once the arena is truly drained. A nested domain links back
/// to its spawning node, whose own retirement is deferred until the drain.
#[derive(Debug)]
pub(crate) struct Domain {
    /// The nodes this domain schedules.
    pub(crate) arena: ArenaRef,
    /// Scheduled-but-not-retired nodes in this arena.
    pub(crate) pending: AtomicUsize,
    /// The domain and node that spawned this one; `None` for the root.
    pub(crate) parent: Option<(Arc<Domain>, NodeId)>,
}

impl Domain {
    /// Root domain for a submitted graph.
    pub(crate) fn root(graph: Arc<FlowGraph>, sources: usize) -> Self {
        Self {
            arena: ArenaRef::Root(graph),
            pending: AtomicUsize::new(sources),
            parent: None,
        }
    }

    /// Nested domain for a spawned sub-graph.
    pub(crate) fn nested(
        arena: Arc<NodeArena>,
        sources: usize,
        parent: Arc<Domain>,
        spawner: NodeId,
    ) -> Self {
        Self {
            arena: ArenaRef::Nested(arena),
            pending: AtomicUsize::new(sources),
            parent: Some((parent, spawner)),
        }
    }
}

/// A ready node queued for execution.
#[derive(Clone)]
pub(crate) struct ReadyNode {
    /// The run this node belongs to.
    pub(crate) run: Arc<RunState>,
    /// The domain owning the node.
    pub(crate) domain: Arc<Domain>,
    /// The node's id within the domain's arena.
    pub(crate) id: NodeId,
}

/// Shared state of one execution of a graph.
pub(crate) struct RunState {
    /// The graph being executed; released when the run finishes.
    graph: Arc<FlowGraph>,
    /// Nodes known to the run, growing as subflows are merged.
    pub(crate) total: AtomicUsize,
    /// Payloads invoked, including failing ones.
    pub(crate) executed: AtomicUsize,
    /// Set by [`RunHandle::cancel`]; stops dispatching newly dequeued
    /// nodes while letting running payloads finish.
    pub(crate) cancelled: AtomicBool,
    /// Captured payload failures, in observation order.
    failures: Mutex<Vec<TaskFailure>>,
    /// When the run was submitted.
    started: Instant,
    /// Completion flag plus elapsed time, guarded together.
    done: Mutex<Option<Duration>>,
    /// Signalled when `done` is set.
    cv: Condvar,
}

impl RunState {
    pub(crate) fn new(graph: Arc<FlowGraph>, total: usize) -> Self {
        Self {
            graph,
            total: AtomicUsize::new(total),
            executed: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            failures: Mutex::new(Vec::new()),
            started: Instant::now(),
            done: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    /// Attach a payload failure to the run.
    pub(crate) fn record_failure(&self, task: &str, error: anyhow::Error) {
        self.failures.lock().push(TaskFailure {
            task: task.to_string(),
            error,
        });
    }

    /// Fulfil the completion signal and release the graph.
    ///
    /// Idempotent: shutdown may finish an abandoned run that later drains.
    pub(crate) fn finish(&self) {
        let mut done = self.done.lock();
        if done.is_some() {
            return;
        }
        self.graph.end_run();
        *done = Some(self.started.elapsed());
        self.cv.notify_all();
    }

    fn wait_done(&self) -> Duration {
        let mut done = self.done.lock();
        while done.is_none() {
            self.cv.wait(&mut done);
        }
        done.unwrap()
    }

    fn is_done(&self) -> bool {
        self.done.lock().is_some()
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Payloads invoked, including failing ones.
    pub executed: usize,
    /// Nodes that never ran: untaken condition branches, their downstream,
    /// and nodes retired undispatched after a cancellation.
    pub skipped: usize,
    /// Wall-clock time from submission to completion.
    pub elapsed: Duration,
}

/// Handle to a submitted run.
///
/// Fulfilled once every reachable node of the (possibly grown) graph has
/// been retired. Failures surface here, never anywhere else.
pub struct RunHandle {
    run: Arc<RunState>,
}

impl RunHandle {
    pub(crate) fn new(run: Arc<RunState>) -> Self {
        Self { run }
    }

    /// Block until the run completes.
    ///
    /// Returns the report on success, [`RunError::Failed`] when any payload
    /// failed (siblings still ran to completion), or
    /// [`RunError::Cancelled`] when the run was cancelled without failures.
    pub fn wait(self) -> Result<RunReport, RunError> {
        let elapsed = self.run.wait_done();

        let failures = std::mem::take(&mut *self.run.failures.lock());
        if !failures.is_empty() {
            return Err(RunError::Failed { failures });
        }
        if self.run.cancelled.load(Ordering::Acquire) {
            return Err(RunError::Cancelled);
        }

        let executed = self.run.executed.load(Ordering::Acquire);
        let total = self.run.total.load(Ordering::Acquire);
        Ok(RunReport {
            executed,
            skipped: total - executed,
            elapsed,
        })
    }

    /// Check for completion without blocking.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.run.is_done()
    }

    /// Request cancellation.
    ///
    /// Nodes not yet dispatched are retired without running; payloads
    /// already executing finish undisturbed. The completion signal still
    /// fires once the in-flight work drains.
    pub fn cancel(&self) {
        self.run.cancelled.store(true, Ordering::Release);
    }
}
