//! Worker loop and node execution.
//!
//! Each worker thread repeatedly pops from its own deque, steals from a
//! peer, or takes from the shared injection queue, parking with a bounded
//! timeout when nothing is available. Executing a node invokes its payload
//! between observer hooks, then propagates readiness to its taken
//! successors and drains the completion accounting.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::deque::Worker;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::run::{Domain, ReadyNode, RunState};
use super::Shared;
use crate::builder::Subflow;
use crate::executor::observer::TaskView;
use crate::graph::arena::NodeArena;
use crate::graph::node::{BranchSet, Node, Work};
use crate::graph::node_id::NodeId;

/// Which successor edges a retiring node takes.
enum Propagate {
    /// All declared successors (static and subflow tasks).
    All,
    /// No successors: failed payloads and cancelled dispatches.
    None,
    /// The successors a condition payload selected.
    Branches(SmallVec<[NodeId; 4]>),
}

/// What invoking a payload produced.
enum Outcome {
    /// Payload finished; propagate along the given edges.
    Done(Propagate),
    /// Payload failed or panicked.
    Failed(anyhow::Error),
    /// Subflow payload populated a nested graph; retirement is deferred
    /// until the nested graph drains.
    Spawned(NodeArena),
}

/// Per-thread execution context.
pub(crate) struct WorkerCtx<'a> {
    /// Worker id, `usize::MAX` outside the pool.
    pub(crate) id: usize,
    /// The worker's own deque.
    pub(crate) deque: &'a Worker<ReadyNode>,
    /// Executor-wide shared state.
    pub(crate) shared: &'a Shared,
}

/// Worker thread main loop.
pub(crate) fn worker_loop(
    id: usize,
    deque: Worker<ReadyNode>,
    shared: Arc<Shared>,
    park_timeout: Duration,
) {
    debug!(worker = id, "worker started");

    let mut rng = rand::rng();
    let ctx = WorkerCtx {
        id,
        deque: &deque,
        shared: &shared,
    };

    loop {
        if !shared.running.load(Ordering::Acquire) {
            break;
        }

        // 1. Own queue first: depth-first locality.
        if let Some(item) = deque.pop() {
            execute(item, &ctx);
            continue;
        }

        // 2. Steal the oldest ready work from a peer.
        if let Some(item) = shared.steal.steal_from_peers(id, &mut rng) {
            trace!(worker = id, "stole work from peer");
            execute(item, &ctx);
            continue;
        }

        // 3. Work submitted from outside the pool.
        if let Some(item) = shared.steal.steal_from_injector() {
            execute(item, &ctx);
            continue;
        }

        // 4. Nothing available; park until woken or timeout.
        let mut guard = shared.sleep_lock.lock();
        if !shared.steal.looks_empty() || !shared.running.load(Ordering::Acquire) {
            continue;
        }
        shared.sleep_cv.wait_for(&mut guard, park_timeout);
    }

    debug!(worker = id, "worker stopped");
}

/// Execute one ready node.
pub(crate) fn execute(item: ReadyNode, ctx: &WorkerCtx<'_>) {
    let ReadyNode { run, domain, id } = item;
    let node = domain.arena.arena().get(id);

    if run.cancelled.load(Ordering::Acquire) {
        // Retired without dispatch; successors stay waiting.
        retire_cascade(&run, &domain, id, Propagate::None, ctx);
        return;
    }

    node.mark_running();

    let view = TaskView {
        name: node.name(),
        kind: node.kind(),
        num_dependencies: node.num_dependencies(),
        num_dependents: node.num_dependents(),
        worker: ctx.id,
    };
    for observer in ctx.shared.observers.read().iter() {
        observer.on_node_begin(&view);
    }

    let outcome = invoke(node);

    for observer in ctx.shared.observers.read().iter() {
        observer.on_node_end(&view);
    }

    match outcome {
        Outcome::Done(propagate) => {
            run.executed.fetch_add(1, Ordering::Relaxed);
            retire_cascade(&run, &domain, id, propagate, ctx);
        }
        Outcome::Failed(error) => {
            warn!(task = node.name(), %error, "task failed");
            run.executed.fetch_add(1, Ordering::Relaxed);
            run.record_failure(node.name(), error);
            retire_cascade(&run, &domain, id, Propagate::None, ctx);
        }
        Outcome::Spawned(arena) => {
            run.executed.fetch_add(1, Ordering::Relaxed);
            seed_subflow(&run, &domain, id, arena, ctx);
        }
    }
}

/// Invoke a node's payload, converting panics into failures.
fn invoke(node: &Node) -> Outcome {
    let mut work = node.work().lock();
    match &mut *work {
        Work::Static(f) => match catch_unwind(AssertUnwindSafe(|| f())) {
            Ok(Ok(())) => Outcome::Done(Propagate::All),
            Ok(Err(error)) => Outcome::Failed(error),
            Err(panic) => Outcome::Failed(anyhow::anyhow!(
                "task panicked: {}",
                panic_message(&panic)
            )),
        },
        Work::Condition(f) => match catch_unwind(AssertUnwindSafe(|| f())) {
            Ok(branches) => Outcome::Done(Propagate::Branches(resolve_branches(node, branches))),
            Err(panic) => Outcome::Failed(anyhow::anyhow!(
                "task panicked: {}",
                panic_message(&panic)
            )),
        },
        Work::Subflow(f) => {
            let mut subflow = Subflow::new();
            match catch_unwind(AssertUnwindSafe(|| f(&mut subflow))) {
                Ok(()) => {
                    let arena = subflow.into_arena();
                    if arena.is_empty() {
                        Outcome::Done(Propagate::All)
                    } else {
                        Outcome::Spawned(arena)
                    }
                }
                Err(panic) => Outcome::Failed(anyhow::anyhow!(
                    "task panicked: {}",
                    panic_message(&panic)
                )),
            }
        }
    }
}

/// Map a condition payload's branch indices to successor node ids.
///
/// Duplicates collapse to one selection; out-of-range indices are ignored.
fn resolve_branches(node: &Node, mut branches: BranchSet) -> SmallVec<[NodeId; 4]> {
    branches.sort_unstable();
    branches.dedup();

    let successors = node.dependents();
    let mut taken = SmallVec::new();
    for branch in branches {
        match successors.get(branch) {
            Some(&succ) => taken.push(succ),
            None => warn!(
                task = node.name(),
                branch, "condition selected an out-of-range branch; ignored"
            ),
        }
    }
    taken
}

/// Retire a node and cascade through drained domains.
///
/// Marks the node completed, schedules its newly enabled successors, and
/// decrements the domain's in-flight count. A nested domain reaching zero
/// completes its spawning node in the parent domain, repeating upward; the
/// root domain reaching zero fulfils the run's completion signal.
fn retire_cascade(
    run: &Arc<RunState>,
    domain: &Arc<Domain>,
    id: NodeId,
    propagate: Propagate,
    ctx: &WorkerCtx<'_>,
) {
    let mut domain = domain.clone();
    let mut id = id;
    let mut propagate = propagate;

    loop {
        complete_and_schedule(run, &domain, id, propagate, ctx);

        if domain.pending.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        // This domain drained.
        match &domain.parent {
            Some((parent, spawner)) => {
                trace!("sub-graph drained; completing its spawner");
                id = *spawner;
                propagate = Propagate::All;
                let parent = parent.clone();
                domain = parent;
            }
            None => {
                debug!(
                    executed = run.executed.load(Ordering::Relaxed),
                    "run finished"
                );
                run.finish();
                return;
            }
        }
    }
}

/// Mark a node completed and push its newly enabled successors.
///
/// The domain's in-flight count is raised for the new work *before* any
/// push and before the caller's own decrement, so the count can only reach
/// zero once the domain is truly drained.
fn complete_and_schedule(
    run: &Arc<RunState>,
    domain: &Arc<Domain>,
    id: NodeId,
    propagate: Propagate,
    ctx: &WorkerCtx<'_>,
) {
    let arena = domain.arena.arena();
    let node = arena.get(id);
    node.mark_completed();
    ctx.shared.stats.tasks_completed.fetch_add(1, Ordering::Relaxed);

    let taken: SmallVec<[NodeId; 4]> = if run.cancelled.load(Ordering::Acquire) {
        SmallVec::new()
    } else {
        match propagate {
            Propagate::All => SmallVec::from_slice(node.dependents()),
            Propagate::None => SmallVec::new(),
            Propagate::Branches(branches) => branches,
        }
    };

    let mut ready: SmallVec<[NodeId; 8]> = SmallVec::new();
    for &succ_id in &taken {
        let succ = arena.get(succ_id);
        if succ.decrement_join() {
            succ.mark_ready();
            ready.push(succ_id);
        }
    }

    if ready.is_empty() {
        return;
    }

    domain.pending.fetch_add(ready.len(), Ordering::AcqRel);
    ctx.shared
        .stats
        .tasks_scheduled
        .fetch_add(ready.len(), Ordering::Relaxed);
    for &succ_id in &ready {
        ctx.deque.push(ReadyNode {
            run: run.clone(),
            domain: domain.clone(),
            id: succ_id,
        });
    }
    if ready.len() > 1 {
        // The first one is ours; peers can take the rest.
        ctx.shared.notify_workers();
    }
}

/// Merge a freshly built sub-graph into the run.
///
/// The nested domain's in-flight count is primed with its source count
/// before any source is pushed, and the spawning node keeps its slot in the
/// parent domain until the nested domain drains, so the merge cannot race
/// with completion.
fn seed_subflow(
    run: &Arc<RunState>,
    parent: &Arc<Domain>,
    spawner: NodeId,
    arena: NodeArena,
    ctx: &WorkerCtx<'_>,
) {
    arena.reset_run_state();
    let nodes = arena.len();
    let arena = Arc::new(arena);
    let sources = arena.source_ids();
    debug_assert!(!sources.is_empty(), "non-empty acyclic arena has a source");

    trace!(
        spawner = parent.arena.arena().get(spawner).name(),
        nodes, "sub-graph spawned"
    );

    run.total.fetch_add(nodes, Ordering::Relaxed);
    let child = Arc::new(Domain::nested(
        arena,
        sources.len(),
        parent.clone(),
        spawner,
    ));

    ctx.shared
        .stats
        .tasks_scheduled
        .fetch_add(sources.len(), Ordering::Relaxed);
    let fan_out = sources.len();
    for id in sources {
        ctx.deque.push(ReadyNode {
            run: run.clone(),
            domain: child.clone(),
            id,
        });
    }
    if fan_out > 1 {
        ctx.shared.notify_workers();
    }
}

/// Extract a readable message from a payload panic.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
