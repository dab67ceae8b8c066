//! Task-graph executor
//!
//! The executor owns a fixed pool of worker threads and drives submitted
//! graphs to completion: source nodes are seeded through a shared injection
//! queue, workers execute depth-first from their own deques and steal from
//! each other when idle, and every run's completion signal fires once its
//! whole (possibly dynamically grown) graph has been retired.

pub mod observer;
pub mod queue;
pub mod run;

pub(crate) mod worker;

pub use queue::StealStats;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::debug;

use crate::builder::FlowGraph;
use crate::error::RunError;

use self::observer::Observer;
use self::queue::StealSet;
use self::run::{Domain, ReadyNode, RunHandle, RunState};

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of worker threads.
    pub num_workers: usize,
    /// How long an idle worker parks before re-checking the queues.
    pub park_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let num_cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            num_workers: num_cpus,
            park_timeout: Duration::from_millis(1),
        }
    }
}

/// Executor statistics, accumulated over the executor's lifetime.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    /// Nodes pushed to a queue (seeded or enabled by a predecessor).
    pub tasks_scheduled: AtomicUsize,
    /// Nodes retired.
    pub tasks_completed: AtomicUsize,
}

/// State shared between the executor handle and its worker threads.
pub(crate) struct Shared {
    /// Stealers and the injection queue.
    pub(crate) steal: StealSet<ReadyNode>,
    /// Cleared on shutdown; workers exit their loop when false.
    pub(crate) running: AtomicBool,
    /// Lock pairing with `sleep_cv` for idle parking.
    pub(crate) sleep_lock: Mutex<()>,
    /// Wakes parked workers when new work arrives or shutdown begins.
    pub(crate) sleep_cv: Condvar,
    /// Registered observers, invoked around every payload.
    pub(crate) observers: RwLock<Vec<Arc<dyn Observer>>>,
    /// Lifetime statistics.
    pub(crate) stats: ExecutorStats,
}

impl Shared {
    /// Wake every parked worker.
    ///
    /// The sleep lock is taken so a worker between its queue re-check and
    /// its wait cannot miss the notification.
    pub(crate) fn notify_workers(&self) {
        let _guard = self.sleep_lock.lock();
        self.sleep_cv.notify_all();
    }
}

/// Executes task graphs across a pool of worker threads.
///
/// One executor can serve many graphs, sequentially or concurrently; no
/// ordering holds between nodes of unrelated graphs. Dropping the executor
/// shuts the pool down after in-flight payloads finish.
pub struct Executor {
    config: ExecutorConfig,
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl Executor {
    /// Create an executor with default configuration.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    /// Create an executor with custom configuration.
    pub fn with_config(config: ExecutorConfig) -> Self {
        let num_workers = config.num_workers.max(1);
        let (steal, deques) = StealSet::new(num_workers);

        let shared = Arc::new(Shared {
            steal,
            running: AtomicBool::new(true),
            sleep_lock: Mutex::new(()),
            sleep_cv: Condvar::new(),
            observers: RwLock::new(Vec::new()),
            stats: ExecutorStats::default(),
        });

        let workers = deques
            .into_iter()
            .enumerate()
            .map(|(worker_id, deque)| {
                let shared = shared.clone();
                let park_timeout = config.park_timeout;
                thread::Builder::new()
                    .name(format!("loom-worker-{}", worker_id))
                    .spawn(move || {
                        worker::worker_loop(worker_id, deque, shared, park_timeout);
                    })
                    .expect("Failed to spawn worker thread")
            })
            .collect();

        debug!(workers = num_workers, "executor started");

        Self {
            config,
            shared,
            workers,
        }
    }

    /// Register an observer.
    ///
    /// Observers registered after runs were submitted may miss nodes that
    /// already executed; register them before the first run.
    pub fn add_observer(&self, observer: Arc<dyn Observer>) {
        self.shared.observers.write().push(observer);
    }

    /// Submit a graph for execution.
    ///
    /// Seeds every source node and returns a handle fulfilled once the
    /// whole graph, including sub-graphs spawned mid-run, has completed.
    /// The same graph can be submitted again after its previous run
    /// finished.
    pub fn run(&self, graph: &Arc<FlowGraph>) -> Result<RunHandle, RunError> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(RunError::ShuttingDown);
        }
        if !graph.begin_run() {
            return Err(RunError::AlreadyRunning);
        }

        let arena = graph.arena();
        arena.reset_run_state();
        let run = Arc::new(RunState::new(graph.clone(), arena.len()));

        debug!(graph = graph.name(), nodes = arena.len(), "run submitted");

        if arena.is_empty() {
            run.finish();
            return Ok(RunHandle::new(run));
        }

        let sources = arena.source_ids();
        debug_assert!(!sources.is_empty(), "non-empty acyclic graph has a source");

        let domain = Arc::new(Domain::root(graph.clone(), sources.len()));
        self.shared
            .stats
            .tasks_scheduled
            .fetch_add(sources.len(), Ordering::Relaxed);
        for id in sources {
            self.shared.steal.inject(ReadyNode {
                run: run.clone(),
                domain: domain.clone(),
                id,
            });
        }
        self.shared.notify_workers();

        Ok(RunHandle::new(run))
    }

    /// Get the number of workers.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.config.num_workers.max(1)
    }

    /// Get lifetime statistics.
    #[inline]
    pub fn stats(&self) -> &ExecutorStats {
        &self.shared.stats
    }

    /// Get steal statistics.
    #[inline]
    pub fn steal_stats(&self) -> &StealStats {
        self.shared.steal.stats()
    }

    /// Check if the executor is accepting work.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Shut the pool down.
    ///
    /// Workers stop after their current node; in-flight payloads are never
    /// interrupted. Work still queued is abandoned: its runs are marked
    /// cancelled and their completion signals released, so waiters observe
    /// `RunError::Cancelled` rather than hanging.
    pub fn shutdown(&mut self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }

        self.shared.notify_workers();
        for worker in self.workers.drain(..) {
            worker.join().expect("Worker thread panicked");
        }

        for item in self.shared.steal.drain() {
            item.run.cancelled.store(true, Ordering::Release);
            item.run.finish();
        }

        debug!("executor stopped");
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
