//! Work-stealing queues for the executor.
//!
//! Each worker owns a Chase-Lev deque: the owner pushes and pops at one end
//! (LIFO, keeping freshly-enabled work hot in cache) while any other worker
//! steals from the opposite end (FIFO relative to the owner, taking the
//! oldest ready work). A shared injector receives work submitted from
//! outside the pool, such as the initial seeding of a run. The deques come
//! from `crossbeam`, which guarantees that a stolen item is never returned
//! twice and that a successful steal observes the push that happened-before
//! it; growth never invalidates in-flight steals.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::deque::{Injector, Steal, Stealer, Worker};
use rand::Rng;

/// Statistics about steal operations.
#[derive(Debug, Default)]
pub struct StealStats {
    /// Number of successful steal calls.
    pub steal_successes: AtomicUsize,
    /// Number of steal calls that found nothing.
    pub steal_failures: AtomicUsize,
    /// Total number of steal calls.
    pub total_attempts: AtomicUsize,
}

impl StealStats {
    /// Record a successful steal.
    #[inline]
    pub(crate) fn record_success(&self) {
        self.steal_successes.fetch_add(1, Ordering::Relaxed);
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed steal attempt.
    #[inline]
    pub(crate) fn record_failure(&self) {
        self.steal_failures.fetch_add(1, Ordering::Relaxed);
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get success rate as a fraction.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_attempts.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        let successes = self.steal_successes.load(Ordering::Relaxed);
        successes as f64 / total as f64
    }
}

/// The stealing side of the executor's queues: every worker's stealer plus
/// the shared injection queue.
///
/// The owning [`Worker`] halves are handed to the worker threads at
/// startup; this set stays behind the executor's shared state so any thread
/// can steal or inject.
#[derive(Debug)]
pub(crate) struct StealSet<T> {
    /// Shared queue for work originating outside the pool.
    injector: Injector<T>,
    /// Stealers for all worker deques.
    stealers: Vec<Stealer<T>>,
    /// Statistics.
    stats: StealStats,
}

impl<T> StealSet<T> {
    /// Create the queues for `num_workers` workers.
    ///
    /// Returns the steal set and the owning deque halves, one per worker.
    pub(crate) fn new(num_workers: usize) -> (Self, Vec<Worker<T>>) {
        let mut stealers = Vec::with_capacity(num_workers);
        let mut workers = Vec::with_capacity(num_workers);

        for _ in 0..num_workers {
            let worker = Worker::new_lifo();
            stealers.push(worker.stealer());
            workers.push(worker);
        }

        let set = Self {
            injector: Injector::new(),
            stealers,
            stats: StealStats::default(),
        };

        (set, workers)
    }

    /// Number of worker deques.
    #[inline]
    pub(crate) fn num_workers(&self) -> usize {
        self.stealers.len()
    }

    /// Push an item onto the shared injection queue.
    ///
    /// Callable from any thread; used for work submitted from outside the
    /// pool.
    #[inline]
    pub(crate) fn inject(&self, item: T) {
        self.injector.push(item);
    }

    /// Take one item from the shared injection queue.
    pub(crate) fn steal_from_injector(&self) -> Option<T> {
        loop {
            match self.injector.steal() {
                Steal::Success(item) => return Some(item),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    /// Steal one item from a peer's deque.
    ///
    /// Victims are visited round-robin starting from a randomly chosen
    /// peer, so idle workers do not gang up on the same victim. A
    /// contended steal is retried once before moving to the next victim.
    pub(crate) fn steal_from_peers<R: Rng>(&self, worker_id: usize, rng: &mut R) -> Option<T> {
        let num_workers = self.stealers.len();
        if num_workers <= 1 {
            return None;
        }

        let start = rng.random_range(0..num_workers);
        for i in 0..num_workers {
            let victim = (start + i) % num_workers;
            if victim == worker_id {
                continue;
            }

            match self.stealers[victim].steal() {
                Steal::Success(item) => {
                    self.stats.record_success();
                    return Some(item);
                }
                Steal::Empty => continue,
                Steal::Retry => {
                    if let Steal::Success(item) = self.stealers[victim].steal() {
                        self.stats.record_success();
                        return Some(item);
                    }
                }
            }
        }

        self.stats.record_failure();
        None
    }

    /// Best-effort check that every queue appears empty.
    ///
    /// May race with concurrent pushes; only ever used as a parking hint,
    /// never as a correctness gate.
    pub(crate) fn looks_empty(&self) -> bool {
        if !self.injector.is_empty() {
            return false;
        }
        self.stealers.iter().all(Stealer::is_empty)
    }

    /// Remove everything still queued, injector and worker deques alike.
    ///
    /// Used during shutdown, after the worker threads have stopped, to
    /// release abandoned work.
    pub(crate) fn drain(&self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.steal_from_injector() {
            items.push(item);
        }
        for stealer in &self.stealers {
            loop {
                match stealer.steal() {
                    Steal::Success(item) => items.push(item),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }
        items
    }

    /// Get steal statistics.
    #[inline]
    pub(crate) fn stats(&self) -> &StealStats {
        &self.stats
    }
}
