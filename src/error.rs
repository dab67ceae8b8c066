//! Error taxonomy for graph construction and execution.
//!
//! Build-time errors are returned synchronously by the call that introduced
//! them; payload failures are captured per run and surfaced from the run
//! handle. Each executor and graph carries its own errors, nothing is
//! registered globally.

use thiserror::Error;

use crate::graph::node_id::NodeId;

/// Errors raised while constructing a graph.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The requested dependency edge would close a cycle.
    #[error("dependency {from} -> {to} would create a cycle")]
    CycleDetected {
        /// Predecessor side of the rejected edge.
        from: NodeId,
        /// Successor side of the rejected edge.
        to: NodeId,
    },

    /// A task handle from another graph was passed in.
    #[error("task handle does not belong to this graph")]
    ForeignHandle,

    /// A task cannot depend on itself.
    #[error("a task cannot depend on itself")]
    SelfDependency,
}

/// A captured payload failure, attached to the run that observed it.
#[derive(Debug, Error)]
#[error("task '{task}' failed: {error}")]
pub struct TaskFailure {
    /// Name of the failing task.
    pub task: String,
    /// The error the payload returned, or the panic message.
    pub error: anyhow::Error,
}

/// Errors surfaced by the run API.
#[derive(Debug, Error)]
pub enum RunError {
    /// The graph is already being executed; a graph supports one run at a
    /// time.
    #[error("graph is already running")]
    AlreadyRunning,

    /// The executor is shutting down and no longer accepts work.
    #[error("executor is shutting down")]
    ShuttingDown,

    /// The run was cancelled before all nodes were dispatched.
    #[error("run was cancelled")]
    Cancelled,

    /// One or more payloads failed; siblings kept running and the run
    /// completed, but it is reported failed.
    #[error("run failed with {} task failure(s)", .failures.len())]
    Failed {
        /// Every captured failure, in the order they were observed.
        failures: Vec<TaskFailure>,
    },
}

impl RunError {
    /// First captured failure, if this is a `Failed` error.
    pub fn first_failure(&self) -> Option<&TaskFailure> {
        match self {
            RunError::Failed { failures } => failures.first(),
            _ => None,
        }
    }
}
