//! Taskloom
//!
//! A work-stealing task-graph executor: express computation as a directed
//! acyclic graph of interdependent tasks and run it across a pool of worker
//! threads with automatic load balancing.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use taskloom::{Executor, FlowGraph};
//!
//! let mut graph = FlowGraph::new("diamond");
//! let a = graph.add_task("A", || println!("A"));
//! let b = graph.add_task("B", || println!("B"));
//! let c = graph.add_task("C", || println!("C"));
//! let d = graph.add_task("D", || println!("D"));
//!
//! graph.precede(a, [b, c]).unwrap(); // B and C run after A
//! graph.succeed(d, [b, c]).unwrap(); // D runs after B and C
//!
//! let executor = Executor::new();
//! let report = executor.run(&Arc::new(graph)).unwrap().wait().unwrap();
//! assert_eq!(report.executed, 4);
//! ```

#![doc(html_root_url = "https://docs.rs/taskloom")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod builder;
pub mod error;
pub mod executor;
pub mod graph;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

pub use builder::{FlowGraph, Subflow, TaskHandle};
pub use error::{BuildError, RunError, TaskFailure};
pub use executor::observer::{Observer, TaskView};
pub use executor::run::{RunHandle, RunReport};
pub use executor::{Executor, ExecutorConfig};
pub use graph::node::{BranchSet, NodeKind};
pub use graph::node_id::NodeId;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
