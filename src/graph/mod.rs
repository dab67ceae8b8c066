//! Task graph model
//!
//! This module provides the core data structures for representing and
//! manipulating the dependency graph the executor runs.
//!
//! # Architecture
//!
//! The graph module is organized as follows:
//!
//! - [`NodeId`](node_id::NodeId) - Index identity of a node within its arena
//! - [`Node`](node::Node) - A single task node with its payload and edges
//! - [`NodeKind`](node::NodeKind) - Kinds of work a node can carry
//! - [`NodeState`](node::NodeState) - Per-run state machine of a node
//! - [`NodeArena`](arena::NodeArena) - The arena owning a graph's nodes
//!
//! Nodes are owned exclusively by the arena that created them and refer to
//! each other by index, never by reference, so predecessor/successor links
//! cannot form ownership cycles.

pub mod arena;
pub mod node;
pub mod node_id;

pub(crate) mod dump;

pub use arena::NodeArena;
pub use node::{BranchSet, Node, NodeKind, NodeState};
pub use node_id::NodeId;

#[cfg(test)]
mod tests;
