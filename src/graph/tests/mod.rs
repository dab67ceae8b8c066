//! Graph module unit tests
//!
//! Covers node identity, the per-run state machine, arena edge rules and
//! the DOT dump.

use smallvec::smallvec;

use crate::error::BuildError;
use crate::graph::arena::NodeArena;
use crate::graph::node::{Node, NodeState, Work};
use crate::graph::node_id::NodeId;

fn noop() -> Work {
    Work::Static(Box::new(|| Ok(())))
}

#[cfg(test)]
mod node_id_tests {
    use super::*;

    #[test]
    fn test_node_id_new() {
        let id = NodeId::new(1);
        assert_eq!(id.index(), 1);
    }

    #[test]
    fn test_node_id_copy() {
        let id = NodeId(42);
        let copied = id;
        assert_eq!(id.index(), copied.index());
    }

    #[test]
    fn test_node_id_partial_eq() {
        assert_eq!(NodeId(1), NodeId(1));
        assert_ne!(NodeId(1), NodeId(2));
    }

    #[test]
    fn test_node_id_display() {
        let id = NodeId(42);
        let display = format!("{}", id);
        assert!(display.contains("42"));
    }
}

#[cfg(test)]
mod node_state_tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [
            NodeState::Waiting,
            NodeState::Ready,
            NodeState::Running,
            NodeState::Completed,
        ] {
            assert_eq!(NodeState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_state_partial_eq() {
        assert_eq!(NodeState::Waiting, NodeState::Waiting);
        assert_ne!(NodeState::Waiting, NodeState::Ready);
    }
}

#[cfg(test)]
mod node_tests {
    use super::*;

    #[test]
    fn test_node_new() {
        let node = Node::new("add", noop());
        assert_eq!(node.name(), "add");
        assert!(node.dependencies().is_empty());
        assert!(node.dependents().is_empty());
        assert!(node.is_source());
        assert!(node.is_sink());
    }

    #[test]
    fn test_node_edges() {
        let mut node = Node::new("mid", noop());
        node.add_dependency(NodeId(1));
        node.add_dependency(NodeId(2));
        node.add_dependent(NodeId(3));

        assert_eq!(node.num_dependencies(), 2);
        assert_eq!(node.num_dependents(), 1);
        assert!(!node.is_source());
        assert!(!node.is_sink());
    }

    #[test]
    fn test_node_reset_source_is_ready() {
        let node = Node::new("src", noop());
        node.reset_run_state();
        assert_eq!(node.state(), NodeState::Ready);
    }

    #[test]
    fn test_node_reset_with_dependencies_is_waiting() {
        let mut node = Node::new("sink", noop());
        node.add_dependency(NodeId(0));
        node.add_dependency(NodeId(1));
        node.reset_run_state();
        assert_eq!(node.state(), NodeState::Waiting);

        // Both predecessors must retire before the counter hits zero.
        assert!(!node.decrement_join());
        assert!(node.decrement_join());
    }

    #[test]
    fn test_node_state_transitions() {
        let node = Node::new("t", noop());
        node.reset_run_state();
        assert_eq!(node.state(), NodeState::Ready);
        node.mark_running();
        assert_eq!(node.state(), NodeState::Running);
        node.mark_completed();
        assert_eq!(node.state(), NodeState::Completed);
    }
}

#[cfg(test)]
mod arena_tests {
    use super::*;

    #[test]
    fn test_arena_push_assigns_sequential_ids() {
        let mut arena = NodeArena::new();
        let a = arena.push_node("a", noop());
        let b = arena.push_node("b", noop());
        assert_eq!(a, NodeId(0));
        assert_eq!(b, NodeId(1));
        assert_eq!(arena.len(), 2);
        assert!(!arena.is_empty());
    }

    #[test]
    fn test_arena_link_records_both_directions() {
        let mut arena = NodeArena::new();
        let a = arena.push_node("a", noop());
        let b = arena.push_node("b", noop());
        arena.link(a, b).unwrap();

        assert_eq!(arena.get(a).dependents(), &[b]);
        assert_eq!(arena.get(b).dependencies(), &[a]);
        assert_eq!(arena.num_edges(), 1);
    }

    #[test]
    fn test_arena_rejects_self_dependency() {
        let mut arena = NodeArena::new();
        let a = arena.push_node("a", noop());
        assert!(matches!(
            arena.link(a, a),
            Err(BuildError::SelfDependency)
        ));
    }

    #[test]
    fn test_arena_rejects_cycle() {
        let mut arena = NodeArena::new();
        let a = arena.push_node("a", noop());
        let b = arena.push_node("b", noop());
        let c = arena.push_node("c", noop());
        arena.link(a, b).unwrap();
        arena.link(b, c).unwrap();

        // c -> a would close the loop
        assert!(matches!(
            arena.link(c, a),
            Err(BuildError::CycleDetected { .. })
        ));

        // and the rejected edge must leave no trace
        assert_eq!(arena.num_edges(), 2);
        assert!(arena.get(c).dependents().is_empty());
    }

    #[test]
    fn test_arena_source_ids() {
        let mut arena = NodeArena::new();
        let a = arena.push_node("a", noop());
        let b = arena.push_node("b", noop());
        let c = arena.push_node("c", noop());
        arena.link(a, c).unwrap();
        arena.link(b, c).unwrap();

        assert_eq!(arena.source_ids(), vec![a, b]);
    }

    #[test]
    fn test_arena_reset_run_state() {
        let mut arena = NodeArena::new();
        let a = arena.push_node("a", noop());
        let b = arena.push_node("b", noop());
        arena.link(a, b).unwrap();

        arena.reset_run_state();
        assert_eq!(arena.get(a).state(), NodeState::Ready);
        assert_eq!(arena.get(b).state(), NodeState::Waiting);

        // Drive b to completion, then reset again: states come back fresh.
        assert!(arena.get(b).decrement_join());
        arena.get(b).mark_ready();
        arena.get(b).mark_running();
        arena.get(b).mark_completed();

        arena.reset_run_state();
        assert_eq!(arena.get(b).state(), NodeState::Waiting);
    }
}

#[cfg(test)]
mod dump_tests {
    use super::*;
    use crate::graph::dump::to_dot;

    #[test]
    fn test_dump_renders_nodes_and_edges() {
        let mut arena = NodeArena::new();
        let a = arena.push_node("first", noop());
        let b = arena.push_node("second", noop());
        arena.link(a, b).unwrap();

        let dot = to_dot("demo", &arena);
        assert!(dot.starts_with("digraph \"demo\""));
        assert!(dot.contains("label=\"first\""));
        assert!(dot.contains("label=\"second\""));
        assert!(dot.contains("n0 -> n1;"));
    }

    #[test]
    fn test_dump_marks_condition_nodes() {
        let mut arena = NodeArena::new();
        let cond = arena.push_node("pick", Work::Condition(Box::new(|| smallvec![0])));
        let yes = arena.push_node("yes", noop());
        let no = arena.push_node("no", noop());
        arena.link(cond, yes).unwrap();
        arena.link(cond, no).unwrap();

        let dot = to_dot("branches", &arena);
        assert!(dot.contains("shape=diamond"));
        assert!(dot.contains("style=dashed label=\"0\""));
        assert!(dot.contains("style=dashed label=\"1\""));
    }

    #[test]
    fn test_dump_escapes_quotes() {
        let mut arena = NodeArena::new();
        arena.push_node("say \"hi\"", noop());
        let dot = to_dot("q", &arena);
        assert!(dot.contains("say \\\"hi\\\""));
    }
}
