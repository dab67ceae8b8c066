//! Builder unit tests
//!
//! Covers handle identity, the construction surface shared by graphs and
//! subflows, and the build-time error paths.

use smallvec::smallvec;

use crate::builder::{FlowGraph, Subflow};
use crate::error::BuildError;
use crate::graph::node::NodeKind;

#[cfg(test)]
mod handle_tests {
    use super::*;

    #[test]
    fn test_handles_are_copyable() {
        let mut graph = FlowGraph::new("g");
        let a = graph.add_task("a", || {});
        let copy = a;
        assert_eq!(a, copy);
        assert_eq!(a.id(), copy.id());
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut graph = FlowGraph::new("g");
        let mut other = FlowGraph::new("other");
        let a = graph.add_task("a", || {});
        let alien = other.add_task("alien", || {});

        assert!(matches!(
            graph.add_dependency(a, alien),
            Err(BuildError::ForeignHandle)
        ));
        assert!(matches!(
            graph.add_dependency(alien, a),
            Err(BuildError::ForeignHandle)
        ));
        assert!(matches!(
            graph.task_name(alien),
            Err(BuildError::ForeignHandle)
        ));
    }
}

#[cfg(test)]
mod flow_graph_tests {
    use super::*;

    #[test]
    fn test_new_graph_is_empty() {
        let graph = FlowGraph::new("empty");
        assert_eq!(graph.name(), "empty");
        assert_eq!(graph.num_tasks(), 0);
        assert_eq!(graph.num_dependencies(), 0);
    }

    #[test]
    fn test_add_tasks_and_dependencies() {
        let mut graph = FlowGraph::new("g");
        let a = graph.add_task("a", || {});
        let b = graph.add_task("b", || {});
        graph.add_dependency(a, b).unwrap();

        assert_eq!(graph.num_tasks(), 2);
        assert_eq!(graph.num_dependencies(), 1);
        assert_eq!(graph.num_successors(a).unwrap(), 1);
        assert_eq!(graph.num_predecessors(b).unwrap(), 1);
    }

    #[test]
    fn test_cycle_rejected_through_public_api() {
        let mut graph = FlowGraph::new("g");
        let a = graph.add_task("a", || {});
        let b = graph.add_task("b", || {});
        let c = graph.add_task("c", || {});
        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(b, c).unwrap();

        assert!(matches!(
            graph.add_dependency(c, a),
            Err(BuildError::CycleDetected { .. })
        ));
        assert!(matches!(
            graph.add_dependency(a, a),
            Err(BuildError::SelfDependency)
        ));
    }

    #[test]
    fn test_precede_and_succeed_sugar() {
        let mut graph = FlowGraph::new("diamond");
        let a = graph.add_task("a", || {});
        let b = graph.add_task("b", || {});
        let c = graph.add_task("c", || {});
        let d = graph.add_task("d", || {});

        graph.precede(a, [b, c]).unwrap();
        graph.succeed(d, [b, c]).unwrap();

        assert_eq!(graph.num_dependencies(), 4);
        assert_eq!(graph.num_successors(a).unwrap(), 2);
        assert_eq!(graph.num_predecessors(d).unwrap(), 2);
    }

    #[test]
    fn test_task_accessors() {
        let mut graph = FlowGraph::new("g");
        let plain = graph.add_task("plain", || {});
        let cond = graph.add_condition("cond", || smallvec![0]);
        let sub = graph.add_subflow("sub", |_| {});

        assert_eq!(graph.task_name(plain).unwrap(), "plain");
        assert_eq!(graph.task_kind(plain).unwrap(), NodeKind::Static);
        assert_eq!(graph.task_kind(cond).unwrap(), NodeKind::Condition);
        assert_eq!(graph.task_kind(sub).unwrap(), NodeKind::Subflow);
    }

    #[test]
    fn test_fallible_task_kind_is_static() {
        let mut graph = FlowGraph::new("g");
        let t = graph.add_fallible_task("may_fail", || Ok(()));
        assert_eq!(graph.task_kind(t).unwrap(), NodeKind::Static);
    }

    #[test]
    fn test_condition_successors_keep_declaration_order() {
        let mut graph = FlowGraph::new("g");
        let cond = graph.add_condition("cond", || smallvec![1]);
        let first = graph.add_task("first", || {});
        let second = graph.add_task("second", || {});

        // Branch 0 is `first`, branch 1 is `second`.
        graph.add_dependency(cond, first).unwrap();
        graph.add_dependency(cond, second).unwrap();

        let successors = graph.arena().get(cond.id()).dependents();
        assert_eq!(successors, &[first.id(), second.id()]);
    }

    #[test]
    fn test_dump_uses_graph_name() {
        let mut graph = FlowGraph::new("pipeline");
        graph.add_task("only", || {});
        assert!(graph.dump().starts_with("digraph \"pipeline\""));
    }

    #[test]
    fn test_begin_run_is_exclusive() {
        let graph = FlowGraph::new("g");
        assert!(graph.begin_run());
        assert!(!graph.begin_run());
        graph.end_run();
        assert!(graph.begin_run());
    }
}

#[cfg(test)]
mod subflow_tests {
    use super::*;

    #[test]
    fn test_subflow_offers_same_surface() {
        let mut subflow = Subflow::new();
        let a = subflow.add_task("a", || {});
        let b = subflow.add_fallible_task("b", || Ok(()));
        let c = subflow.add_condition("c", || smallvec![0]);
        subflow.precede(a, [b]).unwrap();
        subflow.succeed(c, [b]).unwrap();

        assert_eq!(subflow.num_tasks(), 3);

        let arena = subflow.into_arena();
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.num_edges(), 2);
    }

    #[test]
    fn test_subflow_rejects_parent_handles() {
        let mut graph = FlowGraph::new("parent");
        let parent_task = graph.add_task("t", || {});

        let mut subflow = Subflow::new();
        let inner = subflow.add_task("inner", || {});

        assert!(matches!(
            subflow.add_dependency(parent_task, inner),
            Err(BuildError::ForeignHandle)
        ));
    }

    #[test]
    fn test_subflow_rejects_cycles() {
        let mut subflow = Subflow::new();
        let a = subflow.add_task("a", || {});
        let b = subflow.add_task("b", || {});
        subflow.add_dependency(a, b).unwrap();
        assert!(matches!(
            subflow.add_dependency(b, a),
            Err(BuildError::CycleDetected { .. })
        ));
    }
}
