//! Graphviz export of a task graph.

use std::fmt::Write as _;

use super::arena::NodeArena;
use super::node::NodeKind;

/// Render the arena as a Graphviz `digraph`.
///
/// Condition nodes are drawn as diamonds and their outgoing edges dashed,
/// labelled with the branch index a payload would select.
pub(crate) fn to_dot(name: &str, arena: &NodeArena) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", escape(name));
    for (id, node) in arena.iter() {
        let shape = match node.kind() {
            NodeKind::Condition => " shape=diamond",
            _ => "",
        };
        let _ = writeln!(
            out,
            "  n{} [label=\"{}\"{}];",
            id.index(),
            escape(node.name()),
            shape
        );
    }
    for (id, node) in arena.iter() {
        for (branch, succ) in node.dependents().iter().enumerate() {
            match node.kind() {
                NodeKind::Condition => {
                    let _ = writeln!(
                        out,
                        "  n{} -> n{} [style=dashed label=\"{}\"];",
                        id.index(),
                        succ.index(),
                        branch
                    );
                }
                _ => {
                    let _ = writeln!(out, "  n{} -> n{};", id.index(), succ.index());
                }
            }
        }
    }
    out.push_str("}\n");
    out
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
