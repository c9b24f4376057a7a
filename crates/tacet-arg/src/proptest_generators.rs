//! Proptest strategies for generating well-formed explored graphs.

use proptest::prelude::*;

use crate::graph::{ExploredGraph, NodeId, StateLabel};

/// Strategy for a well-formed explored DAG plus a reconstruction target.
///
/// Generated graphs have:
/// - 2–12 nodes in topological insertion order
/// - node 0 as a guaranteed root
/// - every later node with 1–3 parents among its predecessors, so each
///   node is reachable from a root and the parent relation is acyclic
/// - the last node as the designated target
pub fn arb_rooted_dag() -> impl Strategy<Value = (ExploredGraph, NodeId)> {
    (2..=12usize)
        .prop_flat_map(|n| {
            let parents_per_node: Vec<_> = (1..n)
                .map(|i| proptest::collection::btree_set(0..i, 1..=i.min(3)))
                .collect();
            (Just(n), parents_per_node)
        })
        .prop_map(|(n, parents_per_node)| {
            let mut g = ExploredGraph::new();
            for i in 0..n {
                g.add_node(StateLabel::noop(i as u64));
            }
            for (child_minus_one, parents) in parents_per_node.into_iter().enumerate() {
                let child = child_minus_one + 1;
                for parent in parents {
                    g.add_edge(parent, child).expect("edges are fresh");
                }
            }
            (g, n - 1)
        })
}
