//! # Interference Graph
//!
//! Undirected graph over temporaries: an edge means the two temporaries are
//! live at the same program point and need different registers.

use super::cfg::ControlFlowGraph;
use super::dataflow::LivenessResult;
use super::ir::Temp;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Interference graph: adjacency sets keyed by temporary
///
/// Symmetric and free of self-edges by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterferenceGraph {
    adjacency: BTreeMap<Temp, BTreeSet<Temp>>,
}

impl InterferenceGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from converged liveness facts
    ///
    /// Every out-set is a clique, and a defined temporary interferes with
    /// everything live after its definition. Every temporary used or defined
    /// anywhere is a node, even if it interferes with nothing.
    pub fn build(cfg: &ControlFlowGraph, liveness: &LivenessResult) -> Self {
        let mut graph = Self::new();

        for node in cfg.nodes() {
            let Some(info) = liveness.info(node.id) else {
                continue;
            };

            for temp in info.use_set.iter().chain(info.def_set.iter()) {
                graph.add_node(*temp);
            }

            let live: Vec<Temp> = info.live_out.iter().copied().collect();
            for (i, a) in live.iter().enumerate() {
                graph.add_node(*a);
                for b in &live[i + 1..] {
                    graph.add_edge(*a, *b);
                }
            }

            for def in &info.def_set {
                for temp in &live {
                    graph.add_edge(*def, *temp);
                }
            }
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built interference graph"
        );

        graph
    }

    /// Add an isolated node (no-op if present)
    pub fn add_node(&mut self, temp: Temp) {
        self.adjacency.entry(temp).or_default();
    }

    /// Add an undirected edge; self-edges are ignored
    pub fn add_edge(&mut self, a: Temp, b: Temp) {
        if a == b {
            self.add_node(a);
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    /// Remove a node and all its edges
    pub fn remove_node(&mut self, temp: Temp) {
        if let Some(neighbors) = self.adjacency.remove(&temp) {
            for n in neighbors {
                if let Some(adj) = self.adjacency.get_mut(&n) {
                    adj.remove(&temp);
                }
            }
        }
    }

    /// Is `temp` a node?
    pub fn contains(&self, temp: Temp) -> bool {
        self.adjacency.contains_key(&temp)
    }

    /// Do `a` and `b` interfere?
    pub fn contains_edge(&self, a: Temp, b: Temp) -> bool {
        self.adjacency
            .get(&a)
            .map(|adj| adj.contains(&b))
            .unwrap_or(false)
    }

    /// Neighbours of `temp` (empty for unknown temporaries)
    pub fn neighbors(&self, temp: Temp) -> impl Iterator<Item = Temp> + '_ {
        self.adjacency
            .get(&temp)
            .into_iter()
            .flat_map(|adj| adj.iter().copied())
    }

    /// Number of neighbours
    pub fn degree(&self, temp: Temp) -> usize {
        self.adjacency.get(&temp).map(BTreeSet::len).unwrap_or(0)
    }

    /// Nodes in ascending temporary order
    pub fn nodes(&self) -> impl Iterator<Item = Temp> + '_ {
        self.adjacency.keys().copied()
    }

    /// Each edge once, as `(a, b)` with `a < b`
    pub fn edges(&self) -> impl Iterator<Item = (Temp, Temp)> + '_ {
        self.adjacency
            .iter()
            .flat_map(|(a, adj)| adj.iter().filter(move |b| *a < **b).map(move |b| (*a, *b)))
    }

    /// Lowest-numbered node with degree strictly below `k`
    pub fn find_low_degree(&self, k: usize) -> Option<Temp> {
        self.adjacency
            .iter()
            .find(|(_, adj)| adj.len() < k)
            .map(|(t, _)| *t)
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// True when the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Largest degree of any node
    pub fn max_degree(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).max().unwrap_or(0)
    }
}

impl fmt::Display for InterferenceGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (temp, adj) in &self.adjacency {
            let neighbors: Vec<String> = adj.iter().map(Temp::to_string).collect();
            writeln!(f, "{} -> [{}]", temp, neighbors.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::dataflow::LivenessAnalysis;
    use crate::compiler::ir::{BinOp, IrCommand};

    fn graph_for(commands: &[IrCommand]) -> InterferenceGraph {
        let cfg = ControlFlowGraph::build(commands).unwrap();
        let liveness = LivenessAnalysis::new(&cfg).run(&cfg, 10_000).unwrap();
        InterferenceGraph::build(&cfg, &liveness)
    }

    #[test]
    fn test_edges_are_symmetric_without_self_loops() {
        let mut g = InterferenceGraph::new();
        g.add_edge(Temp(1), Temp(2));
        g.add_edge(Temp(3), Temp(3));

        assert!(g.contains_edge(Temp(1), Temp(2)));
        assert!(g.contains_edge(Temp(2), Temp(1)));
        assert!(!g.contains_edge(Temp(3), Temp(3)));
        assert!(g.contains(Temp(3)));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_remove_node_drops_incident_edges() {
        let mut g = InterferenceGraph::new();
        g.add_edge(Temp(1), Temp(2));
        g.add_edge(Temp(1), Temp(3));
        g.remove_node(Temp(1));

        assert!(!g.contains(Temp(1)));
        assert_eq!(g.degree(Temp(2)), 0);
        assert_eq!(g.find_low_degree(1), Some(Temp(2)));
    }

    #[test]
    fn test_simultaneously_live_operands_interfere() {
        let g = graph_for(&[
            IrCommand::ConstInt {
                dst: Temp(1),
                value: 5,
            },
            IrCommand::ConstInt {
                dst: Temp(2),
                value: 7,
            },
            IrCommand::Binop {
                op: BinOp::Add,
                dst: Temp(3),
                lhs: Temp(1),
                rhs: Temp(2),
            },
            IrCommand::Return { value: Temp(3) },
        ]);

        assert!(g.contains_edge(Temp(1), Temp(2)));
        assert!(!g.contains_edge(Temp(1), Temp(3)));
        assert!(!g.contains_edge(Temp(2), Temp(3)));
        assert_eq!(g.node_count(), 3);
    }

    #[test]
    fn test_dead_definition_interferes_with_live_values() {
        // t2 is never used but is written while t1 is live
        let g = graph_for(&[
            IrCommand::ConstInt {
                dst: Temp(1),
                value: 1,
            },
            IrCommand::ConstInt {
                dst: Temp(2),
                value: 2,
            },
            IrCommand::Return { value: Temp(1) },
        ]);

        assert!(g.contains_edge(Temp(2), Temp(1)));
    }

    #[test]
    fn test_isolated_temporaries_are_nodes() {
        let g = graph_for(&[
            IrCommand::ConstInt {
                dst: Temp(4),
                value: 1,
            },
            IrCommand::ReturnVoid,
        ]);
        assert!(g.contains(Temp(4)));
        assert_eq!(g.degree(Temp(4)), 0);
    }

    #[test]
    fn test_display_lists_adjacency() {
        let mut g = InterferenceGraph::new();
        g.add_edge(Temp(1), Temp(2));
        assert_eq!(g.to_string(), "Temp_1 -> [Temp_2]\nTemp_2 -> [Temp_1]\n");
    }
}
