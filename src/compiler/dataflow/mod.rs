//! # Fixpoint Dataflow Engine
//!
//! Generic monotone work-list solver over the per-command CFG. An analysis
//! supplies its direction, lattice operations and transfer function; the
//! engine iterates until no node's fact changes.
//!
//! ## Algorithm
//!
//! 1. Every node starts unvisited with the analysis' `initial()` fact.
//! 2. All nodes go on the work-list (program order for forward analyses,
//!    reverse program order for backward ones).
//! 3. Pop a node and combine the facts of its already-visited neighbours
//!    (predecessors going forward, successors going backward). The entry
//!    node (forward) or an exit node (backward) also combines `boundary()`.
//! 4. Apply the transfer function. If the result changed, or the node was
//!    visited for the first time, re-enqueue every neighbour in the
//!    propagation direction that is not already queued.
//!
//! The lattice is finite and transfer functions are monotone, so the loop
//! terminates. The iteration limit only catches engine defects and hitting
//! it is reported as [`Error::FixpointNotReached`].

pub mod initialization;
pub mod liveness;

use super::cfg::{CfgNode, ControlFlowGraph, NodeId};
use crate::error::{Error, Result};
use std::collections::VecDeque;

pub use initialization::{InitializationAnalysis, InitializationResult, InitializationState, Name};
pub use liveness::{LivenessAnalysis, LivenessInfo, LivenessResult};

/// Default number of work-list iterations allowed per CFG node
pub const DEFAULT_ITERATION_BUDGET_PER_NODE: usize = 1000;

/// Propagation direction of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Facts flow from predecessors to successors
    Forward,
    /// Facts flow from successors to predecessors
    Backward,
}

/// A monotone dataflow analysis over a [`ControlFlowGraph`]
pub trait DataflowAnalysis {
    /// Lattice element attached to each program point
    type Fact: Clone + PartialEq;

    /// Name used in diagnostics
    fn name(&self) -> &'static str;

    /// Propagation direction
    fn direction(&self) -> Direction;

    /// Fact flowing into the entry node (forward) or out of exit nodes (backward)
    fn boundary(&self) -> Self::Fact;

    /// Fact of a program point none of whose neighbours has been visited yet
    fn initial(&self) -> Self::Fact;

    /// Meet/join of neighbour facts (`facts` is never empty)
    fn combine(&self, facts: &[&Self::Fact]) -> Self::Fact;

    /// Transfer function of one node
    ///
    /// Receives the combined fact on the incoming side of the node (before
    /// it going forward, after it going backward) and returns the fact on
    /// the outgoing side.
    fn transfer(&mut self, node: &CfgNode, input: &Self::Fact) -> Self::Fact;
}

/// Converged facts of one analysis run
#[derive(Debug, Clone)]
pub struct Solution<F> {
    in_facts: Vec<F>,
    out_facts: Vec<F>,
    /// Number of work-list pops until the fixpoint
    pub iterations: usize,
}

impl<F> Solution<F> {
    /// Fact holding just before the node's command
    pub fn fact_in(&self, id: NodeId) -> Option<&F> {
        self.in_facts.get(id.index())
    }

    /// Fact holding just after the node's command
    pub fn fact_out(&self, id: NodeId) -> Option<&F> {
        self.out_facts.get(id.index())
    }

    /// `(in, out)` pairs in program order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &F, &F)> {
        self.in_facts
            .iter()
            .zip(self.out_facts.iter())
            .enumerate()
            .map(|(i, (fin, fout))| (NodeId(i), fin, fout))
    }

    /// Number of program points
    pub fn len(&self) -> usize {
        self.in_facts.len()
    }

    /// True for the solution over an empty graph
    pub fn is_empty(&self) -> bool {
        self.in_facts.is_empty()
    }
}

/// Iteration limit for a graph of `nodes` nodes
pub fn iteration_limit(budget_per_node: usize, nodes: usize) -> usize {
    budget_per_node.saturating_mul(nodes.max(1))
}

/// Run `analysis` to fixpoint over `cfg`
///
/// Fails with [`Error::FixpointNotReached`] when more than `limit` nodes
/// are processed.
pub fn solve<A: DataflowAnalysis>(
    cfg: &ControlFlowGraph,
    analysis: &mut A,
    limit: usize,
) -> Result<Solution<A::Fact>> {
    let count = cfg.len();
    let direction = analysis.direction();

    // Incoming/outgoing relative to the propagation direction
    let mut incoming: Vec<A::Fact> = vec![analysis.initial(); count];
    let mut outgoing: Vec<A::Fact> = vec![analysis.initial(); count];
    let mut visited = vec![false; count];
    let mut queued = vec![true; count];

    let mut worklist: VecDeque<NodeId> = match direction {
        Direction::Forward => (0..count).map(NodeId).collect(),
        Direction::Backward => (0..count).rev().map(NodeId).collect(),
    };

    let mut iterations = 0usize;

    while let Some(id) = worklist.pop_front() {
        queued[id.index()] = false;
        iterations += 1;
        if iterations > limit {
            tracing::warn!(
                analysis = analysis.name(),
                limit,
                "dataflow iteration limit exhausted"
            );
            return Err(Error::FixpointNotReached {
                analysis: analysis.name(),
                limit,
            });
        }

        let node = &cfg.nodes()[id.index()];
        let (sources, targets) = match direction {
            Direction::Forward => (node.predecessors(), node.successors()),
            Direction::Backward => (node.successors(), node.predecessors()),
        };
        let at_boundary = match direction {
            Direction::Forward => cfg.entry() == Some(id),
            Direction::Backward => cfg.exits().contains(&id),
        };

        let boundary = at_boundary.then(|| analysis.boundary());
        let mut facts: Vec<&A::Fact> = boundary.iter().collect();
        facts.extend(
            sources
                .iter()
                .filter(|s| visited[s.index()])
                .map(|s| &outgoing[s.index()]),
        );

        let input = if facts.is_empty() {
            analysis.initial()
        } else {
            analysis.combine(&facts)
        };
        let output = analysis.transfer(node, &input);

        let changed = !visited[id.index()] || output != outgoing[id.index()];
        incoming[id.index()] = input;
        if changed {
            outgoing[id.index()] = output;
            visited[id.index()] = true;
            for target in targets {
                if !queued[target.index()] {
                    queued[target.index()] = true;
                    worklist.push_back(*target);
                }
            }
        }
    }

    tracing::debug!(
        analysis = analysis.name(),
        nodes = count,
        iterations,
        "dataflow analysis converged"
    );

    let (in_facts, out_facts) = match direction {
        Direction::Forward => (incoming, outgoing),
        Direction::Backward => (outgoing, incoming),
    };

    Ok(Solution {
        in_facts,
        out_facts,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{IrCommand, Temp};
    use std::collections::BTreeSet;

    /// Forward "reaching nodes" analysis: union of node ids on some path
    struct Reaching;

    impl DataflowAnalysis for Reaching {
        type Fact = BTreeSet<usize>;

        fn name(&self) -> &'static str {
            "reaching"
        }

        fn direction(&self) -> Direction {
            Direction::Forward
        }

        fn boundary(&self) -> Self::Fact {
            BTreeSet::new()
        }

        fn initial(&self) -> Self::Fact {
            BTreeSet::new()
        }

        fn combine(&self, facts: &[&Self::Fact]) -> Self::Fact {
            facts.iter().flat_map(|f| f.iter().copied()).collect()
        }

        fn transfer(&mut self, node: &CfgNode, input: &Self::Fact) -> Self::Fact {
            let mut out = input.clone();
            out.insert(node.id.index());
            out
        }
    }

    /// Deliberately non-monotone: alternates forever around a loop
    struct Flipper;

    impl DataflowAnalysis for Flipper {
        type Fact = bool;

        fn name(&self) -> &'static str {
            "flipper"
        }

        fn direction(&self) -> Direction {
            Direction::Forward
        }

        fn boundary(&self) -> bool {
            false
        }

        fn initial(&self) -> bool {
            false
        }

        fn combine(&self, facts: &[&bool]) -> bool {
            facts.iter().any(|f| **f)
        }

        fn transfer(&mut self, _node: &CfgNode, input: &bool) -> bool {
            !*input
        }
    }

    fn looping_cfg() -> ControlFlowGraph {
        ControlFlowGraph::build(&[
            IrCommand::Label {
                name: "L".to_string(),
            },
            IrCommand::ConstInt {
                dst: Temp(1),
                value: 1,
            },
            IrCommand::Jump {
                label: "L".to_string(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_forward_union_over_loop() {
        let cfg = looping_cfg();
        let solution = solve(&cfg, &mut Reaching, 100).unwrap();

        // The loop makes every node reach the label
        assert_eq!(
            solution.fact_in(NodeId(0)).unwrap(),
            &BTreeSet::from([0, 1, 2])
        );
        assert_eq!(solution.fact_out(NodeId(1)).unwrap(), &BTreeSet::from([0, 1, 2]));
        assert!(solution.iterations >= cfg.len());
    }

    #[test]
    fn test_empty_graph_converges_immediately() {
        let cfg = ControlFlowGraph::build(&[]).unwrap();
        let solution = solve(&cfg, &mut Reaching, 10).unwrap();
        assert!(solution.is_empty());
        assert_eq!(solution.iterations, 0);
    }

    #[test]
    fn test_non_monotone_analysis_hits_limit() {
        let cfg = looping_cfg();
        let err = solve(&cfg, &mut Flipper, 50).unwrap_err();
        assert_eq!(
            err,
            Error::FixpointNotReached {
                analysis: "flipper",
                limit: 50,
            }
        );
    }

    #[test]
    fn test_iteration_limit_scales_with_nodes() {
        assert_eq!(iteration_limit(1000, 0), 1000);
        assert_eq!(iteration_limit(10, 7), 70);
        assert_eq!(iteration_limit(usize::MAX, 2), usize::MAX);
    }
}
