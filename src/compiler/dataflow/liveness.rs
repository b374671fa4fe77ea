//! # Liveness Analysis
//!
//! Backward may-analysis over temporaries:
//!
//! ```text
//! out[n] = ∪ in[s]  for s in successors(n)
//! in[n]  = use[n] ∪ (out[n] − def[n])
//! ```
//!
//! The converged facts drive interference graph construction.

use super::{solve, DataflowAnalysis, Direction};
use crate::compiler::cfg::{CfgNode, ControlFlowGraph, NodeId};
use crate::compiler::ir::Temp;
use crate::error::Result;
use std::collections::BTreeSet;

/// Liveness facts of one CFG node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessInfo {
    /// Temporaries read by the command
    pub use_set: BTreeSet<Temp>,
    /// Temporary written by the command (at most one)
    pub def_set: BTreeSet<Temp>,
    /// Temporaries live before the command
    pub live_in: BTreeSet<Temp>,
    /// Temporaries live after the command
    pub live_out: BTreeSet<Temp>,
}

/// Backward liveness over temporaries
#[derive(Debug, Clone)]
pub struct LivenessAnalysis {
    // (use, def) per node, fixed before iteration
    use_def: Vec<(BTreeSet<Temp>, BTreeSet<Temp>)>,
}

impl LivenessAnalysis {
    /// Precompute use/def sets for every node of `cfg`
    pub fn new(cfg: &ControlFlowGraph) -> Self {
        let use_def = cfg
            .nodes()
            .iter()
            .map(|node| {
                (
                    node.command.uses(),
                    node.command.defines().into_iter().collect(),
                )
            })
            .collect();
        Self { use_def }
    }

    /// Run to fixpoint over `cfg`
    pub fn run(&mut self, cfg: &ControlFlowGraph, limit: usize) -> Result<LivenessResult> {
        if self.use_def.len() != cfg.len() {
            *self = Self::new(cfg);
        }

        let solution = solve(cfg, self, limit)?;
        let info = solution
            .iter()
            .map(|(id, live_in, live_out)| {
                let (use_set, def_set) = self.use_def[id.index()].clone();
                LivenessInfo {
                    use_set,
                    def_set,
                    live_in: live_in.clone(),
                    live_out: live_out.clone(),
                }
            })
            .collect();

        Ok(LivenessResult {
            info,
            iterations: solution.iterations,
        })
    }
}

impl DataflowAnalysis for LivenessAnalysis {
    type Fact = BTreeSet<Temp>;

    fn name(&self) -> &'static str {
        "liveness"
    }

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn boundary(&self) -> BTreeSet<Temp> {
        BTreeSet::new()
    }

    fn initial(&self) -> BTreeSet<Temp> {
        BTreeSet::new()
    }

    fn combine(&self, facts: &[&BTreeSet<Temp>]) -> BTreeSet<Temp> {
        facts.iter().flat_map(|f| f.iter().copied()).collect()
    }

    fn transfer(&mut self, node: &CfgNode, live_out: &BTreeSet<Temp>) -> BTreeSet<Temp> {
        let (use_set, def_set) = &self.use_def[node.id.index()];
        let mut live_in: BTreeSet<Temp> = live_out.difference(def_set).copied().collect();
        live_in.extend(use_set.iter().copied());
        live_in
    }
}

/// Converged liveness facts for every node
#[derive(Debug, Clone, Default)]
pub struct LivenessResult {
    info: Vec<LivenessInfo>,
    /// Work-list iterations until the fixpoint
    pub iterations: usize,
}

impl LivenessResult {
    /// Facts of one node
    pub fn info(&self, id: NodeId) -> Option<&LivenessInfo> {
        self.info.get(id.index())
    }

    /// Facts in program order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &LivenessInfo)> {
        self.info.iter().enumerate().map(|(i, info)| (NodeId(i), info))
    }

    /// Number of nodes covered
    pub fn len(&self) -> usize {
        self.info.len()
    }

    /// True for the result over an empty graph
    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    /// Check both dataflow equations at every node of `cfg`
    pub fn satisfies_equations(&self, cfg: &ControlFlowGraph) -> bool {
        if self.info.len() != cfg.len() {
            return false;
        }

        cfg.nodes().iter().all(|node| {
            let info = &self.info[node.id.index()];

            let expected_out: BTreeSet<Temp> = node
                .successors()
                .iter()
                .flat_map(|s| self.info[s.index()].live_in.iter().copied())
                .collect();

            let mut expected_in: BTreeSet<Temp> =
                info.live_out.difference(&info.def_set).copied().collect();
            expected_in.extend(info.use_set.iter().copied());

            info.live_out == expected_out && info.live_in == expected_in
        })
    }
}
