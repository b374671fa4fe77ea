//! # Graph Coloring Register Allocator
//!
//! Kempe-style coloring of the interference graph with K registers:
//! 1. Simplify: repeatedly remove a node with degree < K (lowest temporary
//!    first) from a working copy of the graph and push it on a stack
//! 2. If no such node remains while the graph is non-empty, allocation fails
//!    (there is no spilling)
//! 3. Select: pop nodes and give each the lowest-index register not taken by
//!    an already-colored neighbour in the original graph
//!
//! Every node had fewer than K neighbours when it was removed, so select
//! always finds a free register. A violation of that is an internal error.

use super::cfg::ControlFlowGraph;
use super::dataflow::{iteration_limit, LivenessAnalysis, LivenessResult};
use super::interference::InterferenceGraph;
use super::ir::{IrCommand, Temp};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Machine register name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Register(pub String);

impl Register {
    /// Register name as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered set of K distinct registers available for allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterPool {
    registers: Vec<Register>,
}

impl RegisterPool {
    /// Build a pool, rejecting empty or duplicate names
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registers: Vec<Register> = names.into_iter().map(|n| Register(n.into())).collect();
        if registers.is_empty() {
            return Err(Error::config("register pool must not be empty"));
        }
        let mut seen = BTreeSet::new();
        for reg in &registers {
            if reg.0.is_empty() {
                return Err(Error::config("register names must not be empty"));
            }
            if !seen.insert(reg) {
                return Err(Error::config(format!("duplicate register '{}'", reg)));
            }
        }
        Ok(Self { registers })
    }

    /// The MIPS temporaries `$t0` .. `$t9`
    pub fn mips_temporaries() -> Self {
        Self {
            registers: (0..10).map(|i| Register(format!("$t{}", i))).collect(),
        }
    }

    /// Number of registers (K)
    pub fn k(&self) -> usize {
        self.registers.len()
    }

    /// Registers in preference order
    pub fn registers(&self) -> &[Register] {
        &self.registers
    }
}

impl Default for RegisterPool {
    fn default() -> Self {
        Self::mips_temporaries()
    }
}

/// Outcome of coloring one interference graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterAllocation {
    /// Every temporary received a register
    Colored {
        /// Temporary -> register, total over the graph's nodes
        assignment: BTreeMap<Temp, Register>,
    },
    /// Simplification got stuck
    Failed {
        /// Temporaries left when no node had degree < K
        blocked: BTreeSet<Temp>,
    },
}

impl RegisterAllocation {
    /// Did every temporary receive a register?
    pub fn success(&self) -> bool {
        matches!(self, RegisterAllocation::Colored { .. })
    }

    /// Register of `temp` (None on failure or for unknown temporaries)
    pub fn register(&self, temp: Temp) -> Option<&Register> {
        self.assignment().and_then(|a| a.get(&temp))
    }

    /// Full mapping, only available on success
    pub fn assignment(&self) -> Option<&BTreeMap<Temp, Register>> {
        match self {
            RegisterAllocation::Colored { assignment } => Some(assignment),
            RegisterAllocation::Failed { .. } => None,
        }
    }

    /// Temporaries that blocked simplification, only available on failure
    pub fn blocked(&self) -> Option<&BTreeSet<Temp>> {
        match self {
            RegisterAllocation::Colored { .. } => None,
            RegisterAllocation::Failed { blocked } => Some(blocked),
        }
    }

    /// Check that no two interfering temporaries share a register and that
    /// every node of `graph` is assigned
    pub fn is_valid_for(&self, graph: &InterferenceGraph) -> bool {
        let Some(assignment) = self.assignment() else {
            return false;
        };
        graph.nodes().all(|t| assignment.contains_key(&t))
            && graph
                .edges()
                .all(|(a, b)| assignment.get(&a) != assignment.get(&b))
    }
}

/// Graph coloring register allocator
#[derive(Debug, Clone, Default)]
pub struct GraphColoringAllocator {
    pool: RegisterPool,
}

impl GraphColoringAllocator {
    /// Create an allocator for the given register pool
    pub fn new(pool: RegisterPool) -> Self {
        Self { pool }
    }

    /// Register pool in use
    pub fn pool(&self) -> &RegisterPool {
        &self.pool
    }

    /// Color `graph` with the pool's K registers
    ///
    /// Running out of colors is reported as [`RegisterAllocation::Failed`];
    /// `Err` means the select invariant was broken.
    pub fn allocate(&self, graph: &InterferenceGraph) -> Result<RegisterAllocation> {
        let k = self.pool.k();

        // Simplify on a working copy
        let mut working = graph.clone();
        let mut select_stack: Vec<Temp> = Vec::with_capacity(graph.node_count());

        while !working.is_empty() {
            match working.find_low_degree(k) {
                Some(temp) => {
                    working.remove_node(temp);
                    select_stack.push(temp);
                }
                None => {
                    let blocked: BTreeSet<Temp> = working.nodes().collect();
                    tracing::debug!(
                        k,
                        blocked = blocked.len(),
                        "simplification stuck, no node with degree < K"
                    );
                    return Ok(RegisterAllocation::Failed { blocked });
                }
            }
        }

        // Select: assign colors by popping from stack
        let mut assignment: BTreeMap<Temp, Register> = BTreeMap::new();
        while let Some(temp) = select_stack.pop() {
            let used_colors: BTreeSet<&Register> = graph
                .neighbors(temp)
                .filter_map(|n| assignment.get(&n))
                .collect();

            let Some(color) = self
                .pool
                .registers()
                .iter()
                .find(|r| !used_colors.contains(r))
            else {
                return Err(Error::ColoringInvariantViolated {
                    temp,
                    neighbors: used_colors.len(),
                    registers: k,
                });
            };

            assignment.insert(temp, color.clone());
        }

        Ok(RegisterAllocation::Colored { assignment })
    }
}

/// Everything computed while allocating registers for one command stream
#[derive(Debug, Clone)]
pub struct AllocationArtifacts {
    /// Control flow graph
    pub cfg: ControlFlowGraph,
    /// Converged liveness facts
    pub liveness: LivenessResult,
    /// Interference graph built from `liveness`
    pub graph: InterferenceGraph,
    /// Coloring outcome
    pub allocation: RegisterAllocation,
}

/// Full allocation pipeline: CFG, liveness, interference, coloring
#[derive(Debug, Clone)]
pub struct RegisterAllocator {
    coloring: GraphColoringAllocator,
    iteration_budget_per_node: usize,
}

impl RegisterAllocator {
    /// Create an allocator with the given pool and fixpoint budget
    pub fn new(pool: RegisterPool, iteration_budget_per_node: usize) -> Self {
        Self {
            coloring: GraphColoringAllocator::new(pool),
            iteration_budget_per_node,
        }
    }

    /// Register pool in use
    pub fn pool(&self) -> &RegisterPool {
        self.coloring.pool()
    }

    /// Allocate registers for every temporary of `commands`
    ///
    /// An empty stream yields an empty successful allocation.
    pub fn allocate(&self, commands: &[IrCommand]) -> Result<RegisterAllocation> {
        Ok(self.allocate_with_artifacts(commands)?.allocation)
    }

    /// Like [`RegisterAllocator::allocate`], keeping the intermediate results
    pub fn allocate_with_artifacts(&self, commands: &[IrCommand]) -> Result<AllocationArtifacts> {
        self.allocate_cfg(ControlFlowGraph::build(commands)?)
    }

    /// Run liveness, interference and coloring over an already built CFG
    pub fn allocate_cfg(&self, cfg: ControlFlowGraph) -> Result<AllocationArtifacts> {
        let limit = iteration_limit(self.iteration_budget_per_node, cfg.len());
        let liveness = LivenessAnalysis::new(&cfg).run(&cfg, limit)?;
        let graph = InterferenceGraph::build(&cfg, &liveness);
        let allocation = self.coloring.allocate(&graph)?;

        Ok(AllocationArtifacts {
            cfg,
            liveness,
            graph,
            allocation,
        })
    }
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new(
            RegisterPool::default(),
            super::dataflow::DEFAULT_ITERATION_BUDGET_PER_NODE,
        )
    }
}
