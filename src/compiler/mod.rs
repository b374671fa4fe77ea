//! # L Compiler Back End - Analysis and Register Allocation
//!
//! This module takes the flat IR command stream of each routine, rebuilds
//! its control flow graph, runs dataflow analyses over it and assigns the
//! IR temporaries to a fixed set of machine registers.
//!
//! ## Architecture
//!
//! ```text
//! IR commands → CFG → { Initialization analysis → diagnostics
//!                     { Liveness → Interference graph → Graph coloring → registers
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use lcc_backend::compiler::{Backend, BackendOptions};
//!
//! let backend = Backend::new(BackendOptions::default())?;
//! let output = backend.compile_routine(&routine)?;
//! println!("{}", output.analysis.uninitialized_report());
//! ```

pub mod analyzer;
pub mod cfg;
pub mod dataflow;
pub mod debug;
pub mod graph_coloring;
pub mod interference;
pub mod ir;
pub mod regalloc_analyzer;

pub use analyzer::{AnalysisReport, Analyzer, Diagnostic, Severity, NO_ISSUES_MARKER};
pub use cfg::{CfgNode, ControlFlowGraph, NodeId};
pub use dataflow::{
    solve, DataflowAnalysis, Direction, InitializationAnalysis, InitializationState,
    LivenessAnalysis, LivenessInfo, Solution,
};
pub use debug::{dump_allocation, dump_interference, dump_ir, dump_liveness};
pub use graph_coloring::{
    AllocationArtifacts, GraphColoringAllocator, Register, RegisterAllocation, RegisterAllocator,
    RegisterPool,
};
pub use interference::InterferenceGraph;
pub use ir::{BinOp, CommandKind, IrCommand, IrRoutine, LabelFactory, Temp, TempFactory};
pub use regalloc_analyzer::{NodePressure, PressureIssue, PressureReport, RegAllocAnalyzer};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Back-end options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    /// Register names available to the allocator, in preference order
    pub registers: Vec<String>,
    /// Work-list iterations allowed per CFG node before giving up
    pub iteration_budget_per_node: usize,
    /// Report `x_3` as `x` in the uninitialized-variable list
    pub strip_scope_suffixes: bool,
    /// Render each routine's CFG in DOT format
    pub emit_cfg_dot: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            registers: RegisterPool::mips_temporaries()
                .registers()
                .iter()
                .map(|r| r.0.clone())
                .collect(),
            iteration_budget_per_node: dataflow::DEFAULT_ITERATION_BUDGET_PER_NODE,
            strip_scope_suffixes: true,
            emit_cfg_dot: false,
        }
    }
}

impl BackendOptions {
    /// Parse options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("malformed options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Check that the options are usable
    pub fn validate(&self) -> Result<()> {
        if self.iteration_budget_per_node == 0 {
            return Err(Error::config("iteration_budget_per_node must be at least 1"));
        }
        RegisterPool::new(self.registers.iter().cloned())?;
        Ok(())
    }

    /// Register pool described by these options
    pub fn register_pool(&self) -> Result<RegisterPool> {
        RegisterPool::new(self.registers.iter().cloned())
    }
}

/// Back-end output for one routine
#[derive(Debug, Clone)]
pub struct RoutineOutput {
    /// Routine name
    pub routine: String,
    /// Static analysis report (diagnostics, uninitialized variables)
    pub analysis: AnalysisReport,
    /// Temporary -> register mapping for the code generator
    pub assignment: BTreeMap<Temp, Register>,
    /// Register pressure per node
    pub pressure: PressureReport,
    /// CFG in DOT format (when enabled)
    pub cfg_dot: Option<String>,
}

/// Back-end driver
#[derive(Debug, Clone)]
pub struct Backend {
    options: BackendOptions,
    analyzer: Analyzer,
    allocator: RegisterAllocator,
}

impl Backend {
    /// Create a back end, validating `options`
    pub fn new(options: BackendOptions) -> Result<Self> {
        options.validate()?;
        let pool = options.register_pool()?;
        Ok(Self {
            analyzer: Analyzer::new(
                options.iteration_budget_per_node,
                options.strip_scope_suffixes,
            ),
            allocator: RegisterAllocator::new(pool, options.iteration_budget_per_node),
            options,
        })
    }

    /// Options in effect
    pub fn options(&self) -> &BackendOptions {
        &self.options
    }

    /// Analyze one routine and allocate its registers
    ///
    /// Uninitialized variables are logged and reported but never fail the
    /// routine. Running out of registers fails it with
    /// [`Error::RegisterAllocationFailed`].
    pub fn compile_routine(&self, routine: &IrRoutine) -> Result<RoutineOutput> {
        // Phase 1: Static analysis
        tracing::debug!("{}", dump_ir(routine));
        let analysis = self.analyzer.analyze(routine)?;

        for diag in analysis.diagnostics_at_least(Severity::Warning) {
            tracing::warn!(routine = %routine.name, "{}", diag);
        }

        // Phase 2: Liveness, interference, coloring
        let artifacts = self.allocator.allocate_cfg(analysis.cfg.clone())?;
        tracing::debug!("{}", dump_liveness(&artifacts.cfg, &artifacts.liveness));
        tracing::debug!("{}", dump_interference(&artifacts.graph));
        tracing::debug!("{}", dump_allocation(&artifacts.allocation));

        let k = self.allocator.pool().k();
        let pressure = RegAllocAnalyzer::new(k).analyze(&artifacts.cfg, &artifacts.liveness);

        // Phase 3: Hand the mapping to the code generator, or stop here
        let assignment = match artifacts.allocation {
            RegisterAllocation::Colored { assignment } => assignment,
            RegisterAllocation::Failed { blocked } => {
                tracing::warn!(
                    routine = %routine.name,
                    blocked = blocked.len(),
                    peak_pressure = pressure.peak_pressure,
                    registers = k,
                    "register allocation failed"
                );
                return Err(Error::RegisterAllocationFailed {
                    routine: routine.name.clone(),
                    peak_pressure: pressure.peak_pressure,
                    registers: k,
                });
            }
        };

        let cfg_dot = self.options.emit_cfg_dot.then(|| analysis.cfg.to_dot());

        tracing::info!(
            routine = %routine.name,
            commands = routine.len(),
            temporaries = assignment.len(),
            peak_pressure = pressure.peak_pressure,
            warnings = analysis.diagnostics_at_least(Severity::Warning).count(),
            "routine allocated"
        );

        Ok(RoutineOutput {
            routine: routine.name.clone(),
            analysis,
            assignment,
            pressure,
            cfg_dot,
        })
    }

    /// Compile routines one at a time, stopping at the first failure
    pub fn compile_program(&self, routines: &[IrRoutine]) -> Result<Vec<RoutineOutput>> {
        routines.iter().map(|r| self.compile_routine(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = BackendOptions::default();
        assert_eq!(options.registers.len(), 10);
        assert_eq!(options.registers[0], "$t0");
        assert_eq!(options.iteration_budget_per_node, 1000);
        assert!(options.strip_scope_suffixes);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_from_partial_json() {
        let options = BackendOptions::from_json(r#"{"registers": ["a", "b"], "emit_cfg_dot": true}"#)
            .unwrap();
        assert_eq!(options.registers, vec!["a", "b"]);
        assert!(options.emit_cfg_dot);
        assert_eq!(options.iteration_budget_per_node, 1000);
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        assert!(BackendOptions::from_json(r#"{"registers": []}"#).is_err());
        assert!(BackendOptions::from_json(r#"{"registers": ["a", "a"]}"#).is_err());
        assert!(BackendOptions::from_json(r#"{"iteration_budget_per_node": 0}"#).is_err());
        assert!(matches!(
            BackendOptions::from_json("not json"),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_backend_compiles_routine() {
        let backend = Backend::new(BackendOptions {
            emit_cfg_dot: true,
            ..BackendOptions::default()
        })
        .unwrap();
        let routine = IrRoutine::new(
            "main",
            vec![
                IrCommand::ConstInt {
                    dst: Temp(1),
                    value: 1,
                },
                IrCommand::Return { value: Temp(1) },
            ],
        );

        let output = backend.compile_routine(&routine).unwrap();
        assert_eq!(output.assignment.len(), 1);
        assert!(output.cfg_dot.unwrap().contains("digraph CFG"));
    }
}
