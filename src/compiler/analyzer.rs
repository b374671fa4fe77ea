//! # Static Analyzer
//!
//! Builds the CFG of a routine, runs the initialization analysis over it and
//! turns the results into diagnostics: possibly-uninitialized variables,
//! unreachable commands and loops. None of these abort compilation.

use super::cfg::{ControlFlowGraph, NodeId};
use super::dataflow::{iteration_limit, InitializationAnalysis, InitializationResult};
use super::ir::IrRoutine;
use crate::error::Result;
use std::collections::BTreeSet;
use std::fmt;

/// Marker written instead of the variable list when nothing is flagged
pub const NO_ISSUES_MARKER: &str = "!OK";

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational
    Note,
    /// Likely bug in the source program
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One analyzer finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Node the finding refers to, if any
    pub node: Option<NodeId>,
    /// Human-readable message
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            Some(node) => write!(f, "{} [node {}]: {}", self.severity, node, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Result of analyzing one routine
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Routine name
    pub routine: String,
    /// Control flow graph of the routine
    pub cfg: ControlFlowGraph,
    /// Converged initialization facts
    pub initialization: InitializationResult,
    /// Findings in discovery order
    pub diagnostics: Vec<Diagnostic>,
    uninitialized: Vec<String>,
}

impl AnalysisReport {
    /// Sorted variables possibly read before initialization
    pub fn uninitialized_variables(&self) -> &[String] {
        &self.uninitialized
    }

    /// Variable names one per line, or [`NO_ISSUES_MARKER`] when there are none
    pub fn uninitialized_report(&self) -> String {
        if self.uninitialized.is_empty() {
            NO_ISSUES_MARKER.to_string()
        } else {
            self.uninitialized.join("\n")
        }
    }

    /// Findings of at least `severity`
    pub fn diagnostics_at_least(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.severity >= severity)
    }

    /// Human-readable summary
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Analysis of routine {}\n", self.routine));
        out.push_str(&format!(
            "CFG has {} nodes, {} edges, {} exits\n",
            self.cfg.len(),
            self.cfg.edge_count(),
            self.cfg.exits().len()
        ));
        out.push_str(&format!(
            "Analysis completed in {} iterations\n",
            self.initialization.iterations()
        ));

        if self.diagnostics.is_empty() {
            out.push_str("No issues detected!\n");
        } else {
            out.push_str("Warnings:\n");
            for diag in &self.diagnostics {
                out.push_str(&format!("  {}\n", diag));
            }
        }
        out
    }
}

/// Static analyzer over single routines
#[derive(Debug, Clone)]
pub struct Analyzer {
    iteration_budget_per_node: usize,
    strip_scope_suffixes: bool,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(super::dataflow::DEFAULT_ITERATION_BUDGET_PER_NODE, true)
    }
}

impl Analyzer {
    /// Create an analyzer
    pub fn new(iteration_budget_per_node: usize, strip_scope_suffixes: bool) -> Self {
        Self {
            iteration_budget_per_node,
            strip_scope_suffixes,
        }
    }

    /// Analyze one routine
    ///
    /// Fails only when the CFG cannot be built or the fixpoint engine gives up.
    pub fn analyze(&self, routine: &IrRoutine) -> Result<AnalysisReport> {
        let cfg = ControlFlowGraph::build(routine.commands())?;
        let limit = iteration_limit(self.iteration_budget_per_node, cfg.len());
        let initialization = InitializationAnalysis::new().run(&cfg, limit)?;

        let mut diagnostics = Vec::new();

        if cfg.is_empty() {
            diagnostics.push(Diagnostic {
                severity: Severity::Note,
                node: None,
                message: "Empty IR - no CFG constructed".to_string(),
            });
        }

        let mut reported = BTreeSet::new();
        for (node, var) in initialization.uninitialized_reads(&cfg) {
            let name = self.display_name(var);
            if reported.insert(name.clone()) {
                diagnostics.push(Diagnostic {
                    severity: Severity::Warning,
                    node: Some(node),
                    message: format!("Possibly uninitialized variable: {}", name),
                });
            }
        }

        for id in cfg.unreachable_nodes() {
            if let Some(node) = cfg.node(id) {
                diagnostics.push(Diagnostic {
                    severity: Severity::Warning,
                    node: Some(id),
                    message: format!("Unreachable code detected at: {}", node.command),
                });
            }
        }

        for id in cfg.loop_heads() {
            if let Some(node) = cfg.node(id) {
                diagnostics.push(Diagnostic {
                    severity: Severity::Note,
                    node: Some(id),
                    message: format!("Potential infinite loop detected involving: {}", node.command),
                });
            }
        }

        let uninitialized: Vec<String> = reported.into_iter().collect();

        Ok(AnalysisReport {
            routine: routine.name.clone(),
            cfg,
            initialization,
            diagnostics,
            uninitialized,
        })
    }

    fn display_name(&self, var: &str) -> String {
        InitializationResult::clean_variable_name(var, self.strip_scope_suffixes).into_owned()
    }
}
