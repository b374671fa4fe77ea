//! # Initialization Analysis
//!
//! Forward must-analysis: a name is initialized entering a node only if it
//! is initialized along every path reaching it (meet = set intersection).
//! Once the facts converge, every read of a name not initialized in the
//! node's in-fact is collected in a possibly-uninitialized accumulator.

use super::{solve, DataflowAnalysis, Direction, Solution};
use crate::compiler::cfg::{CfgNode, ControlFlowGraph, NodeId};
use crate::compiler::ir::Temp;
use crate::error::Result;
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

lazy_static::lazy_static! {
    // Scope suffix appended by the front end to disambiguate shadowed names
    static ref SCOPE_SUFFIX: Regex = Regex::new(r"_\d+$").expect("scope suffix pattern");
}

/// A name whose initialization is tracked
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Name {
    /// Named variable in memory
    Var(String),
    /// IR temporary
    Temp(Temp),
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Var(v) => write!(f, "{}", v),
            Name::Temp(t) => write!(f, "{}", t),
        }
    }
}

/// Set of names known initialized at a program point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitializationState {
    initialized: BTreeSet<Name>,
}

impl InitializationState {
    /// Nothing initialized
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` as initialized
    pub fn mark_initialized(&mut self, name: Name) {
        self.initialized.insert(name);
    }

    /// Is `name` known initialized?
    pub fn is_initialized(&self, name: &Name) -> bool {
        self.initialized.contains(name)
    }

    /// Names initialized in both states
    pub fn intersect(&self, other: &InitializationState) -> InitializationState {
        InitializationState {
            initialized: self
                .initialized
                .intersection(&other.initialized)
                .cloned()
                .collect(),
        }
    }

    /// Iterate initialized names in order
    pub fn iter(&self) -> impl Iterator<Item = &Name> {
        self.initialized.iter()
    }

    /// Number of initialized names
    pub fn len(&self) -> usize {
        self.initialized.len()
    }

    /// True when nothing is initialized
    pub fn is_empty(&self) -> bool {
        self.initialized.is_empty()
    }
}

impl fmt::Display for InitializationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.initialized.iter().map(Name::to_string).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Names a command reads
fn used_names(node: &CfgNode) -> Vec<Name> {
    let mut names: Vec<Name> = node.command.uses().into_iter().map(Name::Temp).collect();
    if let Some(var) = node.command.variable_read() {
        names.push(Name::Var(var.to_string()));
    }
    names
}

/// Names a command initializes
fn defined_names(node: &CfgNode) -> Vec<Name> {
    let mut names: Vec<Name> = node.command.defines().into_iter().map(Name::Temp).collect();
    if let Some(var) = node.command.variable_written() {
        names.push(Name::Var(var.to_string()));
    }
    names
}

/// Forward initialization analysis with its possibly-uninitialized accumulator
#[derive(Debug, Default)]
pub struct InitializationAnalysis {
    possibly_uninitialized: BTreeSet<Name>,
}

impl InitializationAnalysis {
    /// Create the analysis with an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Run to fixpoint over `cfg`
    ///
    /// The accumulator is rebuilt from the converged in-facts, never from
    /// intermediate ones, so running twice over the same graph gives the
    /// same result.
    pub fn run(&mut self, cfg: &ControlFlowGraph, limit: usize) -> Result<InitializationResult> {
        let solution = solve(cfg, self, limit)?;

        self.possibly_uninitialized.clear();
        for node in cfg.nodes() {
            let Some(state) = solution.fact_in(node.id) else {
                continue;
            };
            for name in used_names(node) {
                if !state.is_initialized(&name) {
                    self.possibly_uninitialized.insert(name);
                }
            }
        }

        Ok(InitializationResult {
            solution,
            possibly_uninitialized: self.possibly_uninitialized.clone(),
        })
    }

    /// Names flagged by the most recent run
    pub fn possibly_uninitialized(&self) -> &BTreeSet<Name> {
        &self.possibly_uninitialized
    }
}

impl DataflowAnalysis for InitializationAnalysis {
    type Fact = InitializationState;

    fn name(&self) -> &'static str {
        "initialization"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn boundary(&self) -> InitializationState {
        InitializationState::new()
    }

    fn initial(&self) -> InitializationState {
        InitializationState::new()
    }

    fn combine(&self, facts: &[&InitializationState]) -> InitializationState {
        let mut iter = facts.iter();
        let Some(first) = iter.next() else {
            return InitializationState::new();
        };
        iter.fold((*first).clone(), |acc, f| acc.intersect(f))
    }

    fn transfer(&mut self, node: &CfgNode, input: &InitializationState) -> InitializationState {
        let mut out = input.clone();
        for name in defined_names(node) {
            out.mark_initialized(name);
        }
        out
    }
}

/// Converged initialization facts plus the accumulator
#[derive(Debug, Clone)]
pub struct InitializationResult {
    /// Per-node facts
    pub solution: Solution<InitializationState>,
    /// Every name read at a node whose converged in-fact lacks it
    pub possibly_uninitialized: BTreeSet<Name>,
}

impl InitializationResult {
    /// Work-list iterations until the fixpoint
    pub fn iterations(&self) -> usize {
        self.solution.iterations
    }

    /// Sorted, de-duplicated variable names for the report
    ///
    /// Temporaries are never included. With `strip_scope_suffixes`, `x_3`
    /// is reported as `x`.
    pub fn uninitialized_variables(&self, strip_scope_suffixes: bool) -> Vec<String> {
        let vars: BTreeSet<String> = self
            .possibly_uninitialized
            .iter()
            .filter_map(|name| match name {
                Name::Var(v) => Some(v.as_str()),
                Name::Temp(_) => None,
            })
            .map(|v| Self::clean_variable_name(v, strip_scope_suffixes).into_owned())
            .collect();
        vars.into_iter().collect()
    }

    /// Variable name as reported, optionally without its `_<n>` scope suffix
    pub fn clean_variable_name(var: &str, strip_scope_suffixes: bool) -> Cow<'_, str> {
        if strip_scope_suffixes {
            SCOPE_SUFFIX.replace(var, "")
        } else {
            Cow::Borrowed(var)
        }
    }

    /// Temporaries read while not known initialized
    pub fn uninitialized_temps(&self) -> BTreeSet<Temp> {
        self.possibly_uninitialized
            .iter()
            .filter_map(|name| match name {
                Name::Temp(t) => Some(*t),
                Name::Var(_) => None,
            })
            .collect()
    }

    /// Each node reading a variable not initialized on every incoming path
    pub fn uninitialized_reads<'a>(
        &'a self,
        cfg: &'a ControlFlowGraph,
    ) -> impl Iterator<Item = (NodeId, &'a str)> + 'a {
        cfg.nodes().iter().filter_map(move |node| {
            let var = node.command.variable_read()?;
            let state = self.solution.fact_in(node.id)?;
            (!state.is_initialized(&Name::Var(var.to_string()))).then_some((node.id, var))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::dataflow::DEFAULT_ITERATION_BUDGET_PER_NODE;
    use crate::compiler::ir::IrCommand;

    fn load(dst: u32, var: &str) -> IrCommand {
        IrCommand::Load {
            dst: Temp(dst),
            var: var.to_string(),
        }
    }

    fn store(var: &str, src: u32) -> IrCommand {
        IrCommand::Store {
            var: var.to_string(),
            src: Temp(src),
        }
    }

    fn konst(dst: u32) -> IrCommand {
        IrCommand::ConstInt {
            dst: Temp(dst),
            value: 0,
        }
    }

    fn run(commands: &[IrCommand]) -> (ControlFlowGraph, InitializationResult) {
        let cfg = ControlFlowGraph::build(commands).unwrap();
        let result = InitializationAnalysis::new()
            .run(&cfg, DEFAULT_ITERATION_BUDGET_PER_NODE * cfg.len().max(1))
            .unwrap();
        (cfg, result)
    }

    #[test]
    fn test_load_before_store_is_flagged() {
        let (cfg, result) = run(&[load(1, "x"), konst(2), store("x", 2)]);
        assert_eq!(result.uninitialized_variables(true), vec!["x".to_string()]);
        assert_eq!(
            result.uninitialized_reads(&cfg).collect::<Vec<_>>(),
            vec![(NodeId(0), "x")]
        );
    }

    #[test]
    fn test_store_before_load_is_clean() {
        let (_, result) = run(&[konst(1), store("x", 1), load(2, "x")]);
        assert!(result.possibly_uninitialized.is_empty());
    }

    #[test]
    fn test_store_on_one_branch_only() {
        // if (t1) { x := t2 } ; t3 := x
        let (_, result) = run(&[
            konst(1),
            IrCommand::JumpIfEqToZero {
                cond: Temp(1),
                label: "L_end".to_string(),
            },
            konst(2),
            store("x", 2),
            IrCommand::Label {
                name: "L_end".to_string(),
            },
            load(3, "x"),
        ]);
        assert_eq!(result.uninitialized_variables(true), vec!["x".to_string()]);
    }

    #[test]
    fn test_store_on_both_branches() {
        let (_, result) = run(&[
            konst(1),
            IrCommand::JumpIfEqToZero {
                cond: Temp(1),
                label: "L_else".to_string(),
            },
            konst(2),
            store("x", 2),
            IrCommand::Jump {
                label: "L_end".to_string(),
            },
            IrCommand::Label {
                name: "L_else".to_string(),
            },
            konst(3),
            store("x", 3),
            IrCommand::Label {
                name: "L_end".to_string(),
            },
            load(4, "x"),
        ]);
        assert!(result.uninitialized_variables(true).is_empty());
    }

    #[test]
    fn test_uninitialized_temp_is_recorded_but_not_reported() {
        let (_, result) = run(&[IrCommand::Return { value: Temp(9) }]);
        assert_eq!(result.uninitialized_temps(), BTreeSet::from([Temp(9)]));
        assert!(result.uninitialized_variables(true).is_empty());
    }

    #[test]
    fn test_scope_suffix_stripping() {
        let (_, result) = run(&[load(1, "count_3"), load(2, "count_7"), load(3, "y")]);
        assert_eq!(
            result.uninitialized_variables(true),
            vec!["count".to_string(), "y".to_string()]
        );
        assert_eq!(
            result.uninitialized_variables(false),
            vec!["count_3".to_string(), "count_7".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let cfg = ControlFlowGraph::build(&[load(1, "x"), store("y", 1)]).unwrap();
        let mut analysis = InitializationAnalysis::new();
        let first = analysis.run(&cfg, 1000).unwrap();
        let second = analysis.run(&cfg, 1000).unwrap();
        assert_eq!(first.possibly_uninitialized, second.possibly_uninitialized);
        assert_eq!(analysis.possibly_uninitialized().len(), 1);
    }

    #[test]
    fn test_store_reached_through_backward_jump_is_clean() {
        // jump L2 ; L1: t2 := x ; return t2 ; L2: t1 := 1 ; x := t1 ; jump L1
        let (cfg, result) = run(&[
            IrCommand::Jump {
                label: "L2".to_string(),
            },
            IrCommand::Label {
                name: "L1".to_string(),
            },
            load(2, "x"),
            IrCommand::Return { value: Temp(2) },
            IrCommand::Label {
                name: "L2".to_string(),
            },
            konst(1),
            store("x", 1),
            IrCommand::Jump {
                label: "L1".to_string(),
            },
        ]);
        assert!(result.possibly_uninitialized.is_empty());
        assert!(result.uninitialized_variables(false).is_empty());
        assert_eq!(result.uninitialized_reads(&cfg).count(), 0);
    }

    #[test]
    fn test_loop_does_not_initialize_on_entry() {
        // while: L: t1 := x ; x := t1 ; jump L
        let (_, result) = run(&[
            IrCommand::Label {
                name: "L".to_string(),
            },
            load(1, "x"),
            store("x", 1),
            IrCommand::Jump {
                label: "L".to_string(),
            },
        ]);
        assert_eq!(result.uninitialized_variables(true), vec!["x".to_string()]);
    }
}
