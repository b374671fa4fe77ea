//! Register Pressure Analyzer
//!
//! Reads converged liveness facts and reports, per CFG node, how many
//! temporaries need a register at the same time. Points where that number
//! exceeds the register budget K can never be colored, so the report is the
//! first thing to look at when allocation fails.
//!
//! Usage:
//! ```rust,ignore
//! let analyzer = RegAllocAnalyzer::new(10);
//! let report = analyzer.analyze(&cfg, &liveness);
//! println!("{}", report.format());
//! ```

use super::cfg::{ControlFlowGraph, NodeId};
use super::dataflow::LivenessResult;
use super::ir::Temp;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Pressure at a single CFG node
#[derive(Debug, Clone, Serialize)]
pub struct NodePressure {
    /// Node index
    pub index: usize,
    /// Temporaries defined by the command
    pub defs: Vec<Temp>,
    /// Temporaries used by the command
    pub uses: Vec<Temp>,
    /// Temporaries live after the command
    pub live_out: BTreeSet<Temp>,
    /// Registers needed at this node
    pub pressure: usize,
    /// Printable command
    pub description: String,
}

/// Point where the register budget is exceeded
#[derive(Debug, Clone, Serialize)]
pub struct PressureIssue {
    /// Node index where the issue occurs
    pub index: usize,
    /// Severity: "critical" or "warning"
    pub severity: &'static str,
    /// Description of the issue
    pub message: String,
}

/// Complete pressure report for one routine
#[derive(Debug, Clone, Serialize)]
pub struct PressureReport {
    /// Per-node analysis
    pub nodes: Vec<NodePressure>,
    /// Detected issues
    pub issues: Vec<PressureIssue>,
    /// Peak register pressure
    pub peak_pressure: usize,
    /// Node of peak pressure
    pub peak_pressure_index: usize,
    /// Register budget K
    pub available_regs: usize,
}

impl PressureReport {
    /// True when no node needs more than K registers
    pub fn fits(&self) -> bool {
        self.peak_pressure <= self.available_regs
    }

    /// Format report as human-readable text
    pub fn format(&self) -> String {
        self.to_string()
    }

    /// JSON representation for programmatic analysis
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for PressureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "REGISTER PRESSURE REPORT")?;
        writeln!(f, "Available registers: {}", self.available_regs)?;
        writeln!(
            f,
            "Peak pressure: {} at node #{}",
            self.peak_pressure, self.peak_pressure_index
        )?;
        writeln!(f, "Issues found: {}", self.issues.len())?;

        if !self.issues.is_empty() {
            writeln!(f)?;
            for issue in &self.issues {
                writeln!(
                    f,
                    "[{}] node #{}: {}",
                    issue.severity.to_uppercase(),
                    issue.index,
                    issue.message
                )?;
            }
        }

        writeln!(f)?;
        writeln!(
            f,
            "{:4} {:40} {:15} {:15} {:6}",
            "IDX", "COMMAND", "DEFS", "USES", "LIVE"
        )?;

        let max_bar_width = 20;
        for node in &self.nodes {
            let desc = if node.description.chars().count() > 38 {
                let head: String = node.description.chars().take(35).collect();
                format!("{}...", head)
            } else {
                node.description.clone()
            };
            let bar_len = (node.pressure * max_bar_width) / self.available_regs.max(1);
            let overflow = if node.pressure > self.available_regs {
                " !"
            } else {
                ""
            };

            writeln!(
                f,
                "{:4} {:40} {:15} {:15} {:6} {}{}",
                node.index,
                desc,
                join_or_dash(&node.defs),
                join_or_dash(&node.uses),
                node.pressure,
                "#".repeat(bar_len.min(max_bar_width)),
                overflow
            )?;
        }

        Ok(())
    }
}

fn join_or_dash(temps: &[Temp]) -> String {
    if temps.is_empty() {
        "-".to_string()
    } else {
        temps
            .iter()
            .map(Temp::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Register pressure analyzer
#[derive(Debug, Clone)]
pub struct RegAllocAnalyzer {
    available_regs: usize,
}

impl RegAllocAnalyzer {
    /// Create an analyzer for a budget of `available_regs` registers
    pub fn new(available_regs: usize) -> Self {
        Self { available_regs }
    }

    /// Analyze converged liveness of `cfg`
    ///
    /// Pressure at a node is the larger of the live-in set and the live-out
    /// set plus the defined temporary (a dead definition still needs a
    /// register for the instant it is written).
    pub fn analyze(&self, cfg: &ControlFlowGraph, liveness: &LivenessResult) -> PressureReport {
        let mut nodes = Vec::with_capacity(cfg.len());
        let mut issues = Vec::new();
        let mut peak_pressure = 0;
        let mut peak_pressure_index = 0;

        for node in cfg.nodes() {
            let Some(info) = liveness.info(node.id) else {
                continue;
            };

            let written: BTreeSet<Temp> = info.live_out.union(&info.def_set).copied().collect();
            let pressure = info.live_in.len().max(written.len());

            if pressure > peak_pressure {
                peak_pressure = pressure;
                peak_pressure_index = node.id.index();
            }

            if pressure > self.available_regs {
                issues.push(self.overflow_issue(node.id, pressure, &written));
            }

            nodes.push(NodePressure {
                index: node.id.index(),
                defs: info.def_set.iter().copied().collect(),
                uses: info.use_set.iter().copied().collect(),
                live_out: info.live_out.clone(),
                pressure,
                description: node.command.to_string(),
            });
        }

        PressureReport {
            nodes,
            issues,
            peak_pressure,
            peak_pressure_index,
            available_regs: self.available_regs,
        }
    }

    fn overflow_issue(&self, id: NodeId, pressure: usize, live: &BTreeSet<Temp>) -> PressureIssue {
        let names: Vec<String> = live.iter().map(Temp::to_string).collect();
        PressureIssue {
            index: id.index(),
            severity: if pressure > self.available_regs + 2 {
                "critical"
            } else {
                "warning"
            },
            message: format!(
                "Register pressure ({}) exceeds available ({}): {}",
                pressure,
                self.available_regs,
                names.join(", ")
            ),
        }
    }
}

impl Default for RegAllocAnalyzer {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::dataflow::LivenessAnalysis;
    use crate::compiler::ir::{BinOp, IrCommand};

    fn report_for(commands: &[IrCommand], k: usize) -> PressureReport {
        let cfg = ControlFlowGraph::build(commands).unwrap();
        let liveness = LivenessAnalysis::new(&cfg).run(&cfg, 10_000).unwrap();
        RegAllocAnalyzer::new(k).analyze(&cfg, &liveness)
    }

    /// `n` constants all summed at the end, so all are live together
    fn wide_sum(n: u32) -> Vec<IrCommand> {
        let mut commands: Vec<IrCommand> = (0..n)
            .map(|i| IrCommand::ConstInt {
                dst: Temp(i),
                value: i as i64,
            })
            .collect();
        let mut acc = Temp(0);
        for i in 1..n {
            let dst = Temp(100 + i);
            commands.push(IrCommand::Binop {
                op: BinOp::Add,
                dst,
                lhs: acc,
                rhs: Temp(i),
            });
            acc = dst;
        }
        commands.push(IrCommand::Return { value: acc });
        commands
    }

    #[test]
    fn test_basic_analysis() {
        let report = report_for(&wide_sum(3), 10);
        assert_eq!(report.peak_pressure, 3);
        assert!(report.issues.is_empty());
        assert!(report.fits());
        assert!(report.format().contains("Peak pressure: 3"));
    }

    #[test]
    fn test_high_pressure_detection() {
        let report = report_for(&wide_sum(6), 3);
        assert_eq!(report.peak_pressure, 6);
        assert!(!report.fits());
        assert!(report.issues.iter().any(|i| i.severity == "critical"));
        assert!(report.to_json().unwrap().contains("\"peak_pressure\": 6"));
    }

    #[test]
    fn test_dead_definition_counts() {
        let report = report_for(
            &[
                IrCommand::ConstInt {
                    dst: Temp(1),
                    value: 1,
                },
                IrCommand::ReturnVoid,
            ],
            1,
        );
        assert_eq!(report.nodes[0].pressure, 1);
    }
}
