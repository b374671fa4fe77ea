//! Debug utilities for the back end
//!
//! Text dumps of IR, liveness, the interference graph and the final
//! register assignment. The driver logs them at debug level.

use super::cfg::ControlFlowGraph;
use super::dataflow::LivenessResult;
use super::graph_coloring::RegisterAllocation;
use super::interference::InterferenceGraph;
use super::ir::{IrRoutine, Temp};
use std::collections::BTreeSet;

const RULE: &str = "═══════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────";

/// IR routine in human-readable format
pub fn dump_ir(routine: &IrRoutine) -> String {
    let mut out = String::new();
    out.push_str(RULE);
    out.push_str("\n                    IR DUMP\n");
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("Routine: {}\n", routine.name));
    out.push_str(&format!("Temporaries: {}\n", routine.temps().len()));
    out.push_str(THIN_RULE);
    out.push('\n');

    for (i, cmd) in routine.commands().iter().enumerate() {
        out.push_str(&format!("{:04}: {}\n", i, cmd));
    }
    out.push_str(RULE);
    out.push('\n');
    out
}

fn format_set(temps: &BTreeSet<Temp>) -> String {
    let names: Vec<String> = temps.iter().map(Temp::to_string).collect();
    format!("{{{}}}", names.join(", "))
}

/// Per-node liveness facts
pub fn dump_liveness(cfg: &ControlFlowGraph, liveness: &LivenessResult) -> String {
    let mut out = String::new();
    out.push_str("LIVENESS\n");
    out.push_str(THIN_RULE);
    out.push('\n');

    for node in cfg.nodes() {
        let Some(info) = liveness.info(node.id) else {
            continue;
        };
        out.push_str(&format!("Node {}: {}\n", node.id, node.command));
        out.push_str(&format!(
            "  USE: {}  DEF: {}\n",
            format_set(&info.use_set),
            format_set(&info.def_set)
        ));
        out.push_str(&format!("  IN:  {}\n", format_set(&info.live_in)));
        out.push_str(&format!("  OUT: {}\n", format_set(&info.live_out)));
    }
    out.push_str(&format!("Converged in {} iterations\n", liveness.iterations));
    out
}

/// Interference graph adjacency
pub fn dump_interference(graph: &InterferenceGraph) -> String {
    format!(
        "INTERFERENCE GRAPH ({} nodes, {} edges, max degree {})\n{}{}",
        graph.node_count(),
        graph.edge_count(),
        graph.max_degree(),
        graph,
        THIN_RULE
    )
}

/// Register assignment or the temporaries that blocked coloring
pub fn dump_allocation(allocation: &RegisterAllocation) -> String {
    let mut out = String::new();
    match allocation {
        RegisterAllocation::Colored { assignment } => {
            out.push_str(&format!("ALLOCATION: success ({} temporaries)\n", assignment.len()));
            for (temp, reg) in assignment {
                out.push_str(&format!("  {} -> {}\n", temp, reg));
            }
        }
        RegisterAllocation::Failed { blocked } => {
            out.push_str("ALLOCATION: failed\n");
            out.push_str(&format!("  blocked: {}\n", format_set(blocked)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::graph_coloring::Register;
    use crate::compiler::ir::IrCommand;
    use std::collections::BTreeMap;

    #[test]
    fn test_dump_ir_numbers_commands() {
        let routine = IrRoutine::new(
            "main",
            vec![
                IrCommand::ConstInt {
                    dst: Temp(1),
                    value: 4,
                },
                IrCommand::Return { value: Temp(1) },
            ],
        );
        let dump = dump_ir(&routine);
        assert!(dump.contains("Routine: main"));
        assert!(dump.contains("0000: Temp_1 := 4"));
        assert!(dump.contains("0001: RETURN Temp_1"));
    }

    #[test]
    fn test_dump_allocation() {
        let colored = RegisterAllocation::Colored {
            assignment: BTreeMap::from([(Temp(2), Register("$t0".to_string()))]),
        };
        assert!(dump_allocation(&colored).contains("Temp_2 -> $t0"));

        let failed = RegisterAllocation::Failed {
            blocked: BTreeSet::from([Temp(1), Temp(2)]),
        };
        assert!(dump_allocation(&failed).contains("blocked: {Temp_1, Temp_2}"));
    }
}
