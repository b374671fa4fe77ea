//! # Control Flow Graph Construction
//!
//! Builds the control flow graph of one routine from its flat IR command
//! stream. Every command becomes its own node; edges follow fall-through and
//! jump targets resolved through the label table.

use super::ir::{CommandKind, IrCommand};
use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Stable node identifier (index in program order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Position of the node's command in the routine
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in the control flow graph, wrapping exactly one command
#[derive(Debug, Clone)]
pub struct CfgNode {
    /// Node ID
    pub id: NodeId,
    /// The wrapped command
    pub command: IrCommand,
    /// Classification derived from the command
    pub kind: CommandKind,
    predecessors: BTreeSet<NodeId>,
    successors: BTreeSet<NodeId>,
}

impl CfgNode {
    fn new(id: NodeId, command: IrCommand) -> Self {
        let kind = command.kind();
        Self {
            id,
            command,
            kind,
            predecessors: BTreeSet::new(),
            successors: BTreeSet::new(),
        }
    }

    /// Nodes that can transfer control to this one
    pub fn predecessors(&self) -> &BTreeSet<NodeId> {
        &self.predecessors
    }

    /// Nodes this one can transfer control to
    pub fn successors(&self) -> &BTreeSet<NodeId> {
        &self.successors
    }
}

/// Control Flow Graph
#[derive(Debug, Clone, Default)]
pub struct ControlFlowGraph {
    nodes: Vec<CfgNode>,
    entry: Option<NodeId>,
    exits: BTreeSet<NodeId>,
    labels: HashMap<String, NodeId>,
}

impl ControlFlowGraph {
    /// Build the CFG for an ordered command list
    ///
    /// An empty list yields an empty graph with no entry. A jump to a label
    /// that is not defined in `commands` is rejected.
    pub fn build(commands: &[IrCommand]) -> Result<Self> {
        let mut cfg = ControlFlowGraph::default();

        if commands.is_empty() {
            return Ok(cfg);
        }

        // Step 1: One node per command
        cfg.nodes = commands
            .iter()
            .enumerate()
            .map(|(i, cmd)| CfgNode::new(NodeId(i), cmd.clone()))
            .collect();

        // Step 2: Label table
        for node in &cfg.nodes {
            if let Some(name) = node.command.label_name() {
                if let Some(&first) = cfg.labels.get(name) {
                    return Err(Error::DuplicateLabel {
                        label: name.to_string(),
                        first,
                        second: node.id,
                    });
                }
                cfg.labels.insert(name.to_string(), node.id);
            }
        }

        // Step 3: Edges
        let count = cfg.nodes.len();
        for i in 0..count {
            let id = NodeId(i);
            let kind = cfg.nodes[i].kind;
            let fall_through = (i + 1 < count).then(|| NodeId(i + 1));

            if matches!(kind, CommandKind::Jump | CommandKind::ConditionalJump) {
                let target = cfg.resolve_jump(id)?;
                cfg.add_edge(id, target);
            }

            if kind != CommandKind::Jump {
                if let Some(next) = fall_through {
                    cfg.add_edge(id, next);
                }
            }
        }

        // Step 4: Entry and exits
        cfg.entry = Some(NodeId(0));
        cfg.exits = cfg
            .nodes
            .iter()
            .filter(|n| n.successors.is_empty())
            .map(|n| n.id)
            .collect();

        tracing::debug!(
            nodes = cfg.nodes.len(),
            labels = cfg.labels.len(),
            exits = cfg.exits.len(),
            "built control flow graph"
        );

        Ok(cfg)
    }

    fn resolve_jump(&self, id: NodeId) -> Result<NodeId> {
        let node = &self.nodes[id.0];
        let label = node.command.jump_target().unwrap_or_default();
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| Error::UnresolvedLabel {
                label: label.to_string(),
                node: id,
            })
    }

    /// Add an edge between nodes
    fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.0].successors.insert(to);
        self.nodes[to.0].predecessors.insert(from);
    }

    /// All nodes in program order
    pub fn nodes(&self) -> &[CfgNode] {
        &self.nodes
    }

    /// Get node by ID
    pub fn node(&self, id: NodeId) -> Option<&CfgNode> {
        self.nodes.get(id.0)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True for the graph of an empty command stream
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Entry node (first command), `None` for an empty graph
    pub fn entry(&self) -> Option<NodeId> {
        self.entry
    }

    /// Nodes with no successors
    pub fn exits(&self) -> &BTreeSet<NodeId> {
        &self.exits
    }

    /// Node defining `label`
    pub fn label_node(&self, label: &str) -> Option<NodeId> {
        self.labels.get(label).copied()
    }

    /// Total number of edges
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.successors.len()).sum()
    }

    /// Nodes reachable from the entry along successor edges
    pub fn reachable_from_entry(&self) -> BTreeSet<NodeId> {
        let mut visited = BTreeSet::new();
        let Some(entry) = self.entry else {
            return visited;
        };

        let mut stack = vec![entry];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            stack.extend(self.nodes[id.0].successors.iter().copied());
        }
        visited
    }

    /// Non-entry nodes that no edge reaches (typically code after a jump or return)
    pub fn unreachable_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| Some(n.id) != self.entry && n.predecessors.is_empty())
            .map(|n| n.id)
            .collect()
    }

    /// Targets of back edges found by a depth-first walk from the entry
    ///
    /// Every loop in the routine has at least one of these as its header.
    pub fn loop_heads(&self) -> Vec<NodeId> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };

        let mut heads = BTreeSet::new();
        let mut on_stack = vec![false; self.nodes.len()];
        let mut visited = vec![false; self.nodes.len()];

        // (node, successors still to visit)
        let mut stack: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        visited[entry.0] = true;
        on_stack[entry.0] = true;
        stack.push((entry, self.successors_desc(entry)));

        while let Some(top) = stack.last_mut() {
            let id = top.0;
            let next = top.1.pop();
            match next {
                Some(succ) if on_stack[succ.0] => {
                    heads.insert(succ);
                }
                Some(succ) if !visited[succ.0] => {
                    visited[succ.0] = true;
                    on_stack[succ.0] = true;
                    stack.push((succ, self.successors_desc(succ)));
                }
                Some(_) => {}
                None => {
                    on_stack[id.0] = false;
                    stack.pop();
                }
            }
        }

        heads.into_iter().collect()
    }

    // Reversed so popping from the end visits successors in ascending order.
    fn successors_desc(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id.0].successors.iter().rev().copied().collect()
    }

    /// Render the graph in Graphviz DOT format
    ///
    /// The entry node is green, exit nodes are red, and each node is
    /// labelled with its command text.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        out.push_str("digraph CFG {\n");
        out.push_str("  rankdir=TB;\n");
        out.push_str("  node [shape=box];\n");

        for node in &self.nodes {
            let color = if Some(node.id) == self.entry {
                "green"
            } else if self.exits.contains(&node.id) {
                "red"
            } else {
                "black"
            };
            out.push_str(&format!(
                "  node{} [label=\"{}\" color={}];\n",
                node.id,
                escape_dot(&node.command.to_string()),
                color
            ));
        }

        for node in &self.nodes {
            for succ in &node.successors {
                out.push_str(&format!("  node{} -> node{};\n", node.id, succ));
            }
        }

        out.push_str("}\n");
        out
    }
}

fn escape_dot(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{BinOp, Temp};

    fn label(name: &str) -> IrCommand {
        IrCommand::Label {
            name: name.to_string(),
        }
    }

    fn jump(name: &str) -> IrCommand {
        IrCommand::Jump {
            label: name.to_string(),
        }
    }

    fn cjump(cond: u32, name: &str) -> IrCommand {
        IrCommand::JumpIfEqToZero {
            cond: Temp(cond),
            label: name.to_string(),
        }
    }

    fn konst(dst: u32, value: i64) -> IrCommand {
        IrCommand::ConstInt {
            dst: Temp(dst),
            value,
        }
    }

    #[test]
    fn test_empty_cfg() {
        let cfg = ControlFlowGraph::build(&[]).unwrap();
        assert!(cfg.is_empty());
        assert_eq!(cfg.entry(), None);
        assert!(cfg.exits().is_empty());
    }

    #[test]
    fn test_linear_cfg() {
        let cfg = ControlFlowGraph::build(&[
            konst(1, 5),
            konst(2, 7),
            IrCommand::Binop {
                op: BinOp::Add,
                dst: Temp(3),
                lhs: Temp(1),
                rhs: Temp(2),
            },
            IrCommand::Return { value: Temp(3) },
        ])
        .unwrap();

        assert_eq!(cfg.len(), 4);
        assert_eq!(cfg.entry(), Some(NodeId(0)));
        assert_eq!(cfg.exits(), &BTreeSet::from([NodeId(3)]));
        assert_eq!(cfg.edge_count(), 3);
    }

    #[test]
    fn test_conditional_jump_has_two_successors() {
        let cfg = ControlFlowGraph::build(&[
            konst(1, 0),
            cjump(1, "L_else"),
            konst(2, 1),
            label("L_else"),
            IrCommand::ReturnVoid,
        ])
        .unwrap();

        let node = cfg.node(NodeId(1)).unwrap();
        assert_eq!(node.kind, CommandKind::ConditionalJump);
        assert_eq!(node.successors(), &BTreeSet::from([NodeId(2), NodeId(3)]));
        assert_eq!(
            cfg.node(NodeId(3)).unwrap().predecessors(),
            &BTreeSet::from([NodeId(1), NodeId(2)])
        );
    }

    #[test]
    fn test_conditional_jump_to_next_node_collapses() {
        // Target and fall-through are the same node
        let cfg =
            ControlFlowGraph::build(&[konst(1, 0), cjump(1, "L"), label("L"), IrCommand::ReturnVoid])
                .unwrap();
        assert_eq!(cfg.node(NodeId(1)).unwrap().successors().len(), 1);
    }

    #[test]
    fn test_conditional_jump_at_end_has_only_target() {
        let cfg = ControlFlowGraph::build(&[label("L"), konst(1, 0), cjump(1, "L")]).unwrap();
        assert_eq!(
            cfg.node(NodeId(2)).unwrap().successors(),
            &BTreeSet::from([NodeId(0)])
        );
        assert!(cfg.exits().is_empty());
    }

    #[test]
    fn test_unconditional_jump_has_no_fall_through() {
        let cfg = ControlFlowGraph::build(&[
            jump("L_end"),
            konst(1, 1),
            label("L_end"),
            IrCommand::ReturnVoid,
        ])
        .unwrap();

        assert_eq!(
            cfg.node(NodeId(0)).unwrap().successors(),
            &BTreeSet::from([NodeId(2)])
        );
        assert_eq!(cfg.unreachable_nodes(), vec![NodeId(1)]);
        assert!(!cfg.reachable_from_entry().contains(&NodeId(1)));
    }

    #[test]
    fn test_return_still_falls_through() {
        let cfg = ControlFlowGraph::build(&[IrCommand::ReturnVoid, konst(1, 1)]).unwrap();
        assert_eq!(
            cfg.node(NodeId(0)).unwrap().successors(),
            &BTreeSet::from([NodeId(1)])
        );
        assert_eq!(cfg.exits(), &BTreeSet::from([NodeId(1)]));
    }

    #[test]
    fn test_unresolved_label_fails() {
        let err = ControlFlowGraph::build(&[jump("nowhere")]).unwrap_err();
        assert_eq!(
            err,
            Error::UnresolvedLabel {
                label: "nowhere".to_string(),
                node: NodeId(0),
            }
        );
    }

    #[test]
    fn test_duplicate_label_fails() {
        let err = ControlFlowGraph::build(&[label("L"), label("L")]).unwrap_err();
        assert!(matches!(err, Error::DuplicateLabel { .. }));
    }

    #[test]
    fn test_loop_heads() {
        // while (t1) { t2 := 1 }
        let cfg = ControlFlowGraph::build(&[
            label("L_start"),
            konst(1, 1),
            cjump(1, "L_end"),
            konst(2, 1),
            jump("L_start"),
            label("L_end"),
            IrCommand::ReturnVoid,
        ])
        .unwrap();

        assert_eq!(cfg.loop_heads(), vec![NodeId(0)]);
        assert!(cfg.unreachable_nodes().is_empty());
    }

    #[test]
    fn test_dot_output() {
        let cfg = ControlFlowGraph::build(&[
            IrCommand::ConstString {
                dst: Temp(1),
                value: "hi".to_string(),
            },
            IrCommand::ReturnVoid,
        ])
        .unwrap();

        let dot = cfg.to_dot();
        assert!(dot.starts_with("digraph CFG {"));
        assert!(dot.contains("node0 [label=\"Temp_1 := \\\"hi\\\"\" color=green];"));
        assert!(dot.contains("node1 [label=\"RETURN_VOID\" color=red];"));
        assert!(dot.contains("node0 -> node1;"));
    }
}
