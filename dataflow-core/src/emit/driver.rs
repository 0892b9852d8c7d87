//! Emission driver (component K, contract only).
//!
//! The real C-text emitter is out of scope; `build_partition_program`
//! produces the structured schedule a textual backend would render: one
//! partition's nodes in topological order, with `ContextOpen`/`ContextClose`
//! bracketing context-root bodies as the walk enters/leaves them, and
//! `FifoWait`/`FifoPull`/`FifoPush` around the `ThreadCrossingFifo` nodes
//! that feed into or out of this partition.

use crate::error::DataflowError;
use crate::graph::Graph;
use crate::node::NodeKind;
use crate::passes::context::context_stack;
use petgraph::stable_graph::NodeIndex;

#[derive(Clone, Debug, PartialEq)]
pub enum EmitOp {
    ContextOpen(NodeIndex),
    ContextClose(NodeIndex),
    FifoWait(NodeIndex),
    FifoPull(NodeIndex),
    Compute(NodeIndex),
    FifoPush(NodeIndex),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionProgram {
    pub partition: i32,
    pub ops: Vec<EmitOp>,
}

/// Builds the scheduling program for `partition`: every node assigned to
/// it, in topological order, plus the FIFO and context bracketing ops its
/// neighbors require.
pub fn build_partition_program(graph: &Graph, partition: i32) -> Result<PartitionProgram, DataflowError> {
    let order = crate::algo::topological_order(graph).map_err(|cycle| {
        DataflowError::transformation(
            "emit::driver::build_partition_program",
            format!("graph still has a cycle at {:?}; blocking should have broken it first", cycle),
        )
    })?;

    let mut ops = Vec::new();
    let mut open_stack: Vec<NodeIndex> = Vec::new();

    for node in order {
        let belongs = graph.node(node).and_then(|n| n.partition) == Some(partition);
        if !belongs {
            continue;
        }

        for edge in graph.in_arcs(node) {
            let (src, _) = graph.inner.edge_endpoints(edge).expect("edge exists");
            if let Some(NodeKind::ThreadCrossingFifo { partition_dst, .. }) = graph.node(src).map(|n| &n.kind) {
                if *partition_dst == partition {
                    ops.push(EmitOp::FifoWait(src));
                    ops.push(EmitOp::FifoPull(src));
                }
            }
        }

        let target_stack = context_stack(graph, node);
        retarget_context_stack(&mut ops, &mut open_stack, &target_stack);

        ops.push(EmitOp::Compute(node));

        for edge in graph.out_arcs(node) {
            let (_, dst) = graph.inner.edge_endpoints(edge).expect("edge exists");
            if let Some(NodeKind::ThreadCrossingFifo { partition_src, .. }) = graph.node(dst).map(|n| &n.kind) {
                if *partition_src == partition {
                    ops.push(EmitOp::FifoPush(dst));
                }
            }
        }
    }

    retarget_context_stack(&mut ops, &mut open_stack, &[]);

    Ok(PartitionProgram { partition, ops })
}

/// Emits `ContextClose`/`ContextOpen` ops to move from `open_stack`
/// (outermost last, matching `context_stack`'s closest-first convention
/// reversed for comparison) to `target`, closing the divergent suffix and
/// opening the new one, then updates `open_stack` in place.
fn retarget_context_stack(ops: &mut Vec<EmitOp>, open_stack: &mut Vec<NodeIndex>, target: &[NodeIndex]) {
    // Both are closest-first; reverse to outermost-first for prefix comparison.
    let current: Vec<NodeIndex> = open_stack.iter().rev().copied().collect();
    let target_outer_first: Vec<NodeIndex> = target.iter().rev().copied().collect();

    let common = current
        .iter()
        .zip(target_outer_first.iter())
        .take_while(|(a, b)| a == b)
        .count();

    for idx in current[common..].iter().rev() {
        ops.push(EmitOp::ContextClose(*idx));
    }
    for idx in &target_outer_first[common..] {
        ops.push(EmitOp::ContextOpen(*idx));
    }

    *open_stack = target.to_vec();
}
