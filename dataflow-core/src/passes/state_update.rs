//! State-update node creation.
//!
//! Every stateful node (`Delay`, a `BlackBox` that declares itself
//! stateful, and — once built — `RepeatOutput`/blocking-registered-output
//! variants) needs a companion `StateUpdate` node that commits its
//! freshly-computed next-state into the state the next invocation reads.
//! The companion is placed in the same parent/context as the stateful node
//! (so it shares the same conditional/iterative emission envelope) and is
//! wired with an order-constraint arc from every current reader of the
//! node's output, so the scheduler cannot emit the commit until all of
//! those readers have consumed the *prior* state.

use crate::error::DataflowError;
use crate::graph::{Graph, GraphNode, NodeRef};
use crate::node::NodeKind;
use crate::port::Arc as ArcWeight;
use petgraph::stable_graph::NodeIndex;

/// Creates a `StateUpdate` companion for `stateful`, parented alongside it,
/// with an order-constraint arc from every node currently reading
/// `stateful`'s output. Fails if `stateful` does not report `has_state()`.
pub fn create_state_update_node(graph: &mut Graph, stateful: NodeIndex) -> Result<NodeIndex, DataflowError> {
    let node = graph
        .node(stateful)
        .ok_or_else(|| DataflowError::referential_integrity("create_state_update_node: node missing"))?;
    if !node.kind.has_state() {
        return Err(DataflowError::transformation(
            "state_update::create_state_update_node",
            format!("{:?} does not carry state", stateful),
        ));
    }
    let parent = node.parent;

    let mut update = GraphNode::new(NodeKind::StateUpdate {
        target: stateful.index() as u32,
    });
    update.parent = parent;

    let dependents: Vec<NodeIndex> = graph
        .out_arcs(stateful)
        .filter_map(|edge| graph.inner.edge_endpoints(edge).map(|(_, dst)| dst))
        .collect();

    let new_arcs = dependents
        .iter()
        .enumerate()
        .map(|(i, &dependent)| {
            (
                NodeRef::Existing(dependent),
                NodeRef::New(0),
                ArcWeight::new_order_constraint(0, i as u32),
            )
        })
        .collect();

    let (added_nodes, _) = graph.add_remove_nodes_and_arcs(vec![update], new_arcs, Vec::new(), Vec::new())?;
    Ok(added_nodes[0])
}

/// Runs `create_state_update_node` over every node in the graph that
/// reports `has_state()` and does not already have a `StateUpdate`
/// targeting it (idempotent across repeated passes: re-running after a
/// prior run adds nothing new).
pub fn create_state_update_nodes(graph: &mut Graph) -> Result<Vec<NodeIndex>, DataflowError> {
    let stateful: Vec<NodeIndex> = graph
        .inner
        .node_indices()
        .filter(|&idx| graph.node(idx).map(|n| n.kind.has_state()).unwrap_or(false))
        .collect();

    let already_updated: std::collections::HashSet<u32> = graph
        .inner
        .node_indices()
        .filter_map(|idx| match &graph.node(idx)?.kind {
            NodeKind::StateUpdate { target } => Some(*target),
            _ => None,
        })
        .collect();

    let mut created = Vec::new();
    for idx in stateful {
        if already_updated.contains(&(idx.index() as u32)) {
            continue;
        }
        created.push(create_state_update_node(graph, idx)?);
    }
    Ok(created)
}
