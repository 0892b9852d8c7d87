//! Context subsystem (component H).
//!
//! A node's *context stack* is the subsequence of its ancestor chain made
//! up of `ContextRoot` nodes (enabled subsystems, muxed subsystems,
//! for-loops) — the containers whose body is conditionally or repeatedly
//! emitted, as opposed to plain `Subsystem` grouping that has no runtime
//! effect on scheduling. `contiguous_emission` contexts (a for-loop's
//! counter init/increment) require every statement of their body to be
//! emitted as one unbroken block; fragmentable contexts (an enabled
//! subsystem) may have their statements interleaved with sibling context
//! as the scheduler sees fit.

use crate::error::DataflowError;
use crate::graph::{Graph, GraphNode};
use crate::node::NodeKind;
use petgraph::stable_graph::NodeIndex;

/// The chain of enclosing `ContextRoot` nodes for `node`, closest first.
/// Plain `Subsystem` ancestors are not contexts and are skipped.
pub fn context_stack(graph: &Graph, node: NodeIndex) -> Vec<NodeIndex> {
    crate::algo::ancestor_chain(graph, node)
        .into_iter()
        .filter(|&idx| graph.node(idx).map(|n| n.kind.is_context_root()).unwrap_or(false))
        .collect()
}

/// True if `outer`'s context stack is a (possibly improper) prefix of
/// `inner`'s — i.e. every node driven from `outer`'s context is already
/// visible to code emitted inside `inner`'s.
pub fn dominates(graph: &Graph, outer: NodeIndex, inner: NodeIndex) -> bool {
    let outer_stack = context_stack(graph, outer);
    let inner_stack = context_stack(graph, inner);
    inner_stack.len() >= outer_stack.len() && inner_stack[inner_stack.len() - outer_stack.len()..] == outer_stack[..]
}

/// A driver node (e.g. a `Constant`) consumed from more than one context
/// must be replicated into each consuming context that it does not already
/// dominate, so the emitted code for each context is self-contained. This
/// creates one clone of `driver` per distinct target context in
/// `consumer_contexts` that `driver`'s own context does not dominate, and
/// returns the node each original consumer in that context should be
/// rewired to read from.
pub fn replicate_driver_for_contexts(
    graph: &mut Graph,
    driver: NodeIndex,
    consumer_contexts: &[NodeIndex],
) -> Result<Vec<NodeIndex>, DataflowError> {
    let driver_node = graph
        .node(driver)
        .ok_or_else(|| DataflowError::referential_integrity("replicate_driver_for_contexts: driver missing"))?
        .clone();

    let mut replicas = Vec::with_capacity(consumer_contexts.len());
    for &ctx in consumer_contexts {
        if dominates(graph, driver, ctx) {
            replicas.push(driver);
            continue;
        }
        let mut replica = GraphNode::new(driver_node.kind.clone());
        replica.parent = Some(ctx);
        replicas.push(graph.add_node(replica));
    }
    Ok(replicas)
}

/// A `contiguous_emission` context root that would otherwise be skipped
/// (e.g. every node originally scheduled in it was hoisted out by an
/// earlier pass) still needs a dummy replica so the scheduler reserves its
/// emission slot and interleaving with sibling context is not disturbed.
pub fn insert_dummy_replica_if_empty(graph: &mut Graph, context: NodeIndex) -> Result<Option<NodeIndex>, DataflowError> {
    let is_contiguous = matches!(
        graph
            .node(context)
            .ok_or_else(|| DataflowError::referential_integrity("insert_dummy_replica_if_empty: context missing"))?
            .kind,
        NodeKind::ContextRoot {
            contiguous_emission: true,
            ..
        }
    );
    if !is_contiguous {
        return Ok(None);
    }

    let has_body = graph
        .inner
        .node_indices()
        .any(|idx| idx != context && graph.node(idx).and_then(|n| n.parent) == Some(context));
    if has_body {
        return Ok(None);
    }

    let mut dummy = GraphNode::new(NodeKind::ContextPlaceholder);
    dummy.parent = Some(context);
    Ok(Some(graph.add_node(dummy)))
}
