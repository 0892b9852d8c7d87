//! Arc grouping, shared by partitioning's FIFO insertion (component I) and
//! blocking's bridge insertion (component G) —
//! both need "which arcs cross this boundary and can share one piece of
//! plumbing" and neither owns the concept outright, so it lives here.
//!
//! Arcs are grouped by everything that must match for them to share a
//! single FIFO/bridge: the same source node, the same destination
//! partition, the same clock domain sample time, and the same enclosing
//! blocking-domain stack (a bridge or FIFO serving arcs with different
//! blocking contexts would not be emitting at the right point in the
//! schedule for all of them).

use crate::graph::Graph;
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArcGroupKey {
    pub src: NodeIndex,
    pub dst_partition: Option<i32>,
    pub sample_time: u64,
    pub blocking_stack: Vec<NodeIndex>,
}

/// The chain of enclosing `BlockingDomain` nodes for `node`, closest first.
pub fn blocking_stack(graph: &Graph, node: NodeIndex) -> Vec<NodeIndex> {
    crate::algo::ancestor_chain(graph, node)
        .into_iter()
        .filter(|&idx| {
            matches!(
                graph.node(idx).map(|n| &n.kind),
                Some(crate::node::NodeKind::BlockingDomain { .. })
            )
        })
        .collect()
}

/// Groups every arc for which `crosses(src, dst)` is true by
/// `ArcGroupKey`, so each group's arcs can be routed through one shared
/// FIFO/bridge instead of one each.
pub fn group_crossing_arcs(
    graph: &Graph,
    crosses: impl Fn(NodeIndex, NodeIndex) -> bool,
) -> HashMap<ArcGroupKey, Vec<EdgeIndex>> {
    let mut groups: HashMap<ArcGroupKey, Vec<EdgeIndex>> = HashMap::new();

    for edge in graph.inner.edge_indices() {
        let (src, dst) = graph
            .inner
            .edge_endpoints(edge)
            .expect("edge_indices yields live edges");
        if !crosses(src, dst) {
            continue;
        }
        let arc = graph.arc(edge).expect("edge_indices yields live edges");
        let key = ArcGroupKey {
            src,
            dst_partition: graph.node(dst).and_then(|n| n.partition),
            sample_time: arc.sample_time,
            blocking_stack: blocking_stack(graph, src),
        };
        groups.entry(key).or_default().push(edge);
    }

    groups
}
