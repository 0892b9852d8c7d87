//! Graph algorithms (component E): hierarchy queries, strongly connected
//! components, and topological ordering.
//!
//! SCC discovery backs blocking-group discovery (`passes::blocking`) and
//! topological order backs the emission driver's scheduling loop
//! (`emit::driver`). Both are thin wrappers over `petgraph::algo`, used
//! directly since `StableDiGraph` supports them natively.

use crate::graph::Graph;
use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::stable_graph::NodeIndex;

/// Ancestor chain of `node`, closest parent first, following the subsystem
/// containment tree (not the dataflow arcs).
pub fn ancestor_chain(graph: &Graph, node: NodeIndex) -> Vec<NodeIndex> {
    let mut chain = Vec::new();
    let mut cur = graph.node(node).and_then(|n| n.parent);
    while let Some(idx) = cur {
        chain.push(idx);
        cur = graph.node(idx).and_then(|n| n.parent);
    }
    chain
}

/// True if `ancestor` appears anywhere in `node`'s ancestor chain.
pub fn is_descendant_of(graph: &Graph, node: NodeIndex, ancestor: NodeIndex) -> bool {
    ancestor_chain(graph, node).contains(&ancestor)
}

/// Nearest common ancestor of two nodes in the containment tree, or `None`
/// if they share no enclosing subsystem (both are top-level).
pub fn lowest_common_ancestor(graph: &Graph, a: NodeIndex, b: NodeIndex) -> Option<NodeIndex> {
    let a_chain = ancestor_chain(graph, a);
    let b_chain: std::collections::HashSet<_> = ancestor_chain(graph, b).into_iter().collect();
    a_chain.into_iter().find(|idx| b_chain.contains(idx))
}

/// Strongly connected components of the dataflow arcs (ignoring
/// containment), via Kosaraju's algorithm. A component with more than one
/// node, or a single node with a self-loop, is a feedback group that
/// blocking-group discovery must treat specially.
pub fn strongly_connected_components(graph: &Graph) -> Vec<Vec<NodeIndex>> {
    kosaraju_scc(&graph.inner)
}

/// Topological order of the dataflow arcs. `Err` returns the node that
/// closes a cycle — callers in blocking (which breaks cycles at delay
/// nodes before calling this) should never see it once cycles are broken.
pub fn topological_order(graph: &Graph) -> Result<Vec<NodeIndex>, NodeIndex> {
    toposort(&graph.inner, None).map_err(|cycle| cycle.node_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphNode;
    use crate::node::{MasterKind, NodeKind, PrimitiveOp};
    use crate::port::Arc as ArcWeight;
    use crate::types::{BaseKind, DataType};

    fn leaf(kind: NodeKind) -> GraphNode {
        GraphNode::new(kind)
    }

    fn dt() -> DataType {
        DataType::scalar(BaseKind::Int, true, 16)
    }

    #[test]
    fn ancestor_chain_walks_to_root() {
        let mut g = Graph::new();
        let root = g.add_node(leaf(NodeKind::Subsystem { name: "root".into() }));
        let mid = g.add_node(GraphNode::with_parent(
            NodeKind::Subsystem { name: "mid".into() },
            root,
        ));
        let leaf_idx = g.add_node(GraphNode::with_parent(
            NodeKind::Master { kind: MasterKind::Input },
            mid,
        ));

        assert_eq!(ancestor_chain(&g, leaf_idx), vec![mid, root]);
        assert!(is_descendant_of(&g, leaf_idx, root));
    }

    #[test]
    fn lowest_common_ancestor_finds_shared_root() {
        let mut g = Graph::new();
        let root = g.add_node(leaf(NodeKind::Subsystem { name: "root".into() }));
        let a = g.add_node(GraphNode::with_parent(
            NodeKind::Master { kind: MasterKind::Input },
            root,
        ));
        let b = g.add_node(GraphNode::with_parent(
            NodeKind::Master { kind: MasterKind::Output },
            root,
        ));
        assert_eq!(lowest_common_ancestor(&g, a, b), Some(root));
    }

    #[test]
    fn scc_detects_feedback_loop() {
        let mut g = Graph::new();
        let a = g.add_node(leaf(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        let b = g.add_node(leaf(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        g.add_arc(a, b, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(b, a, ArcWeight::new(0, 1, dt(), 1)).unwrap();

        let sccs = strongly_connected_components(&g);
        let feedback = sccs.into_iter().find(|c| c.len() > 1).expect("feedback group");
        assert_eq!(feedback.len(), 2);
        assert!(feedback.contains(&a) && feedback.contains(&b));
    }

    #[test]
    fn toposort_orders_linear_chain() {
        let mut g = Graph::new();
        let input = g.add_node(leaf(NodeKind::Master { kind: MasterKind::Input }));
        let output = g.add_node(leaf(NodeKind::Master { kind: MasterKind::Output }));
        g.add_arc(input, output, ArcWeight::new(0, 0, dt(), 1)).unwrap();

        let order = topological_order(&g).unwrap();
        let pos_in = order.iter().position(|&n| n == input).unwrap();
        let pos_out = order.iter().position(|&n| n == output).unwrap();
        assert!(pos_in < pos_out);
    }
}
