//! Graph container (component D).
//!
//! `Graph` wraps `petgraph::stable_graph::StableDiGraph<GraphNode, Arc>` —
//! an arena-of-stable-handles representation, and a removal-stable
//! generalization of an append-only `petgraph::graph::DiGraph` IR. Passes
//! add and remove
//! nodes/arcs repeatedly (clock-domain support nodes, blocking bridges,
//! FIFOs), so `NodeIndex`/`EdgeIndex` must stay valid across mutation —
//! `StableDiGraph` tombstones removed slots instead of shifting indices.

use crate::error::DataflowError;
use crate::node::NodeKind;
use crate::port::Arc as ArcWeight;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::HashMap;

/// A node in the graph: its operational kind, the subsystem it is
/// contained in (if any), and the thread partition it has been assigned to
/// (if partitioning has run). Containment is a tree separate from the
/// dataflow arcs, so it is tracked alongside `kind` rather than folded
/// into it; partition number is likewise orthogonal to both.
#[derive(Clone, Debug)]
pub struct GraphNode {
    pub kind: NodeKind,
    pub parent: Option<NodeIndex>,
    pub partition: Option<i32>,
}

impl GraphNode {
    pub fn new(kind: NodeKind) -> Self {
        GraphNode {
            kind,
            parent: None,
            partition: None,
        }
    }

    pub fn with_parent(kind: NodeKind, parent: NodeIndex) -> Self {
        GraphNode {
            kind,
            parent: Some(parent),
            partition: None,
        }
    }
}

/// Names one endpoint of a `new_arcs` entry passed to
/// `Graph::add_remove_nodes_and_arcs`: either a node already in the graph,
/// or a not-yet-assigned index into that same call's `new_nodes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRef {
    Existing(NodeIndex),
    New(usize),
}

pub type Inner = StableDiGraph<GraphNode, ArcWeight>;

#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub inner: Inner,
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            inner: StableDiGraph::new(),
        }
    }

    pub fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        self.inner.add_node(node)
    }

    pub fn add_arc(&mut self, src: NodeIndex, dst: NodeIndex, arc: ArcWeight) -> Result<EdgeIndex, DataflowError> {
        if !self.inner.contains_node(src) || !self.inner.contains_node(dst) {
            return Err(DataflowError::referential_integrity(
                "add_arc endpoint does not exist in graph",
            ));
        }
        Ok(self.inner.add_edge(src, dst, arc))
    }

    /// Batch mutation: adds every node/arc in `new_nodes`/`new_arcs`, then
    /// removes every node/arc named. Every failure mode is checked up front,
    /// against `self` as it stands before the batch, so nothing is mutated
    /// until the whole batch is known to apply cleanly — either it all
    /// commits or `self` is returned untouched and an error is raised.
    /// `new_arcs` endpoints may name either a pre-existing node
    /// (`NodeRef::Existing`) or one of this same batch's `new_nodes`
    /// (`NodeRef::New`, indexing into `new_nodes`), so a pass can splice a
    /// freshly created node onto the graph in one call instead of adding it
    /// and wiring it in two.
    pub fn add_remove_nodes_and_arcs(
        &mut self,
        new_nodes: Vec<GraphNode>,
        new_arcs: Vec<(NodeRef, NodeRef, ArcWeight)>,
        remove_nodes: Vec<NodeIndex>,
        remove_arcs: Vec<EdgeIndex>,
    ) -> Result<(Vec<NodeIndex>, Vec<EdgeIndex>), DataflowError> {
        for &e in &remove_arcs {
            if self.inner.edge_weight(e).is_none() {
                return Err(DataflowError::referential_integrity(format!(
                    "add_remove_nodes_and_arcs: arc {:?} does not exist",
                    e
                )));
            }
        }
        for &n in &remove_nodes {
            if !self.inner.contains_node(n) {
                return Err(DataflowError::referential_integrity(format!(
                    "add_remove_nodes_and_arcs: node {:?} does not exist",
                    n
                )));
            }
        }
        for (src, dst, _) in &new_arcs {
            for r in [src, dst] {
                match r {
                    NodeRef::Existing(idx) if !self.inner.contains_node(*idx) => {
                        return Err(DataflowError::referential_integrity(
                            "add_remove_nodes_and_arcs: new arc references a node that does not exist",
                        ))
                    }
                    NodeRef::New(i) if *i >= new_nodes.len() => {
                        return Err(DataflowError::referential_integrity(
                            "add_remove_nodes_and_arcs: new arc references an out-of-range new-node slot",
                        ))
                    }
                    _ => {}
                }
            }
        }

        let removed_arc_set: std::collections::HashSet<EdgeIndex> = remove_arcs.iter().copied().collect();
        for &n in &remove_nodes {
            let still_incident = self
                .inner
                .edges_directed(n, Direction::Incoming)
                .chain(self.inner.edges_directed(n, Direction::Outgoing))
                .any(|e| !removed_arc_set.contains(&e.id()));
            if still_incident {
                return Err(DataflowError::referential_integrity(format!(
                    "add_remove_nodes_and_arcs: cannot remove {:?}, arcs still incident",
                    n
                )));
            }
            let references_removed_node = new_arcs.iter().any(|(src, dst, _)| {
                matches!(src, NodeRef::Existing(idx) if *idx == n) || matches!(dst, NodeRef::Existing(idx) if *idx == n)
            });
            if references_removed_node {
                return Err(DataflowError::referential_integrity(format!(
                    "add_remove_nodes_and_arcs: new arc references {:?}, which this same batch removes",
                    n
                )));
            }
        }

        // Validation passed: every remaining step is infallible, so the
        // batch now commits in full.
        let added_nodes: Vec<NodeIndex> = new_nodes.into_iter().map(|n| self.inner.add_node(n)).collect();
        let resolve = |r: NodeRef| match r {
            NodeRef::Existing(idx) => idx,
            NodeRef::New(i) => added_nodes[i],
        };
        let added_arcs: Vec<EdgeIndex> = new_arcs
            .into_iter()
            .map(|(src, dst, arc)| self.inner.add_edge(resolve(src), resolve(dst), arc))
            .collect();

        for e in &remove_arcs {
            self.inner.remove_edge(*e);
        }
        for n in &remove_nodes {
            self.remove_known_references(*n)
                .expect("validated above: no incident arcs remain and the node exists");
        }

        Ok((added_nodes, added_arcs))
    }

    /// Removes a node, first checking that it has no incident arcs left
    /// (the caller must have removed them explicitly) and re-parenting any
    /// child whose `parent` pointed at it to `None`. Returns
    /// `ReferentialIntegrity` if arcs still touch the node.
    pub fn remove_known_references(&mut self, node: NodeIndex) -> Result<(), DataflowError> {
        if !self.inner.contains_node(node) {
            return Err(DataflowError::referential_integrity(format!(
                "remove_known_references: {:?} does not exist",
                node
            )));
        }
        let still_incident = self
            .inner
            .edges_directed(node, Direction::Incoming)
            .next()
            .is_some()
            || self.inner.edges_directed(node, Direction::Outgoing).next().is_some();
        if still_incident {
            return Err(DataflowError::referential_integrity(format!(
                "cannot remove {:?}: arcs still incident",
                node
            )));
        }

        let children: Vec<NodeIndex> = self
            .inner
            .node_indices()
            .filter(|&idx| self.inner[idx].parent == Some(node))
            .collect();
        for child in children {
            self.inner[child].parent = None;
        }

        self.inner.remove_node(node);
        Ok(())
    }

    /// Deep-copies the graph, returning the copy plus bijective orig→copy
    /// maps for both node and edge indices — used by passes that need to
    /// try a rewrite against a scratch copy before committing it.
    pub fn copy_graph(&self) -> (Graph, HashMap<NodeIndex, NodeIndex>, HashMap<EdgeIndex, EdgeIndex>) {
        let mut copy = Graph::new();
        let mut node_map = HashMap::new();

        for idx in self.inner.node_indices() {
            let new_idx = copy.inner.add_node(self.inner[idx].clone());
            node_map.insert(idx, new_idx);
        }
        // Second pass to remap parent pointers to the copy's indices.
        for idx in self.inner.node_indices() {
            if let Some(parent) = self.inner[idx].parent {
                copy.inner[node_map[&idx]].parent = Some(node_map[&parent]);
            }
        }

        let mut edge_map = HashMap::new();
        for edge in self.inner.edge_indices() {
            let (src, dst) = self.inner.edge_endpoints(edge).expect("edge_indices yields live edges");
            let weight = self.inner[edge].clone();
            let new_edge = copy.inner.add_edge(node_map[&src], node_map[&dst], weight);
            edge_map.insert(edge, new_edge);
        }

        (copy, node_map, edge_map)
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&GraphNode> {
        self.inner.node_weight(idx)
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> Option<&mut GraphNode> {
        self.inner.node_weight_mut(idx)
    }

    pub fn arc(&self, idx: EdgeIndex) -> Option<&ArcWeight> {
        self.inner.edge_weight(idx)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn arc_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn in_arcs(&self, idx: NodeIndex) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.inner.edges_directed(idx, Direction::Incoming).map(|e| e.id())
    }

    pub fn out_arcs(&self, idx: NodeIndex) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.inner.edges_directed(idx, Direction::Outgoing).map(|e| e.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{MasterKind, NodeKind};
    use crate::port::Arc as ArcWeight;
    use crate::types::{BaseKind, DataType};

    fn leaf(kind: NodeKind) -> GraphNode {
        GraphNode::new(kind)
    }

    #[test]
    fn remove_known_references_rejects_node_with_incident_arc() {
        let mut g = Graph::new();
        let a = g.add_node(leaf(NodeKind::Master { kind: MasterKind::Input }));
        let b = g.add_node(leaf(NodeKind::Master { kind: MasterKind::Output }));
        let dt = DataType::scalar(BaseKind::Int, true, 16);
        g.add_arc(a, b, ArcWeight::new(0, 0, dt, 1)).unwrap();

        let err = g.remove_known_references(a).unwrap_err();
        assert!(matches!(err, DataflowError::ReferentialIntegrity { .. }));
    }

    #[test]
    fn remove_known_references_reparents_children() {
        let mut g = Graph::new();
        let parent = g.add_node(leaf(NodeKind::Subsystem { name: "s".into() }));
        let child_idx = g.add_node(GraphNode::with_parent(
            NodeKind::Constant {
                value: crate::types::NumericValue::Int { re: 1, im: None },
            },
            parent,
        ));

        g.remove_known_references(parent).unwrap();
        assert_eq!(g.node(child_idx).unwrap().parent, None);
    }

    #[test]
    fn copy_graph_preserves_topology_and_parent_links() {
        let mut g = Graph::new();
        let parent = g.add_node(leaf(NodeKind::Subsystem { name: "s".into() }));
        let child = g.add_node(GraphNode::with_parent(
            NodeKind::Master { kind: MasterKind::Input },
            parent,
        ));
        let sink = g.add_node(leaf(NodeKind::Master { kind: MasterKind::Output }));
        let dt = DataType::scalar(BaseKind::Int, true, 16);
        g.add_arc(child, sink, ArcWeight::new(0, 0, dt, 1)).unwrap();

        let (copy, node_map, edge_map) = g.copy_graph();
        assert_eq!(copy.node_count(), g.node_count());
        assert_eq!(copy.arc_count(), g.arc_count());
        assert_eq!(edge_map.len(), 1);

        let copied_child = node_map[&child];
        let copied_parent = node_map[&parent];
        assert_eq!(copy.node(copied_child).unwrap().parent, Some(copied_parent));
    }

    #[test]
    fn batch_wires_a_new_node_onto_existing_endpoints_in_one_call() {
        let mut g = Graph::new();
        let src = g.add_node(leaf(NodeKind::Master { kind: MasterKind::Input }));
        let dst = g.add_node(leaf(NodeKind::Master { kind: MasterKind::Output }));
        let dt = DataType::scalar(BaseKind::Int, true, 16);

        let (added_nodes, added_arcs) = g
            .add_remove_nodes_and_arcs(
                vec![leaf(NodeKind::Constant {
                    value: crate::types::NumericValue::Int { re: 1, im: None },
                })],
                vec![
                    (NodeRef::Existing(src), NodeRef::New(0), ArcWeight::new(0, 0, dt.clone(), 1)),
                    (NodeRef::New(0), NodeRef::Existing(dst), ArcWeight::new(0, 0, dt, 1)),
                ],
                Vec::new(),
                Vec::new(),
            )
            .unwrap();

        assert_eq!(added_nodes.len(), 1);
        assert_eq!(added_arcs.len(), 2);
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.arc_count(), 2);
    }

    #[test]
    fn batch_leaves_graph_untouched_when_a_removal_is_invalid() {
        let mut g = Graph::new();
        let a = g.add_node(leaf(NodeKind::Master { kind: MasterKind::Input }));
        let b = g.add_node(leaf(NodeKind::Master { kind: MasterKind::Output }));
        let dt = DataType::scalar(BaseKind::Int, true, 16);
        g.add_arc(a, b, ArcWeight::new(0, 0, dt.clone(), 1)).unwrap();

        let before_nodes = g.node_count();
        let before_arcs = g.arc_count();

        // `a` still has an incident arc that this batch does not remove, so
        // the whole batch must be rejected and nothing committed.
        let err = g
            .add_remove_nodes_and_arcs(
                vec![leaf(NodeKind::Constant {
                    value: crate::types::NumericValue::Int { re: 1, im: None },
                })],
                vec![(NodeRef::Existing(b), NodeRef::New(0), ArcWeight::new(0, 0, dt, 1))],
                vec![a],
                Vec::new(),
            )
            .unwrap_err();

        assert!(matches!(err, DataflowError::ReferentialIntegrity { .. }));
        assert_eq!(g.node_count(), before_nodes);
        assert_eq!(g.arc_count(), before_arcs);
    }

    #[test]
    fn add_arc_rejects_missing_endpoint() {
        let mut g = Graph::new();
        let a = g.add_node(leaf(NodeKind::Master { kind: MasterKind::Input }));
        let mut other = Graph::new();
        let ghost = other.add_node(leaf(NodeKind::Master { kind: MasterKind::Output }));
        let dt = DataType::scalar(BaseKind::Int, true, 16);
        let err = g.add_arc(a, ghost, ArcWeight::new(0, 0, dt, 1)).unwrap_err();
        assert!(matches!(err, DataflowError::ReferentialIntegrity { .. }));
    }
}
