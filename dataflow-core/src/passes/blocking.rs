//! Blocking subsystem (component G).
//!
//! Blocking-group discovery starts from strongly connected components of
//! the dataflow arcs (a feedback loop must be blocked as one unit — it has
//! no well-defined topological position to split at) and layers the
//! context-hierarchy rule on top: every member of a group must share the
//! same context stack, since a blocking domain's body is emitted as one
//! contiguous unit and cannot itself straddle a context boundary. Each
//! group is assigned a single base sub-blocking length; whether a group
//! may mix sub-blocking lengths is resolved here as "no" (see DESIGN.md) —
//! `assign_sub_blocking_length` rejects a second, different length
//! requested for a group already assigned one.

use crate::error::DataflowError;
use crate::graph::{Graph, GraphNode, NodeRef};
use crate::node::{ClockDomainSpec, NodeKind};
use crate::passes::arc_group::group_crossing_arcs;
use petgraph::stable_graph::NodeIndex;
use std::collections::{HashMap, HashSet};

/// §4.8.1: the sub-blocking length a node effectively runs at, given the
/// base length for its partition and the rate of the nearest enclosing
/// clock domain. Errors if the scaled length is not a whole number of
/// samples.
pub fn effective_sub_block(base_sub: u32, rate_relative_to_base: (u32, u32)) -> Result<u32, DataflowError> {
    let (up, down) = rate_relative_to_base;
    let scaled = base_sub as u64 * up as u64;
    if scaled % down as u64 != 0 {
        return Err(DataflowError::structural(
            "<clock domain>",
            format!(
                "base sub-blocking length {} is not divisible by rate {}/{}",
                base_sub, down, up
            ),
        ));
    }
    Ok((scaled / down as u64) as u32)
}

/// The rate of the nearest `ClockDomain` ancestor of `node`, or `(1, 1)` if
/// `node` has none or that domain's rate has not yet been discovered.
fn nearest_clock_domain_rate(graph: &Graph, node: NodeIndex) -> (u32, u32) {
    crate::algo::ancestor_chain(graph, node)
        .into_iter()
        .find_map(|idx| match &graph.node(idx)?.kind {
            NodeKind::ClockDomain {
                rate_relative_to_base: Some(rate),
                ..
            } => Some(*rate),
            _ => None,
        })
        .unwrap_or((1, 1))
}

/// Discovers blocking groups per §4.8.2: clones the graph, disconnects the
/// outputs of any `Delay` node whose length is at least its effective
/// sub-block length (a delay that long already breaks the feedback loop at
/// a sub-block boundary, so it must not force the whole loop into one
/// blocking group), then computes strongly-connected components on the
/// clone and maps them back to the live graph's indices. Every
/// strongly-connected component of size greater than one (a feedback loop
/// that survived delay-breaking) forms one group; every other node forms
/// its own singleton group. Returns an error if a feedback loop's members
/// do not all share the same context stack — that check still runs against
/// the live graph, since context data is not carried onto the clone.
pub fn discover_blocking_groups(
    graph: &Graph,
    base_sub_blocking_length: &HashMap<NodeIndex, u32>,
) -> Result<Vec<Vec<NodeIndex>>, DataflowError> {
    let (mut clone, orig_to_copy, _edge_map) = graph.copy_graph();
    let copy_to_orig: HashMap<NodeIndex, NodeIndex> = orig_to_copy.iter().map(|(&o, &c)| (c, o)).collect();

    let delay_nodes: Vec<NodeIndex> = clone
        .inner
        .node_indices()
        .filter(|&idx| matches!(clone.node(idx).map(|n| &n.kind), Some(NodeKind::Delay { .. })))
        .collect();

    for copy_idx in delay_nodes {
        let orig_idx = copy_to_orig[&copy_idx];
        let length = match &clone.node(copy_idx).expect("just filtered").kind {
            NodeKind::Delay { length, .. } => *length,
            _ => unreachable!("filtered to Delay above"),
        };
        let base_sub = *base_sub_blocking_length.get(&orig_idx).unwrap_or(&1);
        let rate = nearest_clock_domain_rate(graph, orig_idx);
        let effective = effective_sub_block(base_sub, rate)?;
        if length >= effective {
            let out_edges: Vec<_> = clone.out_arcs(copy_idx).collect();
            for edge in out_edges {
                clone.inner.remove_edge(edge);
            }
        }
    }

    let sccs = crate::algo::strongly_connected_components(&clone);
    let mut groups = Vec::with_capacity(sccs.len());

    for scc in sccs {
        let orig_scc: Vec<NodeIndex> = scc.iter().map(|&idx| copy_to_orig[&idx]).collect();
        if orig_scc.len() > 1 {
            let first_stack = crate::passes::context::context_stack(graph, orig_scc[0]);
            for &member in &orig_scc[1..] {
                if crate::passes::context::context_stack(graph, member) != first_stack {
                    return Err(DataflowError::structural(
                        format!("{:?}", orig_scc[0]),
                        "feedback loop spans more than one context; cannot form a single blocking group",
                    ));
                }
            }
        }
        groups.push(orig_scc);
    }
    Ok(groups)
}

/// §4.6: a clock domain realizes its rate change by expanding the outer
/// array dimension of data, instead of conditional execution, exactly when
/// its rate is compatible with the base sub-block length and no data
/// dependency crosses its boundary other than through its own
/// `RateChangeInput`/`RateChangeOutput` nodes.
pub fn decide_vector_sampling_mode(graph: &Graph, domain: NodeIndex, base_sub_blocking_length: u32) -> bool {
    let (up, down) = match graph.node(domain).map(|n| &n.kind) {
        Some(NodeKind::ClockDomain {
            spec: ClockDomainSpec::Downsample { factor },
            ..
        }) => (1, *factor),
        Some(NodeKind::ClockDomain {
            spec: ClockDomainSpec::Upsample { factor },
            ..
        }) => (*factor, 1),
        _ => return false,
    };

    let rate_compatible = (base_sub_blocking_length as u64 * up as u64) % down as u64 == 0;
    if !rate_compatible {
        return false;
    }

    !has_stray_boundary_crossing_edge(graph, domain)
}

/// True if some arc has exactly one endpoint inside `domain`'s subtree and
/// the other endpoint is anything other than a `RateChangeInput`/
/// `RateChangeOutput` node.
fn has_stray_boundary_crossing_edge(graph: &Graph, domain: NodeIndex) -> bool {
    let inside = |idx: NodeIndex| idx == domain || crate::algo::is_descendant_of(graph, idx, domain);

    graph.inner.edge_indices().any(|e| {
        graph
            .inner
            .edge_endpoints(e)
            .map(|(src, dst)| {
                let (src_inside, dst_inside) = (inside(src), inside(dst));
                let outside_endpoint = if src_inside && !dst_inside {
                    dst
                } else if !src_inside && dst_inside {
                    src
                } else {
                    return false;
                };
                !matches!(
                    graph.node(outside_endpoint).map(|n| &n.kind),
                    Some(NodeKind::RateChangeInput { .. }) | Some(NodeKind::RateChangeOutput { .. })
                )
            })
            .unwrap_or(false)
    })
}

/// §4.8.3: traverses the context hierarchy, deepest root first. At a
/// context root that requires encapsulation — every `ContextRoot`, and any
/// `ClockDomain` [`decide_vector_sampling_mode`] rejects — every blocking
/// group with a member inside that root's subtree is merged into one,
/// failing if the merged members disagree on base sub-blocking length. A
/// `ClockDomain` that vector-samples is left alone (its own contained SCCs
/// stay inside it) and marked accordingly; traversal then continues
/// outward into its own enclosing context roots.
pub fn merge_blocking_groups_by_context_hierarchy(
    graph: &mut Graph,
    mut groups: Vec<Vec<NodeIndex>>,
    base_sub_blocking_length: &HashMap<NodeIndex, u32>,
) -> Result<Vec<Vec<NodeIndex>>, DataflowError> {
    let mut context_roots: Vec<NodeIndex> = graph
        .inner
        .node_indices()
        .filter(|&idx| graph.node(idx).map(|n| n.kind.is_context_root()).unwrap_or(false))
        .collect();
    context_roots.sort_by_key(|&idx| std::cmp::Reverse(crate::algo::ancestor_chain(graph, idx).len()));

    for root in context_roots {
        let is_clock_domain = matches!(graph.node(root).map(|n| &n.kind), Some(NodeKind::ClockDomain { .. }));

        if is_clock_domain {
            let base_sub = *base_sub_blocking_length.get(&root).unwrap_or(&1);
            if decide_vector_sampling_mode(graph, root, base_sub) {
                if let Some(GraphNode {
                    kind: NodeKind::ClockDomain {
                        use_vector_sampling_mode,
                        ..
                    },
                    ..
                }) = graph.node_mut(root)
                {
                    *use_vector_sampling_mode = true;
                }
                continue;
            }
        }

        let member_group_indices: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, grp)| grp.iter().any(|&n| crate::algo::is_descendant_of(graph, n, root)))
            .map(|(i, _)| i)
            .collect();

        if member_group_indices.len() <= 1 {
            continue;
        }

        let mut lengths: HashSet<u32> = HashSet::new();
        for &i in &member_group_indices {
            for &member in &groups[i] {
                lengths.insert(*base_sub_blocking_length.get(&member).unwrap_or(&1));
            }
        }
        if lengths.len() > 1 {
            return Err(DataflowError::structural(
                format!("{:?}", root),
                "context-encapsulated blocking groups disagree on base sub-blocking length",
            ));
        }

        let mut merged = Vec::new();
        for &i in member_group_indices.iter().rev() {
            merged.extend(groups.remove(i));
        }
        groups.push(merged);
    }

    Ok(groups)
}

/// Assigns `requested` as the sub-blocking length for `group`, recording it
/// in `assigned`. Fails if a different length was already assigned to this
/// exact group (by first member's index, which is stable per pass run).
pub fn assign_sub_blocking_length(
    assigned: &mut HashMap<NodeIndex, u32>,
    group: &[NodeIndex],
    requested: u32,
) -> Result<(), DataflowError> {
    let key = *group.iter().min().expect("group is non-empty");
    match assigned.get(&key) {
        Some(&existing) if existing != requested => Err(DataflowError::structural(
            format!("{:?}", key),
            format!(
                "blocking group already assigned sub-blocking length {}, cannot also assign {}",
                existing, requested
            ),
        )),
        _ => {
            assigned.insert(key, requested);
            Ok(())
        }
    }
}

/// Wraps `members` in a new `BlockingDomain` node — a `for` loop of
/// `blocking_length / sub_blocking_length` iterations — reparenting every
/// member under it, and splices `BlockingInput`/`BlockingOutput` boundary
/// nodes onto arcs that cross into/out of the group — one boundary node
/// per [`crate::passes::arc_group::ArcGroupKey`] so multiple arcs sharing a
/// source/partition/blocking-stack share a single boundary instead of one
/// each. Per §4.8.5, a sub-blocking domain materialized around a non-singleton
/// group always has `sub_blocking_length == 1`; the global blocking domain of
/// §4.8.6 is the other caller, with `sub_blocking_length` equal to the
/// partition's base sub-blocking length.
pub fn insert_blocking_domain(
    graph: &mut Graph,
    members: &[NodeIndex],
    blocking_length: u32,
    sub_blocking_length: u32,
) -> Result<NodeIndex, DataflowError> {
    if members.is_empty() {
        return Err(DataflowError::structural(
            "<blocking group>",
            "cannot insert a blocking domain around an empty member set",
        ));
    }
    if blocking_length % sub_blocking_length != 0 {
        return Err(DataflowError::structural(
            "<blocking group>",
            format!(
                "blocking_length {} not divisible by sub_blocking_length {}",
                blocking_length, sub_blocking_length
            ),
        ));
    }

    let member_set: HashSet<NodeIndex> = members.iter().copied().collect();
    let outer_parent = graph
        .node(members[0])
        .ok_or_else(|| DataflowError::referential_integrity("insert_blocking_domain: member missing"))?
        .parent;

    let mut domain_node = GraphNode::new(NodeKind::BlockingDomain {
        blocking_length,
        sub_blocking_length,
    });
    domain_node.parent = outer_parent;
    let domain_idx = graph.add_node(domain_node);

    for &member in members {
        if let Some(node) = graph.node_mut(member) {
            node.parent = Some(domain_idx);
        }
    }

    let incoming = group_crossing_arcs(graph, |src, dst| !member_set.contains(&src) && member_set.contains(&dst));
    splice_boundary_nodes(graph, domain_idx, NodeKind::BlockingInput, incoming)?;

    let outgoing = group_crossing_arcs(graph, |src, dst| member_set.contains(&src) && !member_set.contains(&dst));
    splice_boundary_nodes(graph, domain_idx, NodeKind::BlockingOutput, outgoing)?;

    Ok(domain_idx)
}

/// Splices one boundary node of `kind` per [`crate::passes::arc_group::ArcGroupKey`]
/// group onto its arcs, parented under `domain_idx`, committing every
/// group's node-and-arc batch through a single
/// [`Graph::add_remove_nodes_and_arcs`] call.
fn splice_boundary_nodes(
    graph: &mut Graph,
    domain_idx: NodeIndex,
    kind: NodeKind,
    groups: HashMap<crate::passes::arc_group::ArcGroupKey, Vec<petgraph::stable_graph::EdgeIndex>>,
) -> Result<(), DataflowError> {
    let mut new_nodes = Vec::with_capacity(groups.len());
    let mut new_arcs = Vec::new();
    let mut remove_arcs = Vec::new();

    for (_, edges) in groups {
        let mut boundary = GraphNode::new(kind.clone());
        boundary.parent = Some(domain_idx);
        let slot = new_nodes.len();
        new_nodes.push(boundary);

        for edge in edges {
            let (src, dst) = graph.inner.edge_endpoints(edge).expect("edge exists");
            let weight = graph.arc(edge).expect("edge exists").clone();
            remove_arcs.push(edge);

            let mut in_weight = weight.clone();
            in_weight.set_dst_port(0);
            new_arcs.push((NodeRef::Existing(src), NodeRef::New(slot), in_weight));

            let mut out_weight = weight;
            out_weight.set_src_port(0);
            new_arcs.push((NodeRef::New(slot), NodeRef::Existing(dst), out_weight));
        }
    }

    graph.add_remove_nodes_and_arcs(new_nodes, new_arcs, Vec::new(), remove_arcs)?;
    Ok(())
}

/// Splices a `BlockingDomainBridge` onto the arc `edge`, used when an arc
/// connects two blocking domains with different sub-blocking lengths and
/// the consumer needs its input regrouped rather than a plain pass-through.
pub fn insert_bridge(graph: &mut Graph, edge: petgraph::stable_graph::EdgeIndex) -> Result<NodeIndex, DataflowError> {
    let (src, dst) = graph
        .inner
        .edge_endpoints(edge)
        .ok_or_else(|| DataflowError::referential_integrity("insert_bridge: arc missing"))?;
    let weight = graph
        .arc(edge)
        .ok_or_else(|| DataflowError::referential_integrity("insert_bridge: arc missing"))?
        .clone();

    let parent = crate::algo::lowest_common_ancestor(graph, src, dst);
    let mut bridge = GraphNode::new(NodeKind::BlockingDomainBridge);
    bridge.parent = parent;

    let mut in_weight = weight.clone();
    in_weight.set_dst_port(0);
    let mut out_weight = weight;
    out_weight.set_src_port(0);

    let (added_nodes, _) = graph.add_remove_nodes_and_arcs(
        vec![bridge],
        vec![
            (NodeRef::Existing(src), NodeRef::New(0), in_weight),
            (NodeRef::New(0), NodeRef::Existing(dst), out_weight),
        ],
        Vec::new(),
        vec![edge],
    )?;
    Ok(added_nodes[0])
}

/// §4.8.4 "lone constants": a `Constant` node whose own blocking group is a
/// singleton never materializes its own one-node blocking domain. A
/// constant with exactly one distinct consumer is merged directly into that
/// consumer's group (and its singleton group entry is dropped); a constant
/// feeding more than one distinct consumer is cloned once per extra
/// consumer so each consumer's group gets a private copy, with the original
/// folded into the first consumer's group.
pub fn absorb_lone_constants(graph: &mut Graph, groups: &mut Vec<Vec<NodeIndex>>) -> Result<(), DataflowError> {
    let singleton_constants: Vec<NodeIndex> = groups
        .iter()
        .filter(|grp| grp.len() == 1)
        .map(|grp| grp[0])
        .filter(|&idx| matches!(graph.node(idx).map(|n| &n.kind), Some(NodeKind::Constant { .. })))
        .collect();

    for constant in singleton_constants {
        let mut distinct_consumers: Vec<NodeIndex> = Vec::new();
        for edge in graph.out_arcs(constant) {
            if let Some((_, dst)) = graph.inner.edge_endpoints(edge) {
                if !distinct_consumers.contains(&dst) {
                    distinct_consumers.push(dst);
                }
            }
        }

        groups.retain(|grp| grp.as_slice() != [constant]);
        if distinct_consumers.is_empty() {
            continue;
        }

        let first = distinct_consumers[0];
        if let Some(group) = groups.iter_mut().find(|grp| grp.contains(&first)) {
            group.push(constant);
        }

        let value = match &graph
            .node(constant)
            .ok_or_else(|| DataflowError::referential_integrity("absorb_lone_constants: constant missing"))?
            .kind
        {
            NodeKind::Constant { value } => value.clone(),
            _ => unreachable!("filtered to Constant above"),
        };
        let parent = graph.node(constant).and_then(|n| n.parent);

        for &owner in &distinct_consumers[1..] {
            let mut clone_node = GraphNode::new(NodeKind::Constant { value: value.clone() });
            clone_node.parent = parent;
            let clone_idx = graph.add_node(clone_node);

            let edges_to_owner: Vec<_> = graph
                .out_arcs(constant)
                .filter(|&e| graph.inner.edge_endpoints(e).map(|(_, d)| d) == Some(owner))
                .collect();
            for edge in edges_to_owner {
                let weight = graph.arc(edge).expect("edge exists").clone();
                graph.inner.remove_edge(edge);
                graph.add_arc(clone_idx, owner, weight)?;
            }

            match groups.iter_mut().find(|grp| grp.contains(&owner)) {
                Some(group) => group.push(clone_idx),
                None => groups.push(vec![clone_idx]),
            }
        }
    }

    Ok(())
}

/// §4.8.6 "global blocking domain": the remaining top-level nodes (those
/// that never joined a non-singleton blocking group and were not folded
/// into one by [`absorb_lone_constants`]) are partitioned by their
/// `base_sub_blocking_length` and each partition is wrapped in one global
/// `BlockingDomain` with `blocking_length = base_block_length`. A partition
/// whose nominal length is 1 is left unwrapped — §B2's `base_block_length
/// == 1` short-circuit generalizes per-partition here: a length-1 global
/// domain would add a trivial `for (i = 0; i < 1; i++)` wrapper with no
/// observable effect.
pub fn insert_global_blocking_domains(
    graph: &mut Graph,
    base_block_length: u32,
    base_sub_blocking_length: &HashMap<NodeIndex, u32>,
) -> Result<Vec<NodeIndex>, DataflowError> {
    let top_level: Vec<NodeIndex> = graph
        .inner
        .node_indices()
        .filter(|&idx| graph.node(idx).map(|n| n.parent.is_none()).unwrap_or(false))
        .collect();

    let mut by_length: HashMap<u32, Vec<NodeIndex>> = HashMap::new();
    for idx in top_level {
        let len = *base_sub_blocking_length.get(&idx).unwrap_or(&1);
        by_length.entry(len).or_default().push(idx);
    }

    let mut domains = Vec::new();
    for (sub_blocking_length, members) in by_length {
        if sub_blocking_length <= 1 || base_block_length <= 1 {
            continue;
        }
        domains.push(insert_blocking_domain(
            graph,
            &members,
            base_block_length,
            sub_blocking_length,
        )?);
    }
    Ok(domains)
}

/// Per-arc record of what outer-dimension expansion each side requested
/// while blocking-domain insertion ran (§4.8.7). Insertion happens
/// incrementally, group by group and domain by domain, so whether the two
/// sides of a given arc actually agree isn't known until every insertion
/// pass has finished recording its requests.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExpansionRequest {
    pub src_expansion: Option<u32>,
    pub dst_expansion: Option<u32>,
}

/// §4.8.7 "deferred arc expansion and bridges": reconciles every arc's
/// recorded `ExpansionRequest`. A request on only one side applies
/// directly; matching requests on both sides apply directly; requests that
/// differ mean the arc crosses a sub-blocking-length boundary and gets a
/// `BlockingDomainBridge`, grouped by [`crate::passes::arc_group::ArcGroupKey`]
/// so one bridge serves every arc sharing a source port, destination
/// partition, and blocking-domain stack rather than one bridge per arc.
pub fn reconcile_arc_expansions(
    graph: &mut Graph,
    requests: &HashMap<petgraph::stable_graph::EdgeIndex, ExpansionRequest>,
) -> Result<Vec<NodeIndex>, DataflowError> {
    let mut needs_bridge = Vec::new();

    for (&edge, req) in requests {
        let resolved = match (req.src_expansion, req.dst_expansion) {
            (Some(n), None) | (None, Some(n)) => Some(n),
            (Some(a), Some(b)) if a == b => Some(a),
            (Some(_), Some(_)) => None,
            (None, None) => None,
        };
        match resolved {
            Some(n) => {
                if let Some(arc) = graph.inner.edge_weight_mut(edge) {
                    arc.data_type = arc.data_type.expand_for_block(n);
                }
            }
            None if req.src_expansion.is_some() && req.dst_expansion.is_some() => {
                needs_bridge.push(edge);
            }
            None => {}
        }
    }

    let mut groups: HashMap<crate::passes::arc_group::ArcGroupKey, Vec<petgraph::stable_graph::EdgeIndex>> =
        HashMap::new();
    for edge in needs_bridge {
        let (src, dst) = graph
            .inner
            .edge_endpoints(edge)
            .ok_or_else(|| DataflowError::referential_integrity("reconcile_arc_expansions: arc missing"))?;
        let arc = graph
            .arc(edge)
            .ok_or_else(|| DataflowError::referential_integrity("reconcile_arc_expansions: arc missing"))?;
        let key = crate::passes::arc_group::ArcGroupKey {
            src,
            dst_partition: graph.node(dst).and_then(|n| n.partition),
            sample_time: arc.sample_time,
            blocking_stack: crate::passes::arc_group::blocking_stack(graph, src),
        };
        groups.entry(key).or_default().push(edge);
    }

    let mut bridges = Vec::new();
    for (key, edges) in groups {
        let src = key.src;
        let src_parent = graph
            .node(src)
            .ok_or_else(|| DataflowError::referential_integrity("reconcile_arc_expansions: source missing"))?
            .parent;
        let src_partition = graph.node(src).and_then(|n| n.partition);

        let mut bridge = GraphNode::new(NodeKind::BlockingDomainBridge);
        bridge.parent = src_parent;
        bridge.partition = src_partition;

        let mut batch_arcs = Vec::new();
        let mut remove_arcs = Vec::with_capacity(edges.len());
        let mut input_spliced = false;
        for edge in edges {
            let req = requests[&edge];
            let src_expansion = req.src_expansion.expect("grouped only when both sides requested");
            let dst_expansion = req.dst_expansion.expect("grouped only when both sides requested");
            let (_, dst) = graph.inner.edge_endpoints(edge).expect("edge exists");
            let weight = graph.arc(edge).expect("edge exists").clone();
            remove_arcs.push(edge);

            if !input_spliced {
                let in_weight = crate::port::Arc {
                    data_type: weight.data_type.expand_for_block(src_expansion),
                    dst_port: 0,
                    ..weight.clone()
                };
                batch_arcs.push((NodeRef::Existing(src), NodeRef::New(0), in_weight));
                input_spliced = true;
            }
            let out_weight = crate::port::Arc {
                data_type: weight.data_type.expand_for_block(dst_expansion),
                src_port: 0,
                ..weight
            };
            batch_arcs.push((NodeRef::New(0), NodeRef::Existing(dst), out_weight));
        }

        let (added_nodes, _) = graph.add_remove_nodes_and_arcs(vec![bridge], batch_arcs, Vec::new(), remove_arcs)?;
        bridges.push(added_nodes[0]);
    }

    Ok(bridges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{MasterKind, PrimitiveOp};
    use crate::port::Arc as ArcWeight;
    use crate::types::{BaseKind, DataType};

    fn dt() -> DataType {
        DataType::scalar(BaseKind::Int, true, 16)
    }

    #[test]
    fn discover_groups_keeps_feedback_loop_together() {
        let mut g = Graph::new();
        let a = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        let b = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        g.add_arc(a, b, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(b, a, ArcWeight::new(0, 1, dt(), 1)).unwrap();

        let groups = discover_blocking_groups(&g, &HashMap::new()).unwrap();
        let feedback = groups.iter().find(|grp| grp.len() > 1).unwrap();
        assert_eq!(feedback.len(), 2);
    }

    #[test]
    fn discover_groups_breaks_loop_at_a_sufficiently_long_delay() {
        let mut g = Graph::new();
        let a = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        let delay = g.add_node(GraphNode::new(NodeKind::Delay {
            length: 2,
            initial_conditions: vec![
                crate::types::NumericValue::Int { re: 0, im: None },
                crate::types::NumericValue::Int { re: 0, im: None },
            ],
        }));
        g.add_arc(a, delay, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(delay, a, ArcWeight::new(0, 1, dt(), 1)).unwrap();

        let mut base = HashMap::new();
        base.insert(a, 2);
        base.insert(delay, 2);

        let groups = discover_blocking_groups(&g, &base).unwrap();
        assert!(
            groups.iter().all(|grp| grp.len() == 1),
            "a delay at least as long as the effective sub-block should break the feedback loop into singletons"
        );
    }

    #[test]
    fn effective_sub_block_rejects_non_divisible_rate() {
        let err = effective_sub_block(3, (1, 2)).unwrap_err();
        assert!(matches!(err, DataflowError::Structural { .. }));
    }

    #[test]
    fn effective_sub_block_scales_by_rate() {
        assert_eq!(effective_sub_block(4, (1, 2)).unwrap(), 2);
        assert_eq!(effective_sub_block(4, (2, 1)).unwrap(), 8);
    }

    #[test]
    fn assign_sub_blocking_length_rejects_conflicting_second_request() {
        let mut assigned = HashMap::new();
        let group = vec![NodeIndex::new(0)];
        assign_sub_blocking_length(&mut assigned, &group, 4).unwrap();
        let err = assign_sub_blocking_length(&mut assigned, &group, 8).unwrap_err();
        assert!(matches!(err, DataflowError::Structural { .. }));
    }

    #[test]
    fn insert_blocking_domain_splices_boundary_nodes() {
        let mut g = Graph::new();
        let input = g.add_node(GraphNode::new(NodeKind::Master { kind: MasterKind::Input }));
        let inner = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        let output = g.add_node(GraphNode::new(NodeKind::Master { kind: MasterKind::Output }));
        g.add_arc(input, inner, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(inner, output, ArcWeight::new(0, 0, dt(), 1)).unwrap();

        let domain = insert_blocking_domain(&mut g, &[inner], 4, 1).unwrap();
        assert_eq!(g.node(inner).unwrap().parent, Some(domain));

        let has_blocking_input = g
            .inner
            .node_indices()
            .any(|idx| matches!(g.node(idx).unwrap().kind, NodeKind::BlockingInput));
        let has_blocking_output = g
            .inner
            .node_indices()
            .any(|idx| matches!(g.node(idx).unwrap().kind, NodeKind::BlockingOutput));
        assert!(has_blocking_input);
        assert!(has_blocking_output);
    }

    #[test]
    fn insert_blocking_domain_rejects_non_divisible_lengths() {
        let mut g = Graph::new();
        let inner = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        let err = insert_blocking_domain(&mut g, &[inner], 5, 2).unwrap_err();
        assert!(matches!(err, DataflowError::Structural { .. }));
    }

    #[test]
    fn lone_constant_with_one_consumer_is_folded_into_its_group() {
        let mut g = Graph::new();
        let constant = g.add_node(GraphNode::new(NodeKind::Constant {
            value: crate::types::NumericValue::Int { re: 1, im: None },
        }));
        let consumer = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        g.add_arc(constant, consumer, ArcWeight::new(0, 0, dt(), 1)).unwrap();

        let mut groups = vec![vec![constant], vec![consumer]];
        absorb_lone_constants(&mut g, &mut groups).unwrap();

        assert_eq!(groups.len(), 1);
        assert!(groups[0].contains(&constant) && groups[0].contains(&consumer));
    }

    #[test]
    fn lone_constant_with_two_consumers_is_cloned_per_extra_consumer() {
        let mut g = Graph::new();
        let constant = g.add_node(GraphNode::new(NodeKind::Constant {
            value: crate::types::NumericValue::Int { re: 7, im: None },
        }));
        let consumer_a = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        let consumer_b = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        g.add_arc(constant, consumer_a, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(constant, consumer_b, ArcWeight::new(0, 1, dt(), 1)).unwrap();

        let mut groups = vec![vec![constant], vec![consumer_a], vec![consumer_b]];
        absorb_lone_constants(&mut g, &mut groups).unwrap();

        assert_eq!(groups.len(), 2, "the original constant group disappears, folded into consumer_a's");
        let total_members: usize = groups.iter().map(|g| g.len()).sum();
        assert_eq!(total_members, 4, "consumer_a + original constant, consumer_b + its clone");
    }

    #[test]
    fn global_blocking_domain_wraps_top_level_nodes_by_sub_block_length() {
        let mut g = Graph::new();
        let a = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        let b = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));

        let mut lengths = HashMap::new();
        lengths.insert(a, 2);
        lengths.insert(b, 2);

        let domains = insert_global_blocking_domains(&mut g, 4, &lengths).unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(g.node(a).unwrap().parent, Some(domains[0]));
        assert_eq!(g.node(b).unwrap().parent, Some(domains[0]));
    }

    #[test]
    fn global_blocking_domain_skips_base_length_one() {
        let mut g = Graph::new();
        let a = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        let domains = insert_global_blocking_domains(&mut g, 1, &HashMap::new()).unwrap();
        assert!(domains.is_empty());
        assert_eq!(g.node(a).unwrap().parent, None);
    }

    #[test]
    fn mismatched_expansion_requests_get_a_bridge_matched_requests_apply_directly() {
        let mut g = Graph::new();
        let src = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        let dst_same = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        let dst_diff = g.add_node(GraphNode::new(NodeKind::Primitive {
            op: PrimitiveOp::Add,
            num_inputs: 2,
        }));
        let same_edge = g.add_arc(src, dst_same, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        let diff_edge = g.add_arc(src, dst_diff, ArcWeight::new(0, 1, dt(), 1)).unwrap();

        let mut requests = HashMap::new();
        requests.insert(
            same_edge,
            ExpansionRequest {
                src_expansion: Some(4),
                dst_expansion: Some(4),
            },
        );
        requests.insert(
            diff_edge,
            ExpansionRequest {
                src_expansion: Some(4),
                dst_expansion: Some(2),
            },
        );

        let bridges = reconcile_arc_expansions(&mut g, &requests).unwrap();
        assert_eq!(bridges.len(), 1);

        assert_eq!(g.arc(same_edge).unwrap().data_type.dims, vec![4]);
        assert!(g.inner.edge_endpoints(diff_edge).is_none(), "original arc replaced by the bridge");
    }
}
