//! Partitioning & FIFO insertion (component I), plus a FIFO merging
//! post-pass.
//!
//! Arc grouping is shared with blocking's bridge insertion
//! (`passes::arc_group`); this module owns the partition-crossing-specific
//! parts: inserting a `ThreadCrossingFifo` per arc group, absorbing a
//! `Delay` node's initial conditions into the FIFO it now feeds instead of
//! keeping both (input side via `try_absorb_input_delay`, output side via
//! `try_absorb_output_delay`), reshaping a FIFO's flat initial-condition
//! list into per-block chunks once blocking has set a block size, and —
//! after every FIFO is placed — merging any left that turn out to be exact
//! duplicates.

use crate::error::DataflowError;
use crate::graph::{Graph, GraphNode, NodeRef};
use crate::node::NodeKind;
use crate::passes::arc_group::group_crossing_arcs;
use crate::types::NumericValue;
use petgraph::stable_graph::NodeIndex;
use std::collections::HashMap;

/// Default ring depth for a freshly inserted FIFO; later passes may resize
/// it once they know the producer/consumer's actual block cadence.
const DEFAULT_FIFO_LENGTH: u32 = 2;

/// Splices a `ThreadCrossingFifo` onto every arc group that crosses a
/// partition boundary (`src`'s partition differs from `dst`'s and both are
/// assigned), so that group's arcs all read from one shared FIFO.
pub fn insert_fifos_for_partition_crossings(graph: &mut Graph) -> Result<Vec<NodeIndex>, DataflowError> {
    let crossing = |src: NodeIndex, dst: NodeIndex| {
        let sp = graph.node(src).and_then(|n| n.partition);
        let dp = graph.node(dst).and_then(|n| n.partition);
        matches!((sp, dp), (Some(a), Some(b)) if a != b)
    };
    let groups = group_crossing_arcs(graph, crossing);

    let mut new_nodes = Vec::with_capacity(groups.len());
    let mut new_arcs = Vec::new();
    let mut remove_arcs = Vec::new();
    let mut fifo_slots = Vec::with_capacity(groups.len());

    for (key, edges) in groups {
        let mut fifo = GraphNode::new(NodeKind::ThreadCrossingFifo {
            fifo_length: DEFAULT_FIFO_LENGTH,
            partition_src: graph.node(key.src).and_then(|n| n.partition).unwrap_or(-1),
            partition_dst: key.dst_partition.unwrap_or(-1),
            init_conditions: Vec::new(),
        });
        fifo.parent = fifo_parent(graph, key.src);
        let slot = new_nodes.len();
        new_nodes.push(fifo);
        fifo_slots.push(slot);

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

    let (added_nodes, _added_arcs) =
        graph.add_remove_nodes_and_arcs(new_nodes, new_arcs, Vec::new(), remove_arcs)?;
    Ok(fifo_slots.into_iter().map(|slot| added_nodes[slot]).collect())
}

/// The FIFO sits in the source's own context, unless the source is a
/// `RateChangeOutput`: that node's output belongs to the clock domain it
/// closes, so the FIFO is placed one level out, in the domain's own parent.
fn fifo_parent(graph: &Graph, src: NodeIndex) -> Option<NodeIndex> {
    let src_node = graph.node(src)?;
    if matches!(src_node.kind, NodeKind::RateChangeOutput { .. }) {
        src_node.parent.and_then(|p| graph.node(p)).and_then(|n| n.parent)
    } else {
        src_node.parent
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DelayAbsorptionOutcome {
    /// The delay has zero length; there is nothing to absorb.
    None,
    /// The delay's entire initial-condition list moved into the FIFO and
    /// the delay node was removed.
    Full,
    /// Only part of the delay fit in the FIFO's capacity; a smaller delay
    /// node survives upstream of the FIFO carrying the remainder.
    PartialFull { remaining_length: u32 },
    /// The delay's initial conditions had to be concatenated onto a
    /// nonempty initial-condition list the FIFO already carried.
    PartialMergeInitCond { remaining_length: u32 },
}

/// Absorbs `delay`'s initial conditions into `fifo`, removing or shrinking
/// the delay node as appropriate. `delay` must sit immediately upstream of
/// `fifo` with nothing else consuming its output.
pub fn absorb_delay_into_fifo(
    graph: &mut Graph,
    delay: NodeIndex,
    fifo: NodeIndex,
) -> Result<DelayAbsorptionOutcome, DataflowError> {
    let (length, ic) = match &graph
        .node(delay)
        .ok_or_else(|| DataflowError::referential_integrity("absorb_delay_into_fifo: delay missing"))?
        .kind
    {
        NodeKind::Delay {
            length,
            initial_conditions,
        } => (*length, initial_conditions.clone()),
        _ => {
            return Err(DataflowError::transformation(
                "partition::absorb_delay_into_fifo",
                "target node is not a Delay",
            ))
        }
    };

    if length == 0 {
        return Ok(DelayAbsorptionOutcome::None);
    }

    let (fifo_length, existing_ic) = match &graph
        .node(fifo)
        .ok_or_else(|| DataflowError::referential_integrity("absorb_delay_into_fifo: fifo missing"))?
        .kind
    {
        NodeKind::ThreadCrossingFifo {
            fifo_length,
            init_conditions,
            ..
        } => (*fifo_length, init_conditions.clone()),
        _ => {
            return Err(DataflowError::transformation(
                "partition::absorb_delay_into_fifo",
                "target node is not a ThreadCrossingFifo",
            ))
        }
    };

    let capacity = fifo_length as usize;
    let outcome = if (length as usize) <= capacity && existing_ic.is_empty() {
        set_fifo_ic(graph, fifo, ic)?;
        remove_delay_by_splicing(graph, delay)?;
        DelayAbsorptionOutcome::Full
    } else if (length as usize) <= capacity {
        let mut merged = existing_ic;
        merged.extend(ic);
        set_fifo_ic(graph, fifo, merged)?;
        remove_delay_by_splicing(graph, delay)?;
        DelayAbsorptionOutcome::PartialMergeInitCond { remaining_length: 0 }
    } else {
        let (absorbed, remaining) = ic.split_at(capacity);
        set_fifo_ic(graph, fifo, absorbed.to_vec())?;
        if let Some(GraphNode {
            kind: NodeKind::Delay {
                length: l,
                initial_conditions: rest,
            },
            ..
        }) = graph.node_mut(delay)
        {
            *l = length - capacity as u32;
            *rest = remaining.to_vec();
        }
        DelayAbsorptionOutcome::PartialFull {
            remaining_length: length - capacity as u32,
        }
    };

    Ok(outcome)
}

/// Drives the input-side case of §4.4: absorbs the delay feeding `fifo` if
/// and only if the FIFO has no order-constraint inputs, its unique producer
/// is a delay, and that delay has exactly one consumer (the FIFO itself).
/// Returns `None` without touching the graph if any precondition fails.
pub fn try_absorb_input_delay(
    graph: &mut Graph,
    fifo: NodeIndex,
) -> Result<Option<DelayAbsorptionOutcome>, DataflowError> {
    if graph
        .in_arcs(fifo)
        .any(|e| graph.arc(e).map(|a| a.order_constraint).unwrap_or(false))
    {
        return Ok(None);
    }
    let mut producers = graph.in_arcs(fifo);
    let producer_edge = match producers.next() {
        Some(edge) => edge,
        None => return Ok(None),
    };
    if producers.next().is_some() {
        return Ok(None);
    }
    let (delay, _) = graph.inner.edge_endpoints(producer_edge).expect("edge exists");
    if !matches!(graph.node(delay).map(|n| &n.kind), Some(NodeKind::Delay { .. })) {
        return Ok(None);
    }
    if graph.out_arcs(delay).count() != 1 {
        return Ok(None);
    }
    Ok(Some(absorb_delay_into_fifo(graph, delay, fifo)?))
}

/// Drives the output-side, symmetric case of §4.4: `fifo` feeds one or more
/// `Delay` consumers, all sharing the same initial conditions, none reached
/// through an order-constraint output. Absorbs that shared initial-condition
/// list into the FIFO and removes the (now-redundant) delays, leaving the
/// FIFO's direct consumers wired to whatever those delays used to feed.
pub fn try_absorb_output_delay(
    graph: &mut Graph,
    fifo: NodeIndex,
) -> Result<Option<DelayAbsorptionOutcome>, DataflowError> {
    let out_edges: Vec<_> = graph.out_arcs(fifo).collect();
    if out_edges.is_empty() || out_edges.iter().any(|&e| graph.arc(e).map(|a| a.order_constraint).unwrap_or(false)) {
        return Ok(None);
    }

    let mut delays = Vec::with_capacity(out_edges.len());
    let mut shared: Option<(u32, Vec<NumericValue>)> = None;
    for &edge in &out_edges {
        let (_, dst) = graph.inner.edge_endpoints(edge).expect("edge exists");
        match graph.node(dst).map(|n| &n.kind) {
            Some(NodeKind::Delay {
                length,
                initial_conditions,
            }) => {
                match &shared {
                    None => shared = Some((*length, initial_conditions.clone())),
                    Some((l, ic)) if *l == *length && ic == initial_conditions => {}
                    Some(_) => return Ok(None),
                }
                delays.push(dst);
            }
            _ => return Ok(None),
        }
    }

    let (length, ic) = match shared {
        Some(pair) => pair,
        None => return Ok(None),
    };
    if length == 0 {
        return Ok(None);
    }

    let (fifo_length, existing_ic) = match &graph
        .node(fifo)
        .ok_or_else(|| DataflowError::referential_integrity("try_absorb_output_delay: fifo missing"))?
        .kind
    {
        NodeKind::ThreadCrossingFifo {
            fifo_length,
            init_conditions,
            ..
        } => (*fifo_length, init_conditions.clone()),
        _ => {
            return Err(DataflowError::transformation(
                "partition::try_absorb_output_delay",
                "target node is not a ThreadCrossingFifo",
            ))
        }
    };

    let capacity = fifo_length as usize;
    let outcome = if (length as usize) <= capacity && existing_ic.is_empty() {
        set_fifo_ic(graph, fifo, ic)?;
        for delay in delays {
            remove_delay_by_splicing(graph, delay)?;
        }
        DelayAbsorptionOutcome::Full
    } else if (length as usize) <= capacity {
        let mut merged = existing_ic;
        merged.extend(ic);
        set_fifo_ic(graph, fifo, merged)?;
        for delay in delays {
            remove_delay_by_splicing(graph, delay)?;
        }
        DelayAbsorptionOutcome::PartialMergeInitCond { remaining_length: 0 }
    } else {
        let (absorbed, remaining) = ic.split_at(capacity);
        set_fifo_ic(graph, fifo, absorbed.to_vec())?;
        for delay in &delays {
            if let Some(GraphNode {
                kind: NodeKind::Delay {
                    length: l,
                    initial_conditions: rest,
                },
                ..
            }) = graph.node_mut(*delay)
            {
                *l = length - capacity as u32;
                *rest = remaining.to_vec();
            }
        }
        DelayAbsorptionOutcome::PartialFull {
            remaining_length: length - capacity as u32,
        }
    };

    Ok(Some(outcome))
}

fn set_fifo_ic(graph: &mut Graph, fifo: NodeIndex, ic: Vec<NumericValue>) -> Result<(), DataflowError> {
    if let Some(GraphNode {
        kind: NodeKind::ThreadCrossingFifo { init_conditions, .. },
        ..
    }) = graph.node_mut(fifo)
    {
        *init_conditions = ic;
        Ok(())
    } else {
        Err(DataflowError::referential_integrity(
            "set_fifo_ic: target is not a ThreadCrossingFifo",
        ))
    }
}

/// Removes a fully-absorbed delay node by reconnecting its single producer
/// directly to its single consumer, then deleting it.
fn remove_delay_by_splicing(graph: &mut Graph, delay: NodeIndex) -> Result<(), DataflowError> {
    let in_edge = graph
        .in_arcs(delay)
        .next()
        .ok_or_else(|| DataflowError::referential_integrity("delay has no producer"))?;
    let out_edge = graph
        .out_arcs(delay)
        .next()
        .ok_or_else(|| DataflowError::referential_integrity("delay has no consumer"))?;

    let (producer, _) = graph.inner.edge_endpoints(in_edge).expect("edge exists");
    let (_, consumer) = graph.inner.edge_endpoints(out_edge).expect("edge exists");
    let src_port = graph.arc(in_edge).expect("edge exists").src_port;
    let mut weight = graph.arc(out_edge).expect("edge exists").clone();
    weight.set_src_port(src_port);

    graph.add_remove_nodes_and_arcs(
        Vec::new(),
        vec![(NodeRef::Existing(producer), NodeRef::Existing(consumer), weight)],
        vec![delay],
        vec![in_edge, out_edge],
    )?;
    Ok(())
}

/// Reshapes a flat initial-condition list into `ceil(len / block_size)`
/// per-block chunks, zero-padding the final chunk so every chunk is
/// exactly `block_size` long — the form a blocked FIFO's initial state
/// must be in once blocking has assigned it a block size.
pub fn reshape_initial_conditions(ic: &[NumericValue], block_size: u32) -> Vec<Vec<NumericValue>> {
    if ic.is_empty() || block_size == 0 {
        return Vec::new();
    }
    let zero = match &ic[0] {
        NumericValue::Int { .. } => NumericValue::Int { re: 0, im: None },
        NumericValue::Float { .. } => NumericValue::Float { re: 0.0, im: None },
    };
    ic.chunks(block_size as usize)
        .map(|chunk| {
            let mut v = chunk.to_vec();
            while v.len() < block_size as usize {
                v.push(zero.clone());
            }
            v
        })
        .collect()
}

/// Merges FIFOs left in the same partition pair, fed by the same source
/// node, with the same block size — a redundancy the per-group insertion
/// above does not catch because it is applied per arc group, not globally
/// after every group has been placed. Later-discovered duplicates are
/// folded into the earliest one; its consumers are rewired and the
/// duplicate is deleted.
pub fn merge_redundant_fifos(graph: &mut Graph) -> Result<usize, DataflowError> {
    #[derive(PartialEq, Eq, Hash)]
    struct Key {
        src: NodeIndex,
        partition_src: i32,
        partition_dst: i32,
        fifo_length: u32,
    }

    let fifo_indices: Vec<NodeIndex> = graph
        .inner
        .node_indices()
        .filter(|&idx| matches!(graph.node(idx).map(|n| &n.kind), Some(NodeKind::ThreadCrossingFifo { .. })))
        .collect();

    let mut survivors: HashMap<Key, NodeIndex> = HashMap::new();
    let mut merged_count = 0;

    for fifo in fifo_indices {
        let (partition_src, partition_dst, fifo_length) = match &graph.node(fifo).unwrap().kind {
            NodeKind::ThreadCrossingFifo {
                partition_src,
                partition_dst,
                fifo_length,
                ..
            } => (*partition_src, *partition_dst, *fifo_length),
            _ => continue,
        };
        let src = match graph.in_arcs(fifo).next() {
            Some(edge) => graph.inner.edge_endpoints(edge).expect("edge exists").0,
            None => continue,
        };

        let key = Key {
            src,
            partition_src,
            partition_dst,
            fifo_length,
        };

        match survivors.get(&key) {
            None => {
                survivors.insert(key, fifo);
            }
            Some(&survivor) => {
                merge_fifo(graph, fifo, survivor)?;
                merged_count += 1;
            }
        }
    }

    Ok(merged_count)
}

/// Redirects every consumer of `from` onto `survivor` and deletes `from`, in
/// one commit: `from`'s outgoing arcs are replaced by equivalent arcs out of
/// `survivor`, and `from` itself (with its now-duplicate incoming arc) is
/// removed.
fn merge_fifo(graph: &mut Graph, from: NodeIndex, survivor: NodeIndex) -> Result<(), DataflowError> {
    let out_edges: Vec<_> = graph.out_arcs(from).collect();
    let in_edges: Vec<_> = graph.in_arcs(from).collect();

    let new_arcs = out_edges
        .iter()
        .map(|&edge| {
            let (_, dst) = graph.inner.edge_endpoints(edge).expect("edge exists");
            let weight = graph.arc(edge).expect("edge exists").clone();
            (NodeRef::Existing(survivor), NodeRef::Existing(dst), weight)
        })
        .collect();

    let mut remove_arcs = out_edges;
    remove_arcs.extend(in_edges);

    graph.add_remove_nodes_and_arcs(Vec::new(), new_arcs, vec![from], remove_arcs)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MasterKind;
    use crate::port::Arc as ArcWeight;
    use crate::types::{BaseKind, DataType};

    fn dt() -> DataType {
        DataType::scalar(BaseKind::Int, true, 16)
    }

    #[test]
    fn inserts_fifo_for_partition_crossing_arc() {
        let mut g = Graph::new();
        let mut src = GraphNode::new(NodeKind::Master { kind: MasterKind::Input });
        src.partition = Some(0);
        let src_idx = g.add_node(src);
        let mut dst = GraphNode::new(NodeKind::Master { kind: MasterKind::Output });
        dst.partition = Some(1);
        let dst_idx = g.add_node(dst);
        g.add_arc(src_idx, dst_idx, ArcWeight::new(0, 0, dt(), 1)).unwrap();

        let fifos = insert_fifos_for_partition_crossings(&mut g).unwrap();
        assert_eq!(fifos.len(), 1);
        assert!(matches!(
            g.node(fifos[0]).unwrap().kind,
            NodeKind::ThreadCrossingFifo { .. }
        ));
    }

    #[test]
    fn absorb_delay_fully_when_it_fits() {
        let mut g = Graph::new();
        let producer = g.add_node(GraphNode::new(NodeKind::Master { kind: MasterKind::Input }));
        let delay = g.add_node(GraphNode::new(NodeKind::Delay {
            length: 2,
            initial_conditions: vec![
                NumericValue::Int { re: 0, im: None },
                NumericValue::Int { re: 0, im: None },
            ],
        }));
        let fifo = g.add_node(GraphNode::new(NodeKind::ThreadCrossingFifo {
            fifo_length: 4,
            partition_src: 0,
            partition_dst: 1,
            init_conditions: Vec::new(),
        }));
        g.add_arc(producer, delay, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(delay, fifo, ArcWeight::new(0, 0, dt(), 1)).unwrap();

        let outcome = absorb_delay_into_fifo(&mut g, delay, fifo).unwrap();
        assert_eq!(outcome, DelayAbsorptionOutcome::Full);
        assert!(!g.inner.contains_node(delay));
    }

    #[test]
    fn absorb_delay_partial_when_longer_than_fifo_capacity() {
        let mut g = Graph::new();
        let producer = g.add_node(GraphNode::new(NodeKind::Master { kind: MasterKind::Input }));
        let delay = g.add_node(GraphNode::new(NodeKind::Delay {
            length: 5,
            initial_conditions: (0..5)
                .map(|i| NumericValue::Int { re: i, im: None })
                .collect(),
        }));
        let fifo = g.add_node(GraphNode::new(NodeKind::ThreadCrossingFifo {
            fifo_length: 2,
            partition_src: 0,
            partition_dst: 1,
            init_conditions: Vec::new(),
        }));
        g.add_arc(producer, delay, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(delay, fifo, ArcWeight::new(0, 0, dt(), 1)).unwrap();

        let outcome = absorb_delay_into_fifo(&mut g, delay, fifo).unwrap();
        assert_eq!(outcome, DelayAbsorptionOutcome::PartialFull { remaining_length: 3 });
        assert!(g.inner.contains_node(delay));
    }

    #[test]
    fn try_absorb_input_delay_skips_when_fifo_has_other_producer() {
        let mut g = Graph::new();
        let delay = g.add_node(GraphNode::new(NodeKind::Delay {
            length: 1,
            initial_conditions: vec![NumericValue::Int { re: 0, im: None }],
        }));
        let other = g.add_node(GraphNode::new(NodeKind::Master { kind: MasterKind::Input }));
        let fifo = g.add_node(GraphNode::new(NodeKind::ThreadCrossingFifo {
            fifo_length: 4,
            partition_src: 0,
            partition_dst: 1,
            init_conditions: Vec::new(),
        }));
        g.add_arc(delay, fifo, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(other, fifo, ArcWeight::new(0, 1, dt(), 1)).unwrap();

        let outcome = try_absorb_input_delay(&mut g, fifo).unwrap();
        assert_eq!(outcome, None);
        assert!(g.inner.contains_node(delay));
    }

    #[test]
    fn try_absorb_input_delay_skips_when_delay_has_two_consumers() {
        let mut g = Graph::new();
        let delay = g.add_node(GraphNode::new(NodeKind::Delay {
            length: 1,
            initial_conditions: vec![NumericValue::Int { re: 0, im: None }],
        }));
        let fifo = g.add_node(GraphNode::new(NodeKind::ThreadCrossingFifo {
            fifo_length: 4,
            partition_src: 0,
            partition_dst: 1,
            init_conditions: Vec::new(),
        }));
        let other_consumer = g.add_node(GraphNode::new(NodeKind::Master { kind: MasterKind::Output }));
        g.add_arc(delay, fifo, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(delay, other_consumer, ArcWeight::new(0, 0, dt(), 1)).unwrap();

        let outcome = try_absorb_input_delay(&mut g, fifo).unwrap();
        assert_eq!(outcome, None);
        assert!(g.inner.contains_node(delay));
    }

    #[test]
    fn try_absorb_input_delay_succeeds_on_clean_chain() {
        let mut g = Graph::new();
        let producer = g.add_node(GraphNode::new(NodeKind::Master { kind: MasterKind::Input }));
        let delay = g.add_node(GraphNode::new(NodeKind::Delay {
            length: 1,
            initial_conditions: vec![NumericValue::Int { re: 7, im: None }],
        }));
        let fifo = g.add_node(GraphNode::new(NodeKind::ThreadCrossingFifo {
            fifo_length: 4,
            partition_src: 0,
            partition_dst: 1,
            init_conditions: Vec::new(),
        }));
        g.add_arc(producer, delay, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(delay, fifo, ArcWeight::new(0, 0, dt(), 1)).unwrap();

        let outcome = try_absorb_input_delay(&mut g, fifo).unwrap();
        assert_eq!(outcome, Some(DelayAbsorptionOutcome::Full));
        assert!(!g.inner.contains_node(delay));
    }

    #[test]
    fn try_absorb_output_delay_merges_matching_delays_into_fifo() {
        let mut g = Graph::new();
        let mut producer = GraphNode::new(NodeKind::Master { kind: MasterKind::Input });
        producer.partition = Some(0);
        let producer_idx = g.add_node(producer);
        let fifo = g.add_node(GraphNode::new(NodeKind::ThreadCrossingFifo {
            fifo_length: 4,
            partition_src: 0,
            partition_dst: 1,
            init_conditions: Vec::new(),
        }));
        let ic = vec![NumericValue::Int { re: 9, im: None }];
        let delay_a = g.add_node(GraphNode::new(NodeKind::Delay {
            length: 1,
            initial_conditions: ic.clone(),
        }));
        let delay_b = g.add_node(GraphNode::new(NodeKind::Delay {
            length: 1,
            initial_conditions: ic.clone(),
        }));
        let sink_a = g.add_node(GraphNode::new(NodeKind::Master { kind: MasterKind::Output }));
        let sink_b = g.add_node(GraphNode::new(NodeKind::Master { kind: MasterKind::Output }));
        g.add_arc(producer_idx, fifo, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(fifo, delay_a, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(fifo, delay_b, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(delay_a, sink_a, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(delay_b, sink_b, ArcWeight::new(0, 0, dt(), 1)).unwrap();

        let outcome = try_absorb_output_delay(&mut g, fifo).unwrap();
        assert_eq!(outcome, Some(DelayAbsorptionOutcome::Full));
        assert!(!g.inner.contains_node(delay_a));
        assert!(!g.inner.contains_node(delay_b));
        match &g.node(fifo).unwrap().kind {
            NodeKind::ThreadCrossingFifo { init_conditions, .. } => assert_eq!(init_conditions, &ic),
            _ => panic!("expected ThreadCrossingFifo"),
        }
    }

    #[test]
    fn try_absorb_output_delay_skips_when_consumers_disagree() {
        let mut g = Graph::new();
        let fifo = g.add_node(GraphNode::new(NodeKind::ThreadCrossingFifo {
            fifo_length: 4,
            partition_src: 0,
            partition_dst: 1,
            init_conditions: Vec::new(),
        }));
        let delay_a = g.add_node(GraphNode::new(NodeKind::Delay {
            length: 1,
            initial_conditions: vec![NumericValue::Int { re: 1, im: None }],
        }));
        let delay_b = g.add_node(GraphNode::new(NodeKind::Delay {
            length: 1,
            initial_conditions: vec![NumericValue::Int { re: 2, im: None }],
        }));
        g.add_arc(fifo, delay_a, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(fifo, delay_b, ArcWeight::new(0, 0, dt(), 1)).unwrap();

        let outcome = try_absorb_output_delay(&mut g, fifo).unwrap();
        assert_eq!(outcome, None);
        assert!(g.inner.contains_node(delay_a));
        assert!(g.inner.contains_node(delay_b));
    }

    #[test]
    fn reshape_pads_final_chunk() {
        let ic: Vec<NumericValue> = (0..5).map(|i| NumericValue::Int { re: i, im: None }).collect();
        let chunks = reshape_initial_conditions(&ic, 3);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), 3);
        assert_eq!(chunks[1][2], NumericValue::Int { re: 0, im: None });
    }

    #[test]
    fn merge_redundant_fifos_collapses_duplicates() {
        let mut g = Graph::new();
        let mut src = GraphNode::new(NodeKind::Master { kind: MasterKind::Input });
        src.partition = Some(0);
        let src_idx = g.add_node(src);

        let fifo_a = g.add_node(GraphNode::new(NodeKind::ThreadCrossingFifo {
            fifo_length: 2,
            partition_src: 0,
            partition_dst: 1,
            init_conditions: Vec::new(),
        }));
        let fifo_b = g.add_node(GraphNode::new(NodeKind::ThreadCrossingFifo {
            fifo_length: 2,
            partition_src: 0,
            partition_dst: 1,
            init_conditions: Vec::new(),
        }));
        let mut sink_a = GraphNode::new(NodeKind::Master { kind: MasterKind::Output });
        sink_a.partition = Some(1);
        let sink_a_idx = g.add_node(sink_a);
        let mut sink_b = GraphNode::new(NodeKind::Master { kind: MasterKind::Output });
        sink_b.partition = Some(1);
        let sink_b_idx = g.add_node(sink_b);

        g.add_arc(src_idx, fifo_a, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(fifo_a, sink_a_idx, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(src_idx, fifo_b, ArcWeight::new(0, 0, dt(), 1)).unwrap();
        g.add_arc(fifo_b, sink_b_idx, ArcWeight::new(0, 0, dt(), 1)).unwrap();

        let merged = merge_redundant_fifos(&mut g).unwrap();
        assert_eq!(merged, 1);
        assert!(!g.inner.contains_node(fifo_b));
    }
}
