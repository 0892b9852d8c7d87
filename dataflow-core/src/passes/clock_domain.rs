//! Clock-domain subsystem (component F).
//!
//! `discover_clock_domain_parameters` walks every `ClockDomain` node's
//! ancestor chain and folds the per-level rate-change ratios (not just the
//! immediate parent) into a single rate relative to the
//! design's base rate, reduced by GCD at each step the way
//! `ClockDomain.cpp`'s `rateRelativeToBase` does. `specialize` turns a
//! `Generic` domain into `Downsample`/`Upsample`; upsample specialization
//! from a generic domain is the documented not-yet-implemented gap
//! (`DataflowError::Unsupported`, not a guessed semantics).

use crate::error::DataflowError;
use crate::graph::{Graph, GraphNode, NodeRef};
use crate::node::{ClockDomainSpec, MasterKind, NodeKind};
use petgraph::stable_graph::NodeIndex;

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn reduce(num: u32, den: u32) -> (u32, u32) {
    let g = gcd(num, den).max(1);
    (num / g, den / g)
}

/// Every `ClockDomain` ancestor of `node`, closest first, carrying its own
/// `(ratio_num, ratio_den)` pulled from its `RateChangeInput`/`RateChangeOutput`
/// pair — here approximated directly from the domain's own `spec`, since
/// support nodes have not been created yet when this runs.
fn clock_domain_ancestors(graph: &Graph, node: NodeIndex) -> Vec<(u32, u32)> {
    crate::algo::ancestor_chain(graph, node)
        .into_iter()
        .filter_map(|idx| match &graph.node(idx)?.kind {
            NodeKind::ClockDomain {
                spec: ClockDomainSpec::Downsample { factor },
                ..
            } => Some((1, *factor)),
            NodeKind::ClockDomain {
                spec: ClockDomainSpec::Upsample { factor },
                ..
            } => Some((*factor, 1)),
            _ => None,
        })
        .collect()
}

/// Computes and stores `rate_relative_to_base` on every `ClockDomain` node
/// in the graph, folding over each node's full ancestor chain.
pub fn discover_clock_domain_parameters(graph: &mut Graph) -> Result<(), DataflowError> {
    let domain_indices: Vec<NodeIndex> = graph
        .inner
        .node_indices()
        .filter(|&idx| matches!(graph.node(idx).map(|n| &n.kind), Some(NodeKind::ClockDomain { .. })))
        .collect();

    for idx in domain_indices {
        let own_ratio = match &graph.node(idx).expect("just filtered").kind {
            NodeKind::ClockDomain {
                spec: ClockDomainSpec::Downsample { factor },
                ..
            } => (1, *factor),
            NodeKind::ClockDomain {
                spec: ClockDomainSpec::Upsample { factor },
                ..
            } => (*factor, 1),
            _ => (1, 1),
        };

        let mut rate = own_ratio;
        for (num, den) in clock_domain_ancestors(graph, idx) {
            rate = reduce(rate.0 * num, rate.1 * den);
        }

        if let Some(GraphNode {
            kind: NodeKind::ClockDomain {
                rate_relative_to_base,
                ..
            },
            ..
        }) = graph.node_mut(idx)
        {
            *rate_relative_to_base = Some(rate);
        }
    }
    Ok(())
}

/// Turns every `Generic` clock domain into `Downsample`/`Upsample` using
/// its already-discovered `rate_relative_to_base`. A generic domain whose
/// rate is greater than 1 (an upsample) is rejected as unsupported rather
/// than silently specialized, matching the Open Question's resolution.
pub fn specialize(graph: &mut Graph) -> Result<(), DataflowError> {
    let domain_indices: Vec<NodeIndex> = graph
        .inner
        .node_indices()
        .filter(|&idx| {
            matches!(
                graph.node(idx).map(|n| &n.kind),
                Some(NodeKind::ClockDomain {
                    spec: ClockDomainSpec::Generic,
                    ..
                })
            )
        })
        .collect();

    for idx in domain_indices {
        let rate = match &graph.node(idx).expect("just filtered").kind {
            NodeKind::ClockDomain {
                rate_relative_to_base: Some(rate),
                ..
            } => *rate,
            _ => {
                return Err(DataflowError::transformation(
                    "clock_domain::specialize",
                    format!("{:?} has no discovered rate; run discover_clock_domain_parameters first", idx),
                ))
            }
        };

        if rate.0 > rate.1 {
            return Err(DataflowError::unsupported(
                "upsample specialization from a generic clock domain is not implemented",
            ));
        }

        if let Some(GraphNode {
            kind: NodeKind::ClockDomain { spec, .. },
            ..
        }) = graph.node_mut(idx)
        {
            *spec = ClockDomainSpec::Downsample {
                factor: rate.1 / rate.0.max(1),
            };
        }
    }
    Ok(())
}

/// Inserts the wrapping-counter driver and repeat-output latch bridge
/// support nodes a downsample/upsample clock domain needs at its boundary
/// (`RateChange.h`'s `RateChangeInput`/`RateChangeOutput` pair), wiring
/// them onto the domain's single input/output port.
pub fn create_support_nodes(graph: &mut Graph, domain: NodeIndex) -> Result<(NodeIndex, NodeIndex), DataflowError> {
    let (num, den, is_downsample) = match &graph
        .node(domain)
        .ok_or_else(|| DataflowError::referential_integrity("create_support_nodes: domain missing"))?
        .kind
    {
        NodeKind::ClockDomain {
            spec: ClockDomainSpec::Downsample { factor },
            ..
        } => (1, *factor, true),
        NodeKind::ClockDomain {
            spec: ClockDomainSpec::Upsample { factor },
            ..
        } => (*factor, 1, false),
        _ => {
            return Err(DataflowError::transformation(
                "clock_domain::create_support_nodes",
                "domain must be specialized (Downsample/Upsample) before support nodes are created",
            ))
        }
    };

    let parent = graph.node(domain).and_then(|n| n.parent);

    let mut new_nodes = Vec::new();
    let mut new_arcs = Vec::new();

    let mut input_node = GraphNode::new(NodeKind::RateChangeInput {
        ratio_num: num,
        ratio_den: den,
    });
    input_node.parent = parent;
    let input_slot = new_nodes.len();
    new_nodes.push(input_node);

    let mut output_node = GraphNode::new(NodeKind::RateChangeOutput {
        ratio_num: num,
        ratio_den: den,
    });
    output_node.parent = parent;
    let output_slot = new_nodes.len();
    new_nodes.push(output_node);

    // A downsample domain gets a wrapping counter as its own context
    // driver; an upsample domain fires every base-rate tick and needs none.
    if is_downsample {
        let mut counter = GraphNode::new(NodeKind::WrappingCounter { modulus: den });
        counter.parent = Some(domain);
        new_nodes.push(counter);
    }

    // Every IO-output arc that leaves the domain's subtree gets a repeat-
    // output latch spliced onto it, so the held value keeps presenting at
    // the surrounding higher-rate sampling points between domain firings.
    let io_output_arcs: Vec<_> = graph
        .inner
        .edge_indices()
        .filter(|&e| {
            graph
                .inner
                .edge_endpoints(e)
                .map(|(src, dst)| {
                    (src == domain || crate::algo::is_descendant_of(graph, src, domain))
                        && matches!(
                            graph.node(dst).map(|n| &n.kind),
                            Some(NodeKind::Master { kind: MasterKind::Output })
                        )
                })
                .unwrap_or(false)
        })
        .collect();

    let mut remove_arcs = Vec::with_capacity(io_output_arcs.len());
    for edge in io_output_arcs {
        let (src, dst) = graph.inner.edge_endpoints(edge).expect("edge exists");
        let weight = graph.arc(edge).expect("edge exists").clone();
        remove_arcs.push(edge);

        let mut latch = GraphNode::new(NodeKind::RepeatOutputLatch {
            ratio_num: num,
            ratio_den: den,
        });
        latch.parent = parent;
        let latch_slot = new_nodes.len();
        new_nodes.push(latch);

        let mut in_weight = weight.clone();
        in_weight.set_dst_port(0);
        new_arcs.push((NodeRef::Existing(src), NodeRef::New(latch_slot), in_weight));

        let mut out_weight = weight;
        out_weight.set_src_port(0);
        new_arcs.push((NodeRef::New(latch_slot), NodeRef::Existing(dst), out_weight));
    }

    let (added_nodes, _) = graph.add_remove_nodes_and_arcs(new_nodes, new_arcs, Vec::new(), remove_arcs)?;
    Ok((added_nodes[input_slot], added_nodes[output_slot]))
}
