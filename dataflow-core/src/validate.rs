//! Graph-wide structural validation, exercised by idempotence (running
//! `validate` twice in a row must agree).
//!
//! Some invariants are satisfied by construction rather than by an
//! explicit check here, because of a deliberate representation choice
//! recorded in DESIGN.md: this crate stores hierarchy as parent-pointers
//! on `GraphNode` and derives context/blocking/clock membership by walking
//! the ancestor chain (`algo::ancestor_chain`), rather than caching a
//! separate membership list on the domain node that could fall out of
//! sync with the hierarchy. There is exactly one source of truth, so "the
//! structurally discovered set equals the recorded set" has no way to
//! fail. The same applies to "every arc is listed in its endpoint port's
//! arc set": a `Port` here does not keep its own arc set at all — the
//! graph's edge list is the only place an arc is recorded — so that
//! invariant cannot drift either.
//!
//! What *is* checked here, because nothing else enforces it structurally:
//! - No ordinary (non order-constraint) input port receives more than one
//!   incoming arc.
//! - Every arc feeding or leaving a given (node, port) pair agrees on
//!   `DataType` with every other arc on that same port.
//! - An arc whose endpoints sit in different blocking-domain stacks must
//!   pass through a `BlockingInput`/`BlockingOutput`/`BlockingDomainBridge`
//!   node at one of its two ends.
//! - A `RateChangeInput`/`RateChangeOutput` node's own `(up, down)` agrees
//!   with its nearest enclosing `ClockDomain`'s own ratio.
//! - Every `ClockDomain`'s `rate_relative_to_base`, once discovered, is
//!   fully reduced (GCD of numerator/denominator is 1).
//! - Context stacks are suffix-preserving along the containment tree.

use crate::error::DataflowError;
use crate::graph::Graph;
use crate::node::{ClockDomainSpec, NodeKind};
use crate::passes::arc_group::blocking_stack;
use crate::passes::context::context_stack;
use petgraph::stable_graph::NodeIndex;
use std::collections::HashMap;

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn node_path(graph: &Graph, node: NodeIndex) -> String {
    let mut parts = vec![format!("{:?}", node)];
    let mut cur = graph.node(node).and_then(|n| n.parent);
    while let Some(idx) = cur {
        parts.push(format!("{:?}", idx));
        cur = graph.node(idx).and_then(|n| n.parent);
    }
    parts.reverse();
    parts.join("/")
}

/// Runs every structurally-checkable invariant over `graph`. Returns the
/// first violation found; this function is idempotent since it only reads
/// the graph.
pub fn validate(graph: &Graph) -> Result<(), DataflowError> {
    check_single_producer_per_input_port(graph)?;
    check_port_type_consistency(graph)?;
    check_blocking_boundary_crossings(graph)?;
    check_blocking_length_divisible(graph)?;
    check_rate_change_matches_domain(graph)?;
    check_rate_relative_to_base_reduced(graph)?;
    check_context_stack_suffix_preserved(graph)?;
    Ok(())
}

fn check_blocking_length_divisible(graph: &Graph) -> Result<(), DataflowError> {
    for node in graph.inner.node_indices() {
        if let Some(NodeKind::BlockingDomain {
            blocking_length,
            sub_blocking_length,
        }) = graph.node(node).map(|n| &n.kind)
        {
            if sub_blocking_length == &0 || blocking_length % sub_blocking_length != 0 {
                return Err(DataflowError::structural(
                    node_path(graph, node),
                    format!(
                        "blocking_length {} not a multiple of sub_blocking_length {}",
                        blocking_length, sub_blocking_length
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn check_single_producer_per_input_port(graph: &Graph) -> Result<(), DataflowError> {
    for node in graph.inner.node_indices() {
        let mut counts: HashMap<u32, u32> = HashMap::new();
        for edge in graph.in_arcs(node) {
            let arc = graph.arc(edge).expect("in_arcs yields live edges");
            if arc.order_constraint {
                continue;
            }
            *counts.entry(arc.dst_port).or_insert(0) += 1;
        }
        if let Some((&port, &count)) = counts.iter().find(|(_, &c)| c > 1) {
            return Err(DataflowError::structural(
                node_path(graph, node),
                format!("input port {} has {} producers, expected at most one", port, count),
            ));
        }
    }
    Ok(())
}

fn check_port_type_consistency(graph: &Graph) -> Result<(), DataflowError> {
    for node in graph.inner.node_indices() {
        let mut seen: HashMap<u32, &crate::types::DataType> = HashMap::new();
        for edge in graph.in_arcs(node) {
            let arc = graph.arc(edge).expect("in_arcs yields live edges");
            if arc.order_constraint {
                continue;
            }
            if let Some(existing) = seen.insert(arc.dst_port, &arc.data_type) {
                if existing != &arc.data_type {
                    return Err(DataflowError::structural(
                        node_path(graph, node),
                        format!("input port {} sees conflicting DataTypes across arcs", arc.dst_port),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn is_blocking_boundary(graph: &Graph, node: NodeIndex) -> bool {
    matches!(
        graph.node(node).map(|n| &n.kind),
        Some(NodeKind::BlockingInput) | Some(NodeKind::BlockingOutput) | Some(NodeKind::BlockingDomainBridge)
    )
}

fn is_master(graph: &Graph, node: NodeIndex) -> bool {
    matches!(graph.node(node).map(|n| &n.kind), Some(NodeKind::Master { .. }))
}

fn check_blocking_boundary_crossings(graph: &Graph) -> Result<(), DataflowError> {
    for edge in graph.inner.edge_indices() {
        let (src, dst) = graph
            .inner
            .edge_endpoints(edge)
            .expect("edge_indices yields live edges");
        let src_stack = blocking_stack(graph, src);
        let dst_stack = blocking_stack(graph, dst);
        if src_stack == dst_stack {
            continue;
        }
        // Master-port I/O arcs whose destination clock domain cannot
        // operate in vector mode are the documented exception.
        if is_master(graph, src) || is_master(graph, dst) {
            continue;
        }
        if !is_blocking_boundary(graph, src) && !is_blocking_boundary(graph, dst) {
            return Err(DataflowError::structural(
                node_path(graph, dst),
                "arc crosses a blocking-domain boundary without a blocking-input/output/bridge node",
            ));
        }
    }
    Ok(())
}

fn domain_own_ratio(spec: &ClockDomainSpec) -> Option<(u32, u32)> {
    match spec {
        ClockDomainSpec::Downsample { factor } => Some((1, *factor)),
        ClockDomainSpec::Upsample { factor } => Some((*factor, 1)),
        ClockDomainSpec::Generic => None,
    }
}

fn check_rate_change_matches_domain(graph: &Graph) -> Result<(), DataflowError> {
    for node in graph.inner.node_indices() {
        let own_ratio = match &graph.node(node).expect("node_indices yields live nodes").kind {
            NodeKind::RateChangeInput { ratio_num, ratio_den } => (*ratio_num, *ratio_den),
            NodeKind::RateChangeOutput { ratio_num, ratio_den } => (*ratio_num, *ratio_den),
            _ => continue,
        };

        let domain_ratio = crate::algo::ancestor_chain(graph, node).into_iter().find_map(|idx| {
            match &graph.node(idx)?.kind {
                NodeKind::ClockDomain { spec, .. } => domain_own_ratio(spec),
                _ => None,
            }
        });

        if let Some(domain_ratio) = domain_ratio {
            if domain_ratio != own_ratio {
                return Err(DataflowError::structural(
                    node_path(graph, node),
                    format!(
                        "rate-change node reports ({}, {}) but enclosing clock domain is ({}, {})",
                        own_ratio.0, own_ratio.1, domain_ratio.0, domain_ratio.1
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn check_rate_relative_to_base_reduced(graph: &Graph) -> Result<(), DataflowError> {
    for node in graph.inner.node_indices() {
        if let Some(NodeKind::ClockDomain {
            rate_relative_to_base: Some((num, den)),
            ..
        }) = graph.node(node).map(|n| &n.kind)
        {
            if gcd(*num, *den) != 1 {
                return Err(DataflowError::structural(
                    node_path(graph, node),
                    format!("rate_relative_to_base ({}, {}) is not fully reduced", num, den),
                ));
            }
        }
    }
    Ok(())
}

fn check_context_stack_suffix_preserved(graph: &Graph) -> Result<(), DataflowError> {
    for node in graph.inner.node_indices() {
        let Some(parent) = graph.node(node).and_then(|n| n.parent) else {
            continue;
        };
        let node_ctx = context_stack(graph, node);
        let parent_ctx = context_stack(graph, parent);
        let is_suffix = node_ctx.len() >= parent_ctx.len()
            && node_ctx[node_ctx.len() - parent_ctx.len()..] == parent_ctx[..];
        if !is_suffix {
            return Err(DataflowError::structural(
                node_path(graph, node),
                "context stack is not a suffix-preserving extension of its parent's",
            ));
        }
    }
    Ok(())
}
