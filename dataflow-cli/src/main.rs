//! Thin driver binary: reads a JSON attribute-map dump (the stand-in for a
//! GraphML file — no XML library is in scope), builds a
//! `dataflow_core::Graph` from it, runs the pass pipeline, and prints a
//! summary. The real GraphML parser and C emitter live outside this crate;
//! this binary only wires the in-scope pieces together.

use anyhow::{Context, Result};
use clap::Parser;
use dataflow_core::graph::{Graph, GraphNode};
use dataflow_core::node::NodeKind;
use dataflow_core::passes::{blocking, clock_domain, context as context_pass, partition, state_update};
use dataflow_core::port::Arc as ArcWeight;
use dataflow_core::types::DataType;
use petgraph::stable_graph::NodeIndex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dataflow-cli", about = "Runs the dataflow graph compiler's structural passes")]
struct Args {
    /// Path to a JSON attribute-map dump of the graph.
    input: PathBuf,

    /// Base sub-blocking length applied to every discovered blocking group.
    #[arg(long, default_value_t = 4)]
    base_block_length: u32,
}

#[derive(Deserialize)]
struct NodeSpec {
    id: String,
    kind_tag: String,
    #[serde(default)]
    attrs: BTreeMap<String, String>,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    partition: Option<i32>,
}

#[derive(Deserialize)]
struct ArcSpec {
    src: String,
    src_port: u32,
    dst: String,
    dst_port: u32,
    data_type: DataType,
    sample_time: u64,
}

#[derive(Deserialize)]
struct GraphSpec {
    nodes: Vec<NodeSpec>,
    arcs: Vec<ArcSpec>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();
    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let spec: GraphSpec = serde_json::from_str(&text).context("parsing graph JSON")?;

    let mut graph = Graph::new();
    let mut ids: BTreeMap<String, NodeIndex> = BTreeMap::new();

    for node_spec in &spec.nodes {
        let kind = NodeKind::from_attrs(&node_spec.kind_tag, &node_spec.attrs)
            .with_context(|| format!("node {}", node_spec.id))?;
        let mut node = GraphNode::new(kind);
        node.partition = node_spec.partition;
        let idx = graph.add_node(node);
        ids.insert(node_spec.id.clone(), idx);
    }

    for node_spec in &spec.nodes {
        if let Some(parent_id) = &node_spec.parent {
            let idx = ids[&node_spec.id];
            let parent_idx = *ids
                .get(parent_id)
                .with_context(|| format!("node {} names unknown parent {}", node_spec.id, parent_id))?;
            graph.node_mut(idx).expect("just inserted").parent = Some(parent_idx);
        }
    }

    for arc_spec in &spec.arcs {
        let src = *ids
            .get(&arc_spec.src)
            .with_context(|| format!("arc names unknown source {}", arc_spec.src))?;
        let dst = *ids
            .get(&arc_spec.dst)
            .with_context(|| format!("arc names unknown destination {}", arc_spec.dst))?;
        let weight = ArcWeight::new(arc_spec.src_port, arc_spec.dst_port, arc_spec.data_type.clone(), arc_spec.sample_time);
        graph.add_arc(src, dst, weight)?;
    }

    tracing::info!(nodes = graph.node_count(), arcs = graph.arc_count(), "graph loaded");

    clock_domain::discover_clock_domain_parameters(&mut graph)?;
    match clock_domain::specialize(&mut graph) {
        Ok(()) => {}
        Err(err) => tracing::warn!(%err, "clock domain specialization left some domains unspecialized"),
    }

    let mut assigned_lengths = std::collections::HashMap::new();
    let base_sub_blocking_length = std::collections::HashMap::new();
    let groups = blocking::discover_blocking_groups(&graph, &base_sub_blocking_length)?;
    let groups = blocking::merge_blocking_groups_by_context_hierarchy(&mut graph, groups, &base_sub_blocking_length)?;
    let mut domains_created = 0;
    for group in &groups {
        if group.len() < 2 {
            continue;
        }
        blocking::assign_sub_blocking_length(&mut assigned_lengths, group, 1)?;
        blocking::insert_blocking_domain(&mut graph, group, args.base_block_length, 1)?;
        domains_created += 1;
    }

    for idx in graph.inner.node_indices().collect::<Vec<_>>() {
        let _ = context_pass::insert_dummy_replica_if_empty(&mut graph, idx);
    }

    let fifos = partition::insert_fifos_for_partition_crossings(&mut graph)?;
    let merged = partition::merge_redundant_fifos(&mut graph)?;
    let state_updates = state_update::create_state_update_nodes(&mut graph)?;

    dataflow_core::validate(&graph).context("graph failed post-pass validation")?;

    tracing::info!(
        blocking_domains = domains_created,
        fifos_inserted = fifos.len(),
        fifos_merged = merged,
        state_updates_created = state_updates.len(),
        final_nodes = graph.node_count(),
        final_arcs = graph.arc_count(),
        content_hash = %dataflow_core::cache::content_hash(&graph),
        "pass pipeline complete"
    );

    Ok(())
}
