//! Developer-tooling entry point, run as `cargo run -p xtask -- <command>`.
//!
//! `validate-nodes` is a quick sanity check for a JSON graph fixture: it
//! parses every node's `kind_tag`/`attrs` pair through
//! `NodeKind::from_attrs` without building a graph, so a malformed fixture
//! fails fast with the node id that's wrong instead of surfacing as an
//! opaque `dataflow-cli` error later.

use anyhow::{bail, Context, Result};
use dataflow_core::node::NodeKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Deserialize)]
struct NodeSpec {
    id: String,
    kind_tag: String,
    #[serde(default)]
    attrs: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct GraphSpec {
    nodes: Vec<NodeSpec>,
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("validate-nodes") => {
            let path: PathBuf = args.next().context("usage: xtask validate-nodes <path>")?.into();
            validate_nodes(&path)
        }
        Some(other) => bail!("unknown xtask command '{}'", other),
        None => bail!("usage: xtask <validate-nodes> ..."),
    }
}

fn validate_nodes(path: &PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let spec: GraphSpec = serde_json::from_str(&text).context("parsing graph JSON")?;

    let mut failures = 0;
    for node in &spec.nodes {
        if let Err(err) = NodeKind::from_attrs(&node.kind_tag, &node.attrs) {
            eprintln!("node {}: {}", node.id, err);
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{} node(s) failed to parse", failures);
    }
    println!("{} node(s) validated", spec.nodes.len());
    Ok(())
}
