//! Integration test: drives the `dataflow-cli` binary against a small JSON
//! graph dump exercising a partition crossing, checking it runs the full
//! pass pipeline without error.

use std::io::Write;
use std::process::Command;

const GRAPH_JSON: &str = r#"
{
  "nodes": [
    {"id": "in", "kind_tag": "MasterInput", "attrs": {}, "partition": 0},
    {"id": "out", "kind_tag": "MasterOutput", "attrs": {}, "partition": 1}
  ],
  "arcs": [
    {
      "src": "in", "src_port": 0, "dst": "out", "dst_port": 0,
      "data_type": {"base_kind": "Int", "signed": true, "total_bits": 32, "fractional_bits": 0, "dims": [1], "complex": false},
      "sample_time": 1
    }
  ]
}
"#;

#[test]
fn cli_runs_pass_pipeline_over_a_partition_crossing_graph() {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("create temp graph file");
    file.write_all(GRAPH_JSON.as_bytes()).unwrap();

    let exe = env!("CARGO_BIN_EXE_dataflow-cli");
    let output = Command::new(exe)
        .arg(file.path())
        .output()
        .expect("failed to run dataflow-cli");

    assert!(
        output.status.success(),
        "dataflow-cli exited with {:?}, stderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}
