//! Node taxonomy (component C).
//!
//! `NodeKind` is a tagged union over every node variant, dispatched by
//! `match` rather than a trait-object hierarchy. Hierarchy (subsystem
//! containment, context stacks) is not carried inline on `NodeKind` — it
//! lives in `Graph`'s parent map (component D) — so a node's own data stays
//! just its operational parameters.

use crate::error::DataflowError;
use crate::port::{Port, PortDirection};
use crate::types::{DataType, NumericValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextRootKind {
    EnabledSubsystem,
    Muxed,
    ForLoop,
}

/// Pre- and post-specialization clock domain shape (component F).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockDomainSpec {
    /// Not yet specialized; `rate_relative_to_base` has not been computed.
    Generic,
    Downsample { factor: u32 },
    Upsample { factor: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterKind {
    Input,
    Output,
    Visualization,
    Unconnected,
    Terminator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveOp {
    Add,
    Mul,
    Product,
    LogicalOp(LogicalOpKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOpKind {
    And,
    Or,
    Xor,
    Not,
}

/// Role a `ThreadCrossingFifo` plays at one endpoint, mirroring the
/// original's `Role` enum (`LocklessThreadCrossingFIFO.cpp`): which cached
/// index belongs to this side and whether the full-cache fast path applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FifoRole {
    None,
    Producer,
    Consumer,
    ProducerFullCache,
    ConsumerFullCache,
}

impl FifoRole {
    pub fn is_producer(&self) -> bool {
        matches!(self, FifoRole::Producer | FifoRole::ProducerFullCache)
    }

    pub fn is_full_cache(&self) -> bool {
        matches!(self, FifoRole::ProducerFullCache | FifoRole::ConsumerFullCache)
    }
}

/// Every node variant the graph can contain, plus the primitive/constant/
/// delay/black-box variants added so the passes have nontrivial subjects
/// (feedback loops, stateful nodes, lone constants) to act on in tests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NodeKind {
    Subsystem {
        name: String,
    },
    ContextRoot {
        kind: ContextRootKind,
        /// true if this root's body must be emitted as one contiguous
        /// block (e.g. a for-loop counter init/increment straddling it);
        /// false if its statements may be interleaved with sibling context.
        contiguous_emission: bool,
    },
    ClockDomain {
        spec: ClockDomainSpec,
        use_vector_sampling_mode: bool,
        /// Reduced rate relative to the design's base rate, computed by
        /// folding over the entire ancestor chain, not just the immediate
        /// parent. `None` until computed.
        rate_relative_to_base: Option<(u32, u32)>,
    },
    RateChangeInput {
        ratio_num: u32,
        ratio_den: u32,
    },
    RateChangeOutput {
        ratio_num: u32,
        ratio_den: u32,
    },
    /// §4.5 support node: a downsample domain's context driver. Counts
    /// `0..modulus` at the base rate and fires the domain's body on wrap,
    /// the way a plain `for`-loop counter drives a `ContextRoot`.
    WrappingCounter {
        modulus: u32,
    },
    /// §4.5 support node: spliced onto an IO-output arc that leaves a
    /// downsample domain, so the domain's held value keeps presenting at
    /// the surrounding higher-rate sampling points between its own firings,
    /// instead of an arbitrary stale sample.
    RepeatOutputLatch {
        ratio_num: u32,
        ratio_den: u32,
    },
    BlockingDomain {
        /// Outer loop count, in samples: `blocking_length / sub_blocking_length`
        /// iterations of the wrapped body. `blocking_length % sub_blocking_length
        /// == 0` is enforced by `validate`.
        blocking_length: u32,
        sub_blocking_length: u32,
    },
    BlockingInput,
    BlockingOutput,
    BlockingDomainBridge,
    Master {
        kind: MasterKind,
    },
    ThreadCrossingFifo {
        fifo_length: u32,
        partition_src: i32,
        partition_dst: i32,
        init_conditions: Vec<NumericValue>,
    },
    StateUpdate {
        /// Node index of the `Delay`/stateful `BlackBox` this update node
        /// commits state for, recorded as a raw index so this variant does
        /// not need to know the graph's index type.
        target: u32,
    },
    /// A placeholder reserving a `contiguous_emission` context root's slot
    /// when every node originally scheduled inside it has been hoisted out
    /// by an earlier pass (component H). Distinct from `StateUpdate` even
    /// though both are synthetic, pass-inserted nodes: a `StateUpdate`'s
    /// `target` indexes the stateful node it commits, while this node
    /// carries no payload at all.
    ContextPlaceholder,
    Delay {
        length: u32,
        initial_conditions: Vec<NumericValue>,
    },
    Constant {
        value: NumericValue,
    },
    Primitive {
        op: PrimitiveOp,
        num_inputs: u32,
    },
    BlackBox {
        name: String,
        stateful: bool,
        num_inputs: u32,
        num_outputs: u32,
    },
}

impl NodeKind {
    /// Number of input ports this node presents, independent of how many
    /// are currently wired — used to validate arc endpoints.
    pub fn num_input_ports(&self) -> u32 {
        match self {
            NodeKind::Subsystem { .. } => 0,
            NodeKind::ContextRoot { .. } => 1,
            NodeKind::ClockDomain { .. } => 1,
            NodeKind::RateChangeInput { .. } => 1,
            NodeKind::RateChangeOutput { .. } => 1,
            NodeKind::WrappingCounter { .. } => 0,
            NodeKind::RepeatOutputLatch { .. } => 1,
            NodeKind::BlockingDomain { .. } => 1,
            NodeKind::BlockingInput => 1,
            NodeKind::BlockingOutput => 1,
            NodeKind::BlockingDomainBridge => 1,
            NodeKind::Master { kind: MasterKind::Input } => 0,
            NodeKind::Master { .. } => 1,
            NodeKind::ThreadCrossingFifo { .. } => 1,
            NodeKind::StateUpdate { .. } => 1,
            NodeKind::ContextPlaceholder => 0,
            NodeKind::Delay { .. } => 1,
            NodeKind::Constant { .. } => 0,
            NodeKind::Primitive { num_inputs, .. } => *num_inputs,
            NodeKind::BlackBox { num_inputs, .. } => *num_inputs,
        }
    }

    pub fn num_output_ports(&self) -> u32 {
        match self {
            NodeKind::Subsystem { .. } => 0,
            NodeKind::ContextRoot { .. } => 1,
            NodeKind::ClockDomain { .. } => 1,
            NodeKind::RateChangeInput { .. } => 1,
            NodeKind::RateChangeOutput { .. } => 1,
            NodeKind::WrappingCounter { .. } => 1,
            NodeKind::RepeatOutputLatch { .. } => 1,
            NodeKind::BlockingDomain { .. } => 1,
            NodeKind::BlockingInput => 1,
            NodeKind::BlockingOutput => 1,
            NodeKind::BlockingDomainBridge => 1,
            NodeKind::Master { kind: MasterKind::Input } => 1,
            NodeKind::Master { .. } => 0,
            NodeKind::ThreadCrossingFifo { .. } => 1,
            NodeKind::StateUpdate { .. } => 0,
            NodeKind::ContextPlaceholder => 0,
            NodeKind::Delay { .. } => 1,
            NodeKind::Constant { .. } => 1,
            NodeKind::Primitive { .. } => 1,
            NodeKind::BlackBox { num_outputs, .. } => *num_outputs,
        }
    }

    /// Whether this node carries state across invocations and therefore
    /// needs a `StateUpdate` node created for it.
    pub fn has_state(&self) -> bool {
        match self {
            NodeKind::Delay { .. } => true,
            NodeKind::BlackBox { stateful, .. } => *stateful,
            // A downsample/upsample domain's output latch holds the prior
            // sample across every base-rate tick it does not itself fire
            // on, so it needs the same order-constrained commit a delay
            // gets rather than recomputing a value every tick.
            NodeKind::RateChangeOutput { .. } => true,
            // Same reasoning as RateChangeOutput: between its own firings
            // the latch keeps presenting the held sample rather than
            // recomputing one.
            NodeKind::RepeatOutputLatch { .. } => true,
            _ => false,
        }
    }

    /// Whether this node is a structural container whose body is subject
    /// to context-stack rules (component H), as opposed to a leaf compute
    /// node. `ClockDomain` and `BlockingDomain` are context roots in their
    /// own right per spec.md §4.7 (an `if`/`else` and a `for` loop,
    /// respectively) in addition to the generic `ContextRoot` variant.
    pub fn is_context_root(&self) -> bool {
        matches!(
            self,
            NodeKind::ContextRoot { .. } | NodeKind::ClockDomain { .. } | NodeKind::BlockingDomain { .. }
        )
    }

    pub fn is_blocking_boundary(&self) -> bool {
        matches!(
            self,
            NodeKind::BlockingDomain { .. }
                | NodeKind::BlockingInput
                | NodeKind::BlockingOutput
                | NodeKind::BlockingDomainBridge
        )
    }

    fn ports_for(&self, direction: PortDirection) -> Vec<Port> {
        let n = match direction {
            PortDirection::Input => self.num_input_ports(),
            PortDirection::Output => self.num_output_ports(),
        };
        (0..n)
            .map(|i| Port::new(i, direction, DataType::bool_scalar()))
            .collect()
    }

    pub fn input_ports(&self) -> Vec<Port> {
        self.ports_for(PortDirection::Input)
    }

    pub fn output_ports(&self) -> Vec<Port> {
        self.ports_for(PortDirection::Output)
    }

    /// Parses the node-kind-specific fields out of a GraphML-style
    /// attribute map. `kind_tag` is the `block_node_type` value; the
    /// remaining attrs are looked up by key (`block_function`,
    /// `InitialCondition`, `UpsampleRatio`, `InputOps`, `LogicalOp`,
    /// `TgtDataType`).
    pub fn from_attrs(
        kind_tag: &str,
        attrs: &BTreeMap<String, String>,
    ) -> Result<NodeKind, DataflowError> {
        let get = |key: &str| attrs.get(key).map(|s| s.as_str());

        match kind_tag {
            "Subsystem" => Ok(NodeKind::Subsystem {
                name: get("block_function").unwrap_or_default().to_string(),
            }),
            "Delay" => {
                let length: u32 = get("block_function")
                    .unwrap_or("1")
                    .parse()
                    .map_err(|_| DataflowError::Parse {
                        detail: "Delay length not an integer".into(),
                    })?;
                let initial_conditions = match get("InitialCondition") {
                    Some(s) => NumericValue::parse_vector(s)?,
                    None => Vec::new(),
                };
                Ok(NodeKind::Delay {
                    length,
                    initial_conditions,
                })
            }
            "Constant" => {
                let value = NumericValue::parse(get("InitialCondition").ok_or_else(|| {
                    DataflowError::Parse {
                        detail: "Constant node missing InitialCondition".into(),
                    }
                })?)?;
                Ok(NodeKind::Constant { value })
            }
            "Product" => Ok(NodeKind::Primitive {
                op: PrimitiveOp::Product,
                num_inputs: get("InputOps")
                    .map(|s| s.split(',').count() as u32)
                    .unwrap_or(2),
            }),
            "Add" => Ok(NodeKind::Primitive {
                op: PrimitiveOp::Add,
                num_inputs: 2,
            }),
            "LogicalOperator" => {
                let kind = match get("LogicalOp") {
                    Some("and") => LogicalOpKind::And,
                    Some("or") => LogicalOpKind::Or,
                    Some("xor") => LogicalOpKind::Xor,
                    Some("not") => LogicalOpKind::Not,
                    other => {
                        return Err(DataflowError::Parse {
                            detail: format!("unknown LogicalOp {:?}", other),
                        })
                    }
                };
                Ok(NodeKind::Primitive {
                    op: PrimitiveOp::LogicalOp(kind),
                    num_inputs: if matches!(kind, LogicalOpKind::Not) { 1 } else { 2 },
                })
            }
            "BlackBox" => Ok(NodeKind::BlackBox {
                name: get("block_function").unwrap_or_default().to_string(),
                stateful: get("block_function") == Some("stateful"),
                num_inputs: 1,
                num_outputs: 1,
            }),
            "ClockDomain" => {
                let spec = match get("UpsampleRatio") {
                    Some(s) => {
                        let factor: u32 = s.parse().map_err(|_| DataflowError::Parse {
                            detail: "UpsampleRatio not an integer".into(),
                        })?;
                        ClockDomainSpec::Upsample { factor }
                    }
                    None => ClockDomainSpec::Generic,
                };
                Ok(NodeKind::ClockDomain {
                    spec,
                    // Decided during blocking (§4.6), not at import time.
                    use_vector_sampling_mode: false,
                    rate_relative_to_base: None,
                })
            }
            "MasterInput" => Ok(NodeKind::Master { kind: MasterKind::Input }),
            "MasterOutput" => Ok(NodeKind::Master { kind: MasterKind::Output }),
            "MasterUnconnected" => Ok(NodeKind::Master {
                kind: MasterKind::Unconnected,
            }),
            "MasterTerminator" => Ok(NodeKind::Master {
                kind: MasterKind::Terminator,
            }),
            "MasterVisualization" => Ok(NodeKind::Master {
                kind: MasterKind::Visualization,
            }),
            other => Err(DataflowError::Unsupported {
                detail: format!("unknown block_node_type '{}'", other),
            }),
        }
    }

    /// Round-trips this node's fields back into attribute-map form. Must
    /// satisfy `from_attrs(kind_tag, to_attrs()) == self` for every variant
    /// `from_attrs` accepts (round-trip tested).
    pub fn to_attrs(&self) -> (String, BTreeMap<String, String>) {
        let mut attrs = BTreeMap::new();
        let kind_tag = match self {
            NodeKind::Subsystem { name } => {
                attrs.insert("block_function".into(), name.clone());
                "Subsystem"
            }
            NodeKind::Delay {
                length,
                initial_conditions,
            } => {
                attrs.insert("block_function".into(), length.to_string());
                attrs.insert(
                    "InitialCondition".into(),
                    render_vector(initial_conditions),
                );
                "Delay"
            }
            NodeKind::Constant { value } => {
                attrs.insert("InitialCondition".into(), render_value(value));
                "Constant"
            }
            NodeKind::Primitive {
                op: PrimitiveOp::Product,
                num_inputs,
            } => {
                attrs.insert(
                    "InputOps".into(),
                    (0..*num_inputs)
                        .map(|i| i.to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                );
                "Product"
            }
            NodeKind::Primitive {
                op: PrimitiveOp::Add, ..
            } => "Add",
            NodeKind::Primitive {
                op: PrimitiveOp::Mul, ..
            } => "Product",
            NodeKind::Primitive {
                op: PrimitiveOp::LogicalOp(kind),
                ..
            } => {
                let tag = match kind {
                    LogicalOpKind::And => "and",
                    LogicalOpKind::Or => "or",
                    LogicalOpKind::Xor => "xor",
                    LogicalOpKind::Not => "not",
                };
                attrs.insert("LogicalOp".into(), tag.into());
                "LogicalOperator"
            }
            NodeKind::BlackBox {
                name, stateful, ..
            } => {
                attrs.insert(
                    "block_function".into(),
                    if *stateful { "stateful".into() } else { name.clone() },
                );
                "BlackBox"
            }
            NodeKind::ClockDomain { spec, .. } => {
                if let ClockDomainSpec::Upsample { factor } = spec {
                    attrs.insert("UpsampleRatio".into(), factor.to_string());
                }
                "ClockDomain"
            }
            NodeKind::Master { kind } => match kind {
                MasterKind::Input => "MasterInput",
                MasterKind::Output => "MasterOutput",
                MasterKind::Unconnected => "MasterUnconnected",
                MasterKind::Terminator => "MasterTerminator",
                MasterKind::Visualization => "MasterVisualization",
            },
            // The remaining variants are passes' internal support nodes;
            // they never round-trip through the external attribute format.
            _ => "Internal",
        };
        (kind_tag.to_string(), attrs)
    }
}

fn render_value(v: &NumericValue) -> String {
    match v {
        NumericValue::Int { re, im: None } => re.to_string(),
        NumericValue::Int { re, im: Some(im) } => format!("{}+{}i", re, im),
        NumericValue::Float { re, im: None } => re.to_string(),
        NumericValue::Float { re, im: Some(im) } => format!("{}+{}i", re, im),
    }
}

fn render_vector(values: &[NumericValue]) -> String {
    format!(
        "[{}]",
        values.iter().map(render_value).collect::<Vec<_>>().join(", ")
    )
}
