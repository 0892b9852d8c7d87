//! Dataflow graph compiler library: hierarchical signal-flow graph IR,
//! structural transformation passes (clock-domain specialization, blocking,
//! context discovery, thread partitioning with lock-free FIFOs), and the
//! emission driver contract a textual C backend would sit behind.

pub mod algo;
pub mod cache;
pub mod emit;
pub mod error;
pub mod fifo_protocol;
pub mod graph;
pub mod node;
pub mod passes;
pub mod port;
pub mod types;
pub mod validate;

pub use error::DataflowError;
pub use graph::{Graph, GraphNode, NodeRef};
pub use node::NodeKind;
pub use port::{Arc, Port, PortDirection};
pub use types::{BaseKind, DataType, NumericValue, OverflowBehavior};
pub use validate::validate;
