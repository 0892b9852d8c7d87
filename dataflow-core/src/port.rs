//! Port & arc model (component B).
//!
//! A [`Port`] is owned by its node and only carries the node-local metadata
//! needed to validate connections (its index, direction, and `DataType`).
//! An [`Arc`] is the edge weight of the graph (see `graph.rs`): it names the
//! source/destination port indices it connects and the `DataType`/sample
//! time the connection carries. The graph's edge list is the single source
//! of truth for "which arcs touch this port" — `Port` does not duplicate an
//! arc set of its own, so rewiring an arc can never leave a stale reference
//! on either endpoint's port.

use crate::types::DataType;
use serde::{Deserialize, Serialize};

/// A port is either a direct data port or an order-constraint port.
/// Order-constraint ports carry scheduling edges with no data payload —
/// used by `StateUpdate` nodes to force a state commit after every reader
/// of the prior state has run, without the commit itself being a data
/// dependency any reader actually consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
    OrderConstraintInput,
    OrderConstraintOutput,
}

impl PortDirection {
    pub fn is_order_constraint(&self) -> bool {
        matches!(
            self,
            PortDirection::OrderConstraintInput | PortDirection::OrderConstraintOutput
        )
    }
}

/// Node-local port metadata. `index` is the position within the node's
/// input or output port list (whichever `direction` says), not a global id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub index: u32,
    pub direction: PortDirection,
    pub data_type: DataType,
}

impl Port {
    pub fn new(index: u32, direction: PortDirection, data_type: DataType) -> Self {
        Port {
            index,
            direction,
            data_type,
        }
    }
}

/// An edge of the graph: connects one node's output port to another node's
/// input port. `sample_time` is the period, in base-rate samples, at which
/// this arc fires; it is set by clock-domain specialization (component F)
/// and read by blocking (component G).
///
/// `order_constraint` marks an edge created purely for scheduling (no
/// emitted data movement) — `data_type` still carries a placeholder type so
/// existing validation code has something to check, but emission must skip
/// it when deciding whether to copy anything.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub src_port: u32,
    pub dst_port: u32,
    pub data_type: DataType,
    pub sample_time: u64,
    pub order_constraint: bool,
}

impl Arc {
    pub fn new(src_port: u32, dst_port: u32, data_type: DataType, sample_time: u64) -> Self {
        Arc {
            src_port,
            dst_port,
            data_type,
            sample_time,
            order_constraint: false,
        }
    }

    /// An order-constraint edge: no data payload, used to pin scheduling
    /// order between a `StateUpdate` node and the readers of the state it
    /// is about to overwrite.
    pub fn new_order_constraint(src_port: u32, dst_port: u32) -> Self {
        Arc {
            src_port,
            dst_port,
            data_type: DataType::bool_scalar(),
            sample_time: 0,
            order_constraint: true,
        }
    }

    /// Rewires this arc to originate from a different output port, e.g.
    /// when a blocking-domain bridge is spliced in front of the original
    /// producer. Leaves `dst_port`/`data_type`/`sample_time` untouched.
    pub fn set_src_port(&mut self, src_port: u32) {
        self.src_port = src_port;
    }

    /// Rewires this arc to terminate at a different input port, e.g. when a
    /// thread-crossing FIFO is spliced in front of the original consumer.
    pub fn set_dst_port(&mut self, dst_port: u32) {
        self.dst_port = dst_port;
    }
}
