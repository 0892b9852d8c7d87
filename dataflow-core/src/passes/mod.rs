//! Structural transformation passes (components F, G, H, I).
//!
//! Passes run in the order the emission driver (component K) expects:
//! clock-domain specialization, then context discovery/replication, then
//! blocking-group discovery and domain insertion, then partitioning and
//! FIFO insertion, then state-update node creation.

pub mod arc_group;
pub mod blocking;
pub mod clock_domain;
pub mod context;
pub mod partition;
pub mod state_update;
