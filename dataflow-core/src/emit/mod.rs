//! Emission driver contract (component K).

pub mod driver;
pub mod signature;

pub use driver::{build_partition_program, EmitOp, PartitionProgram};
pub use signature::{signature, SignatureParam};
