//! Per-partition compute-function ABI, owned by component K.
//!
//! A partition's compute function takes its block-expanded input ports as
//! scalar parameters where possible, reference ("out") parameters for every
//! output (so the caller sees the values without a return-by-value copy of
//! a whole block), and splits any complex-typed port into separate `_re`/
//! `_im` parameters — the original compiler's C emitter has no native
//! complex type, so real/imaginary always travel as a pair.

use crate::port::{Port, PortDirection};
use crate::types::DataType;

#[derive(Clone, Debug, PartialEq)]
pub struct SignatureParam {
    pub name: String,
    pub direction: PortDirection,
    pub data_type: DataType,
    /// True if this parameter is passed by pointer/reference in the
    /// emitted C — always true for outputs and for any non-scalar
    /// (block-expanded or vector) type.
    pub by_reference: bool,
}

/// Builds the parameter list for one node's compute function at the given
/// block size. `base_name` is the node's port-naming prefix (e.g. its id).
pub fn signature(base_name: &str, ports: &[Port], block_size: u32) -> Vec<SignatureParam> {
    let mut params = Vec::new();
    for port in ports {
        let dt = if block_size > 1 {
            port.data_type.expand_for_block(block_size)
        } else {
            port.data_type.clone()
        };
        let by_reference = matches!(port.direction, PortDirection::Output) || !dt.is_scalar();

        if dt.complex {
            params.push(SignatureParam {
                name: format!("{}_{}_re", base_name, port.index),
                direction: port.direction,
                data_type: DataType {
                    complex: false,
                    ..dt.clone()
                },
                by_reference,
            });
            params.push(SignatureParam {
                name: format!("{}_{}_im", base_name, port.index),
                direction: port.direction,
                data_type: DataType {
                    complex: false,
                    ..dt
                },
                by_reference,
            });
        } else {
            params.push(SignatureParam {
                name: format!("{}_{}", base_name, port.index),
                direction: port.direction,
                data_type: dt,
                by_reference,
            });
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseKind;

    #[test]
    fn scalar_input_is_passed_by_value() {
        let ports = vec![Port::new(0, PortDirection::Input, DataType::scalar(BaseKind::Int, true, 16))];
        let sig = signature("n1", &ports, 1);
        assert_eq!(sig.len(), 1);
        assert!(!sig[0].by_reference);
    }

    #[test]
    fn output_is_always_by_reference() {
        let ports = vec![Port::new(0, PortDirection::Output, DataType::scalar(BaseKind::Int, true, 16))];
        let sig = signature("n1", &ports, 1);
        assert!(sig[0].by_reference);
    }

    #[test]
    fn blocked_input_is_by_reference() {
        let ports = vec![Port::new(0, PortDirection::Input, DataType::scalar(BaseKind::Int, true, 16))];
        let sig = signature("n1", &ports, 4);
        assert!(sig[0].by_reference);
        assert_eq!(sig[0].data_type.dims, vec![4]);
    }

    #[test]
    fn complex_port_splits_into_re_im() {
        let mut dt = DataType::scalar(BaseKind::Float, true, 32);
        dt.complex = true;
        let ports = vec![Port::new(0, PortDirection::Input, dt)];
        let sig = signature("n1", &ports, 1);
        assert_eq!(sig.len(), 2);
        assert_eq!(sig[0].name, "n1_0_re");
        assert_eq!(sig[1].name, "n1_0_im");
        assert!(!sig[0].data_type.complex);
    }
}
