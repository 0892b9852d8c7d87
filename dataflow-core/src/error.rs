//! Error taxonomy.
//!
//! Each variant corresponds to a row of the error-kind table: structural
//! invariant violations caught during graph mutation, dangling references
//! caught during removal/copy, literal parse failures, deliberately
//! unimplemented corners (upsample specialization), and failures raised by a
//! transformation pass partway through rewriting the graph.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataflowError {
    #[error("structural invariant violated at {path}: {rule}")]
    Structural { path: String, rule: String },

    #[error("referential integrity violated: {detail}")]
    ReferentialIntegrity { detail: String },

    #[error("parse error: {detail}")]
    Parse { detail: String },

    #[error("unsupported: {detail}")]
    Unsupported { detail: String },

    #[error("transformation pass '{pass}' failed: {detail}")]
    Transformation { pass: String, detail: String },
}

impl DataflowError {
    pub fn structural(path: impl Into<String>, rule: impl Into<String>) -> Self {
        DataflowError::Structural {
            path: path.into(),
            rule: rule.into(),
        }
    }

    pub fn referential_integrity(detail: impl Into<String>) -> Self {
        DataflowError::ReferentialIntegrity {
            detail: detail.into(),
        }
    }

    pub fn unsupported(detail: impl Into<String>) -> Self {
        DataflowError::Unsupported {
            detail: detail.into(),
        }
    }

    pub fn transformation(pass: impl Into<String>, detail: impl Into<String>) -> Self {
        DataflowError::Transformation {
            pass: pass.into(),
            detail: detail.into(),
        }
    }
}
