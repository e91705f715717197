//! Scheduler errors.

use thiserror::Error;

use pflow_types::NodeName;

/// Errors surfaced by the DAG manager and the value resolver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DagError {
    /// A binding referenced a node that was bypassed without an output.
    #[error(
        "node '{reference}' has been bypassed and provides no output; \
         refer to a node that will not be bypassed"
    )]
    ReferenceNodeBypassed { reference: NodeName },

    /// A binding referenced an unknown node, input, or path.
    #[error("invalid reference `{reference}`: {reason}")]
    InvalidReference { reference: String, reason: String },
}

impl DagError {
    pub(crate) fn invalid(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        DagError::InvalidReference { reference: reference.into(), reason: reason.into() }
    }
}

/// A [`DagError`] attributed to the node whose evaluation raised it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("node `{node}`: {source}")]
pub struct NodeFailure {
    pub node: NodeName,
    #[source]
    pub source: DagError,
}
