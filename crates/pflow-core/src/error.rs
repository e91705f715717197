//! Engine error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pflow_config::FlowLoadError;
use pflow_dag::{DagError, NodeFailure};
use pflow_types::NodeName;

/// Errors surfaced by the execution engine.
///
/// Recoverable kinds stay local to the line that raised them; `Load`, `Io`
/// and `Canceled` are global to the run.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Load(#[from] FlowLoadError),

    /// A binding failed to resolve or referenced a bypassed node.
    #[error(transparent)]
    Dag(#[from] NodeFailure),

    #[error("node `{node}` execution failed: {message}")]
    NodeExecution { node: NodeName, message: String },

    #[error("failed to resolve line inputs: {message}")]
    InputResolution { message: String },

    #[error("run canceled")]
    Canceled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// Stable kind tag used in run records and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::Load(_) => "FlowLoadError",
            FlowError::Dag(failure) => match failure.source {
                DagError::ReferenceNodeBypassed { .. } => "ReferenceNodeBypassed",
                DagError::InvalidReference { .. } => "InvalidReference",
            },
            FlowError::NodeExecution { .. } => "NodeExecutionError",
            FlowError::InputResolution { .. } => "InputResolutionFailed",
            FlowError::Canceled => "Canceled",
            FlowError::Io(_) => "IoError",
        }
    }

    /// The node this error is attributed to, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            FlowError::Dag(failure) => Some(&failure.node),
            FlowError::NodeExecution { node, .. } => Some(node),
            _ => None,
        }
    }
}

/// Serializable form of a [`FlowError`] carried in run records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeName>,
    pub kind: String,
    pub message: String,
}

impl From<&FlowError> for RunError {
    fn from(error: &FlowError) -> Self {
        Self {
            node: error.node().map(str::to_string),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}
