//! Per-node execution state.

use serde::{Deserialize, Serialize};

use super::{Status, Value};

/// State of a single node within one line run.
///
/// A node bypassed by a fired skip clause keeps the resolved return value as
/// its observable output (`Bypassed { return_value: Some(_) }`), so that
/// downstream consumers see a value even though the node never ran. Use
/// [`NodeState::output`] instead of matching on the variants to honor that.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Running,
    Completed {
        output: Value,
    },
    Bypassed {
        #[serde(default)]
        return_value: Option<Value>,
    },
}

impl NodeState {
    /// The node's observable output, if it has one.
    pub fn output(&self) -> Option<&Value> {
        match self {
            NodeState::Completed { output } => Some(output),
            NodeState::Bypassed { return_value } => return_value.as_ref(),
            _ => None,
        }
    }

    /// True if the node was bypassed, with or without a return value.
    pub fn is_bypassed(&self) -> bool {
        matches!(self, NodeState::Bypassed { .. })
    }

    /// True if the node was bypassed and has no observable output.
    /// Bindings referencing such a node cannot resolve.
    pub fn is_bypassed_without_output(&self) -> bool {
        matches!(self, NodeState::Bypassed { return_value: None })
    }

    /// True once the node has reached `Completed` or `Bypassed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Completed { .. } | NodeState::Bypassed { .. })
    }

    /// Status lattice projection of this state.
    pub fn status(&self) -> Status {
        match self {
            NodeState::Pending => Status::NotStarted,
            NodeState::Running => Status::Running,
            NodeState::Completed { .. } => Status::Completed,
            NodeState::Bypassed { .. } => Status::Bypassed,
        }
    }
}
