//! Node definitions.

use serde::{Deserialize, Serialize};

use pflow_types::{NodeName, Value};

use super::{Bindings, InputBinding};

/// Skip clause: when `when` resolves to `is`, the node does not run and
/// `return` is recorded as its output instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkipConfig {
    #[serde(rename = "when")]
    pub condition: InputBinding,
    #[serde(rename = "is")]
    pub condition_value: Value,
    #[serde(rename = "return")]
    pub return_value: InputBinding,
}

/// Activate clause: the node runs only when `when` resolves to `is`;
/// otherwise it is bypassed without an output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivateConfig {
    #[serde(rename = "when")]
    pub condition: InputBinding,
    #[serde(rename = "is")]
    pub condition_value: Value,
}

/// One node of a flow. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub name: NodeName,
    /// Name of the callable in the registry that executes this node.
    pub tool: String,
    #[serde(default)]
    pub inputs: Bindings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activate: Option<ActivateConfig>,
    /// Aggregation nodes run once per batch over per-line vectors and are
    /// excluded from per-line scheduling.
    #[serde(default)]
    pub aggregation: bool,
}

impl Node {
    /// Every binding that participates in the dependency graph: the inputs
    /// plus the skip condition, skip return value, and activate condition.
    pub fn dependencies(&self) -> impl Iterator<Item = &InputBinding> {
        self.inputs
            .values()
            .chain(self.skip.iter().flat_map(|s| [&s.condition, &s.return_value]))
            .chain(self.activate.iter().map(|a| &a.condition))
    }

    /// Names of the nodes this node references.
    pub fn node_references(&self) -> impl Iterator<Item = &str> {
        self.dependencies().filter_map(InputBinding::node_ref)
    }
}
