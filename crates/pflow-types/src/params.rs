//! Callable parameter metadata.

use serde::{Deserialize, Serialize};

/// One parameter of a node callable.
///
/// An ordered list of these is the only callable metadata the engine
/// consumes: whether a parameter has a default decides if a binding to a
/// bypassed node is omitted (default wins) or bound to null.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default)]
    pub has_default: bool,
}

impl ParamSpec {
    /// A required parameter without a default value.
    pub fn required(name: impl Into<String>) -> Self {
        Self { name: name.into(), has_default: false }
    }

    /// A parameter whose callable supplies a default when it is omitted.
    pub fn with_default(name: impl Into<String>) -> Self {
        Self { name: name.into(), has_default: true }
    }
}
