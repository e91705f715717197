//! Shared types for the pflow orchestration engine.

mod ids;
mod params;
mod state;
mod status;

pub use ids::NodeName;
pub use params::ParamSpec;
pub use state::NodeState;
pub use status::Status;

/// Value currency of the engine: flow inputs, node outputs, literals.
pub type Value = serde_json::Value;
