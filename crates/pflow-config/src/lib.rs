//! Flow definition parsing and validation for pflow.

mod binding;
mod error;
mod flow;
mod node;

pub use binding::{Bindings, InputBinding};
pub use error::FlowLoadError;
pub use flow::{Flow, FlowInputSpec, ValueKind};
pub use node::{ActivateConfig, Node, SkipConfig};
