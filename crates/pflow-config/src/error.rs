//! Load-time errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a flow definition, before any run starts.
#[derive(Debug, Error)]
pub enum FlowLoadError {
    #[error("failed to parse flow definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid flow: {0}")]
    Validation(String),

    #[error("cycle detected in node references: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
