//! Status lattice for nodes and runs.

use serde::{Deserialize, Serialize};

/// Status of a node run or a line run.
///
/// `NotStarted < Running < { Completed, Bypassed, Failed, Canceled }`;
/// the terminal states are mutually exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NotStarted,
    Running,
    Completed,
    Bypassed,
    Failed,
    Canceled,
}

impl Status {
    /// True once the status can no longer change.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::NotStarted | Status::Running)
    }

    /// True when the status does not degrade an aggregate run status.
    /// Bypassed nodes count as good: they were excluded on purpose.
    pub fn is_good(self) -> bool {
        matches!(self, Status::Completed | Status::Bypassed)
    }
}
