//! Run records: per-node, per-line, aggregation, and batch results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pflow_types::{NodeName, Status, Value};

use super::RunError;

/// Record of one node within one line (or aggregation) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRunInfo {
    pub node: NodeName,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u128,
}

impl NodeRunInfo {
    /// Record for a node that reached a terminal state without running.
    pub fn untimed(node: impl Into<NodeName>, status: Status, output: Option<Value>) -> Self {
        let now = Utc::now();
        Self {
            node: node.into(),
            status,
            output,
            error: None,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }
}

/// Record of one line run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRunInfo {
    pub run_id: Uuid,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u128,
}

/// Everything a single line produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
    /// Materialized declared outputs; empty when the line did not complete.
    pub output: BTreeMap<String, Value>,
    pub run_info: LineRunInfo,
    /// Node records in the order the nodes terminated.
    pub node_run_infos: Vec<NodeRunInfo>,
    /// This line's contribution for every node an aggregation node reads:
    /// the node's output, or null when it was bypassed without one.
    pub aggregation_inputs: BTreeMap<NodeName, Value>,
}

impl LineResult {
    pub fn node_run_info(&self, node: &str) -> Option<&NodeRunInfo> {
        self.node_run_infos.iter().find(|info| info.node == node)
    }
}

/// Result of the aggregation pass over a finished batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationResult {
    pub node_run_infos: BTreeMap<NodeName, NodeRunInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl AggregationResult {
    pub fn status(&self) -> Status {
        if self.error.is_some() { Status::Failed } else { Status::Completed }
    }
}

/// Per-node terminal-state counts across a batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeStatusCounts {
    pub completed: usize,
    pub bypassed: usize,
    pub failed: usize,
}

/// Line-level breakdown across a batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineCounts {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
}

/// Structured status summary of a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSummary {
    pub nodes: BTreeMap<NodeName, NodeStatusCounts>,
    pub lines: LineCounts,
}

impl StatusSummary {
    pub fn from_lines(line_results: &[LineResult]) -> Self {
        let mut summary = Self { lines: LineCounts { total: line_results.len(), ..Default::default() }, ..Default::default() };
        for result in line_results {
            match result.run_info.status {
                Status::Completed => summary.lines.completed += 1,
                Status::Canceled => summary.lines.canceled += 1,
                _ => summary.lines.failed += 1,
            }
            for info in &result.node_run_infos {
                let counts = summary.nodes.entry(info.node.clone()).or_default();
                match info.status {
                    Status::Completed => counts.completed += 1,
                    Status::Bypassed => counts.bypassed += 1,
                    Status::Failed => counts.failed += 1,
                    _ => {}
                }
            }
        }
        summary
    }
}

/// One record of `outputs.jsonl`: the line number first, then the line's
/// declared outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    pub line_number: usize,
    #[serde(flatten)]
    pub output: BTreeMap<String, Value>,
}

/// Result of a whole batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// Output records of completed lines, ordered by line number.
    pub outputs: Vec<OutputRecord>,
    pub line_results: Vec<LineResult>,
    pub aggregation: AggregationResult,
    pub summary: StatusSummary,
}

impl BatchResult {
    /// Completed iff no line failed or was canceled; bypasses do not degrade.
    pub fn status(&self) -> Status {
        if self.summary.lines.failed == 0 && self.summary.lines.canceled == 0 {
            Status::Completed
        } else if self.summary.lines.canceled > 0 {
            Status::Canceled
        } else {
            Status::Failed
        }
    }
}
