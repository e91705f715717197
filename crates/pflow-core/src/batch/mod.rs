//! Batch execution: fan lines out, collect ordered results, aggregate.

mod mapping;
mod rows;
mod sink;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use pflow_config::Flow;
use pflow_types::{Status, Value};

use super::executor::apply_input_defaults;
use super::report::{BatchResult, LineResult, LineRunInfo, OutputRecord, StatusSummary};
use super::{
    AggregationExecutor, CallableRegistry, CancelHandle, CancelToken, FlowError, LineExecutor,
    RunError, cancel_pair,
};

pub use mapping::apply_inputs_mapping;
pub use rows::{Row, read_jsonl};

/// Knobs for a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Concurrent line executions.
    pub max_workers: usize,
    /// Concurrently dispatched nodes within one line.
    pub node_concurrency: usize,
    /// Per-line timeout; behaves like a line-scope cancel.
    pub line_timeout: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { max_workers: 4, node_concurrency: 1, line_timeout: None }
    }
}

/// Consumes a row source, fans line executions out with bounded concurrency,
/// assembles ordered results plus a status summary, then runs aggregation.
pub struct BatchEngine {
    flow: Arc<Flow>,
    registry: Arc<CallableRegistry>,
    options: BatchOptions,
    cancel_handle: CancelHandle,
    cancel_token: CancelToken,
}

impl BatchEngine {
    pub fn new(flow: Arc<Flow>, registry: Arc<CallableRegistry>) -> Self {
        let (cancel_handle, cancel_token) = cancel_pair();
        Self { flow, registry, options: BatchOptions::default(), cancel_handle, cancel_token }
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Handle to cancel this batch: no new lines start, running lines finish
    /// their in-flight nodes and mark the rest canceled.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }

    /// Run the flow over a JSONL row source, writing `outputs.jsonl` and
    /// side-car artifacts under `output_dir`.
    pub async fn exec_batch(
        &self,
        input_file: &Path,
        inputs_mapping: &BTreeMap<String, String>,
        output_dir: &Path,
    ) -> Result<BatchResult, FlowError> {
        let rows = rows::read_jsonl(input_file)?;
        let sink = sink::OutputSink::new(output_dir)?;
        let mut result = self.exec_rows(rows, inputs_mapping).await;
        sink.persist(&mut result.outputs)?;
        Ok(result)
    }

    /// Run the flow over already-loaded rows.
    pub async fn exec_rows(
        &self,
        rows: Vec<Result<Row, String>>,
        inputs_mapping: &BTreeMap<String, String>,
    ) -> BatchResult {
        let mapping = if inputs_mapping.is_empty() {
            default_mapping(&self.flow)
        } else {
            inputs_mapping.clone()
        };
        let total = rows.len();
        info!(flow = %self.flow.name, lines = total, workers = self.options.max_workers, "starting batch");

        let semaphore = Arc::new(Semaphore::new(self.options.max_workers.max(1)));
        let mut tasks: JoinSet<(usize, LineResult)> = JoinSet::new();
        let mut slots: Vec<Option<LineResult>> = (0..total).map(|_| None).collect();
        let mut line_inputs: Vec<BTreeMap<String, Value>> = vec![BTreeMap::new(); total];

        for (index, row) in rows.into_iter().enumerate() {
            let prepared = row
                .and_then(|row| apply_inputs_mapping(&row, &mapping))
                .map_err(|message| FlowError::InputResolution { message })
                .and_then(|inputs| apply_input_defaults(&self.flow, inputs));
            let inputs = match prepared {
                Ok(inputs) => inputs,
                Err(error) => {
                    warn!(line = index, %error, "line inputs failed to resolve");
                    slots[index] = Some(unstarted_line(index, Status::Failed, Some(&error)));
                    continue;
                }
            };
            line_inputs[index] = inputs.clone();

            let mut executor = LineExecutor::new(self.flow.clone(), self.registry.clone())
                .with_node_concurrency(self.options.node_concurrency)
                .with_cancel(self.cancel_token.clone());
            if let Some(timeout) = self.options.line_timeout {
                executor = executor.with_timeout(timeout);
            }
            let semaphore = semaphore.clone();
            let token = self.cancel_token.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                if token.is_canceled() {
                    return (index, unstarted_line(index, Status::Canceled, Some(&FlowError::Canceled)));
                }
                (index, executor.exec_line(inputs, Some(index)).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(join_error) => warn!(%join_error, "line task aborted"),
            }
        }
        let line_results: Vec<LineResult> = slots.into_iter().flatten().collect();

        let aggregation = if self.cancel_token.is_canceled() {
            Default::default()
        } else {
            AggregationExecutor::new(self.flow.clone(), self.registry.clone())
                .with_cancel(self.cancel_token.clone())
                .exec_aggregation(&line_results, &line_inputs)
                .await
        };

        let summary = StatusSummary::from_lines(&line_results);
        let outputs = line_results
            .iter()
            .filter(|lr| lr.run_info.status == Status::Completed)
            .filter_map(|lr| {
                lr.line_number.map(|line_number| OutputRecord {
                    line_number,
                    output: lr.output.clone(),
                })
            })
            .collect();

        info!(
            completed = summary.lines.completed,
            failed = summary.lines.failed,
            canceled = summary.lines.canceled,
            "batch finished"
        );
        BatchResult { outputs, line_results, aggregation, summary }
    }
}

/// Mapping used when none is given: each declared input from its column.
fn default_mapping(flow: &Flow) -> BTreeMap<String, String> {
    flow.inputs.keys().map(|name| (name.clone(), format!("${{data.{name}}}"))).collect()
}

/// Record for a line that never reached the executor.
fn unstarted_line(index: usize, status: Status, error: Option<&FlowError>) -> LineResult {
    let now = Utc::now();
    LineResult {
        line_number: Some(index),
        output: BTreeMap::new(),
        run_info: LineRunInfo {
            run_id: Uuid::new_v4(),
            status,
            error: error.map(RunError::from),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        },
        node_run_infos: Vec::new(),
        aggregation_inputs: BTreeMap::new(),
    }
}
