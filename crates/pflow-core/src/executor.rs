//! Line execution: drives one input record through the flow's DAG.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pflow_config::Flow;
use pflow_dag::DagManager;
use pflow_types::{NodeState, Status, Value};

use super::report::{LineResult, LineRunInfo, NodeRunInfo};
use super::{CallableRegistry, CancelToken, FlowError, RunError};

/// Fill in declared defaults and reject lines missing a required input.
pub fn apply_input_defaults(
    flow: &Flow,
    mut inputs: BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>, FlowError> {
    for (name, spec) in &flow.inputs {
        if !inputs.contains_key(name) {
            match &spec.default {
                Some(value) => {
                    inputs.insert(name.clone(), value.clone());
                }
                None => {
                    return Err(FlowError::InputResolution {
                        message: format!("missing flow input `{name}`"),
                    });
                }
            }
        }
    }
    Ok(inputs)
}

/// Executes one line of the flow to completion.
pub struct LineExecutor {
    flow: Arc<Flow>,
    registry: Arc<CallableRegistry>,
    node_concurrency: usize,
    cancel: CancelToken,
    line_timeout: Option<Duration>,
}

impl LineExecutor {
    pub fn new(flow: Arc<Flow>, registry: Arc<CallableRegistry>) -> Self {
        Self {
            flow,
            registry,
            node_concurrency: 1,
            cancel: CancelToken::none(),
            line_timeout: None,
        }
    }

    /// Cap for concurrently dispatched nodes within one ready batch.
    pub fn with_node_concurrency(mut self, concurrency: usize) -> Self {
        self.node_concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Line-scope timeout. Behaves like a cancel: in-flight nodes finish,
    /// everything still pending is marked canceled.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.line_timeout = Some(timeout);
        self
    }

    /// Run the flow for one input record. Failures are encoded in the
    /// returned records; this never panics on a misbehaving callable.
    pub async fn exec_line(
        &self,
        inputs: BTreeMap<String, Value>,
        line_number: Option<usize>,
    ) -> LineResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let t0 = Instant::now();
        info!(%run_id, ?line_number, flow = %self.flow.name, "executing line");

        let line_result = |status, error: Option<FlowError>, output, node_run_infos, aggregation_inputs| {
            LineResult {
                line_number,
                output,
                run_info: LineRunInfo {
                    run_id,
                    status,
                    error: error.as_ref().map(RunError::from),
                    started_at,
                    finished_at: Utc::now(),
                    duration_ms: t0.elapsed().as_millis(),
                },
                node_run_infos,
                aggregation_inputs,
            }
        };

        let inputs = match apply_input_defaults(&self.flow, inputs) {
            Ok(inputs) => inputs,
            Err(error) => {
                return line_result(
                    Status::Failed,
                    Some(error),
                    BTreeMap::new(),
                    Vec::new(),
                    BTreeMap::new(),
                );
            }
        };

        let nodes = self.flow.execution_nodes().cloned().collect();
        let mut dag = DagManager::new(nodes, inputs);
        let deadline = self.line_timeout.map(|t| Instant::now() + t);
        let (mut infos, mut failure, canceled) = run_dag_nodes(
            &mut dag,
            &self.registry,
            self.node_concurrency,
            &self.cancel,
            deadline,
        )
        .await;

        // Whatever never got handed out: canceled on cancel, otherwise the
        // line aborted and those nodes simply did not start.
        let leftover_status = if canceled { Status::Canceled } else { Status::NotStarted };
        for name in dag.pending_nodes() {
            infos.push(NodeRunInfo::untimed(name, leftover_status, None));
        }
        if canceled && failure.is_none() {
            failure = Some(FlowError::Canceled);
        }

        let mut output = BTreeMap::new();
        if failure.is_none() {
            match self.materialize_outputs(&dag) {
                Ok(materialized) => output = materialized,
                Err(error) => failure = Some(error),
            }
        }

        let aggregation_inputs = self.collect_aggregation_inputs(&dag);
        let status = match (&failure, canceled) {
            (_, true) => Status::Canceled,
            (Some(_), _) => Status::Failed,
            (None, false) => Status::Completed,
        };
        line_result(status, failure, output, infos, aggregation_inputs)
    }

    /// Resolve the flow's declared outputs against the final node states.
    fn materialize_outputs(
        &self,
        dag: &DagManager,
    ) -> Result<BTreeMap<String, Value>, FlowError> {
        let mut output = BTreeMap::new();
        for (name, binding) in &self.flow.outputs {
            let bypassed_ref = binding.node_ref().is_some_and(|target| {
                dag.state(target).is_some_and(NodeState::is_bypassed_without_output)
            });
            if bypassed_ref {
                warn!(
                    "The node referenced by output:'{name}' is bypassed, which is not recommended."
                );
                output.insert(name.clone(), Value::Null);
                continue;
            }
            let value = dag.resolve(binding).map_err(|source| {
                FlowError::Dag(pflow_dag::NodeFailure {
                    node: format!("output:{name}"),
                    source,
                })
            })?;
            output.insert(name.clone(), value);
        }
        Ok(output)
    }

    /// This line's values for every node the aggregation pass will read.
    fn collect_aggregation_inputs(&self, dag: &DagManager) -> BTreeMap<String, Value> {
        let referenced: BTreeSet<&str> = self
            .flow
            .aggregation_nodes()
            .flat_map(|n| n.node_references())
            .filter(|target| self.flow.node(target).is_some_and(|n| !n.aggregation))
            .collect();
        referenced
            .into_iter()
            .map(|name| {
                (name.to_string(), dag.output_of(name).cloned().unwrap_or(Value::Null))
            })
            .collect()
    }
}

/// The fixed-point scheduling loop shared by line and aggregation execution.
///
/// Bypass detection drains to a fixed point before every dispatch round, so
/// a node downstream of a fired skip observes the recorded return value
/// rather than a missing dependency. Returns the node records in termination
/// order, the first failure (if any), and whether the run was canceled.
pub(crate) async fn run_dag_nodes(
    dag: &mut DagManager,
    registry: &CallableRegistry,
    concurrency: usize,
    cancel: &CancelToken,
    deadline: Option<Instant>,
) -> (Vec<NodeRunInfo>, Option<FlowError>, bool) {
    let mut infos: Vec<NodeRunInfo> = Vec::new();
    let mut failure: Option<FlowError> = None;
    let mut canceled = false;

    'outer: while !dag.completed() {
        loop {
            match dag.pop_bypassable_nodes() {
                Ok(nodes) if nodes.is_empty() => break,
                Ok(nodes) => {
                    for node in nodes {
                        let output = dag.output_of(&node.name).cloned();
                        infos.push(NodeRunInfo::untimed(node.name, Status::Bypassed, output));
                    }
                }
                Err(fail) => {
                    let node = fail.node.clone();
                    let error = FlowError::Dag(fail);
                    let mut info = NodeRunInfo::untimed(node, Status::Failed, None);
                    info.error = Some(RunError::from(&error));
                    infos.push(info);
                    failure = Some(error);
                    break 'outer;
                }
            }
        }
        if dag.completed() {
            break;
        }
        if cancel.is_canceled() || deadline.is_some_and(|d| Instant::now() >= d) {
            canceled = true;
            break;
        }

        let ready = dag.pop_ready_nodes();
        if ready.is_empty() {
            // Unreachable for a validated flow; bail out rather than spin.
            warn!(
                pending = dag.pending_nodes().count(),
                "no progress in DAG execution loop"
            );
            break;
        }
        debug!(count = ready.len(), "dispatching ready nodes");

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        let mut ready_iter = ready.into_iter();
        for node in ready_iter.by_ref() {
            let callable = match registry.get(&node.tool) {
                Some(callable) => callable,
                None => {
                    let error = FlowError::NodeExecution {
                        node: node.name.clone(),
                        message: format!("unknown tool `{}`", node.tool),
                    };
                    let mut info = NodeRunInfo::untimed(node.name, Status::Failed, None);
                    info.error = Some(RunError::from(&error));
                    infos.push(info);
                    failure = Some(error);
                    break;
                }
            };
            let params = match dag.get_valid_inputs(&node, callable.signature()) {
                Ok(params) => params,
                Err(source) => {
                    let fail = pflow_dag::NodeFailure { node: node.name.clone(), source };
                    let error = FlowError::Dag(fail);
                    let mut info = NodeRunInfo::untimed(node.name, Status::Failed, None);
                    info.error = Some(RunError::from(&error));
                    infos.push(info);
                    failure = Some(error);
                    break;
                }
            };

            let semaphore = semaphore.clone();
            let name = node.name.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let started_at = Utc::now();
                let t0 = Instant::now();
                let result = match tokio::task::spawn_blocking(move || callable.call(params)).await
                {
                    Ok(result) => result,
                    Err(join_error) => Err(anyhow::anyhow!("callable panicked: {join_error}")),
                };
                (name, started_at, Utc::now(), t0.elapsed().as_millis(), result)
            });
        }
        // Ready nodes we never dispatched because an earlier one failed to
        // resolve: they did not start.
        for node in ready_iter {
            infos.push(NodeRunInfo::untimed(node.name, Status::NotStarted, None));
        }

        while let Some(joined) = tasks.join_next().await {
            let Ok((name, started_at, finished_at, duration_ms, result)) = joined else {
                warn!("node task aborted before reporting");
                continue;
            };
            match result {
                Ok(output) => {
                    dag.complete(&name, output.clone());
                    infos.push(NodeRunInfo {
                        node: name,
                        status: Status::Completed,
                        output: Some(output),
                        error: None,
                        started_at,
                        finished_at,
                        duration_ms,
                    });
                }
                Err(error) => {
                    let error = FlowError::NodeExecution { node: name.clone(), message: format!("{error:#}") };
                    infos.push(NodeRunInfo {
                        node: name,
                        status: Status::Failed,
                        output: None,
                        error: Some(RunError::from(&error)),
                        started_at,
                        finished_at,
                        duration_ms,
                    });
                    if failure.is_none() {
                        failure = Some(error);
                    }
                }
            }
        }
        if failure.is_some() {
            break;
        }
    }

    (infos, failure, canceled)
}
