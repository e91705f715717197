//! Aggregation pass: runs once per batch over vectors of per-line values.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;

use pflow_config::{Flow, Node};
use pflow_dag::DagManager;
use pflow_types::Value;

use super::executor::run_dag_nodes;
use super::report::{AggregationResult, LineResult};
use super::{CallableRegistry, CancelToken, RunError};

/// Runs the aggregation subgraph after every line of a batch has finished.
///
/// Aggregation nodes see a synthetic frame: each referenced line node's
/// output becomes an ordered per-line vector (null where the node was
/// bypassed without an output), and each declared flow input becomes the
/// vector of per-line values. Aggregation nodes may depend on each other;
/// the bypass rules apply unchanged.
pub struct AggregationExecutor {
    flow: Arc<Flow>,
    registry: Arc<CallableRegistry>,
    cancel: CancelToken,
}

impl AggregationExecutor {
    pub fn new(flow: Arc<Flow>, registry: Arc<CallableRegistry>) -> Self {
        Self { flow, registry, cancel: CancelToken::none() }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub async fn exec_aggregation(
        &self,
        line_results: &[LineResult],
        line_inputs: &[BTreeMap<String, Value>],
    ) -> AggregationResult {
        let nodes: Vec<Node> = self.flow.aggregation_nodes().cloned().collect();
        if nodes.is_empty() {
            return AggregationResult::default();
        }
        info!(nodes = nodes.len(), lines = line_results.len(), "running aggregation");

        let flow_inputs: BTreeMap<String, Value> = self
            .flow
            .inputs
            .keys()
            .map(|name| {
                let column = line_inputs
                    .iter()
                    .map(|inputs| inputs.get(name).cloned().unwrap_or(Value::Null))
                    .collect();
                (name.clone(), Value::Array(column))
            })
            .collect();

        let referenced: BTreeSet<&str> = nodes
            .iter()
            .flat_map(|n| n.node_references())
            .filter(|target| self.flow.node(target).is_some_and(|n| !n.aggregation))
            .collect();
        let seed: BTreeMap<String, Value> = referenced
            .into_iter()
            .map(|name| {
                let column = line_results
                    .iter()
                    .map(|lr| lr.aggregation_inputs.get(name).cloned().unwrap_or(Value::Null))
                    .collect();
                (name.to_string(), Value::Array(column))
            })
            .collect();

        let mut dag = DagManager::with_completed(nodes, flow_inputs, seed);
        let (infos, failure, _canceled) =
            run_dag_nodes(&mut dag, &self.registry, 1, &self.cancel, None).await;

        AggregationResult {
            node_run_infos: infos.into_iter().map(|info| (info.node.clone(), info)).collect(),
            error: failure.as_ref().map(RunError::from),
        }
    }
}
