//! Subcommand implementations.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use serde_json::Value;
use tracing::info;

use pflow_config::Flow;
use pflow_core::{BatchEngine, BatchOptions, LineExecutor};
use pflow_types::Status;

use crate::tools;

pub fn show(path: &Path) -> Result<()> {
    let flow = Flow::from_file(path)?;
    println!("{}", serde_yaml::to_string(&flow)?);
    println!("inputs: {}", flow.inputs.keys().cloned().collect::<Vec<_>>().join(", "));
    println!("outputs: {}", flow.outputs.keys().cloned().collect::<Vec<_>>().join(", "));
    for (depth, level) in flow.topo_levels().iter().enumerate() {
        println!("level {depth}: {}", level.join(", "));
    }
    let aggregation: Vec<&str> = flow.aggregation_nodes().map(|n| n.name.as_str()).collect();
    if !aggregation.is_empty() {
        println!("aggregation: {}", aggregation.join(", "));
    }
    Ok(())
}

pub async fn line(path: &Path, inputs: Vec<(String, String)>, node_concurrency: usize) -> Result<()> {
    let flow = Arc::new(Flow::from_file(path)?);
    let executor = LineExecutor::new(flow, Arc::new(tools::builtin_registry()))
        .with_node_concurrency(node_concurrency);
    let result = executor.exec_line(parse_inputs(inputs), None).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.run_info.status != Status::Completed {
        bail!("line finished with status {:?}", result.run_info.status);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn batch(
    path: &Path,
    input_file: &Path,
    output_dir: &Path,
    mapping: Vec<(String, String)>,
    max_workers: usize,
    node_concurrency: usize,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let flow = Arc::new(Flow::from_file(path)?);
    let options = BatchOptions {
        max_workers,
        node_concurrency,
        line_timeout: timeout_secs.map(Duration::from_secs),
    };
    let engine = BatchEngine::new(flow, Arc::new(tools::builtin_registry())).with_options(options);
    let mapping: BTreeMap<String, String> = mapping.into_iter().collect();
    let result = engine.exec_batch(input_file, &mapping, output_dir).await?;

    info!(outputs = %output_dir.display(), "batch outputs written");
    println!("{}", serde_json::to_string_pretty(&result.summary)?);
    if result.status() != Status::Completed {
        bail!("batch finished with status {:?}", result.status());
    }
    Ok(())
}

/// `--input` values: JSON when they parse, plain strings otherwise.
fn parse_inputs(pairs: Vec<(String, String)>) -> BTreeMap<String, Value> {
    pairs
        .into_iter()
        .map(|(name, raw)| {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            (name, value)
        })
        .collect()
}
