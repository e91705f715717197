mod run;
mod tools;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pflow", version, about = "Prompt-flow orchestration engine CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run a flow for a single input record.
    Run(RunArgs),
    /// Run a flow over a JSONL row source.
    Batch(BatchArgs),
    /// Print a flow after parsing, with its dependency levels.
    Show { flow: PathBuf },
}

#[derive(Parser, Debug)]
struct RunArgs {
    flow: PathBuf,
    /// Flow inputs as name=value; values parse as JSON, else as strings.
    #[arg(long = "input", value_parser = parse_kv, num_args = 0..)]
    inputs: Vec<(String, String)>,
    /// Concurrently dispatched nodes within the line.
    #[arg(long, default_value_t = 1)]
    node_concurrency: usize,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    flow: PathBuf,
    /// JSONL file with one input record per line.
    #[arg(long)]
    input_file: PathBuf,
    /// Directory for outputs.jsonl and side-car artifacts.
    #[arg(long)]
    output_dir: PathBuf,
    /// Input mapping as name=template, e.g. question='${data.question}'.
    #[arg(long = "map", value_parser = parse_kv, num_args = 0..)]
    mapping: Vec<(String, String)>,
    /// Concurrent line executions.
    #[arg(long, default_value_t = 4)]
    max_workers: usize,
    /// Concurrently dispatched nodes within one line.
    #[arg(long, default_value_t = 1)]
    node_concurrency: usize,
    /// Per-line timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn parse_kv(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.into(), v.into()))
        .ok_or_else(|| "expected key=value".into())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Show { flow } => run::show(&flow),
        Cmd::Run(args) => run::line(&args.flow, args.inputs, args.node_concurrency).await,
        Cmd::Batch(args) => {
            run::batch(
                &args.flow,
                &args.input_file,
                &args.output_dir,
                args.mapping,
                args.max_workers,
                args.node_concurrency,
                args.timeout_secs,
            )
            .await
        }
    }
}
