//! Line, aggregation, and batch execution engine for pflow.
//!
//! A [`LineExecutor`] drives one input record through the flow's DAG; the
//! [`BatchEngine`] fans lines out with bounded concurrency, assembles ordered
//! outputs, and hands the per-line vectors to the [`AggregationExecutor`].

mod aggregation;
mod batch;
mod callable;
mod cancel;
mod error;
mod executor;
pub mod multimedia;
mod report;

pub use aggregation::AggregationExecutor;
pub use batch::{BatchEngine, BatchOptions, Row, apply_inputs_mapping, read_jsonl};
pub use callable::{Callable, CallableRegistry, FnCallable};
pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use error::{FlowError, RunError};
pub use executor::{LineExecutor, apply_input_defaults};
pub use report::{
    AggregationResult, BatchResult, LineCounts, LineResult, LineRunInfo, NodeRunInfo,
    NodeStatusCounts, OutputRecord, StatusSummary,
};
