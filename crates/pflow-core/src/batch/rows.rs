//! Row source: line-delimited input records.

use std::collections::BTreeMap;
use std::path::Path;

use pflow_types::Value;

use crate::FlowError;

/// One input record of a batch.
pub type Row = BTreeMap<String, Value>;

/// Read a JSONL row source. File-level I/O errors abort the batch; a
/// malformed row fails only its own line, so each entry carries its own
/// parse result.
pub fn read_jsonl(path: &Path) -> Result<Vec<Result<Row, String>>, FlowError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<Row>(line).map_err(|e| format!("malformed row: {e}"))
        })
        .collect())
}
