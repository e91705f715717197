//! Output materialization: `outputs.jsonl` plus side-car artifact files.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use crate::FlowError;
use crate::multimedia;
use crate::report::OutputRecord;

/// Writes batch outputs under one directory.
pub struct OutputSink {
    dir: PathBuf,
}

impl OutputSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, FlowError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Rewrite multimedia payloads to side-car files, then write one JSON
    /// record per line to `outputs.jsonl`, in the given (line-number) order.
    pub fn persist(&self, records: &mut [OutputRecord]) -> Result<(), FlowError> {
        for record in records.iter_mut() {
            for (name, value) in record.output.iter_mut() {
                let stem = format!("{}_{}", record.line_number, name);
                let mut counter = 0;
                *value = multimedia::persist_media(value, &self.dir, &stem, &mut counter)?;
            }
        }
        let mut file = File::create(self.dir.join("outputs.jsonl"))?;
        for record in records.iter() {
            let json = serde_json::to_string(record).map_err(std::io::Error::from)?;
            writeln!(file, "{json}")?;
        }
        Ok(())
    }
}
