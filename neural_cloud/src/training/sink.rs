//! Scalar logging sinks.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Receives tagged scalars such as `train/loss` at a global step.
pub trait ScalarSink {
    /// Record `value` under `tag` at `step`.
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;

    /// Flush buffered records.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct ScalarRecord<'a> {
    tag: &'a str,
    value: f64,
    step: usize,
}

/// Appends one JSON object per scalar to `scalars.jsonl`.
pub struct JsonlScalarWriter {
    writer: BufWriter<File>,
}

impl JsonlScalarWriter {
    /// Create (or truncate) `scalars.jsonl` inside `dir`.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let file = File::create(dir.join("scalars.jsonl"))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl ScalarSink for JsonlScalarWriter {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &ScalarRecord { tag, value, step })?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps scalars in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// Recorded `(tag, value, step)` triples in arrival order.
    pub records: Vec<(String, f64, usize)>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Values recorded under `tag`, in order.
    pub fn values(&self, tag: &str) -> Vec<f64> {
        self.records
            .iter()
            .filter(|(t, _, _)| t == tag)
            .map(|(_, v, _)| *v)
            .collect()
    }
}

impl ScalarSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        self.records.push((tag.to_string(), value, step));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_writer() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = JsonlScalarWriter::create(temp_dir.path()).unwrap();
        writer.add_scalar("train/loss", 0.5, 1).unwrap();
        writer.add_scalar("test/acc_0", 0.25, 1).unwrap();
        writer.flush().unwrap();

        let text = fs::read_to_string(temp_dir.path().join("scalars.jsonl")).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tag"], "train/loss");
        assert_eq!(lines[1]["value"], 0.25);
        assert_eq!(lines[1]["step"], 1);
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.add_scalar("a", 1.0, 0).unwrap();
        sink.add_scalar("b", 2.0, 0).unwrap();
        sink.add_scalar("a", 3.0, 1).unwrap();
        assert_eq!(sink.values("a"), vec![1.0, 3.0]);
    }
}
