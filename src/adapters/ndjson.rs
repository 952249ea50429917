//! Newline-delimited JSON reader and writer for the batch executor
//!
//! One JSON document per line. Blank lines are skipped on read; a malformed line
//! fails the reader with its 1-based line number.

use crate::core::pipeline::{BatchConsumer, RecordReader};
use crate::domain::PipelineError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};

/// Reads one JSON value per line
pub struct NdjsonReader {
    lines: Lines<BufReader<File>>,
    line_number: usize,
}

impl NdjsonReader {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| PipelineError::Reader(format!("Failed to open {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "Opened NDJSON input");
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }
}

#[async_trait]
impl RecordReader<Value> for NdjsonReader {
    async fn next_item(&mut self) -> Result<Option<Value>, PipelineError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| PipelineError::Reader(e.to_string()))?;
            let Some(line) = line else {
                return Ok(None);
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&line).map(Some).map_err(|e| {
                PipelineError::Reader(format!("Invalid JSON on line {}: {e}", self.line_number))
            });
        }
    }
}

/// Writes each committed value as one line
pub struct NdjsonWriter {
    writer: BufWriter<File>,
    written: u64,
}

impl NdjsonWriter {
    /// Creates (or truncates) the output file, creating parent directories
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::Writer(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let file = File::create(path)
            .await
            .map_err(|e| PipelineError::Writer(format!("Failed to create {}: {e}", path.display())))?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Lines written so far
    pub fn written(&self) -> u64 {
        self.written
    }
}

#[async_trait]
impl BatchConsumer<Value> for NdjsonWriter {
    async fn consume(&mut self, batch: Vec<Value>) -> Result<(), PipelineError> {
        for value in batch {
            let mut line =
                serde_json::to_vec(&value).map_err(|e| PipelineError::Writer(e.to_string()))?;
            line.push(b'\n');
            self.writer
                .write_all(&line)
                .await
                .map_err(|e| PipelineError::Writer(e.to_string()))?;
            self.written += 1;
        }
        // Committed batches must survive a later cancellation
        self.writer
            .flush()
            .await
            .map_err(|e| PipelineError::Writer(e.to_string()))
    }

    async fn complete(&mut self) -> Result<(), PipelineError> {
        self.writer
            .flush()
            .await
            .map_err(|e| PipelineError::Writer(e.to_string()))?;
        tracing::debug!(written = self.written, "NDJSON output complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reader_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.ndjson");
        tokio::fs::write(&path, "{\"a\":1}\n\n   \n{\"a\":2}\n").await.unwrap();

        let mut reader = NdjsonReader::open(&path).await.unwrap();
        assert_eq!(reader.next_item().await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(reader.next_item().await.unwrap(), Some(json!({"a": 2})));
        assert_eq!(reader.next_item().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_reports_line_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.ndjson");
        tokio::fs::write(&path, "{\"a\":1}\n{broken\n").await.unwrap();

        let mut reader = NdjsonReader::open(&path).await.unwrap();
        reader.next_item().await.unwrap();
        let err = reader.next_item().await.unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = NdjsonReader::open(dir.path().join("missing.ndjson")).await;
        assert!(matches!(result, Err(PipelineError::Reader(_))));
    }

    #[tokio::test]
    async fn test_writer_writes_one_line_per_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/result.ndjson");

        let mut writer = NdjsonWriter::create(&path).await.unwrap();
        writer.consume(vec![json!({"a": 1}), json!({"b": "x"})]).await.unwrap();
        writer.consume(vec![json!([1, 2])]).await.unwrap();
        writer.complete().await.unwrap();
        assert_eq!(writer.written(), 3);

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text, "{\"a\":1}\n{\"b\":\"x\"}\n[1,2]\n");
    }
}
