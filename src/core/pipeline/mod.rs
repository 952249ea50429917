//! Partitioned batch executor
//!
//! A three-stage pipeline: one reader task groups items into batches, a pool of
//! workers transforms batches on the blocking thread pool, and the calling task
//! commits finished batches to a consumer. The number of batches in flight is
//! bounded by `2 * concurrency`, so memory stays bounded whatever the ordering mode.
//!
//! # Example
//!
//! ```rust,no_run
//! use deid::core::pipeline::{BatchExecutor, PipelineOptions};
//! use deid::adapters::ndjson::{NdjsonReader, NdjsonWriter};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let reader = NdjsonReader::open("input.ndjson").await?;
//! let mut writer = NdjsonWriter::create("output.ndjson").await?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let executor = BatchExecutor::new(
//!     PipelineOptions::default(),
//!     Arc::new(|value: serde_json::Value| Ok::<_, deid::domain::DeidError>(value)),
//! );
//! let summary = executor.run(reader, &mut writer, shutdown_rx).await?;
//! println!("Consumed: {}", summary.consumed);
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod progress;
pub mod summary;

pub use executor::BatchExecutor;
pub use progress::{PipelineProgress, ProgressSnapshot};
pub use summary::RunSummary;

use crate::domain::{DeidError, PipelineError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pull-based source of raw items
#[async_trait]
pub trait RecordReader<T>: Send {
    /// Next item, or `None` at end of input
    async fn next_item(&mut self) -> Result<Option<T>, PipelineError>;
}

/// Push-based sink of completed batches
#[async_trait]
pub trait BatchConsumer<U>: Send {
    /// Commits one batch
    async fn consume(&mut self, batch: Vec<U>) -> Result<(), PipelineError>;

    /// Signals that no further batch will be committed
    async fn complete(&mut self) -> Result<(), PipelineError>;
}

/// Per-item transform, run on the blocking thread pool
pub type ItemTransform<T, U> = Arc<dyn Fn(T) -> Result<U, DeidError> + Send + Sync>;

/// What happens when one item fails to transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Abort the whole run
    #[default]
    Abort,
    /// Count the item as failed and continue
    Skip,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Items per batch
    pub batch_size: usize,
    /// Worker tasks
    pub concurrency: usize,
    /// Commit batches in submission order
    pub keep_order: bool,
    pub on_item_error: FailurePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrency: 4,
            keep_order: true,
            on_item_error: FailurePolicy::Abort,
        }
    }
}
