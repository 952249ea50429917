//! Batch orchestration for deid.
//!
//! - [`pipeline`] - partitioned batch executor with bounded in-flight batches,
//!   ordered or unordered commits, and cooperative cancellation
//!
//! # Workflow
//!
//! 1. **Read**: a [`pipeline::RecordReader`] yields raw items
//! 2. **Batch**: items are grouped into numbered batches
//! 3. **Transform**: workers run the item transform on the blocking pool
//! 4. **Commit**: the writer hands finished batches to a [`pipeline::BatchConsumer`]
//! 5. **Report**: a [`pipeline::RunSummary`] is logged and returned

pub mod pipeline;
