//! Summary of a pipeline run

use super::progress::ProgressSnapshot;
use super::PipelineOutcome;
use std::time::Duration;

/// Summary of a pipeline run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: PipelineOutcome,
    /// Items transformed successfully
    pub completed: u64,
    /// Items skipped after a transform failure
    pub failed: u64,
    /// Items committed to the consumer
    pub consumed: u64,
    /// Batches committed to the consumer
    pub batches: u64,
    pub duration: Duration,
}

impl RunSummary {
    pub fn new(outcome: PipelineOutcome, progress: ProgressSnapshot, batches: u64, duration: Duration) -> Self {
        Self {
            outcome,
            completed: progress.completed,
            failed: progress.failed,
            consumed: progress.consumed,
            batches,
            duration,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == PipelineOutcome::Cancelled
    }

    /// Items per second over the whole run
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return self.consumed as f64;
        }
        self.consumed as f64 / secs
    }

    pub fn log_summary(&self) {
        tracing::info!(
            outcome = ?self.outcome,
            completed = self.completed,
            failed = self.failed,
            consumed = self.consumed,
            batches = self.batches,
            duration_ms = self.duration.as_millis() as u64,
            throughput = format!("{:.1}/s", self.throughput()),
            "Pipeline run finished"
        );

        if self.failed > 0 {
            tracing::warn!(failed = self.failed, "Some items failed and were skipped");
        }
    }
}
