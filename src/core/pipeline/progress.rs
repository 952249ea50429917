//! Progress counters shared between pipeline stages

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters observable while a run is in progress
#[derive(Debug, Default)]
pub struct PipelineProgress {
    completed: AtomicU64,
    failed: AtomicU64,
    consumed: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProgressSnapshot {
    /// Items transformed successfully
    pub completed: u64,
    /// Items that failed under the skip policy
    pub failed: u64,
    /// Items handed to the consumer
    pub consumed: u64,
}

impl PipelineProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completed(&self, count: u64) {
        self.completed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds to the consumed counter and returns the new total
    pub fn record_consumed(&self, count: u64) -> u64 {
        self.consumed.fetch_add(count, Ordering::Relaxed) + count
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters() {
        let progress = PipelineProgress::new();
        progress.record_completed(3);
        progress.record_failed();
        assert_eq!(progress.record_consumed(2), 2);
        assert_eq!(progress.record_consumed(1), 3);

        assert_eq!(
            progress.snapshot(),
            ProgressSnapshot {
                completed: 3,
                failed: 1,
                consumed: 3
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_updates() {
        let progress = Arc::new(PipelineProgress::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let progress = progress.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    progress.record_completed(1);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(progress.snapshot().completed, 800);
    }
}
