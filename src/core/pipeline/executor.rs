//! Batch executor stages
//!
//! Reader, workers and writer communicate over bounded channels. Every batch carries
//! a semaphore permit from the moment the reader starts filling it until the writer
//! commits it, which caps the number of batches alive at `2 * concurrency`.

use super::progress::PipelineProgress;
use super::summary::RunSummary;
use super::{BatchConsumer, FailurePolicy, ItemTransform, PipelineOptions, PipelineOutcome, RecordReader};
use crate::domain::PipelineError;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// A batch on its way to a worker
struct Batch<T> {
    sequence: u64,
    items: Vec<(u64, T)>,
    permit: OwnedSemaphorePermit,
}

/// A transformed batch on its way to the writer
struct Done<U> {
    sequence: u64,
    items: Vec<U>,
    permit: OwnedSemaphorePermit,
}

type DoneMessage<U> = Result<Done<U>, PipelineError>;

/// Runs an item transform over a reader's output with bounded concurrency
pub struct BatchExecutor<T, U> {
    options: PipelineOptions,
    transform: ItemTransform<T, U>,
    progress: Arc<PipelineProgress>,
}

impl<T, U> BatchExecutor<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    pub fn new(options: PipelineOptions, transform: ItemTransform<T, U>) -> Self {
        let options = PipelineOptions {
            batch_size: options.batch_size.max(1),
            concurrency: options.concurrency.max(1),
            ..options
        };
        Self {
            options,
            transform,
            progress: Arc::new(PipelineProgress::new()),
        }
    }

    /// Counters that can be observed while `run` is in progress
    pub fn progress(&self) -> Arc<PipelineProgress> {
        self.progress.clone()
    }

    /// Runs the pipeline to completion, failure or cancellation
    ///
    /// Cancellation is observed between items and at every blocking queue operation.
    /// Batches committed before cancellation stay committed and the consumer is
    /// completed so it can flush them.
    pub async fn run<R, C>(
        &self,
        reader: R,
        consumer: &mut C,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunSummary, PipelineError>
    where
        R: RecordReader<T> + 'static,
        C: BatchConsumer<U> + ?Sized,
    {
        let started = Instant::now();
        let concurrency = self.options.concurrency;
        let window = concurrency * 2;

        tracing::info!(
            batch_size = self.options.batch_size,
            concurrency,
            keep_order = self.options.keep_order,
            "Starting pipeline"
        );

        let permits = Arc::new(Semaphore::new(window));
        let (batch_tx, batch_rx) = mpsc::channel::<Batch<T>>(concurrency);
        let (done_tx, mut done_rx) = mpsc::channel::<DoneMessage<U>>(window);

        let mut tasks = JoinSet::new();
        tasks.spawn(read_batches(
            reader,
            batch_tx,
            done_tx.clone(),
            permits,
            self.options.batch_size,
            cancel.clone(),
        ));
        let batch_rx = Arc::new(Mutex::new(batch_rx));
        for worker in 0..concurrency {
            tasks.spawn(work(
                worker,
                batch_rx.clone(),
                done_tx.clone(),
                self.transform.clone(),
                self.options.on_item_error,
                self.progress.clone(),
                cancel.clone(),
            ));
        }
        drop(done_tx);

        let committed = self.commit(&mut done_rx, consumer, cancel).await;
        if !matches!(committed, Ok((PipelineOutcome::Completed, _))) {
            tasks.abort_all();
        }
        while tasks.join_next().await.is_some() {}

        let (outcome, batches) = match committed {
            Ok(committed) => committed,
            Err(err) => {
                crate::log_error_with_context!(&err, "Pipeline aborted");
                if let Err(flush) = consumer.complete().await {
                    tracing::warn!(error = %flush, "Failed to complete consumer after abort");
                }
                return Err(err);
            }
        };
        consumer.complete().await?;

        let summary = RunSummary::new(outcome, self.progress.snapshot(), batches, started.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    /// Writer stage: commits batches in the configured order
    async fn commit<C>(
        &self,
        done_rx: &mut mpsc::Receiver<DoneMessage<U>>,
        consumer: &mut C,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<(PipelineOutcome, u64), PipelineError>
    where
        C: BatchConsumer<U> + ?Sized,
    {
        let mut pending: BTreeMap<u64, Done<U>> = BTreeMap::new();
        let mut next_sequence = 0u64;
        let mut batches = 0u64;

        loop {
            let message = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    tracing::info!(batches, "Pipeline cancelled");
                    return Ok((PipelineOutcome::Cancelled, batches));
                }
                message = done_rx.recv() => message,
            };
            let Some(message) = message else {
                break;
            };
            let done = message?;

            if !self.options.keep_order {
                self.commit_batch(consumer, done).await?;
                batches += 1;
                continue;
            }
            pending.insert(done.sequence, done);
            while let Some(done) = pending.remove(&next_sequence) {
                self.commit_batch(consumer, done).await?;
                next_sequence += 1;
                batches += 1;
            }
        }

        if *cancel.borrow() {
            return Ok((PipelineOutcome::Cancelled, batches));
        }
        if !pending.is_empty() {
            return Err(PipelineError::Worker(format!(
                "{} batch(es) never reached the writer",
                pending.len()
            )));
        }
        Ok((PipelineOutcome::Completed, batches))
    }

    async fn commit_batch<C>(&self, consumer: &mut C, done: Done<U>) -> Result<(), PipelineError>
    where
        C: BatchConsumer<U> + ?Sized,
    {
        let Done {
            sequence,
            items,
            permit,
        } = done;
        let size = items.len();
        if size > 0 {
            consumer.consume(items).await?;
        }
        let consumed = self.progress.record_consumed(size as u64);
        crate::log_batch_committed!(sequence, size, consumed);
        drop(permit);
        Ok(())
    }
}

/// Resolves once cancellation is requested; never resolves if the sender is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Reader stage: groups items into numbered batches
async fn read_batches<T, U, R>(
    mut reader: R,
    batch_tx: mpsc::Sender<Batch<T>>,
    done_tx: mpsc::Sender<DoneMessage<U>>,
    permits: Arc<Semaphore>,
    batch_size: usize,
    mut cancel: watch::Receiver<bool>,
) where
    R: RecordReader<T>,
{
    let mut sequence = 0u64;
    let mut index = 0u64;
    loop {
        let permit = tokio::select! {
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = cancelled(&mut cancel) => return,
        };

        let mut items = Vec::with_capacity(batch_size);
        while items.len() < batch_size {
            let next = tokio::select! {
                next = reader.next_item() => next,
                _ = cancelled(&mut cancel) => return,
            };
            match next {
                Ok(Some(item)) => {
                    items.push((index, item));
                    index += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    let _ = done_tx.send(Err(err)).await;
                    return;
                }
            }
        }

        if items.is_empty() {
            return;
        }
        let exhausted = items.len() < batch_size;
        let batch = Batch {
            sequence,
            items,
            permit,
        };
        if batch_tx.send(batch).await.is_err() {
            return;
        }
        sequence += 1;
        if exhausted {
            return;
        }
    }
}

/// Worker stage: transforms whole batches on the blocking pool
async fn work<T, U>(
    worker: usize,
    batch_rx: Arc<Mutex<mpsc::Receiver<Batch<T>>>>,
    done_tx: mpsc::Sender<DoneMessage<U>>,
    transform: ItemTransform<T, U>,
    policy: FailurePolicy,
    progress: Arc<PipelineProgress>,
    cancel: watch::Receiver<bool>,
) where
    T: Send + 'static,
    U: Send + 'static,
{
    loop {
        let batch = {
            let mut rx = batch_rx.lock().await;
            rx.recv().await
        };
        let Some(Batch {
            sequence,
            items,
            permit,
        }) = batch
        else {
            return;
        };

        let transform = transform.clone();
        let progress = progress.clone();
        let cancel = cancel.clone();
        let processed = tokio::task::spawn_blocking(move || {
            transform_batch(items, &transform, policy, &progress, &cancel)
        })
        .await;

        let message = match processed {
            Ok(Ok(Some(items))) => Ok(Done {
                sequence,
                items,
                permit,
            }),
            Ok(Ok(None)) => return,
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(PipelineError::Worker(format!("worker {worker}: {join_err}"))),
        };
        if done_tx.send(message).await.is_err() {
            return;
        }
    }
}

/// Transforms one batch; `None` when cancellation interrupted it
fn transform_batch<T, U>(
    items: Vec<(u64, T)>,
    transform: &ItemTransform<T, U>,
    policy: FailurePolicy,
    progress: &PipelineProgress,
    cancel: &watch::Receiver<bool>,
) -> Result<Option<Vec<U>>, PipelineError> {
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items {
        if *cancel.borrow() {
            return Ok(None);
        }
        match transform(item) {
            Ok(value) => {
                progress.record_completed(1);
                out.push(value);
            }
            Err(err) if policy == FailurePolicy::Skip => {
                tracing::warn!(index, error = %err, "Item failed, skipping");
                progress.record_failed();
            }
            Err(err) => {
                return Err(PipelineError::Item {
                    index,
                    message: err.to_string(),
                })
            }
        }
    }
    Ok(Some(out))
}
