//! Sequential batches of concurrently processed items.
//!
//! [`run_batches`] cuts the input into consecutive slices of at most `batch_size` items. Every
//! item of a slice runs as its own task; the slice is joined before the next one starts, so
//! concurrency never exceeds `batch_size`. Each item yields an [`Outcome`]; a task that panics is
//! recorded as a failure for that item alone. A slice that fails as a whole (currently: exceeds
//! the batch deadline) is handled according to [`OnBatchError`].

use futures_util::future::join_all;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Anything that can name itself in a failure record.
pub trait Labeled {
    /// Human-readable identity used for error attribution.
    fn label(&self) -> String;
}

impl Labeled for String {
    fn label(&self) -> String {
        self.clone()
    }
}

/// Failure attributed to one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Label of the failing item.
    pub label: String,
    /// Rendered error.
    pub error: String,
    /// Zero-based position of the item in the submitted input, set by [`run_batches`].
    pub position: usize,
}

/// Result of processing one item.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Item processed.
    Success(T),
    /// Item failed; siblings are unaffected.
    Failure(ItemFailure),
}

impl<T> Outcome<T> {
    /// Build a failure outcome.
    pub fn failure(label: impl Into<String>, error: impl Display) -> Self {
        Self::Failure(ItemFailure {
            label: label.into(),
            error: error.to_string(),
            position: 0,
        })
    }

    /// Convert a fallible result into an outcome labeled with `label`.
    pub fn from_result<E: Display>(label: impl Into<String>, result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::failure(label, error),
        }
    }
}

/// Delay policy applied between consecutive batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Start the next batch immediately.
    #[default]
    None,
    /// Sleep for a fixed duration between batches (never after the last one).
    Fixed(Duration),
}

impl Pacing {
    async fn pause(self) {
        if let Self::Fixed(delay) = self
            && !delay.is_zero()
        {
            tokio::time::sleep(delay).await;
        }
    }
}

/// What to do with a batch that failed as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnBatchError {
    /// Record every item of the batch as failed with the batch error.
    #[default]
    FailItems,
    /// Drop the batch's results and continue with the next batch.
    Skip,
}

/// Knobs for one orchestrated run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchPolicy {
    /// Delay between batches.
    pub pacing: Pacing,
    /// Deadline for one batch; `None` waits indefinitely.
    pub batch_timeout: Option<Duration>,
    /// Handling of whole-batch failures.
    pub on_batch_error: OnBatchError,
}

impl BatchPolicy {
    /// Set the inter-batch pacing.
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Set the per-batch deadline.
    pub fn with_batch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.batch_timeout = timeout;
        self
    }

    /// Set whole-batch failure handling.
    pub fn on_batch_error(mut self, mode: OnBatchError) -> Self {
        self.on_batch_error = mode;
        self
    }
}

/// Failure of a batch as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The batch did not finish before its deadline; its tasks were aborted.
    #[error("batch {index} ({size} items) exceeded {timeout:?}")]
    TimedOut {
        /// Zero-based batch position.
        index: usize,
        /// Number of items in the batch.
        size: usize,
        /// Deadline that elapsed.
        timeout: Duration,
    },
}

/// Accumulated results of one run.
#[derive(Debug, Clone)]
pub struct AggregateReport<T> {
    /// Successful values in processing order.
    pub successes: Vec<T>,
    /// Failures in processing order.
    pub failures: Vec<ItemFailure>,
    /// Batches that failed as a whole.
    pub dropped_batches: Vec<BatchError>,
    /// Number of batches dispatched.
    pub batches: usize,
    /// Wall-clock seconds from first dispatch to last completion, millisecond precision.
    pub elapsed_seconds: f64,
}

impl<T> Default for AggregateReport<T> {
    fn default() -> Self {
        Self {
            successes: Vec::new(),
            failures: Vec::new(),
            dropped_batches: Vec::new(),
            batches: 0,
            elapsed_seconds: 0.0,
        }
    }
}

impl<T> AggregateReport<T> {
    /// Number of successful items.
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    /// Number of failed items.
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    fn merge(&mut self, position: usize, outcome: Outcome<T>) {
        match outcome {
            Outcome::Success(value) => self.successes.push(value),
            Outcome::Failure(failure) => self.failures.push(ItemFailure {
                position,
                ..failure
            }),
        }
    }
}

/// Round a duration to seconds with millisecond precision.
pub fn elapsed_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

/// Process `items` in order-preserving batches of `batch_size`.
///
/// `operation` is invoked on the calling task to build each item's future, which is then spawned.
/// A `batch_size` of zero is treated as one.
pub async fn run_batches<I, T, F, Fut>(
    items: Vec<I>,
    batch_size: usize,
    policy: BatchPolicy,
    operation: F,
) -> AggregateReport<T>
where
    I: Labeled,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
{
    let started = Instant::now();
    let size = batch_size.max(1);
    let total_batches = items.len().div_ceil(size);
    let mut report = AggregateReport::default();
    let mut remaining = items.into_iter();

    for index in 0..total_batches {
        let first = index * size;
        let batch: Vec<I> = remaining.by_ref().take(size).collect();
        let labels: Vec<String> = batch.iter().map(Labeled::label).collect();
        tracing::debug!(batch = index, size = batch.len(), "Dispatching batch");

        let handles: Vec<JoinHandle<Outcome<T>>> = batch
            .into_iter()
            .map(|item| tokio::spawn(operation(item)))
            .collect();
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let joined = join_all(handles);

        let results = match policy.batch_timeout {
            None => Ok(joined.await),
            Some(timeout) => match tokio::time::timeout(timeout, joined).await {
                Ok(results) => Ok(results),
                Err(_) => {
                    for handle in &aborts {
                        handle.abort();
                    }
                    Err(BatchError::TimedOut {
                        index,
                        size: labels.len(),
                        timeout,
                    })
                }
            },
        };
        report.batches += 1;

        match results {
            Ok(results) => {
                let paired = labels.into_iter().zip(results).enumerate();
                for (offset, (label, result)) in paired {
                    let outcome = result.unwrap_or_else(|error| {
                        tracing::warn!(
                            batch = index,
                            item = %label,
                            error = %error,
                            "Item task failed"
                        );
                        Outcome::failure(label, format!("task failed: {error}"))
                    });
                    report.merge(first + offset, outcome);
                }
            }
            Err(error) => {
                match policy.on_batch_error {
                    OnBatchError::Skip => {
                        tracing::warn!(batch = index, error = %error, "Dropping batch results");
                    }
                    OnBatchError::FailItems => {
                        tracing::warn!(
                            batch = index,
                            error = %error,
                            "Batch failed; marking items failed"
                        );
                        for (offset, label) in labels.into_iter().enumerate() {
                            report.merge(first + offset, Outcome::failure(label, &error));
                        }
                    }
                }
                report.dropped_batches.push(error);
            }
        }

        if index + 1 < total_batches {
            policy.pacing.pause().await;
        }
    }

    report.elapsed_seconds = elapsed_seconds(started.elapsed());
    report
}
