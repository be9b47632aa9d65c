//! Progress reporting for rank sampling.
//!
//! [`sample`](crate::sample) sets the total to the number of grid points,
//! posts one message per batch and advances by one per finished lookup.
//! Terminal bars and job-status rows live in the embedding layer behind
//! [`ProgressCallback`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives progress updates from a running scan.
pub trait ProgressCallback: Send + Sync {
    /// Number of lookups the scan will make.
    fn set_total(&self, total: u64);

    /// `delta` more lookups have finished.
    fn inc(&self, delta: u64);

    /// Status line, e.g. the current batch.
    fn set_message(&self, msg: String);

    /// Sampling ended, successfully or not.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Writes progress to the `log` facade under a fixed label.
///
/// For headless workers where a scan's only trace is the log.
#[derive(Debug)]
pub struct LogProgress {
    label: String,
    total: AtomicU64,
    done: AtomicU64,
}

impl LogProgress {
    /// Creates a reporter that prefixes every line with `label`.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            total: AtomicU64::new(0),
            done: AtomicU64::new(0),
        }
    }

    /// Lookups finished so far.
    #[must_use]
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Total set by the sampler, 0 before sampling starts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl ProgressCallback for LogProgress {
    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
    }

    fn inc(&self, delta: u64) {
        let done = self.done.fetch_add(delta, Ordering::Relaxed) + delta;
        log::trace!("[{}] {done}/{} lookups", self.label, self.total());
    }

    fn set_message(&self, msg: String) {
        log::debug!("[{}] {msg} ({}/{})", self.label, self.done(), self.total());
    }

    fn finish(&self, msg: String) {
        log::info!("[{}] {msg}", self.label);
    }
}
