//! Per-worker metrics for in-process observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single partition worker
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Batches waiting in the worker queue (sampled on receive)
    queue_len: AtomicUsize,
    /// Batches taken off the queue
    batches_received: AtomicU64,
    /// Successful handler invocations
    records_handled: AtomicU64,
    /// Failed handler invocations
    handler_failures: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn batches_received(&self) -> u64 {
        self.batches_received.load(Ordering::Relaxed)
    }

    pub fn inc_batches_received(&self) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_handled(&self) -> u64 {
        self.records_handled.load(Ordering::Relaxed)
    }

    pub fn inc_records_handled(&self) {
        self.records_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    pub fn inc_handler_failures(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            queue_len: self.queue_len(),
            batches_received: self.batches_received(),
            records_handled: self.records_handled(),
            handler_failures: self.handler_failures(),
        }
    }
}

/// Snapshot of worker metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerMetricsSnapshot {
    pub queue_len: usize,
    pub batches_received: u64,
    pub records_handled: u64,
    pub handler_failures: u64,
}

impl WorkerMetricsSnapshot {
    /// Handler invocations, successful or not
    pub fn records_seen(&self) -> u64 {
        self.records_handled + self.handler_failures
    }
}
