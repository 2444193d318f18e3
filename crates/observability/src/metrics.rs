//! Dispatcher metrics
//!
//! Prometheus counters/gauges recorded by the poll loop, the rebalance
//! coordinator and the partition workers, plus in-memory running statistics
//! used for end-of-run summaries.

use metrics::{counter, gauge, histogram};

/// Why a fetched batch never reached a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// No worker registered for the partition (revoked between fetch and dispatch)
    Unowned,
    /// The worker's stop signal fired before the enqueue completed
    Stopping,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unowned => "unowned",
            Self::Stopping => "stopping",
        }
    }
}

/// Record the outcome of one handler invocation
pub fn record_handler_result(topic: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "partition_dispatcher_records_handled_total",
        "topic" => topic.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record a batch handed to a worker queue
pub fn record_batch_routed(topic: &str, records: usize) {
    counter!(
        "partition_dispatcher_batches_routed_total",
        "topic" => topic.to_string()
    )
    .increment(1);
    histogram!("partition_dispatcher_batch_size").record(records as f64);
}

/// Record a batch dropped by the poll loop
pub fn record_batch_discarded(topic: &str, reason: DiscardReason) {
    counter!(
        "partition_dispatcher_batches_discarded_total",
        "topic" => topic.to_string(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a non-fatal fetch error
pub fn record_fetch_error(topic: Option<&str>) {
    counter!(
        "partition_dispatcher_fetch_errors_total",
        "topic" => topic.unwrap_or("").to_string()
    )
    .increment(1);
}

/// Record a rebalance notification ("assigned", "revoked" or "lost")
pub fn record_rebalance(kind: &'static str, partitions: usize) {
    counter!("partition_dispatcher_rebalance_events_total", "kind" => kind).increment(1);
    counter!("partition_dispatcher_rebalance_partitions_total", "kind" => kind)
        .increment(partitions as u64);
}

/// Current number of live partition workers
pub fn set_active_workers(count: usize) {
    gauge!("partition_dispatcher_active_workers").set(count as f64);
}

/// Record the acknowledgement of a produced record
pub fn record_produce(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("partition_dispatcher_records_produced_total", "status" => status).increment(1);
}

/// Summary of a RunningStats instance
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.2}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a sample
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
