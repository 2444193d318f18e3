//! PartitionWorker - one partition's in-order record stream on its own task
//!
//! The worker owns a bounded queue of batches and a broadcast stop signal.
//! The poll loop never owns a worker: it routes through a cloned
//! [`WorkerRoute`] obtained from the registry.

use std::sync::Arc;

use contracts::{Batch, SharedHandler, TopicPartition};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::WorkerMetrics;

/// Outcome of handing a batch to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Batch accepted into the worker queue
    Enqueued,
    /// Stop signal fired first; the batch was discarded
    Stopped,
}

/// Routing reference to a running worker: queue sender plus stop signal
#[derive(Debug, Clone)]
pub struct WorkerRoute {
    topic_partition: TopicPartition,
    tx: mpsc::Sender<Batch>,
    stop: CancellationToken,
}

impl WorkerRoute {
    pub fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    /// Whether the worker's stop signal has fired
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Enqueue a batch, racing the send against the stop signal
    ///
    /// Suspends while the queue is full (backpressure for this partition
    /// only). Never blocks past the stop signal.
    pub async fn deliver(&self, batch: Batch) -> Delivery {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Delivery::Stopped,
            sent = self.tx.send(batch) => match sent {
                Ok(()) => Delivery::Enqueued,
                Err(_) => Delivery::Stopped,
            },
        }
    }
}

/// Receiver and handler held until the worker task is launched
struct PendingTask {
    rx: mpsc::Receiver<Batch>,
    handler: SharedHandler,
}

/// Handle to a partition worker
///
/// Owned by the rebalance coordinator through the registry. Created first,
/// launched once registered.
pub struct PartitionWorker {
    route: WorkerRoute,
    metrics: Arc<WorkerMetrics>,
    pending: Option<PendingTask>,
    task: Option<JoinHandle<()>>,
}

impl PartitionWorker {
    /// Create the queue and stop signal without starting a task
    ///
    /// Batches delivered before [`launch`](Self::launch) wait in the queue.
    pub fn new(
        topic_partition: TopicPartition,
        handler: SharedHandler,
        queue_capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        Self {
            route: WorkerRoute {
                topic_partition,
                tx,
                stop: CancellationToken::new(),
            },
            metrics: Arc::new(WorkerMetrics::new()),
            pending: Some(PendingTask { rx, handler }),
            task: None,
        }
    }

    /// Start the worker task on `runtime`
    ///
    /// Takes an explicit runtime handle: rebalance notifications arrive on
    /// broker threads that are not runtime threads. Returns false if the
    /// worker was already launched.
    pub fn launch(&mut self, runtime: &Handle) -> bool {
        let Some(PendingTask { rx, handler }) = self.pending.take() else {
            return false;
        };
        self.task = Some(runtime.spawn(partition_worker(
            self.route.topic_partition.clone(),
            rx,
            self.route.stop.clone(),
            handler,
            Arc::clone(&self.metrics),
        )));
        true
    }

    /// Create and launch in one step
    pub fn spawn(
        topic_partition: TopicPartition,
        handler: SharedHandler,
        queue_capacity: usize,
        runtime: &Handle,
    ) -> Self {
        let mut worker = Self::new(topic_partition, handler, queue_capacity);
        worker.launch(runtime);
        worker
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.route.topic_partition
    }

    /// Cloned routing reference for the poll loop
    pub fn route(&self) -> WorkerRoute {
        self.route.clone()
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    /// Fire the stop signal
    ///
    /// Idempotent: returns false if the signal had already fired.
    pub fn stop(&self) -> bool {
        let first = !self.route.stop.is_cancelled();
        self.route.stop.cancel();
        first
    }

    pub fn is_stopped(&self) -> bool {
        self.route.stop.is_cancelled()
    }

    pub fn is_launched(&self) -> bool {
        self.task.is_some()
    }

    /// Whether the worker task has exited. A worker never launched has no
    /// task and counts as finished.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the worker and wait for its task to exit
    #[instrument(
        name = "partition_worker_join",
        skip(self),
        fields(partition = %self.route.topic_partition)
    )]
    pub async fn join(self) {
        self.stop();
        let Self { route, task, .. } = self;
        drop(route);
        let Some(task) = task else {
            return;
        };
        if let Err(e) = task.await {
            error!(error = ?e, "Partition worker task panicked");
        }
    }
}

/// Worker loop: apply the handler to every record, in order, until stopped
#[instrument(
    name = "partition_worker_loop",
    skip(rx, stop, handler, metrics),
    fields(topic = %topic_partition.topic, partition = topic_partition.partition)
)]
async fn partition_worker(
    topic_partition: TopicPartition,
    mut rx: mpsc::Receiver<Batch>,
    stop: CancellationToken,
    handler: SharedHandler,
    metrics: Arc<WorkerMetrics>,
) {
    info!("Partition worker started");

    loop {
        let batch = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            batch = rx.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        metrics.inc_batches_received();
        metrics.set_queue_len(rx.len());
        debug!(
            records = batch.len(),
            first_offset = ?batch.first_offset(),
            last_offset = ?batch.last_offset(),
            "Processing batch"
        );

        for record in &batch.records {
            // No record is handed to the handler once the stop signal fired
            if stop.is_cancelled() {
                debug!(offset = record.offset, "Stop signalled mid-batch");
                break;
            }

            match handler.handle(&record.key, &record.value) {
                Ok(()) => {
                    metrics.inc_records_handled();
                    observability::record_handler_result(&topic_partition.topic, true);
                }
                Err(e) => {
                    metrics.inc_handler_failures();
                    observability::record_handler_result(&topic_partition.topic, false);
                    warn!(offset = record.offset, error = %e, "Handler failed");
                    // Continue with the next record - failures are not retried
                }
            }
        }
    }

    rx.close();
    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }

    info!(dropped_batches = dropped, "Partition worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, Record};
    use std::sync::Mutex;
    use tokio::time::{sleep, timeout, Duration};

    fn batch(partition: i32, offsets: std::ops::Range<i64>) -> Batch {
        Batch::new(
            "orders",
            partition,
            offsets
                .map(|o| Record::new("orders", partition, o, format!("k{o}"), format!("v{o}")))
                .collect(),
        )
    }

    fn recording_handler() -> (SharedHandler, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = move |key: &[u8], _value: &[u8]| -> Result<(), ContractError> {
            sink.lock().unwrap().push(String::from_utf8_lossy(key).into_owned());
            Ok(())
        };
        (Arc::new(handler), seen)
    }

    fn spawn_worker(handler: SharedHandler, queue_capacity: usize) -> PartitionWorker {
        PartitionWorker::spawn(
            TopicPartition::new("orders", 0),
            handler,
            queue_capacity,
            &Handle::current(),
        )
    }

    async fn wait_for_records(worker: &PartitionWorker, expected: u64) {
        timeout(Duration::from_secs(2), async {
            while worker.metrics().snapshot().records_seen() < expected {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker did not process records in time");
    }

    #[tokio::test]
    async fn test_worker_handles_records_in_order() {
        let (handler, seen) = recording_handler();
        let worker = spawn_worker(handler, 4);
        let route = worker.route();

        assert_eq!(route.deliver(batch(0, 0..3)).await, Delivery::Enqueued);
        assert_eq!(route.deliver(batch(0, 3..5)).await, Delivery::Enqueued);
        wait_for_records(&worker, 5).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["k0", "k1", "k2", "k3", "k4"]
        );
        assert_eq!(worker.metrics().batches_received(), 2);

        worker.join().await;
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_halt_worker() {
        let handler = |_key: &[u8], value: &[u8]| -> Result<(), ContractError> {
            if value == b"v1" {
                Err(ContractError::handler("bad record"))
            } else {
                Ok(())
            }
        };
        let worker = spawn_worker(Arc::new(handler), 4);

        worker.route().deliver(batch(0, 0..3)).await;
        wait_for_records(&worker, 3).await;

        let snapshot = worker.metrics().snapshot();
        assert_eq!(snapshot.records_handled, 2);
        assert_eq!(snapshot.handler_failures, 1);

        worker.join().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (handler, seen) = recording_handler();
        let worker = spawn_worker(handler, 4);

        assert!(worker.stop());
        assert!(!worker.stop());
        assert!(worker.is_stopped());

        worker.join().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_after_stop_is_discarded() {
        let (handler, seen) = recording_handler();
        let worker = spawn_worker(handler, 4);
        let route = worker.route();

        worker.stop();
        assert!(route.is_stopped());
        assert_eq!(route.deliver(batch(0, 0..2)).await, Delivery::Stopped);

        worker.join().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_queue_send_unblocks_on_stop() {
        // Handler parks on the first record so the queue fills up behind it
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let entered = Arc::new(tokio::sync::Notify::new());
        let handler = {
            let gate = Arc::clone(&gate);
            let entered = Arc::clone(&entered);
            move |_key: &[u8], _value: &[u8]| -> Result<(), ContractError> {
                entered.notify_one();
                while gate.try_acquire().is_err() {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                Ok(())
            }
        };
        let worker = spawn_worker(Arc::new(handler), 1);
        let route = worker.route();

        assert_eq!(route.deliver(batch(0, 0..1)).await, Delivery::Enqueued);
        entered.notified().await;
        assert_eq!(route.deliver(batch(0, 1..2)).await, Delivery::Enqueued);

        // Queue is full: this send parks until the stop signal fires
        let pending = tokio::spawn({
            let route = route.clone();
            async move { route.deliver(batch(0, 2..3)).await }
        });
        sleep(Duration::from_millis(20)).await;
        worker.stop();

        let outcome = timeout(Duration::from_secs(1), pending)
            .await
            .expect("deliver blocked despite stop signal")
            .unwrap();
        assert_eq!(outcome, Delivery::Stopped);

        let metrics = Arc::clone(worker.metrics());
        gate.add_permits(1);
        worker.join().await;

        // Only the record that was in flight when the stop fired completed
        assert_eq!(metrics.records_handled(), 1);
    }

    #[tokio::test]
    async fn test_created_worker_runs_nothing_until_launched() {
        let (handler, seen) = recording_handler();
        let mut worker = PartitionWorker::new(TopicPartition::new("orders", 0), handler, 4);
        assert!(!worker.is_launched());
        assert!(worker.is_finished());

        // Queued ahead of launch, handled once the task starts
        assert_eq!(worker.route().deliver(batch(0, 0..2)).await, Delivery::Enqueued);
        sleep(Duration::from_millis(20)).await;
        assert!(seen.lock().unwrap().is_empty());

        assert!(worker.launch(&Handle::current()));
        assert!(!worker.launch(&Handle::current()));
        wait_for_records(&worker, 2).await;
        assert_eq!(*seen.lock().unwrap(), vec!["k0", "k1"]);

        worker.join().await;
    }

    #[tokio::test]
    async fn test_dropping_unlaunched_worker_rejects_deliveries() {
        let (handler, seen) = recording_handler();
        let worker = PartitionWorker::new(TopicPartition::new("orders", 0), handler, 4);
        let route = worker.route();

        worker.join().await;
        assert_eq!(route.deliver(batch(0, 0..1)).await, Delivery::Stopped);
        assert!(seen.lock().unwrap().is_empty());
    }
}
