//! Poll loop - fetch batches from the broker and route them to workers

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use contracts::{Batch, BrokerClient, FetchError, TopicPartition};
use futures::future::join_all;
use observability::{DiscardReason, RunningStats, StatsSummary};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::registry::PartitionRegistry;
use crate::worker::{Delivery, WorkerRoute};

/// Why the poll loop returned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollExit {
    /// The broker reported the client closed
    #[default]
    ClientClosed,
    /// The coordinator fired the halt token
    Halted,
}

/// Counters accumulated over the lifetime of one poll loop
#[derive(Debug, Clone, Default)]
pub struct PollStats {
    pub fetches: u64,
    pub batches_routed: u64,
    pub records_routed: u64,
    pub batches_discarded: u64,
    pub fetch_errors: u64,
    pub batch_sizes: RunningStats,
    pub exit: PollExit,
}

impl fmt::Display for PollStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "exit:              {:?}", self.exit)?;
        writeln!(f, "fetches:           {}", self.fetches)?;
        writeln!(
            f,
            "batches routed:    {} ({} records)",
            self.batches_routed, self.records_routed
        )?;
        writeln!(f, "batches discarded: {}", self.batches_discarded)?;
        writeln!(f, "fetch errors:      {}", self.fetch_errors)?;
        write!(
            f,
            "batch size:        {}",
            StatsSummary::from(&self.batch_sizes)
        )
    }
}

/// Single long-lived fetch/route loop
pub struct PollLoop<B> {
    broker: Arc<B>,
    registry: Arc<PartitionRegistry>,
    halt: CancellationToken,
}

impl<B> PollLoop<B>
where
    B: BrokerClient + Send + Sync + 'static,
{
    pub fn new(broker: Arc<B>, registry: Arc<PartitionRegistry>, halt: CancellationToken) -> Self {
        Self {
            broker,
            registry,
            halt,
        }
    }

    /// Run until the client is closed or the halt token fires
    #[instrument(name = "poll_loop_run", skip(self))]
    pub async fn run(self) -> PollStats {
        info!("Poll loop started");
        let mut stats = PollStats::default();

        loop {
            let fetches = tokio::select! {
                biased;
                _ = self.halt.cancelled() => {
                    stats.exit = PollExit::Halted;
                    break;
                }
                fetches = self.broker.fetch() => fetches,
            };
            stats.fetches += 1;

            if fetches.is_client_closed() {
                stats.exit = PollExit::ClientClosed;
                break;
            }

            for error in &fetches.errors {
                report_fetch_error(error);
                stats.fetch_errors += 1;
            }

            self.route(fetches.batches, &mut stats).await;
        }

        info!(
            exit = ?stats.exit,
            fetches = stats.fetches,
            batches_routed = stats.batches_routed,
            batches_discarded = stats.batches_discarded,
            "Poll loop stopped"
        );
        stats
    }

    /// Hand every batch of one fetch to its partition worker, or discard it
    ///
    /// Partitions are delivered concurrently so a full queue only holds back
    /// its own partition. Batches of the same partition keep fetch order.
    async fn route(&self, batches: Vec<Batch>, stats: &mut PollStats) {
        let mut routes: Vec<(WorkerRoute, Vec<Batch>)> = Vec::new();
        let mut slots: HashMap<TopicPartition, usize> = HashMap::new();

        for batch in batches {
            let tp = batch.topic_partition();
            if let Some(&slot) = slots.get(&tp) {
                routes[slot].1.push(batch);
                continue;
            }
            let Some(route) = self.registry.lookup(&batch.topic, batch.partition) else {
                // Revoked between fetch and dispatch
                debug!(partition = %tp, "Discarding batch for unowned partition");
                observability::record_batch_discarded(&batch.topic, DiscardReason::Unowned);
                stats.batches_discarded += 1;
                continue;
            };
            slots.insert(tp, routes.len());
            routes.push((route, vec![batch]));
        }

        let deliveries = routes
            .into_iter()
            .map(|(route, batches)| deliver_in_order(route, batches));
        let outcomes = join_all(deliveries).await;

        for routed in outcomes.into_iter().flatten() {
            match routed.delivery {
                Delivery::Enqueued => {
                    observability::record_batch_routed(
                        &routed.topic_partition.topic,
                        routed.records,
                    );
                    stats.batches_routed += 1;
                    stats.records_routed += routed.records as u64;
                    stats.batch_sizes.push(routed.records as f64);
                }
                Delivery::Stopped => {
                    debug!(
                        partition = %routed.topic_partition,
                        "Worker stopping, batch discarded"
                    );
                    observability::record_batch_discarded(
                        &routed.topic_partition.topic,
                        DiscardReason::Stopping,
                    );
                    stats.batches_discarded += 1;
                }
            }
        }
    }
}

/// Outcome of delivering one batch
struct Routed {
    topic_partition: TopicPartition,
    records: usize,
    delivery: Delivery,
}

/// Deliver one partition's batches in fetch order
async fn deliver_in_order(route: WorkerRoute, batches: Vec<Batch>) -> Vec<Routed> {
    let mut outcomes = Vec::with_capacity(batches.len());
    for batch in batches {
        let records = batch.len();
        let delivery = route.deliver(batch).await;
        outcomes.push(Routed {
            topic_partition: route.topic_partition().clone(),
            records,
            delivery,
        });
    }
    outcomes
}

fn report_fetch_error(error: &FetchError) {
    warn!(
        topic = error.topic.as_deref().unwrap_or("-"),
        partition = ?error.partition,
        error = %error.message,
        "Fetch error"
    );
    observability::record_fetch_error(error.topic.as_deref());
}
