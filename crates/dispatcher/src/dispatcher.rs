//! Dispatcher - wires the registry, the rebalance coordinator and the poll loop

use std::sync::Arc;

use contracts::{
    BrokerClient, DispatcherSettings, PartitionSet, SharedHandler, SharedListener, TopicPartition,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::coordinator::RebalanceCoordinator;
use crate::error::DispatcherError;
use crate::metrics::WorkerMetricsSnapshot;
use crate::poll_loop::{PollLoop, PollStats};
use crate::registry::PartitionRegistry;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Batches buffered per partition before the poll loop is throttled
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { queue_capacity: 10 }
    }
}

impl From<&DispatcherSettings> for DispatcherConfig {
    fn from(settings: &DispatcherSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity,
        }
    }
}

/// Two-phase construction: the broker needs the listener before the
/// dispatcher can poll the broker.
pub struct DispatcherBuilder {
    coordinator: Arc<RebalanceCoordinator>,
    runtime: Handle,
}

impl DispatcherBuilder {
    /// Create the registry and coordinator on the current tokio runtime
    ///
    /// # Errors
    /// `DispatcherError::Runtime` when called outside a tokio runtime.
    pub fn new(config: DispatcherConfig, handler: SharedHandler) -> Result<Self, DispatcherError> {
        let runtime =
            Handle::try_current().map_err(|e| DispatcherError::runtime(e.to_string()))?;
        let registry = Arc::new(PartitionRegistry::new());
        let coordinator = Arc::new(RebalanceCoordinator::new(
            registry,
            handler,
            config.queue_capacity,
            runtime.clone(),
        ));
        Ok(Self {
            coordinator,
            runtime,
        })
    }

    /// Notification sink to register with the broker
    pub fn listener(&self) -> SharedListener {
        self.coordinator.clone()
    }

    /// Spawn the poll loop against a connected broker
    #[instrument(name = "dispatcher_start", skip(self, broker))]
    pub fn start<B>(self, broker: Arc<B>) -> Dispatcher<B>
    where
        B: BrokerClient + Send + Sync + 'static,
    {
        let poll_loop = PollLoop::new(
            Arc::clone(&broker),
            Arc::clone(self.coordinator.registry()),
            self.coordinator.halt_token(),
        );
        let poll_task = self.runtime.spawn(poll_loop.run());
        info!("Dispatcher started");

        Dispatcher {
            broker,
            coordinator: self.coordinator,
            poll_task,
        }
    }
}

/// A running dispatcher bound to a broker
pub struct Dispatcher<B> {
    broker: Arc<B>,
    coordinator: Arc<RebalanceCoordinator>,
    poll_task: JoinHandle<PollStats>,
}

impl<B> Dispatcher<B>
where
    B: BrokerClient + Send + Sync + 'static,
{
    pub fn builder(
        config: DispatcherConfig,
        handler: SharedHandler,
    ) -> Result<DispatcherBuilder, DispatcherError> {
        DispatcherBuilder::new(config, handler)
    }

    pub fn broker(&self) -> &Arc<B> {
        &self.broker
    }

    /// Partitions currently owned by this process
    pub fn owned_partitions(&self) -> PartitionSet {
        self.coordinator.registry().owned()
    }

    /// Get metrics for all live workers
    pub fn worker_metrics(&self) -> Vec<(TopicPartition, WorkerMetricsSnapshot)> {
        self.coordinator.registry().metrics()
    }

    /// Whether the poll loop is still running
    pub fn is_running(&self) -> bool {
        !self.poll_task.is_finished()
    }

    /// Resolves once a fatal rebalance error has halted the poll loop
    pub async fn halted(&self) {
        let halt = self.coordinator.halt_token();
        halt.cancelled().await;
    }

    /// Wait for the poll loop to exit on its own, then stop every worker
    ///
    /// The loop exits when the broker reports the client closed or when a
    /// duplicate assignment halts the dispatcher.
    #[instrument(name = "dispatcher_wait", skip(self))]
    pub async fn wait(self) -> Result<PollStats, DispatcherError> {
        let stats = self
            .poll_task
            .await
            .map_err(|e| DispatcherError::poll_task(e.to_string()))?;
        self.coordinator.shutdown().await;
        self.broker.close();
        Self::finish(&self.coordinator, stats)
    }

    /// Stop all workers, release the broker, then wait for the poll loop
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(self) -> Result<PollStats, DispatcherError> {
        self.coordinator.shutdown().await;
        self.broker.close();
        let stats = self
            .poll_task
            .await
            .map_err(|e| DispatcherError::poll_task(e.to_string()))?;
        Self::finish(&self.coordinator, stats)
    }

    fn finish(
        coordinator: &RebalanceCoordinator,
        stats: PollStats,
    ) -> Result<PollStats, DispatcherError> {
        match coordinator.violation() {
            Some(violation) => {
                error!(error = %violation, "Dispatcher halted");
                Err(DispatcherError::Halted(violation))
            }
            None => {
                info!(
                    batches_routed = stats.batches_routed,
                    batches_discarded = stats.batches_discarded,
                    "Dispatcher shutdown complete"
                );
                Ok(stats)
            }
        }
    }
}

/// Build a dispatcher, connect the broker with its listener, and start polling
pub fn create_dispatcher<B, E, F>(
    config: DispatcherConfig,
    handler: SharedHandler,
    connect: F,
) -> Result<Dispatcher<B>, E>
where
    B: BrokerClient + Send + Sync + 'static,
    F: FnOnce(SharedListener) -> Result<B, E>,
    E: From<DispatcherError>,
{
    let builder = DispatcherBuilder::new(config, handler)?;
    let broker = connect(builder.listener())?;
    Ok(builder.start(Arc::new(broker)))
}
