//! Rebalance coordinator
//!
//! Applies assign / revoke / lost notifications to the registry and owns the
//! lifecycle of every partition worker. Notifications arrive synchronously on
//! broker threads; workers are spawned onto the dispatcher's runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use contracts::{ContractError, PartitionSet, RebalanceListener, SharedHandler, TopicPartition};
use futures::future::join_all;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::registry::PartitionRegistry;
use crate::worker::PartitionWorker;

/// Why partitions are being released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseKind {
    /// Graceful, rebalance-initiated
    Revoked,
    /// Ownership lost without a graceful handoff
    Lost,
}

impl ReleaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Revoked => "revoked",
            Self::Lost => "lost",
        }
    }
}

/// Creates and destroys partition workers in response to rebalances
pub struct RebalanceCoordinator {
    registry: Arc<PartitionRegistry>,
    handler: SharedHandler,
    queue_capacity: usize,
    runtime: Handle,
    /// Fired on an invariant violation; stops the poll loop
    halt: CancellationToken,
    /// First duplicate assignment observed
    violation: Mutex<Option<TopicPartition>>,
    closed: AtomicBool,
}

impl RebalanceCoordinator {
    pub fn new(
        registry: Arc<PartitionRegistry>,
        handler: SharedHandler,
        queue_capacity: usize,
        runtime: Handle,
    ) -> Self {
        Self {
            registry,
            handler,
            queue_capacity,
            runtime,
            halt: CancellationToken::new(),
            violation: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<PartitionRegistry> {
        &self.registry
    }

    /// Token fired when the coordinator detects a fatal invariant violation
    pub fn halt_token(&self) -> CancellationToken {
        self.halt.clone()
    }

    /// The fatal error recorded by a duplicate assignment, if any
    pub fn violation(&self) -> Option<ContractError> {
        self.violation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|tp| ContractError::duplicate_assignment(&tp.topic, tp.partition))
    }

    /// Start a worker for every newly owned partition
    ///
    /// The whole set is applied under one registry lock. A partition that is
    /// already owned keeps its existing worker; the first such partition is
    /// recorded, the halt token fires, and the error is returned.
    #[instrument(
        name = "coordinator_assign",
        skip(self, assigned),
        fields(partitions = assigned.len())
    )]
    pub fn assign(&self, assigned: &PartitionSet) -> Result<(), ContractError> {
        let mut duplicate: Option<TopicPartition> = None;
        let mut started = 0usize;

        let active = {
            let mut registry = self.registry.lock();
            // Checked under the lock so shutdown's drain cannot miss a worker
            if self.closed.load(Ordering::Acquire) {
                warn!("Assignment received after shutdown, ignoring");
                return Ok(());
            }

            for tp in assigned.topic_partitions() {
                if registry.contains(&tp.topic, tp.partition) {
                    error!(partition = %tp, "Partition assigned while already owned");
                    duplicate.get_or_insert(tp);
                    continue;
                }

                // Create, register, then launch: a rejected worker never runs
                let worker = PartitionWorker::new(
                    tp.clone(),
                    Arc::clone(&self.handler),
                    self.queue_capacity,
                );
                match registry.put(worker) {
                    Ok(registered) => {
                        registered.launch(&self.runtime);
                        debug!(partition = %tp, "Partition worker registered");
                        started += 1;
                    }
                    Err(_) => {
                        duplicate.get_or_insert(tp);
                    }
                }
            }
            registry.len()
        };

        observability::record_rebalance("assigned", assigned.len());
        observability::set_active_workers(active);
        info!(started, active, "Partitions assigned");

        match duplicate {
            Some(tp) => {
                let err = ContractError::duplicate_assignment(&tp.topic, tp.partition);
                self.violation
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_insert(tp);
                self.halt.cancel();
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Release gracefully revoked partitions
    pub fn revoke(&self, revoked: &PartitionSet) {
        self.release(revoked, ReleaseKind::Revoked);
    }

    /// Release partitions whose ownership was lost
    pub fn lose(&self, lost: &PartitionSet) {
        self.release(lost, ReleaseKind::Lost);
    }

    /// Remove each registry entry, then fire the worker's stop signal
    ///
    /// Stopped workers are not joined: their tasks exit on their own and any
    /// queued batches are dropped.
    #[instrument(
        name = "coordinator_release",
        skip(self, partitions),
        fields(kind = kind.as_str(), partitions = partitions.len())
    )]
    fn release(&self, partitions: &PartitionSet, kind: ReleaseKind) {
        let mut stopped = 0usize;
        let active = {
            let mut registry = self.registry.lock();
            for tp in partitions.topic_partitions() {
                match registry.remove(&tp.topic, tp.partition) {
                    Some(worker) => {
                        worker.stop();
                        stopped += 1;
                    }
                    None => debug!(partition = %tp, "Partition not owned, nothing to release"),
                }
            }
            registry.len()
        };

        observability::record_rebalance(kind.as_str(), partitions.len());
        observability::set_active_workers(active);
        info!(stopped, active, "Partitions {}", kind.as_str());
    }

    /// Stop every live worker and wait for all of them to exit
    ///
    /// Later assignments are ignored. Safe to call more than once.
    #[instrument(name = "coordinator_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);

        let workers = self.registry.drain();
        observability::set_active_workers(0);
        info!(workers = workers.len(), "Stopping partition workers");

        // Fan out the stop signal before waiting on any single worker
        for worker in &workers {
            worker.stop();
        }
        join_all(workers.into_iter().map(PartitionWorker::join)).await;
    }
}

impl RebalanceListener for RebalanceCoordinator {
    fn on_assigned(&self, assigned: &PartitionSet) -> Result<(), ContractError> {
        self.assign(assigned)
    }

    fn on_revoked(&self, revoked: &PartitionSet) {
        self.revoke(revoked);
    }

    fn on_lost(&self, lost: &PartitionSet) {
        self.lose(lost);
    }
}
