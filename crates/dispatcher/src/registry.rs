//! Partition registry
//!
//! Topic -> partition -> worker map behind a single exclusion lock. The
//! rebalance coordinator mutates it, the poll loop reads it. The lock is only
//! ever held for map access, never across a queue operation.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{PartitionId, PartitionSet, TopicPartition};

use crate::metrics::WorkerMetricsSnapshot;
use crate::worker::{PartitionWorker, WorkerRoute};

type WorkerMap = HashMap<String, HashMap<PartitionId, PartitionWorker>>;

/// Lock-guarded mapping of owned partitions to their workers
#[derive(Default)]
pub struct PartitionRegistry {
    workers: Mutex<WorkerMap>,
}

impl PartitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the registry lock for a sequence of operations
    ///
    /// A rebalance notification holds one guard for its whole partition set
    /// so the poll loop never observes it half-applied.
    pub fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            workers: self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Register a worker; hands it back if the partition is already owned
    pub fn put(&self, worker: PartitionWorker) -> Result<(), PartitionWorker> {
        self.lock().put(worker).map(|_| ())
    }

    /// Remove a worker. Absent entries are expected under revoke/lost races.
    pub fn remove(&self, topic: &str, partition: PartitionId) -> Option<PartitionWorker> {
        self.lock().remove(topic, partition)
    }

    /// Routing reference for a partition, if owned
    pub fn lookup(&self, topic: &str, partition: PartitionId) -> Option<WorkerRoute> {
        self.lock().lookup(topic, partition)
    }

    pub fn contains(&self, topic: &str, partition: PartitionId) -> bool {
        self.lock().contains(topic, partition)
    }

    /// Currently owned partitions
    pub fn owned(&self) -> PartitionSet {
        self.lock()
            .workers
            .iter()
            .flat_map(|(topic, partitions)| {
                partitions.keys().map(move |p| (topic.clone(), *p))
            })
            .collect()
    }

    /// Number of registered workers
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of topics with at least one owned partition
    pub fn topic_count(&self) -> usize {
        self.lock().workers.len()
    }

    /// Per-worker metrics, ordered by topic and partition
    pub fn metrics(&self) -> Vec<(TopicPartition, WorkerMetricsSnapshot)> {
        let guard = self.lock();
        let mut snapshots: Vec<_> = guard
            .workers
            .values()
            .flat_map(|partitions| partitions.values())
            .map(|w| (w.topic_partition().clone(), w.metrics().snapshot()))
            .collect();
        snapshots.sort_by(|a, b| a.0.cmp(&b.0));
        snapshots
    }

    /// Remove every worker, leaving the registry empty
    pub fn drain(&self) -> Vec<PartitionWorker> {
        let mut guard = self.lock();
        std::mem::take(&mut *guard.workers)
            .into_values()
            .flat_map(HashMap::into_values)
            .collect()
    }
}

/// Exclusive access to the registry for the lifetime of the guard
pub struct RegistryGuard<'a> {
    workers: MutexGuard<'a, WorkerMap>,
}

impl RegistryGuard<'_> {
    /// Register a worker; hands it back if the partition is already owned
    ///
    /// On success returns the registered entry, still under this guard.
    pub fn put(
        &mut self,
        worker: PartitionWorker,
    ) -> Result<&mut PartitionWorker, PartitionWorker> {
        let TopicPartition { topic, partition } = worker.topic_partition().clone();
        match self.workers.entry(topic).or_default().entry(partition) {
            Entry::Occupied(_) => Err(worker),
            Entry::Vacant(slot) => Ok(slot.insert(worker)),
        }
    }

    /// Remove a worker, pruning the topic once its last partition is gone
    pub fn remove(&mut self, topic: &str, partition: PartitionId) -> Option<PartitionWorker> {
        let partitions = self.workers.get_mut(topic)?;
        let worker = partitions.remove(&partition);
        if partitions.is_empty() {
            self.workers.remove(topic);
        }
        worker
    }

    pub fn lookup(&self, topic: &str, partition: PartitionId) -> Option<WorkerRoute> {
        self.workers
            .get(topic)
            .and_then(|partitions| partitions.get(&partition))
            .map(PartitionWorker::route)
    }

    pub fn contains(&self, topic: &str, partition: PartitionId) -> bool {
        self.workers
            .get(topic)
            .is_some_and(|partitions| partitions.contains_key(&partition))
    }

    pub fn len(&self) -> usize {
        self.workers.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
