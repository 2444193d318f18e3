//! In-memory broker
//!
//! Drives the dispatcher without a cluster: tests and `--mock` runs script
//! rebalances and fetch results directly. Published records are appended to
//! an in-memory log and returned by the next fetch.

use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use contracts::{
    Batch, BrokerClient, ContractError, DeliveryCallback, FetchError, Fetches, PartitionId,
    PartitionSet, Record, RecordMetadata, RecordPublisher, SharedListener, TopicAdmin,
    TopicPartition,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{BrokerError, Result};

#[derive(Debug, Default)]
struct MockLog {
    /// topic -> partition count
    topics: HashMap<String, i32>,
    /// next offset per partition
    next_offsets: HashMap<TopicPartition, i64>,
}

impl MockLog {
    fn allocate(&mut self, topic: &str, partition: PartitionId) -> i64 {
        let next = self
            .next_offsets
            .entry(TopicPartition::new(topic, partition))
            .or_insert(0);
        let offset = *next;
        *next += 1;
        offset
    }
}

/// In-memory broker collaborator
pub struct MockBroker {
    listener: SharedListener,
    producer_topic: String,
    tx: mpsc::UnboundedSender<Fetches>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Fetches>>,
    closed: CancellationToken,
    fetch_calls: AtomicU64,
    log: Mutex<MockLog>,
    /// Partition cursor for records without a key
    round_robin: AtomicU32,
}

impl MockBroker {
    /// Create a broker that reports rebalances to `listener` and publishes to
    /// `producer_topic`
    pub fn new(listener: SharedListener, producer_topic: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            listener,
            producer_topic: producer_topic.into(),
            tx,
            rx: tokio::sync::Mutex::new(rx),
            closed: CancellationToken::new(),
            fetch_calls: AtomicU64::new(0),
            log: Mutex::new(MockLog::default()),
            round_robin: AtomicU32::new(0),
        }
    }

    pub fn listener(&self) -> &SharedListener {
        &self.listener
    }

    pub fn producer_topic(&self) -> &str {
        &self.producer_topic
    }

    /// Notify the listener that partitions were assigned
    pub fn assign(&self, partitions: &PartitionSet) -> std::result::Result<(), ContractError> {
        debug!(partitions = partitions.len(), "Mock assign");
        self.listener.on_assigned(partitions)
    }

    /// Notify the listener that partitions were revoked
    pub fn revoke(&self, partitions: &PartitionSet) {
        debug!(partitions = partitions.len(), "Mock revoke");
        self.listener.on_revoked(partitions);
    }

    /// Notify the listener that partition ownership was lost
    pub fn lose(&self, partitions: &PartitionSet) {
        debug!(partitions = partitions.len(), "Mock lost");
        self.listener.on_lost(partitions);
    }

    /// Queue one batch for `(topic, partition)` with freshly allocated offsets
    ///
    /// Returns the offset of the first record.
    pub fn deliver<K, V>(
        &self,
        topic: &str,
        partition: PartitionId,
        records: impl IntoIterator<Item = (K, V)>,
    ) -> Result<i64>
    where
        K: Into<Bytes>,
        V: Into<Bytes>,
    {
        // Held through the send so batches enter the channel in offset order
        let mut log = self.lock_log();
        let records: Vec<Record> = records
            .into_iter()
            .map(|(key, value)| {
                let offset = log.allocate(topic, partition);
                Record::new(topic, partition, offset, key, value)
            })
            .collect();
        let first = records.first().map_or(-1, |r| r.offset);
        self.push(Fetches::from_batches(vec![Batch::new(topic, partition, records)]))?;
        drop(log);
        Ok(first)
    }

    /// Queue a raw fetch result
    pub fn push(&self, fetches: Fetches) -> Result<()> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        self.tx.send(fetches).map_err(|_| BrokerError::Closed)
    }

    /// Queue a fetch result carrying a single partition error
    pub fn fail(
        &self,
        topic: &str,
        partition: PartitionId,
        message: impl Into<String>,
    ) -> Result<()> {
        self.push(Fetches::from_errors(vec![FetchError::partition(
            topic, partition, message,
        )]))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of fetch calls made so far
    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Partition count of a created topic
    pub fn partition_count(&self, topic: &str) -> Option<i32> {
        self.lock_log().topics.get(topic).copied()
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, MockLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Key-hash partitioning; keyless records rotate across partitions
    fn partition_for(&self, key: &[u8], partitions: i32) -> PartitionId {
        let partitions = partitions.max(1) as u64;
        if key.is_empty() {
            let next = self.round_robin.fetch_add(1, Ordering::Relaxed) as u64;
            return (next % partitions) as PartitionId;
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % partitions) as PartitionId
    }
}

impl BrokerClient for MockBroker {
    async fn fetch(&self) -> Fetches {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.is_cancelled() {
            return Fetches::closed();
        }

        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Fetches::closed(),
            next = rx.recv() => next.unwrap_or_else(Fetches::closed),
        }
    }

    fn close(&self) {
        if !self.closed.is_cancelled() {
            info!("Mock broker closed");
        }
        self.closed.cancel();
    }
}

impl TopicAdmin for MockBroker {
    #[instrument(name = "mock_ensure_topics", skip(self), fields(count = topics.len()))]
    async fn ensure_topics(
        &self,
        topics: &[String],
        partitions: i32,
    ) -> std::result::Result<(), ContractError> {
        if self.is_closed() {
            return Err(ContractError::broker_connection("client closed"));
        }

        let mut log = self.lock_log();
        for topic in topics {
            if partitions <= 0 {
                return Err(ContractError::topic_creation(
                    topic,
                    format!("invalid partition count {partitions}"),
                ));
            }
            match log.topics.entry(topic.clone()) {
                Entry::Occupied(_) => debug!(topic = %topic, "Topic already exists"),
                Entry::Vacant(slot) => {
                    slot.insert(partitions);
                    info!(topic = %topic, partitions, "Topic created");
                }
            }
        }
        Ok(())
    }
}

impl RecordPublisher for MockBroker {
    /// Append to the in-memory log and acknowledge immediately
    fn publish(
        &self,
        key: &[u8],
        value: &[u8],
        ack: DeliveryCallback,
    ) -> std::result::Result<(), ContractError> {
        let topic = self.producer_topic.as_str();
        if self.is_closed() {
            return Err(ContractError::publish(topic, "client closed"));
        }

        // Held through the send so batches enter the channel in offset order
        let mut log = self.lock_log();
        let Some(&partitions) = log.topics.get(topic) else {
            return Err(ContractError::publish(topic, "unknown topic"));
        };
        let partition = self.partition_for(key, partitions);
        let offset = log.allocate(topic, partition);

        let record = Record::new(
            topic,
            partition,
            offset,
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
        );
        self.push(Fetches::from_batches(vec![Batch::new(topic, partition, vec![record])]))
            .map_err(|e| ContractError::publish(topic, e.to_string()))?;
        drop(log);

        ack(Ok(RecordMetadata {
            topic: topic.to_string(),
            partition,
            offset,
        }));
        Ok(())
    }
}
