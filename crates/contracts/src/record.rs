//! Record and Batch - broker output consumed by the dispatcher
//!
//! Records are immutable once delivered. `Bytes` keeps cloning cheap when a
//! batch is handed from the poll loop to a partition worker.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Partition identifier, unique within a topic
pub type PartitionId = i32;

/// A (topic, partition) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: PartitionId,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: PartitionId) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// A single record delivered by the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: PartitionId,
    /// Offset within the partition
    pub offset: i64,
    /// Record key (empty when the producer sent none)
    pub key: Bytes,
    /// Record payload
    pub value: Bytes,
}

impl Record {
    pub fn new(
        topic: impl Into<String>,
        partition: PartitionId,
        offset: i64,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered records for exactly one (topic, partition), as delivered by one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub topic: String,
    pub partition: PartitionId,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn new(topic: impl Into<String>, partition: PartitionId, records: Vec<Record>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            records,
        }
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Offset of the first record, None if the batch is empty
    pub fn first_offset(&self) -> Option<i64> {
        self.records.first().map(|r| r.offset)
    }

    /// Offset of the last record, None if the batch is empty
    pub fn last_offset(&self) -> Option<i64> {
        self.records.last().map(|r| r.offset)
    }
}
