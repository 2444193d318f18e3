//! PartitionSet - payload of assign / revoke / lost notifications
//!
//! Maps topic -> set of partition ids. Ordered containers keep iteration
//! deterministic, which keeps logs and tests stable.

use std::collections::{BTreeMap, BTreeSet};

use crate::{PartitionId, TopicPartition};

/// Set of partitions grouped by topic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSet {
    topics: BTreeMap<String, BTreeSet<PartitionId>>,
}

impl PartitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper: add several partitions of one topic
    pub fn with(
        mut self,
        topic: impl Into<String>,
        partitions: impl IntoIterator<Item = PartitionId>,
    ) -> Self {
        let topic = topic.into();
        for partition in partitions {
            self.insert(topic.clone(), partition);
        }
        self
    }

    /// Add a single partition. Returns false if it was already present.
    pub fn insert(&mut self, topic: impl Into<String>, partition: PartitionId) -> bool {
        self.topics.entry(topic.into()).or_default().insert(partition)
    }

    pub fn contains(&self, topic: &str, partition: PartitionId) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|partitions| partitions.contains(&partition))
    }

    /// Iterate topics with their partitions
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<PartitionId>)> {
        self.topics.iter().map(|(t, p)| (t.as_str(), p))
    }

    /// Iterate flattened (topic, partition) pairs
    pub fn topic_partitions(&self) -> impl Iterator<Item = TopicPartition> + '_ {
        self.topics.iter().flat_map(|(topic, partitions)| {
            partitions
                .iter()
                .map(move |p| TopicPartition::new(topic.clone(), *p))
        })
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// Total number of partitions across all topics
    pub fn len(&self) -> usize {
        self.topics.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<TopicPartition> for PartitionSet {
    fn from_iter<I: IntoIterator<Item = TopicPartition>>(iter: I) -> Self {
        let mut set = Self::new();
        for tp in iter {
            set.insert(tp.topic, tp.partition);
        }
        set
    }
}

impl FromIterator<(String, PartitionId)> for PartitionSet {
    fn from_iter<I: IntoIterator<Item = (String, PartitionId)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(topic, partition)| TopicPartition::new(topic, partition))
            .collect()
    }
}
