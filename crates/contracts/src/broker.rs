//! Broker collaborator contracts
//!
//! The dispatcher consumes three capabilities from the broker connection:
//! - `BrokerClient`: suspending fetch of per-partition batches
//! - `RebalanceListener`: notification sink invoked on assign / revoke / lost
//! - `TopicAdmin` / `RecordPublisher`: topic setup and fire-and-forget produce

use std::sync::Arc;

use crate::{Batch, ContractError, PartitionId, PartitionSet};

/// Error reported by a fetch for one partition (or the whole client)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    /// Topic the error is scoped to, None for client-level errors
    pub topic: Option<String>,
    /// Partition the error is scoped to, None for topic/client-level errors
    pub partition: Option<PartitionId>,
    pub message: String,
}

impl FetchError {
    pub fn partition(
        topic: impl Into<String>,
        partition: PartitionId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            topic: Some(topic.into()),
            partition: Some(partition),
            message: message.into(),
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self {
            topic: None,
            partition: None,
            message: message.into(),
        }
    }
}

/// Result of one fetch cycle
#[derive(Debug, Clone, Default)]
pub struct Fetches {
    /// Per-partition batches, at most one per (topic, partition)
    pub batches: Vec<Batch>,
    /// Non-fatal errors observed while fetching
    pub errors: Vec<FetchError>,
    /// Terminal: the client has been closed and will never return data again
    pub client_closed: bool,
}

impl Fetches {
    pub fn from_batches(batches: Vec<Batch>) -> Self {
        Self {
            batches,
            ..Default::default()
        }
    }

    pub fn from_errors(errors: Vec<FetchError>) -> Self {
        Self {
            errors,
            ..Default::default()
        }
    }

    /// The terminal fetch result
    pub fn closed() -> Self {
        Self {
            client_closed: true,
            ..Default::default()
        }
    }

    pub fn is_client_closed(&self) -> bool {
        self.client_closed
    }

    /// Total number of records across all batches
    pub fn record_count(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }
}

/// Broker client consumed by the poll loop
///
/// `fetch` suspends until data is available, an error occurs, or the client
/// is closed. After `close` every subsequent `fetch` must report
/// `client_closed` without blocking.
#[trait_variant::make(BrokerClient: Send)]
pub trait LocalBrokerClient {
    /// Fetch the next available set of batches
    async fn fetch(&self) -> Fetches;

    /// Close the client, releasing its resources. Idempotent.
    fn close(&self);
}

/// Notification sink the broker invokes on partition ownership changes
///
/// Invoked synchronously from the broker's own thread(s). Implementations
/// must not block on anything but short-lived locks.
pub trait RebalanceListener: Send + Sync {
    /// Partitions newly owned by this process
    ///
    /// # Errors
    /// `ContractError::DuplicateAssignment` if a partition is already owned.
    fn on_assigned(&self, assigned: &PartitionSet) -> Result<(), ContractError>;

    /// Partitions released by a graceful rebalance
    fn on_revoked(&self, revoked: &PartitionSet);

    /// Partitions whose ownership was lost (e.g. session timeout)
    fn on_lost(&self, lost: &PartitionSet);
}

/// Shared listener handle passed to broker constructors
pub type SharedListener = Arc<dyn RebalanceListener>;

/// Topic administration
#[trait_variant::make(TopicAdmin: Send)]
pub trait LocalTopicAdmin {
    /// Create topics if absent. A topic that already exists is not an error.
    async fn ensure_topics(&self, topics: &[String], partitions: i32)
        -> Result<(), ContractError>;
}

/// Broker-side placement of a published record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: PartitionId,
    pub offset: i64,
}

/// Acknowledgement callback invoked once per published record
pub type DeliveryCallback = Box<dyn FnOnce(Result<RecordMetadata, ContractError>) + Send>;

/// Fire-and-forget record production
pub trait RecordPublisher: Send + Sync {
    /// Enqueue a record for the default producer topic.
    ///
    /// Returns once the record is enqueued; `ack` fires when the broker
    /// confirms or rejects it.
    ///
    /// # Errors
    /// Returns an error only if the record could not be enqueued at all.
    fn publish(&self, key: &[u8], value: &[u8], ack: DeliveryCallback)
        -> Result<(), ContractError>;
}
