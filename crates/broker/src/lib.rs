//! # Broker
//!
//! Broker collaborators consumed by the dispatcher.
//!
//! Responsibilities:
//! - Fetch per-partition batches (`BrokerClient`)
//! - Report partition assignment, revocation and loss to a `RebalanceListener`
//! - Create topics idempotently (`TopicAdmin`)
//! - Publish records fire-and-forget with an acknowledgement callback
//!   (`RecordPublisher`)
//!
//! ## Feature Flags
//!
//! - `kafka`: Enable the rdkafka-backed `KafkaBroker`

pub mod error;
pub mod mock;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use contracts::{BrokerClient, RebalanceListener, RecordPublisher, SharedListener, TopicAdmin};
pub use error::{BrokerError, Result};
pub use mock::MockBroker;

#[cfg(feature = "kafka")]
pub use kafka::KafkaBroker;
