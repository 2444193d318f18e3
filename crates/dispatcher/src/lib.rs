//! # Dispatcher
//!
//! Partitioned stream-consumption dispatcher.
//!
//! Responsibilities:
//! - Run one worker task per owned partition, applying the record handler in
//!   offset order
//! - Track ownership in a lock-guarded registry shared with the poll loop
//! - Start and stop workers on assign / revoke / lost notifications
//! - Route fetched batches to their partition's worker without blocking on a
//!   worker that is being torn down

pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod poll_loop;
pub mod registry;
pub mod worker;

pub use contracts::{RecordHandler, SharedHandler};
pub use coordinator::{RebalanceCoordinator, ReleaseKind};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handlers::LogHandler;
pub use metrics::{WorkerMetrics, WorkerMetricsSnapshot};
pub use poll_loop::{PollExit, PollLoop, PollStats};
pub use registry::{PartitionRegistry, RegistryGuard};
pub use worker::{Delivery, PartitionWorker, WorkerRoute};
