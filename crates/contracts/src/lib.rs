//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend only on this crate for cross-crate types; reverse
//! dependencies are prohibited.
//!
//! ## Ordering Model
//! - A `Batch` always belongs to exactly one (topic, partition) pair
//! - Offsets only ever increase within a partition across successive fetches

mod assignment;
mod broker;
mod config;
mod error;
mod handler;
mod record;

pub use assignment::PartitionSet;
pub use broker::*;
pub use config::*;
pub use error::*;
pub use handler::{RecordHandler, SharedHandler};
pub use record::*;
