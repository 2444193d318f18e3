//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// The dispatcher stopped because the broker broke a rebalance invariant
    #[error("dispatcher halted: {0}")]
    Halted(#[source] contracts::ContractError),

    /// The poll loop task panicked or was cancelled
    #[error("poll loop task failed: {message}")]
    PollTask { message: String },

    /// Built outside a tokio runtime
    #[error("no tokio runtime available: {message}")]
    Runtime { message: String },

    /// Contract-level error
    #[error(transparent)]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    /// Create a poll task error
    pub fn poll_task(message: impl Into<String>) -> Self {
        Self::PollTask {
            message: message.into(),
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }
}
