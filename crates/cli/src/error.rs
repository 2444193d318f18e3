//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Real broker requested but the binary was built without it
    #[cfg(not(feature = "kafka"))]
    #[error("Kafka support is not compiled in; rebuild with `--features kafka` or pass --mock")]
    KafkaDisabled,

    /// HTTP server error
    #[error("HTTP server failed: {message}")]
    Server { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }
}
