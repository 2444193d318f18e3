//! Layered error definitions
//!
//! Categorized by source: config / broker / rebalance / handler

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Broker Errors =====
    /// Broker connection error
    #[error("broker connection error: {message}")]
    BrokerConnection { message: String },

    /// Topic administration error ("already exists" is never reported here)
    #[error("failed to create topic '{topic}': {message}")]
    TopicCreation { topic: String, message: String },

    /// Publish error
    #[error("failed to publish to '{topic}': {message}")]
    Publish { topic: String, message: String },

    // ===== Rebalance Errors =====
    /// A partition was assigned while it is still owned by a running worker
    #[error("partition {topic}[{partition}] assigned while already owned")]
    DuplicateAssignment { topic: String, partition: i32 },

    // ===== Handler Errors =====
    /// Record handler failure
    #[error("handler error: {message}")]
    Handler { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create broker connection error
    pub fn broker_connection(message: impl Into<String>) -> Self {
        Self::BrokerConnection {
            message: message.into(),
        }
    }

    /// Create topic creation error
    pub fn topic_creation(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TopicCreation {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create publish error
    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create duplicate assignment error
    pub fn duplicate_assignment(topic: impl Into<String>, partition: i32) -> Self {
        Self::DuplicateAssignment {
            topic: topic.into(),
            partition,
        }
    }

    /// Create handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}
