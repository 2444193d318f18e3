//! Broker error types

use contracts::ContractError;
use thiserror::Error;

/// Broker adapter errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Client construction or connection failure
    #[error("failed to connect to broker: {message}")]
    ConnectionFailed { message: String },

    /// Subscription to the consumer topic failed
    #[error("failed to subscribe to topic '{topic}': {message}")]
    SubscribeFailed { topic: String, message: String },

    /// The client was closed; no further operations are accepted
    #[error("broker client is closed")]
    Closed,

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl BrokerError {
    /// Create connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Create subscribe error
    pub fn subscribe(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SubscribeFailed {
            topic: topic.into(),
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BrokerError::subscribe("orders", "not authorized");
        assert_eq!(
            err.to_string(),
            "failed to subscribe to topic 'orders': not authorized"
        );
        assert_eq!(BrokerError::Closed.to_string(), "broker client is closed");
    }

    #[test]
    fn test_contract_error_is_transparent() {
        let err: BrokerError = ContractError::broker_connection("refused").into();
        assert_eq!(
            err.to_string(),
            ContractError::broker_connection("refused").to_string()
        );
    }
}
