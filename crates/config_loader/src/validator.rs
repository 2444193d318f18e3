//! Configuration validation
//!
//! Rules:
//! - at least one broker, none blank
//! - producer / consumer topic and consumer group are non-empty
//! - partitions > 0
//! - queue_capacity > 0 and max_poll_records > 0
//! - server port != 0

use std::collections::HashSet;

use contracts::{AppConfig, ContractError};

/// Validate an AppConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &AppConfig) -> Result<(), ContractError> {
    validate_brokers(config)?;
    validate_topics(config)?;
    validate_dispatcher(config)?;
    validate_server(config)?;
    Ok(())
}

/// Broker list must be non-empty and free of duplicates
fn validate_brokers(config: &AppConfig) -> Result<(), ContractError> {
    let brokers = &config.kafka.connection.brokers;
    if brokers.is_empty() {
        return Err(ContractError::config_validation(
            "kafka.connection.brokers",
            "at least one broker is required",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, broker) in brokers.iter().enumerate() {
        if broker.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("kafka.connection.brokers[{idx}]"),
                "broker address cannot be empty",
            ));
        }
        if !seen.insert(broker) {
            return Err(ContractError::config_validation(
                format!("kafka.connection.brokers[{idx}]"),
                format!("duplicate broker '{broker}'"),
            ));
        }
    }
    Ok(())
}

fn validate_topics(config: &AppConfig) -> Result<(), ContractError> {
    let topics = &config.kafka.topics;
    for (field, value) in [
        ("kafka.topics.producer", &topics.producer),
        ("kafka.topics.consumer", &topics.consumer),
        ("kafka.topics.consumer_group", &topics.consumer_group),
    ] {
        if value.trim().is_empty() {
            return Err(ContractError::config_validation(field, "cannot be empty"));
        }
    }

    if topics.partitions <= 0 {
        return Err(ContractError::config_validation(
            "kafka.topics.partitions",
            format!("partitions must be > 0, got {}", topics.partitions),
        ));
    }
    Ok(())
}

fn validate_dispatcher(config: &AppConfig) -> Result<(), ContractError> {
    let dispatcher = &config.dispatcher;
    if dispatcher.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "dispatcher.queue_capacity",
            "queue_capacity must be > 0",
        ));
    }
    if dispatcher.max_poll_records == 0 {
        return Err(ContractError::config_validation(
            "dispatcher.max_poll_records",
            "max_poll_records must be > 0",
        ));
    }
    Ok(())
}

fn validate_server(config: &AppConfig) -> Result<(), ContractError> {
    if config.server.port == 0 {
        return Err(ContractError::config_validation(
            "server.port",
            "port must be non-zero",
        ));
    }
    Ok(())
}
