//! AppConfig - Config Loader output
//!
//! Describes broker connection, topics, dispatcher tuning and the HTTP front door.

use serde::{Deserialize, Serialize};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Broker connection and topics
    pub kafka: KafkaConfig,

    /// Dispatcher tuning
    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// HTTP front door
    #[serde(default)]
    pub server: ServerConfig,
}

/// Broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub connection: KafkaConnection,
    pub topics: KafkaTopics,
}

/// Broker connection details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConnection {
    /// Seed brokers, "host:port"
    pub brokers: Vec<String>,

    /// Consumer group session timeout
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

impl KafkaConnection {
    /// Comma-joined broker list
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

fn default_session_timeout_ms() -> u64 {
    10_000
}

/// Topic configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaTopics {
    /// Topic the HTTP front door produces to
    pub producer: String,

    /// Topic the dispatcher consumes
    pub consumer: String,

    /// Consumer group id
    pub consumer_group: String,

    /// Partition count used when creating absent topics
    #[serde(default = "default_partitions")]
    pub partitions: i32,
}

impl KafkaTopics {
    /// Producer and consumer topics, deduplicated
    pub fn all(&self) -> Vec<String> {
        let mut topics = vec![self.producer.clone()];
        if self.consumer != self.producer {
            topics.push(self.consumer.clone());
        }
        topics
    }
}

fn default_partitions() -> i32 {
    3
}

/// Dispatcher tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Bounded queue capacity per partition worker, in batches
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum records gathered into one fetch
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_poll_records: default_max_poll_records(),
        }
    }
}

fn default_queue_capacity() -> usize {
    10
}

fn default_max_poll_records() -> usize {
    500
}

/// HTTP front door settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_server_port() -> u16 {
    8085
}

fn default_log_level() -> String {
    "info".to_string()
}
