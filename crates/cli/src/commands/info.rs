//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::AppConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    kafka: KafkaInfo,
    dispatcher: DispatcherInfo,
    server: ServerInfo,
}

#[derive(Serialize)]
struct KafkaInfo {
    brokers: Vec<String>,
    session_timeout_ms: u64,
    producer_topic: String,
    consumer_topic: String,
    consumer_group: String,
    partitions: i32,
}

#[derive(Serialize)]
struct DispatcherInfo {
    queue_capacity: usize,
    max_poll_records: usize,
}

#[derive(Serialize)]
struct ServerInfo {
    port: u16,
    log_level: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&build_config_info(&config))
            .context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn build_config_info(config: &AppConfig) -> ConfigInfo {
    let topics = &config.kafka.topics;
    ConfigInfo {
        version: format!("{:?}", config.version),
        kafka: KafkaInfo {
            brokers: config.kafka.connection.brokers.clone(),
            session_timeout_ms: config.kafka.connection.session_timeout_ms,
            producer_topic: topics.producer.clone(),
            consumer_topic: topics.consumer.clone(),
            consumer_group: topics.consumer_group.clone(),
            partitions: topics.partitions,
        },
        dispatcher: DispatcherInfo {
            queue_capacity: config.dispatcher.queue_capacity,
            max_poll_records: config.dispatcher.max_poll_records,
        },
        server: ServerInfo {
            port: config.server.port,
            log_level: config.server.log_level.clone(),
        },
    }
}

fn print_config_info(config: &AppConfig) {
    let topics = &config.kafka.topics;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║             Partition Dispatcher Configuration               ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("Version: {:?}\n", config.version);

    println!("Kafka:");
    println!("  Brokers: {}", config.kafka.connection.bootstrap_servers());
    println!(
        "  Session timeout: {} ms",
        config.kafka.connection.session_timeout_ms
    );
    println!("  Producer topic: {}", topics.producer);
    println!("  Consumer topic: {}", topics.consumer);
    println!("  Consumer group: {}", topics.consumer_group);
    println!("  Partitions: {}", topics.partitions);

    println!("\nDispatcher:");
    println!("  Queue capacity: {} batches", config.dispatcher.queue_capacity);
    println!("  Max poll records: {}", config.dispatcher.max_poll_records);

    println!("\nServer:");
    println!("  Port: {}", config.server.port);
    println!("  Log level: {}", config.server.log_level);
}
