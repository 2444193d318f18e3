//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Partition Dispatcher - per-partition record processing for Kafka-compatible brokers
#[derive(Parser, Debug)]
#[command(
    name = "partition-dispatcher",
    author,
    version,
    about = "Partitioned stream-consumption dispatcher",
    long_about = "Consumes a Kafka-compatible topic with one worker per owned partition.\n\n\
                  Partitions are started and stopped as the consumer group rebalances, \n\
                  and an HTTP endpoint produces records to the configured topic."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "PARTITION_DISPATCHER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "PARTITION_DISPATCHER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dispatcher and the HTTP front door
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "PARTITION_DISPATCHER_CONFIG"
    )]
    pub config: PathBuf,

    /// Run against the in-memory broker, owning every configured partition
    #[arg(long, env = "PARTITION_DISPATCHER_MOCK")]
    pub mock: bool,

    /// Override broker addresses from configuration (comma separated)
    #[arg(long, value_delimiter = ',', env = "PARTITION_DISPATCHER_BROKERS")]
    pub brokers: Option<Vec<String>>,

    /// Override HTTP port from configuration
    #[arg(long, env = "PARTITION_DISPATCHER_PORT")]
    pub port: Option<u16>,

    /// Override per-partition queue capacity from configuration
    #[arg(long, env = "PARTITION_DISPATCHER_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "PARTITION_DISPATCHER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
