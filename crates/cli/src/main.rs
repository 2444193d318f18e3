//! # Partition Dispatcher CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - configuration loading and validation
//! - the dispatcher service with its HTTP produce endpoint
//! - graceful shutdown handling

mod cli;
mod commands;
mod error;
mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_service, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_observability(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Partition Dispatcher CLI starting"
    );

    let result = match &cli.command {
        Commands::Run(args) => run_service(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging, and metrics for the `run` command
fn init_observability(cli: &Cli) -> Result<()> {
    // The config file may be unreadable here; `run` reports that once tracing is up
    let configured = match &cli.command {
        Commands::Run(args) => config_loader::ConfigLoader::load_from_path(&args.config)
            .ok()
            .map(|config| config.server.log_level),
        _ => None,
    };
    let default_log_level = default_log_level(cli.verbose, configured.as_deref());

    // Only the long-running service exposes a metrics endpoint
    let metrics_port = match &cli.command {
        Commands::Run(args) if args.metrics_port != 0 => Some(args.metrics_port),
        _ => None,
    };

    observability::init_with_config(observability::ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port,
        default_log_level,
        quiet: cli.quiet,
    })
}

/// `-v` flags win over `server.log_level`; without either, log at info
fn default_log_level(verbose: u8, configured: Option<&str>) -> String {
    match (verbose, configured) {
        (0, Some(level)) if !level.trim().is_empty() => level.trim().to_string(),
        (0, _) => "info".to_string(),
        (1, _) => "debug".to_string(),
        _ => "trace".to_string(),
    }
}
