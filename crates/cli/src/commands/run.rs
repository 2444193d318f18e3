//! `run` command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use broker::MockBroker;
use contracts::{AppConfig, BrokerClient, PartitionSet, RecordPublisher, SharedHandler, TopicAdmin};
use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherConfig, LogHandler};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, instrument, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::server;

/// Execute the `run` command
#[instrument(name = "cli_run", skip(args), fields(config = %args.config.display(), mock = args.mock))]
pub async fn run_service(args: &RunArgs) -> Result<()> {
    let config = load_config(args)?;
    info!(
        brokers = %config.kafka.connection.bootstrap_servers(),
        consumer = %config.kafka.topics.consumer,
        producer = %config.kafka.topics.producer,
        group = %config.kafka.topics.consumer_group,
        "Configuration loaded"
    );

    let handler: SharedHandler = Arc::new(LogHandler::new(&config.kafka.topics.consumer));
    let builder = DispatcherBuilder::new(DispatcherConfig::from(&config.dispatcher), handler)?;

    if args.mock {
        run_mock(&config, builder).await
    } else {
        run_kafka(&config, builder).await
    }
}

/// Load the configuration file and apply command-line overrides
fn load_config(args: &RunArgs) -> Result<AppConfig> {
    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if let Some(ref brokers) = args.brokers {
        info!(brokers = ?brokers, "Overriding brokers from CLI");
        config.kafka.connection.brokers = brokers.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(capacity) = args.queue_capacity {
        config.dispatcher.queue_capacity = capacity;
    }

    config_loader::ConfigLoader::validate(&config)
        .context("Configuration invalid after applying overrides")?;
    Ok(config)
}

/// In-memory broker owning every partition of the consumer topic
async fn run_mock(config: &AppConfig, builder: DispatcherBuilder) -> Result<()> {
    let topics = &config.kafka.topics;
    let broker = Arc::new(MockBroker::new(builder.listener(), &topics.producer));
    broker.ensure_topics(&topics.all(), topics.partitions).await?;

    let dispatcher = builder.start(Arc::clone(&broker));
    broker.assign(&PartitionSet::new().with(&topics.consumer, 0..topics.partitions))?;
    warn!("Running against the in-memory broker; records are not persisted");

    serve_until_shutdown(config, dispatcher, broker).await
}

#[cfg(feature = "kafka")]
async fn run_kafka(config: &AppConfig, builder: DispatcherBuilder) -> Result<()> {
    let broker = Arc::new(broker::KafkaBroker::connect(
        &config.kafka,
        config.dispatcher.max_poll_records,
        builder.listener(),
    )?);
    broker
        .ensure_topics(&config.kafka.topics.all(), config.kafka.topics.partitions)
        .await?;

    let dispatcher = builder.start(Arc::clone(&broker));
    serve_until_shutdown(config, dispatcher, broker).await
}

#[cfg(not(feature = "kafka"))]
async fn run_kafka(_config: &AppConfig, _builder: DispatcherBuilder) -> Result<()> {
    Err(CliError::KafkaDisabled.into())
}

/// Serve HTTP until a signal arrives or the dispatcher halts, then stop both
async fn serve_until_shutdown<B>(
    config: &AppConfig,
    dispatcher: Dispatcher<B>,
    broker: Arc<B>,
) -> Result<()>
where
    B: BrokerClient + RecordPublisher + Send + Sync + 'static,
{
    let listener = TcpListener::bind(("0.0.0.0", config.server.port))
        .await
        .map_err(|e| CliError::server(format!("bind port {}: {e}", config.server.port)))?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let publisher: Arc<dyn RecordPublisher> = broker;
    let server = tokio::spawn(server::serve(
        listener,
        server::router(publisher),
        async move {
            stop_rx.await.ok();
        },
    ));

    tokio::select! {
        _ = setup_shutdown_signal() => info!("Received shutdown signal"),
        _ = dispatcher.halted() => error!("Dispatcher halted"),
    }

    stop_tx.send(()).ok();
    match server.await {
        Ok(Ok(())) => info!("HTTP server stopped"),
        Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
    }

    let stats = dispatcher.shutdown().await?;
    print_stats(&stats);
    Ok(())
}

/// Resolve on Ctrl+C or, on unix, SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_stats(stats: &dispatcher::PollStats) {
    println!("\n=== Dispatcher Statistics ===\n");
    println!("{stats}");
}
