//! connectsync-worker - Salesforce sync through Kafka and Heroku Connect
//!
//! Commands:
//! - Run the supervised consumer
//! - Look up the sync status of a record
//! - Publish a one-off message
//! - Apply database migrations
//! - Check broker connectivity

use clap::{Parser, Subcommand};
use connectsync_engine::{PgSyncStore, SyncEngine};
use connectsync_worker::logging::init_logging;
use connectsync_worker::{Config, WorkerError, WorkerResult};
use std::sync::Arc;

/// Salesforce sync worker
#[derive(Parser)]
#[command(name = "connectsync-worker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume the configured topics and sync every record
    Run,

    /// Print the latest sync record for a Salesforce id as JSON
    Status {
        /// Salesforce record id
        sf_id: String,
    },

    /// Publish one JSON message and print the broker acknowledgement
    Publish {
        /// Destination topic
        topic: String,
        /// JSON payload
        payload: String,
        /// Partition key
        #[arg(long)]
        key: Option<String>,
    },

    /// Apply pending database migrations
    Migrate,

    /// Check broker connectivity
    Health,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        e.print();
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> WorkerResult<()> {
    let config = Config::from_env()?;
    init_logging(&config.log_filter, config.log_format);

    match cli.command {
        Commands::Run => run_worker(config).await,
        Commands::Status { sf_id } => status(&config, &sf_id).await,
        Commands::Publish {
            topic,
            payload,
            key,
        } => publish(&topic, &payload, key.as_deref()).await,
        Commands::Migrate => {
            let store = connect(&config).await?;
            store.migrate().await?;
            println!("Migrations applied");
            Ok(())
        }
        Commands::Health => health().await,
    }
}

async fn connect(config: &Config) -> WorkerResult<PgSyncStore> {
    Ok(PgSyncStore::connect(&config.database_url, config.database_max_connections).await?)
}

async fn status(config: &Config, sf_id: &str) -> WorkerResult<()> {
    let engine = SyncEngine::new(Arc::new(connect(config).await?));
    let record = engine
        .get_sync_status(sf_id)
        .await?
        .ok_or_else(|| WorkerError::NotFound(format!("no sync record for {sf_id}")))?;

    let output = serde_json::to_string_pretty(&record)
        .map_err(|e| WorkerError::Validation(e.to_string()))?;
    println!("{output}");
    Ok(())
}

#[cfg(feature = "kafka")]
async fn run_worker(config: Config) -> WorkerResult<()> {
    use connectsync_events::{EventProducer, KafkaConfig, KafkaSourceFactory, Publisher};
    use connectsync_worker::{build_engine, Worker};

    let kafka = KafkaConfig::from_env()?;
    kafka.require_consumer_group()?;

    let store = connect(&config).await?;
    let engine = build_engine(&config, Arc::new(store))?;

    let publisher: Option<Arc<dyn Publisher>> = if config.retry_enabled {
        Some(Arc::new(EventProducer::new(&kafka)?))
    } else {
        None
    };

    let worker = Worker::new(&config, &engine, publisher);
    let factory = KafkaSourceFactory::new(kafka, config.topic_names());

    tokio::select! {
        error = worker.run(&factory) => Err(error),
        () = shutdown_signal() => Ok(()),
    }
}

#[cfg(not(feature = "kafka"))]
async fn run_worker(_config: Config) -> WorkerResult<()> {
    Err(WorkerError::KafkaDisabled("run"))
}

#[cfg(feature = "kafka")]
async fn publish(topic: &str, payload: &str, key: Option<&str>) -> WorkerResult<()> {
    use connectsync_events::{EventProducer, KafkaConfig};

    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| WorkerError::Validation(format!("payload is not JSON: {e}")))?;

    let producer = EventProducer::new(&KafkaConfig::from_env()?)?;
    let ack = match key {
        Some(key) => producer.send_keyed(topic, key, &value, None).await?,
        None => producer.send(topic, &value).await?,
    };

    let output =
        serde_json::to_string(&ack).map_err(|e| WorkerError::Validation(e.to_string()))?;
    println!("{output}");
    Ok(())
}

#[cfg(not(feature = "kafka"))]
async fn publish(_topic: &str, _payload: &str, _key: Option<&str>) -> WorkerResult<()> {
    Err(WorkerError::KafkaDisabled("publish"))
}

#[cfg(feature = "kafka")]
async fn health() -> WorkerResult<()> {
    use connectsync_events::{EventError, EventProducer, HealthStatus, KafkaConfig};

    let kafka = KafkaConfig::from_env()?;
    let status = match EventProducer::new(&kafka)?.health_check().await {
        Ok(status) => status,
        Err(e) => {
            println!("{}", HealthStatus::unreachable());
            return Err(e.into());
        }
    };
    println!("{status}");

    if status.is_healthy() {
        Ok(())
    } else {
        Err(WorkerError::Events(EventError::ConnectionFailed {
            broker: kafka.bootstrap_list(),
            cause: status.to_string(),
        }))
    }
}

#[cfg(not(feature = "kafka"))]
async fn health() -> WorkerResult<()> {
    Err(WorkerError::KafkaDisabled("health"))
}

/// Resolves on Ctrl+C or SIGTERM.
#[cfg(feature = "kafka")]
async fn shutdown_signal() {
    use tokio::signal;
    use tracing::info;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
