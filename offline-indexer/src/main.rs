use std::env;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use offline_indexer::{BridgeConfig, BridgeError, Dependencies};
use offline_indexer_pipeline::{IndexConsumer, IndexProducer, PipelineError};
use offline_indexer_shared::IndexAction;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "offline-indexer")]
#[command(about = "Submit index mutations through a message broker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Channel both roles bind to (overrides OFFLINE_INDEXER_CHANNEL)
    #[arg(long, global = true)]
    channel: Option<String>,

    /// Log a preview of every sent payload
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run producer and consumer against an in-process broker
    Demo {
        /// Number of synthetic entities to submit
        #[arg(long, default_value = "10")]
        count: u32,
    },
    /// Submit synthetic entities and send them to Kafka
    #[cfg(feature = "kafka")]
    Produce {
        /// Number of synthetic entities to submit
        #[arg(long, default_value = "10")]
        count: u32,
    },
    /// Consume envelopes from Kafka into the in-memory index
    #[cfg(feature = "kafka")]
    Consume,
}

/// Synthetic entity submitted by the binary.
#[derive(Serialize)]
struct Person {
    id: u32,
    name: String,
}

fn people(count: u32) -> Vec<Person> {
    (1..=count)
        .map(|id| Person {
            id,
            name: format!("Julian{}", id),
        })
        .collect()
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "Offline indexer failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(cli: Cli) -> Result<(), BridgeError> {
    let mut config = BridgeConfig::from_env()?;
    if let Some(channel) = cli.channel {
        config.channel = channel;
    }
    config.verbose |= cli.verbose;

    match cli.command {
        Commands::Demo { count } => {
            bound_unset_roles(&mut config, count);
            run_demo(Dependencies::in_memory(&config), count).await
        }
        #[cfg(feature = "kafka")]
        Commands::Produce { count } => {
            if config.stop_after_sent == 0 {
                config.stop_after_sent = u64::from(count);
            }
            run_produce(Dependencies::kafka(&config), count).await
        }
        #[cfg(feature = "kafka")]
        Commands::Consume => run_consume(Dependencies::kafka(&config)).await,
    }
}

/// Bound each role to `count` unless the environment already bounds it.
fn bound_unset_roles(config: &mut BridgeConfig, count: u32) {
    if config.stop_after_sent == 0 {
        config.stop_after_sent = u64::from(count);
    }
    if config.stop_after_received == 0 {
        config.stop_after_received = u64::from(count);
    }
}

async fn run_demo(deps: Dependencies, count: u32) -> Result<(), BridgeError> {
    let consuming = spawn_consumer(&deps.consumer);
    let producing = spawn_producer(&deps.producer);
    let signals = shutdown_on_ctrl_c(Some(deps.producer.clone()), Some(deps.consumer.clone()));

    deps.indexer
        .bulk_submit_entities(IndexAction::Create, &people(count))?;
    info!(count, "Submitted entities");

    let produced = join(producing).await;
    let consumed = join(consuming).await;
    signals.abort();

    info!(
        sent_count = deps.producer.sent_count(),
        unsent_count = deps.producer.unsent_count(),
        received_count = deps.consumer.received_count(),
        indexing_failures = deps.consumer.indexing_failures(),
        indexed_objects = deps.index.object_count(),
        "Demo finished"
    );

    produced?;
    consumed
}

#[cfg(feature = "kafka")]
async fn run_produce(deps: Dependencies, count: u32) -> Result<(), BridgeError> {
    let producing = spawn_producer(&deps.producer);
    let signals = shutdown_on_ctrl_c(Some(deps.producer.clone()), None);

    deps.indexer
        .bulk_submit_entities(IndexAction::CreateOrUpdate, &people(count))?;

    let produced = join(producing).await;
    signals.abort();

    info!(
        sent_count = deps.producer.sent_count(),
        unsent_count = deps.producer.unsent_count(),
        "Producer finished"
    );
    produced
}

#[cfg(feature = "kafka")]
async fn run_consume(deps: Dependencies) -> Result<(), BridgeError> {
    let consuming = spawn_consumer(&deps.consumer);
    let signals = shutdown_on_ctrl_c(None, Some(deps.consumer.clone()));

    let consumed = join(consuming).await;
    signals.abort();

    info!(
        received_count = deps.consumer.received_count(),
        indexing_failures = deps.consumer.indexing_failures(),
        indexed_objects = deps.index.object_count(),
        "Consumer finished"
    );
    consumed
}

fn spawn_producer(producer: &Arc<IndexProducer>) -> JoinHandle<Result<(), PipelineError>> {
    let producer = producer.clone();
    tokio::spawn(async move { producer.run().await })
}

fn spawn_consumer(consumer: &Arc<IndexConsumer>) -> JoinHandle<Result<(), PipelineError>> {
    let consumer = consumer.clone();
    tokio::spawn(async move { consumer.run().await })
}

async fn join(handle: JoinHandle<Result<(), PipelineError>>) -> Result<(), BridgeError> {
    handle.await.map_err(std::io::Error::from)??;
    Ok(())
}

/// Request shutdown of the given roles on Ctrl-C.
fn shutdown_on_ctrl_c(
    producer: Option<Arc<IndexProducer>>,
    consumer: Option<Arc<IndexConsumer>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("Received Ctrl-C, shutting down");
        if let Some(producer) = producer {
            producer.shutdown();
        }
        if let Some(consumer) = consumer {
            consumer.shutdown();
        }
    })
}
