mod config;
mod host;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use spool_buffer::{Buffer, BufferHandle, InMemoryBuffer};
use spool_producer::{AckRegistry, Acknowledger, BufferAcknowledger, ProducerError, ProducerHandle};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::NodeConfig;
use crate::host::{run_host, spawn_feeder, FeedPlan, HostError, HostReport, HostSettings};

#[derive(Debug, Error)]
enum NodeError {
    #[error("config error: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("{0}")]
    Options(#[from] spool_producer::ConfigError),
    #[error("{0}")]
    Producer(#[from] ProducerError),
    #[error("{0}")]
    Host(#[from] HostError),
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Number of items to feed (overrides `seed_items`)
    #[arg(long)]
    items: Option<usize>,
    /// Number of concurrent batch workers (overrides `workers`)
    #[arg(long)]
    workers: Option<usize>,
    /// Default policy for failed messages: discard or requeue
    #[arg(long)]
    on_failure: Option<String>,
}

impl Cli {
    fn load(self) -> Result<NodeConfig, NodeError> {
        let mut config = NodeConfig::new(self.config)?;
        if let Some(items) = self.items {
            config.seed_items = items;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(on_failure) = self.on_failure {
            config.on_failure = on_failure;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = std::env::var("SPOOL_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(report) => {
            info!(
                batches = report.batches,
                succeeded = report.succeeded,
                requeued = report.requeued,
                discarded = report.discarded,
                "spool-node finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("spool-node failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<HostReport, NodeError> {
    let config = cli.load()?;
    let buffer = Arc::new(match config.buffer_capacity {
        Some(capacity) => InMemoryBuffer::with_capacity_limit(capacity),
        None => InMemoryBuffer::new(),
    });
    let handle: BufferHandle = buffer.clone();

    let registry = Arc::new(AckRegistry::new());
    let (batch_tx, batch_rx) = mpsc::channel(config.workers * 2);
    let producer = ProducerHandle::start(
        config.producer_options(handle.clone())?,
        Arc::clone(&registry),
        batch_tx,
    )?;
    info!(
        producer = %producer.producer(),
        workers = config.workers,
        max_demand = config.max_demand,
        items = config.seed_items,
        "spool-node started"
    );

    let feeder = spawn_feeder(handle, FeedPlan::from(&config));
    let acker: Arc<dyn Acknowledger> = Arc::new(BufferAcknowledger::new(registry));
    let outcome = run_host(
        &producer,
        batch_rx,
        feeder,
        acker,
        HostSettings::from(&config),
        async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler unavailable: {err}");
                std::future::pending::<()>().await;
            }
        },
    )
    .await;

    let state = producer.shutdown().await?;
    info!(
        pending = state.pending_demand,
        leftover = buffer.len(),
        pushed = buffer.stats().pushed,
        popped = buffer.stats().popped,
        "producer stopped"
    );

    Ok(outcome?)
}
