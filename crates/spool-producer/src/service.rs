use std::sync::Arc;

use spool_buffer::BufferError;
use spool_core::ProducerId;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

use crate::config::{ConfigError, ProducerOptions};
use crate::demand::DemandAccumulator;
use crate::message::Message;
use crate::registry::AckRegistry;
use crate::state::ProducerState;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("producer `{0}` is no longer running")]
    Stopped(ProducerId),
    #[error("producer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Cloneable sender of demand signals for one producer.
#[derive(Debug, Clone)]
pub struct DemandSender {
    producer: ProducerId,
    tx: mpsc::UnboundedSender<usize>,
}

impl DemandSender {
    /// Asks the producer for `demand` more messages.
    pub fn demand(&self, demand: usize) -> Result<(), ProducerError> {
        self.tx
            .send(demand)
            .map_err(|_| ProducerError::Stopped(self.producer.clone()))
    }

    pub fn producer(&self) -> &ProducerId {
        &self.producer
    }
}

/// Handle to a running producer task.
///
/// The task owns the accumulator and handles one trigger at a time: a
/// demand signal or a retry tick. Dropping the handle stops the task the
/// same way `shutdown` does.
pub struct ProducerHandle {
    demand: DemandSender,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<Result<ProducerState, ProducerError>>,
}

impl ProducerHandle {
    /// Validates `options`, registers the producer, and spawns its task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        options: ProducerOptions,
        registry: Arc<AckRegistry>,
        downstream: mpsc::Sender<Vec<Message>>,
    ) -> Result<Self, ConfigError> {
        let accumulator = DemandAccumulator::init(options, registry)?;
        Ok(Self::spawn(accumulator, downstream))
    }

    /// Spawns the task for an already initialized accumulator.
    ///
    /// Message batches are delivered through `downstream`; empty resolve
    /// cycles send nothing.
    pub fn spawn(accumulator: DemandAccumulator, downstream: mpsc::Sender<Vec<Message>>) -> Self {
        let (demand_tx, demand_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let producer = accumulator.producer().clone();
        let join = tokio::spawn(run_producer(
            accumulator,
            demand_rx,
            downstream,
            shutdown_rx,
        ));

        Self {
            demand: DemandSender {
                producer,
                tx: demand_tx,
            },
            shutdown: Some(shutdown_tx),
            join,
        }
    }

    pub fn producer(&self) -> &ProducerId {
        self.demand.producer()
    }

    pub fn demand(&self, demand: usize) -> Result<(), ProducerError> {
        self.demand.demand(demand)
    }

    pub fn demand_sender(&self) -> DemandSender {
        self.demand.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops the task and returns the producer's final state.
    ///
    /// A batch still waiting for downstream capacity is returned to the
    /// buffer. A buffer failure that ended the task earlier is returned here.
    pub async fn shutdown(mut self) -> Result<ProducerState, ProducerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.join.await?
    }

    /// Waits for the task to end on its own (buffer failure or closed
    /// downstream) without requesting shutdown.
    pub async fn join(mut self) -> Result<ProducerState, ProducerError> {
        let _keep_running = self.shutdown.take();
        self.join.await?
    }
}

async fn run_producer(
    mut accumulator: DemandAccumulator,
    mut demand_rx: mpsc::UnboundedReceiver<usize>,
    downstream: mpsc::Sender<Vec<Message>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> Result<ProducerState, ProducerError> {
    let period = accumulator.retry_period();
    let timer = time::sleep(period);
    tokio::pin!(timer);
    info!(producer = %accumulator.producer(), "producer task started");

    loop {
        let (resolved, ticked) = tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            signal = demand_rx.recv() => match signal {
                Some(demand) => (accumulator.handle_demand(demand), false),
                None => break,
            },
            () = &mut timer => (accumulator.handle_tick(), true),
        };

        let messages = match resolved {
            Ok(messages) => messages,
            Err(err) => {
                error!(producer = %accumulator.producer(), %err, "resolve cycle failed");
                return Err(err.into());
            }
        };

        if !messages.is_empty() {
            let reserved = tokio::select! {
                biased;
                _ = &mut shutdown_rx => None,
                permit = downstream.reserve() => permit.ok(),
            };
            match reserved {
                Some(permit) => permit.send(messages),
                None => {
                    let payloads = messages.into_iter().map(Message::into_data).collect();
                    accumulator.state().buffer.push(payloads)?;
                    warn!(
                        producer = %accumulator.producer(),
                        "downstream closed or shutdown requested; undelivered messages returned to buffer"
                    );
                    break;
                }
            }
        }

        if ticked {
            timer.as_mut().reset(Instant::now() + period);
        }
    }

    Ok(accumulator.shutdown())
}
