use std::sync::Arc;

use spool_buffer::{BufferError, Item};
use spool_core::{FailurePolicy, ProducerId};
use thiserror::Error;
use tracing::debug;

use crate::message::{AckOptions, Message};
use crate::registry::AckRegistry;

#[derive(Debug, Error)]
pub enum AckError {
    /// Ack referenced a producer that never registered or already shut down.
    #[error("no ack config registered for producer `{0}`")]
    UnregisteredProducer(ProducerId),
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),
}

/// Per-call summary of what happened to a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckOutcome {
    pub succeeded: usize,
    pub requeued: usize,
    pub discarded: usize,
}

/// Settles a finished batch for `producer`.
///
/// Successful messages are dropped. Each failed message is requeued or
/// discarded according to its own override, falling back to the producer's
/// registered default. Requeued payloads go back to the buffer in a single
/// push, in the order they appear in `failed`; nothing is pushed when no
/// message needs requeueing.
///
/// Not idempotent: settling the same failed messages twice requeues them
/// twice.
pub fn ack(
    registry: &AckRegistry,
    producer: &ProducerId,
    succeeded: Vec<Message>,
    failed: Vec<Message>,
) -> Result<AckOutcome, AckError> {
    let config = registry.lookup(producer)?;

    let mut requeue: Vec<Item> = Vec::new();
    let mut discarded = 0usize;
    for message in failed {
        match message.ack_options().effective_policy(config.on_failure) {
            FailurePolicy::Requeue => requeue.push(message.into_data()),
            FailurePolicy::Discard => discarded += 1,
        }
    }

    let outcome = AckOutcome {
        succeeded: succeeded.len(),
        requeued: requeue.len(),
        discarded,
    };
    if !requeue.is_empty() {
        config.buffer.push(requeue)?;
    }

    debug!(
        %producer,
        succeeded = outcome.succeeded,
        requeued = outcome.requeued,
        discarded = outcome.discarded,
        "acked batch"
    );
    Ok(outcome)
}

/// Merges `options` into a message's ack data; later values win.
///
/// Pure: the registry is not consulted or changed.
pub fn configure(_producer: &ProducerId, ack_data: AckOptions, options: AckOptions) -> AckOptions {
    ack_data.merge(options)
}

/// Ack contract seen by pipeline hosts.
pub trait Acknowledger: Send + Sync {
    /// Settles one finished batch. Call exactly once per batch.
    fn ack(
        &self,
        producer: &ProducerId,
        succeeded: Vec<Message>,
        failed: Vec<Message>,
    ) -> Result<AckOutcome, AckError>;

    /// Attaches per-message options ahead of the final ack.
    fn configure(
        &self,
        producer: &ProducerId,
        ack_data: AckOptions,
        options: AckOptions,
    ) -> AckOptions {
        configure(producer, ack_data, options)
    }
}

/// Acknowledger that requeues into whichever buffer the producer registered.
#[derive(Debug, Clone)]
pub struct BufferAcknowledger {
    registry: Arc<AckRegistry>,
}

impl BufferAcknowledger {
    pub fn new(registry: Arc<AckRegistry>) -> Self {
        Self { registry }
    }

    /// Acknowledger bound to the process-wide registry.
    pub fn global() -> Self {
        Self::new(AckRegistry::global())
    }
}

impl Acknowledger for BufferAcknowledger {
    fn ack(
        &self,
        producer: &ProducerId,
        succeeded: Vec<Message>,
        failed: Vec<Message>,
    ) -> Result<AckOutcome, AckError> {
        ack(&self.registry, producer, succeeded, failed)
    }
}
