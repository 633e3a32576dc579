use std::sync::Arc;
use std::time::Duration;

use spool_buffer::BufferError;
use spool_core::ProducerId;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ProducerOptions};
use crate::message::Message;
use crate::registry::{AckConfig, AckRegistry};
use crate::state::ProducerState;
use crate::telemetry::{FetchSpan, TelemetrySink, TracingTelemetry};

/// Runs one resolve cycle against `state`.
///
/// Pops at most `additional + pending_demand` items, wraps each into a
/// message stamped with the producer identity, and carries whatever the
/// buffer could not supply forward as pending demand. On a buffer error the
/// state is left untouched.
pub fn resolve_demand(
    state: &mut ProducerState,
    additional: usize,
    telemetry: &dyn TelemetrySink,
) -> Result<Vec<Message>, BufferError> {
    let total = state.pending_demand.saturating_add(additional);

    let span = FetchSpan::start(telemetry, &state.producer, total);
    let items = state.buffer.pop(total)?;
    debug_assert!(items.len() <= total, "buffer returned more than requested");
    let messages: Vec<Message> = items
        .into_iter()
        .map(|data| Message::new(state.producer.clone(), data))
        .collect();
    span.finish(messages.len());

    state.pending_demand = total.saturating_sub(messages.len());
    Ok(messages)
}

/// Owns one producer's state and folds both trigger kinds into
/// `resolve_demand`.
pub struct DemandAccumulator {
    state: ProducerState,
    registry: Arc<AckRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl DemandAccumulator {
    /// Validates `options` and registers the producer's ack config.
    pub fn init(options: ProducerOptions, registry: Arc<AckRegistry>) -> Result<Self, ConfigError> {
        let valid = options.validate()?;

        let replaced = registry.register(
            valid.producer.clone(),
            AckConfig {
                buffer: Arc::clone(&valid.buffer),
                on_failure: valid.on_failure,
            },
        );
        if replaced.is_some() {
            warn!(producer = %valid.producer, "replaced existing ack config registration");
        }
        info!(
            producer = %valid.producer,
            retry_period = ?valid.retry_period,
            on_failure = %valid.on_failure,
            "producer initialized"
        );

        Ok(Self {
            state: ProducerState::new(valid.producer, valid.buffer, valid.retry_period),
            registry,
            telemetry: Arc::new(TracingTelemetry),
        })
    }

    /// Replaces the default `tracing` telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Host-issued demand signal.
    pub fn handle_demand(&mut self, demand: usize) -> Result<Vec<Message>, BufferError> {
        let messages = resolve_demand(&mut self.state, demand, self.telemetry.as_ref())?;
        debug!(
            producer = %self.state.producer,
            demand,
            produced = messages.len(),
            pending = self.state.pending_demand,
            "resolved demand signal"
        );
        Ok(messages)
    }

    /// Timer tick: retries pending demand without adding any.
    pub fn handle_tick(&mut self) -> Result<Vec<Message>, BufferError> {
        let messages = resolve_demand(&mut self.state, 0, self.telemetry.as_ref())?;
        if !messages.is_empty() {
            debug!(
                producer = %self.state.producer,
                produced = messages.len(),
                pending = self.state.pending_demand,
                "resolved pending demand on tick"
            );
        }
        Ok(messages)
    }

    pub fn pending_demand(&self) -> usize {
        self.state.pending_demand
    }

    pub fn producer(&self) -> &ProducerId {
        &self.state.producer
    }

    pub fn retry_period(&self) -> Duration {
        self.state.retry_period
    }

    pub fn state(&self) -> &ProducerState {
        &self.state
    }

    pub fn registry(&self) -> &Arc<AckRegistry> {
        &self.registry
    }

    /// Removes the producer's ack config and hands back its final state.
    pub fn shutdown(self) -> ProducerState {
        self.registry.unregister(&self.state.producer);
        info!(
            producer = %self.state.producer,
            pending = self.state.pending_demand,
            "producer shut down"
        );
        self.state
    }
}
