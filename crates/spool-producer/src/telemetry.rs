use std::time::{Duration, Instant};

use parking_lot::Mutex;
use spool_core::ProducerId;
use tracing::span::EnteredSpan;

/// Observability events bracketing one buffer fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    Start {
        producer: ProducerId,
        demand: usize,
    },
    Stop {
        producer: ProducerId,
        demand: usize,
        produced: usize,
        duration: Duration,
    },
}

impl FetchEvent {
    pub fn producer(&self) -> &ProducerId {
        match self {
            FetchEvent::Start { producer, .. } | FetchEvent::Stop { producer, .. } => producer,
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self, FetchEvent::Start { .. })
    }
}

/// Receiver of fetch events.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: FetchEvent);
}

/// Default sink: records events through `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: FetchEvent) {
        match event {
            FetchEvent::Start { producer, demand } => {
                tracing::debug!(target: "spool::telemetry", %producer, demand, "receive_messages start");
            }
            FetchEvent::Stop {
                producer,
                demand,
                produced,
                duration,
            } => {
                tracing::debug!(
                    target: "spool::telemetry",
                    %producer,
                    demand,
                    produced,
                    duration_us = duration_micros(duration),
                    "receive_messages stop"
                );
            }
        }
    }
}

/// Whole microseconds in `duration`, saturating at `u64::MAX`.
fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// In-memory sink for tests and simulations.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<FetchEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event emitted so far.
    pub fn events(&self) -> Vec<FetchEvent> {
        self.events.lock().clone()
    }

    /// Drains and returns every event emitted so far.
    pub fn take(&self) -> Vec<FetchEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn emit(&self, event: FetchEvent) {
        self.events.lock().push(event);
    }
}

/// Scoped bracket around a buffer fetch.
///
/// `start` emits the start event; the stop event is emitted when the guard
/// drops, whether through `finish`, an early `?` return, or unwinding.
/// A guard dropped without `finish` reports zero produced items.
pub struct FetchSpan<'a> {
    sink: &'a dyn TelemetrySink,
    producer: ProducerId,
    demand: usize,
    produced: usize,
    started: Instant,
    _span: EnteredSpan,
}

impl<'a> FetchSpan<'a> {
    pub fn start(sink: &'a dyn TelemetrySink, producer: &ProducerId, demand: usize) -> Self {
        let span = tracing::debug_span!("receive_messages", %producer, demand).entered();
        sink.emit(FetchEvent::Start {
            producer: producer.clone(),
            demand,
        });
        Self {
            sink,
            producer: producer.clone(),
            demand,
            produced: 0,
            started: Instant::now(),
            _span: span,
        }
    }

    /// Closes the bracket with the number of messages produced.
    pub fn finish(mut self, produced: usize) {
        self.produced = produced;
    }
}

impl Drop for FetchSpan<'_> {
    fn drop(&mut self) {
        self.sink.emit(FetchEvent::Stop {
            producer: self.producer.clone(),
            demand: self.demand,
            produced: self.produced,
            duration: self.started.elapsed(),
        });
    }
}
