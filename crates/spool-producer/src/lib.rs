//! Demand-driven producer over a push/pop buffer.
//!
//! This crate wires demand accounting, message wrapping, fetch telemetry,
//! and acknowledgment-driven requeue on top of a pluggable `Buffer`.

pub mod ack;
pub mod config;
pub mod demand;
pub mod message;
pub mod registry;
pub mod service;
pub mod state;
pub mod telemetry;

pub use ack::{ack, configure, AckError, AckOutcome, Acknowledger, BufferAcknowledger};
pub use config::{
    parse_failure_policy, ConfigError, ProducerOptions, ValidatedOptions, DEFAULT_RETRY_PERIOD,
};
pub use demand::{resolve_demand, DemandAccumulator};
pub use message::{AckOptions, AckRef, Message};
pub use registry::{AckConfig, AckRegistry};
pub use service::{DemandSender, ProducerError, ProducerHandle};
pub use state::ProducerState;
pub use telemetry::{FetchEvent, FetchSpan, RecordingTelemetry, TelemetrySink, TracingTelemetry};
