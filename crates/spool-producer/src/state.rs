use std::fmt;
use std::time::Duration;

use spool_buffer::BufferHandle;
use spool_core::ProducerId;

/// Mutable producer-local state used by every resolve cycle.
///
/// Owned by exactly one execution unit, so it carries no locking.
#[derive(Clone)]
pub struct ProducerState {
    /// Demand requested by the host and not yet satisfied.
    pub pending_demand: usize,
    /// Buffer the producer pops from.
    pub buffer: BufferHandle,
    /// Identity stamped on every wrapped message.
    pub producer: ProducerId,
    /// Timer interval for re-resolving unmet demand.
    pub retry_period: Duration,
}

impl ProducerState {
    pub fn new(producer: ProducerId, buffer: BufferHandle, retry_period: Duration) -> Self {
        Self {
            pending_demand: 0,
            buffer,
            producer,
            retry_period,
        }
    }
}

impl fmt::Debug for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerState")
            .field("pending_demand", &self.pending_demand)
            .field("producer", &self.producer)
            .field("retry_period", &self.retry_period)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
