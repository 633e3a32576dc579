use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

/// Opaque payload stored in a buffer.
pub type Item = Bytes;

/// Shared handle to a buffer, cloned into producers and ack configs.
pub type BufferHandle = Arc<dyn Buffer>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// A bounded buffer cannot take the whole push.
    #[error("buffer full: {queued} queued, capacity {capacity}, rejected {rejected} items")]
    Full {
        queued: usize,
        capacity: usize,
        rejected: usize,
    },
    /// The backing store cannot serve push/pop at all.
    #[error("buffer unavailable: {0}")]
    Unavailable(String),
}

/// Coarse buffer counters for logging and ops decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub queued: usize,
    pub pushed: u64,
    pub popped: u64,
}

/// Push/pop contract consumed by producers (pop) and acknowledgers (push).
///
/// Implementations must tolerate concurrent `push` from many ack callers
/// alongside `pop` from the producer loop.
pub trait Buffer: Send + Sync {
    /// Appends `items` at the tail, preserving their order.
    fn push(&self, items: Vec<Item>) -> Result<(), BufferError>;

    /// Removes up to `max` items from the head in FIFO order.
    ///
    /// May return fewer than `max` (including none), never more.
    fn pop(&self, max: usize) -> Result<Vec<Item>, BufferError>;

    /// Number of items currently queued.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every queued item.
    fn clear(&self);

    /// Best-effort counters.
    fn stats(&self) -> BufferStats {
        BufferStats {
            queued: self.len(),
            ..BufferStats::default()
        }
    }
}
