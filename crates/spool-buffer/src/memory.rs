use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::buffer::{Buffer, BufferError, BufferStats, Item};

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<Item>,
    pushed: u64,
    popped: u64,
}

/// Mutex-guarded FIFO buffer for in-process pipelines, tests, and simulations.
#[derive(Debug, Default)]
pub struct InMemoryBuffer {
    inner: Mutex<Inner>,
    capacity: Option<usize>,
}

impl InMemoryBuffer {
    /// Creates an unbounded buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer that rejects pushes taking it past `capacity` items.
    ///
    /// A rejected push stores nothing.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                ..Inner::default()
            }),
            capacity: Some(capacity),
        }
    }

    /// Creates an unbounded buffer pre-filled with `items`.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let queue: VecDeque<Item> = items.into_iter().collect();
        Self {
            inner: Mutex::new(Inner {
                pushed: queue.len() as u64,
                queue,
                popped: 0,
            }),
            capacity: None,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Buffer for InMemoryBuffer {
    fn push(&self, items: Vec<Item>) -> Result<(), BufferError> {
        let mut inner = self.inner.lock();
        if let Some(capacity) = self.capacity {
            if inner.queue.len() + items.len() > capacity {
                return Err(BufferError::Full {
                    queued: inner.queue.len(),
                    capacity,
                    rejected: items.len(),
                });
            }
        }
        inner.pushed += items.len() as u64;
        inner.queue.extend(items);
        Ok(())
    }

    fn pop(&self, max: usize) -> Result<Vec<Item>, BufferError> {
        let mut inner = self.inner.lock();
        let take = max.min(inner.queue.len());
        let out: Vec<Item> = inner.queue.drain(..take).collect();
        inner.popped += out.len() as u64;
        Ok(out)
    }

    fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    fn clear(&self) {
        self.inner.lock().queue.clear();
    }

    fn stats(&self) -> BufferStats {
        let inner = self.inner.lock();
        BufferStats {
            queued: inner.queue.len(),
            pushed: inner.pushed,
            popped: inner.popped,
        }
    }
}
