//! Buffer abstractions for spool.
//!
//! Producers and acknowledgers only depend on the byte-oriented `Buffer`
//! trait defined here; `InMemoryBuffer` is the reference implementation.

pub mod buffer;
pub mod memory;

pub use buffer::{Buffer, BufferError, BufferHandle, BufferStats, Item};
pub use memory::InMemoryBuffer;
