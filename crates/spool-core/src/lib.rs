//! Core spool primitives shared across crates.
//!
//! Includes producer identities, failure policies, and base errors.

pub mod error;
pub mod types;

pub use error::SpoolError;
pub use types::{FailurePolicy, ProducerId};
