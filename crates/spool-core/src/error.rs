use thiserror::Error;

/// Shared lightweight error type for core primitive operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpoolError {
    /// Invalid caller input or malformed primitive value.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Failure policy name outside the recognized set.
    #[error("unknown failure policy `{0}` (expected `discard` or `requeue`)")]
    UnknownPolicy(String),
}
