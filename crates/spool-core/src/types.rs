use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SpoolError;

/// Stable key correlating a message to its producer's registered ack config.
///
/// Cloned into every message a producer emits, so the name is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerId(Arc<str>);

impl ProducerId {
    /// Builds an identity from a non-empty name.
    pub fn new(name: impl AsRef<str>) -> Result<Self, SpoolError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(SpoolError::InvalidInput("producer id must not be empty"));
        }
        Ok(Self(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happens to a message payload reported as failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Drop the payload.
    #[default]
    Discard,
    /// Push the payload back into the buffer for redelivery.
    Requeue,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::Discard => "discard",
            FailurePolicy::Requeue => "requeue",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = SpoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(FailurePolicy::Discard),
            "requeue" => Ok(FailurePolicy::Requeue),
            _ => Err(SpoolError::UnknownPolicy(s.to_string())),
        }
    }
}
