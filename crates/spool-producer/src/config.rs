use std::fmt;
use std::time::Duration;

use spool_buffer::BufferHandle;
use spool_core::{FailurePolicy, ProducerId};
use thiserror::Error;

/// Interval between timer-driven re-resolutions of unmet demand.
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required option `{option}`")]
    Missing { option: &'static str },
    #[error("invalid option `{option}`: {constraint}")]
    Invalid {
        option: &'static str,
        constraint: String,
    },
}

impl ConfigError {
    /// Name of the offending option.
    pub fn option(&self) -> &'static str {
        match self {
            ConfigError::Missing { option } | ConfigError::Invalid { option, .. } => *option,
        }
    }
}

/// Startup options for one producer.
#[derive(Clone)]
pub struct ProducerOptions {
    /// Producer identity; keys the ack registry entry.
    pub name: String,
    /// Target buffer. Required.
    pub buffer: Option<BufferHandle>,
    /// Periodic re-resolution interval for unmet demand.
    pub retry_period: Duration,
    /// Fallback policy for failed messages without an override.
    pub on_failure: FailurePolicy,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            buffer: None,
            retry_period: DEFAULT_RETRY_PERIOD,
            on_failure: FailurePolicy::Discard,
        }
    }
}

impl fmt::Debug for ProducerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerOptions")
            .field("name", &self.name)
            .field("buffer", &self.buffer.as_ref().map(|_| "<buffer>"))
            .field("retry_period", &self.retry_period)
            .field("on_failure", &self.on_failure)
            .finish()
    }
}

/// Options that passed validation.
#[derive(Clone)]
pub struct ValidatedOptions {
    pub producer: ProducerId,
    pub buffer: BufferHandle,
    pub retry_period: Duration,
    pub on_failure: FailurePolicy,
}

impl ProducerOptions {
    pub fn new(name: impl Into<String>, buffer: BufferHandle) -> Self {
        Self {
            name: name.into(),
            buffer: Some(buffer),
            ..Self::default()
        }
    }

    pub fn with_retry_period(mut self, retry_period: Duration) -> Self {
        self.retry_period = retry_period;
        self
    }

    pub fn with_on_failure(mut self, on_failure: FailurePolicy) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// Checks every option; never substitutes a default for a bad value.
    pub fn validate(self) -> Result<ValidatedOptions, ConfigError> {
        let producer = ProducerId::new(&self.name).map_err(|_| ConfigError::Invalid {
            option: "name",
            constraint: "must be a non-empty string".into(),
        })?;
        let buffer = self.buffer.ok_or(ConfigError::Missing { option: "buffer" })?;
        if self.retry_period.is_zero() {
            return Err(ConfigError::Invalid {
                option: "retry_period",
                constraint: "must be a positive duration".into(),
            });
        }
        Ok(ValidatedOptions {
            producer,
            buffer,
            retry_period: self.retry_period,
            on_failure: self.on_failure,
        })
    }
}

/// Parses a textual `on_failure` setting.
pub fn parse_failure_policy(raw: &str) -> Result<FailurePolicy, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        option: "on_failure",
        constraint: format!("expected `discard` or `requeue`, got `{raw}`"),
    })
}
