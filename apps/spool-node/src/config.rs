use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use spool_buffer::BufferHandle;
use spool_producer::{parse_failure_policy, ProducerOptions};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the demo pipeline host.
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    pub producer_name: String,
    #[serde(with = "humantime_serde")]
    pub retry_period: Duration,
    pub on_failure: String,
    pub workers: usize,
    pub max_demand: usize,
    pub seed_items: usize,
    pub feed_chunk: usize,
    #[serde(with = "humantime_serde")]
    pub feed_interval: Duration,
    pub priority_every: usize,
    pub failure_rate: f64,
    pub buffer_capacity: Option<usize>,
    #[serde(with = "humantime_serde")]
    pub run_for: Duration,
}

impl NodeConfig {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("producer_name", "spool")?
            .set_default("retry_period", "100ms")?
            .set_default("on_failure", "discard")?
            .set_default("workers", 4)?
            .set_default("max_demand", 10)?
            .set_default("seed_items", 1_000)?
            .set_default("feed_chunk", 50)?
            .set_default("feed_interval", "25ms")?
            .set_default("priority_every", 10)?
            .set_default("failure_rate", 0.05)?
            .set_default("buffer_capacity", None::<u64>)?
            .set_default("run_for", "30s")?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("SPOOL").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    /// Checks the host-level settings the producer itself does not validate.
    pub fn validate(&self) -> Result<(), spool_producer::ConfigError> {
        if self.workers == 0 {
            return Err(invalid("workers", "must be at least 1"));
        }
        if self.max_demand == 0 {
            return Err(invalid("max_demand", "must be at least 1"));
        }
        if self.feed_chunk == 0 {
            return Err(invalid("feed_chunk", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(invalid("failure_rate", "must be between 0.0 and 1.0"));
        }
        if self.buffer_capacity == Some(0) {
            return Err(invalid("buffer_capacity", "must be at least 1 when set"));
        }
        Ok(())
    }

    /// Builds producer startup options over `buffer`.
    pub fn producer_options(
        &self,
        buffer: BufferHandle,
    ) -> Result<ProducerOptions, spool_producer::ConfigError> {
        let on_failure = parse_failure_policy(&self.on_failure)?;
        Ok(ProducerOptions::new(self.producer_name.clone(), buffer)
            .with_retry_period(self.retry_period)
            .with_on_failure(on_failure))
    }
}

fn invalid(option: &'static str, constraint: &str) -> spool_producer::ConfigError {
    spool_producer::ConfigError::Invalid {
        option,
        constraint: constraint.to_string(),
    }
}
