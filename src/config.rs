//! Run configuration.
//!
//! A `RunConfig` is read once before a run starts and is immutable for the run's
//! duration. Every field has a default, so a TOML document only needs the keys it
//! wants to change.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{sync::Policy, HandoffError};

/// Numeric knobs for producer/consumer and readers/writers runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Bounded queue capacity
    pub capacity: usize,
    pub producers: usize,
    pub consumers: usize,
    pub producer_interval_ms: u64,
    pub consumer_interval_ms: u64,
    pub readers: usize,
    pub writers: usize,
    pub reader_interval_ms: u64,
    pub writer_interval_ms: u64,
    /// Initial readers-writers policy
    pub policy: Policy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            producers: 1,
            consumers: 2,
            producer_interval_ms: 500,
            consumer_interval_ms: 1000,
            readers: 6,
            writers: 2,
            reader_interval_ms: 200,
            writer_interval_ms: 500,
            policy: Policy::Fair,
        }
    }
}

impl RunConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, HandoffError> {
        let config: RunConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HandoffError> {
        at_least("capacity", self.capacity as u64, 1)?;
        at_least("producers", self.producers as u64, 1)?;
        within("consumers", self.consumers, 1, 64)?;
        within("readers", self.readers, 1, 64)?;
        within("writers", self.writers, 1, 16)?;
        at_least("producer_interval_ms", self.producer_interval_ms, 1)?;
        at_least("consumer_interval_ms", self.consumer_interval_ms, 1)?;
        at_least("reader_interval_ms", self.reader_interval_ms, 1)?;
        at_least("writer_interval_ms", self.writer_interval_ms, 1)?;
        Ok(())
    }

    pub fn producer_interval(&self) -> Duration {
        Duration::from_millis(self.producer_interval_ms)
    }

    pub fn consumer_interval(&self) -> Duration {
        Duration::from_millis(self.consumer_interval_ms)
    }

    pub fn reader_interval(&self) -> Duration {
        Duration::from_millis(self.reader_interval_ms)
    }

    pub fn writer_interval(&self) -> Duration {
        Duration::from_millis(self.writer_interval_ms)
    }
}

fn at_least(field: &'static str, value: u64, min: u64) -> Result<(), HandoffError> {
    if value < min {
        return Err(HandoffError::InvalidConfig {
            field,
            reason: format!("must be at least {min}, got {value}"),
        });
    }
    Ok(())
}

fn within(field: &'static str, value: usize, min: usize, max: usize) -> Result<(), HandoffError> {
    if !(min..=max).contains(&value) {
        return Err(HandoffError::InvalidConfig {
            field,
            reason: format!("must be within {min}..={max}, got {value}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RunConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.capacity, 10);
        assert_eq!(config.consumer_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config = RunConfig::from_toml_str(
            r#"
            capacity = 3
            consumers = 5
            policy = "writer_preference"
            "#,
        )
        .unwrap();

        assert_eq!(config.capacity, 3);
        assert_eq!(config.consumers, 5);
        assert_eq!(config.policy, Policy::WriterPreference);
        assert_eq!(config.producer_interval_ms, 500);
        assert_eq!(config.readers, 6);
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(RunConfig::from_toml_str("").unwrap(), RunConfig::default());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = RunConfig::from_toml_str("capacity = 0").unwrap_err();
        assert!(matches!(
            err,
            HandoffError::InvalidConfig {
                field: "capacity",
                ..
            }
        ));

        let err = RunConfig::from_toml_str("writers = 17").unwrap_err();
        assert!(matches!(
            err,
            HandoffError::InvalidConfig {
                field: "writers",
                ..
            }
        ));
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        assert!(matches!(
            RunConfig::from_toml_str("policy = \"lottery\""),
            Err(HandoffError::Parse { .. })
        ));
        assert!(matches!(
            RunConfig::from_toml_str("capacty = 4"),
            Err(HandoffError::Parse { .. })
        ));
        assert!(matches!(
            RunConfig::from_toml_str("capacity = "),
            Err(HandoffError::Parse { .. })
        ));
    }
}
