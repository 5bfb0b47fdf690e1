use std::fmt::Display;

use thiserror::Error;

/// Wrapper type for `toml::de::Error`
#[derive(Debug, Error)]
pub struct TomlError(toml::de::Error);

impl PartialEq for TomlError {
    fn eq(&self, other: &Self) -> bool {
        self.0.message() == other.0.message()
    }
}

impl Eq for TomlError {}
impl Display for TomlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<toml::de::Error> for TomlError {
    fn from(err: toml::de::Error) -> Self {
        Self(err)
    }
}

/// Error type for all primitives
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandoffError {
    #[error("Stopped, no further hand-offs will be admitted")]
    Stopped,
    #[error("Timed out before the operation could proceed")]
    TimedOut,
    #[error("Buffer full, cannot write until read")]
    Full,
    #[error("Nothing to read, buffer is empty")]
    Empty,
    #[error("Bounded queue capacity must be greater than 0")]
    ZeroCapacity,
    #[error("Invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    #[error("Failed to parse configuration: {from}")]
    Parse {
        #[from]
        from: TomlError,
    },
    #[error("Unknown access policy: {0}")]
    UnknownPolicy(String),
    #[error("Worker thread `{name}` panicked")]
    WorkerPanicked { name: String },
    #[error("Failed to spawn worker thread `{name}`: {reason}")]
    SpawnFailed { name: String, reason: String },
    #[error("A run is already in progress")]
    AlreadyRunning,
}

impl From<toml::de::Error> for HandoffError {
    fn from(err: toml::de::Error) -> Self {
        HandoffError::Parse { from: err.into() }
    }
}
