//! Shared-resource admission control.
//!
//! `gate` holds the readers-writers admission controller; `Policy` selects how it
//! breaks ties between waiting readers and waiting writers.
use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::HandoffError;

pub mod gate;

pub use gate::{Admission, GateSnapshot, ReadGuard, ReadWriteGate, WriteGuard};

/// Tie-breaking policy for a [`ReadWriteGate`].
///
/// Writers always get in once the last reader leaves, under every policy. The policy
/// decides who is woken when a writer leaves, and whether arriving readers queue up
/// behind waiting writers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Waiting readers are woken first; readers never yield to waiting writers.
    ReaderPreference,
    /// Arriving readers block while any writer is waiting; writers are woken first.
    WriterPreference,
    /// Wake one writer and every reader and let them race. Not FIFO.
    #[default]
    Fair,
}

impl Policy {
    pub const ALL: [Policy; 3] = [
        Policy::ReaderPreference,
        Policy::WriterPreference,
        Policy::Fair,
    ];
}

impl Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Policy::ReaderPreference => write!(f, "reader preference"),
            Policy::WriterPreference => write!(f, "writer preference"),
            Policy::Fair => write!(f, "fair"),
        }
    }
}

impl FromStr for Policy {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "reader_preference" | "reader" | "readers" => Ok(Policy::ReaderPreference),
            "writer_preference" | "writer" | "writers" => Ok(Policy::WriterPreference),
            "fair" => Ok(Policy::Fair),
            _ => Err(HandoffError::UnknownPolicy(s.to_string())),
        }
    }
}
