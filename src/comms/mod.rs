//! Producer-consumer hand-off channels.
//!
//! This module provides blocking communication primitives for multi-producer,
//! multi-consumer patterns. Currently, the `bounded` submodule contains a
//! fixed-capacity FIFO queue guarded by a mutex and two condition variables.
pub mod bounded;

pub use bounded::{BoundedQueue, Rejected};
