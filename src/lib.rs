//! In-process hand-off and admission primitives, plus the worker loops that drive them.
//!
//! - [`comms::BoundedQueue`]: fixed-capacity blocking FIFO with cooperative stop.
//! - [`sync::ReadWriteGate`]: readers-writers admission with a runtime-swappable [`sync::Policy`].
//! - [`harness`]: producer/consumer/reader/writer loops, a closure-based thread harness,
//!   and assembled runs configured by [`config::RunConfig`].
//! - [`logging`]: the `append(line)` sinks workers report through.
pub mod comms;
pub mod config;
pub mod error;
pub mod harness;
pub mod logging;
pub mod sync;

pub use error::{HandoffError, TomlError};
