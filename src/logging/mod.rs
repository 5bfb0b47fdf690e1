//! Event sinks for worker observability.
//!
//! Every worker-loop transition is reported as one line through a [`LogSink`]. A sink
//! must be callable from any worker thread and is only ever invoked after the queue or
//! gate lock has been released, so a slow sink never stalls the primitives.
use chrono::Local;

pub mod channel;

pub use channel::ChannelSink;

/// Receives one line per observable event.
pub trait LogSink: Send + Sync {
    fn append(&self, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn append(&self, message: &str) {
        self(message)
    }
}

/// Discards everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn append(&self, _message: &str) {}
}

/// Forwards each line to `tracing` at `INFO`.
#[derive(Copy, Clone, Debug)]
pub struct TracingSink {
    label: &'static str,
}

impl TracingSink {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        TracingSink::new("handoff")
    }
}

impl LogSink for TracingSink {
    fn append(&self, message: &str) {
        tracing::info!(sink = self.label, "{message}");
    }
}

/// Prefixes every line with the local wall-clock time, `[HH:MM:SS.mmm] `.
#[derive(Clone, Debug)]
pub struct Timestamped<S> {
    inner: S,
}

impl<S: LogSink> Timestamped<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: LogSink> LogSink for Timestamped<S> {
    fn append(&self, message: &str) {
        let stamp = Local::now().format("%H:%M:%S%.3f");
        self.inner.append(&format!("[{stamp}] {message}"));
    }
}
