//! Bounded log-line channel between worker threads and a presentation layer.
//!
//! Workers append without ever blocking; the reader side calls [`ChannelSink::drain`] on
//! its own cadence (a UI timer, a test, a log shipper). When the buffer is full, new
//! lines are dropped and counted instead of stalling the worker that produced them.
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use std::sync::Arc;

use crate::{comms::BoundedQueue, logging::LogSink, HandoffError};

#[derive(Debug)]
struct Lines {
    queue: BoundedQueue<String>,
    dropped: AtomicUsize,
}

/// A cloneable, non-blocking log sink backed by a [`BoundedQueue`] of strings.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    lines: Arc<Lines>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Result<Self, HandoffError> {
        Ok(Self {
            lines: Arc::new(Lines {
                queue: BoundedQueue::new(capacity)?,
                dropped: AtomicUsize::new(0),
            }),
        })
    }

    /// Takes every buffered line, oldest first.
    pub fn drain(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.lines.queue.size());
        while let Ok(line) = self.lines.queue.try_take() {
            out.push(line);
        }
        out
    }

    /// Lines currently buffered.
    pub fn len(&self) -> usize {
        self.lines.queue.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lines discarded because the buffer was full.
    pub fn dropped(&self) -> usize {
        self.lines.dropped.load(Relaxed)
    }
}

impl LogSink for ChannelSink {
    fn append(&self, message: &str) {
        if self.lines.queue.try_put(message.to_string()).is_err() {
            self.lines.dropped.fetch_add(1, Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drain_returns_lines_in_order() {
        let sink = ChannelSink::new(8).unwrap();
        assert!(sink.is_empty());

        sink.append("first");
        sink.append("second");
        assert_eq!(sink.len(), 2);

        assert_eq!(sink.drain(), vec!["first", "second"]);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn overflow_is_counted_not_blocking() {
        let sink = ChannelSink::new(2).unwrap();
        for i in 0..5 {
            sink.append(&format!("line {i}"));
        }
        assert_eq!(sink.dropped(), 3);
        assert_eq!(sink.drain(), vec!["line 0", "line 1"]);

        sink.append("after drain");
        assert_eq!(sink.drain(), vec!["after drain"]);
    }

    #[test]
    fn clones_share_one_buffer_across_threads() {
        let sink = ChannelSink::new(64).unwrap();
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let sink = sink.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        sink.append(&format!("{t}:{i}"));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let lines = sink.drain();
        assert_eq!(lines.len(), 40);
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(ChannelSink::new(0).unwrap_err(), HandoffError::ZeroCapacity);
    }
}
