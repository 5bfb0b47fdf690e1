//! Blocking, capacity-bounded FIFO hand-off between producer and consumer threads.
//!
//! `BoundedQueue` keeps its buffer and its stop flag behind a single mutex and parks
//! producers and consumers on two separate condition variables ("not full" and "not
//! empty"), so a `put` only ever wakes a consumer and a `take` only ever wakes a producer.
//! Every wait sits inside a predicate loop, so spurious wake-ups are harmless.
//!
//! Stopping is fail-fast: once [`BoundedQueue::stop`] has been called, both `put` and
//! `take` return [`HandoffError::Stopped`] even if items are still buffered. Leftovers can
//! be recovered with [`BoundedQueue::take_remaining`].
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::HandoffError;

/// An item handed back by a non-blocking `try_put`, along with the reason it was refused.
#[derive(Debug, PartialEq, Eq)]
pub struct Rejected<T> {
    pub item: T,
    pub reason: HandoffError,
}

#[derive(Debug)]
struct Buffer<T> {
    items: VecDeque<T>,
    stopped: bool,
}

/// A fixed-capacity, thread-safe FIFO queue with blocking `put`/`take` and cooperative shutdown.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    buffer: Mutex<Buffer<T>>,
    /// Producers park here while the buffer is full
    not_full: Condvar,
    /// Consumers park here while the buffer is empty
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Result<Self, HandoffError> {
        if capacity == 0 {
            return Err(HandoffError::ZeroCapacity);
        }
        Ok(Self {
            buffer: Mutex::new(Buffer {
                items: VecDeque::with_capacity(capacity),
                stopped: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        })
    }

    /// Appends `item` to the tail, blocking while the queue is full.
    ///
    /// Returns `Stopped` without inserting if the queue is (or becomes) stopped.
    pub fn put(&self, item: T) -> Result<(), HandoffError> {
        let mut buffer = self.buffer.lock();
        while buffer.items.len() == self.capacity && !buffer.stopped {
            self.not_full.wait(&mut buffer);
        }
        self.push_locked(buffer, item)
    }

    /// Like [`put`](Self::put), but gives up with `TimedOut` once `timeout` has elapsed.
    ///
    /// A timeout too large to express as a deadline waits like `put`.
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), HandoffError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.put(item);
        };
        let mut buffer = self.buffer.lock();
        while buffer.items.len() == self.capacity && !buffer.stopped {
            if self.not_full.wait_until(&mut buffer, deadline).timed_out()
                && buffer.items.len() == self.capacity
                && !buffer.stopped
            {
                return Err(HandoffError::TimedOut);
            }
        }
        self.push_locked(buffer, item)
    }

    /// Appends `item` only if there is room right now.
    pub fn try_put(&self, item: T) -> Result<(), Rejected<T>> {
        let mut buffer = self.buffer.lock();
        if buffer.stopped {
            return Err(Rejected {
                item,
                reason: HandoffError::Stopped,
            });
        }
        if buffer.items.len() == self.capacity {
            return Err(Rejected {
                item,
                reason: HandoffError::Full,
            });
        }
        buffer.items.push_back(item);
        drop(buffer);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes and returns the head item, blocking while the queue is empty.
    pub fn take(&self) -> Result<T, HandoffError> {
        let mut buffer = self.buffer.lock();
        while buffer.items.is_empty() && !buffer.stopped {
            self.not_empty.wait(&mut buffer);
        }
        self.pop_locked(buffer)
    }

    /// Like [`take`](Self::take), but gives up with `TimedOut` once `timeout` has elapsed.
    pub fn take_timeout(&self, timeout: Duration) -> Result<T, HandoffError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.take();
        };
        let mut buffer = self.buffer.lock();
        while buffer.items.is_empty() && !buffer.stopped {
            if self.not_empty.wait_until(&mut buffer, deadline).timed_out()
                && buffer.items.is_empty()
                && !buffer.stopped
            {
                return Err(HandoffError::TimedOut);
            }
        }
        self.pop_locked(buffer)
    }

    /// Removes the head item only if one is available right now.
    pub fn try_take(&self) -> Result<T, HandoffError> {
        let buffer = self.buffer.lock();
        if !buffer.stopped && buffer.items.is_empty() {
            return Err(HandoffError::Empty);
        }
        self.pop_locked(buffer)
    }

    /// Stops the queue and wakes every blocked producer and consumer. Idempotent.
    pub fn stop(&self) {
        let mut buffer = self.buffer.lock();
        buffer.stopped = true;
        drop(buffer);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Instantaneous item count. May be stale as soon as it is returned.
    pub fn size(&self) -> usize {
        self.buffer.lock().items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_stopped(&self) -> bool {
        self.buffer.lock().stopped
    }

    /// Empties the buffer and returns whatever was left in it, oldest first.
    ///
    /// Intended for after [`stop`](Self::stop), when `take` no longer hands items out.
    pub fn take_remaining(&self) -> Vec<T> {
        let mut buffer = self.buffer.lock();
        let remaining: Vec<T> = buffer.items.drain(..).collect();
        drop(buffer);
        self.not_full.notify_all();
        remaining
    }

    fn push_locked(
        &self,
        mut buffer: MutexGuard<'_, Buffer<T>>,
        item: T,
    ) -> Result<(), HandoffError> {
        if buffer.stopped {
            return Err(HandoffError::Stopped);
        }
        debug_assert!(buffer.items.len() < self.capacity);
        buffer.items.push_back(item);
        drop(buffer);
        self.not_empty.notify_one();
        Ok(())
    }

    fn pop_locked(&self, mut buffer: MutexGuard<'_, Buffer<T>>) -> Result<T, HandoffError> {
        if buffer.stopped {
            return Err(HandoffError::Stopped);
        }
        let item = buffer.items.pop_front().ok_or(HandoffError::Empty)?;
        drop(buffer);
        self.not_full.notify_one();
        Ok(item)
    }
}
