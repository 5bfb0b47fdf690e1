//! Readers-writers admission control with a swappable fairness policy.
//!
//! `ReadWriteGate` admits either any number of readers or exactly one writer. The
//! admission bookkeeping lives behind one mutex with a condition variable per role;
//! the protected value sits behind its own `RwLock`, so slow payload access never
//! holds the bookkeeping lock.
//!
//! The gate is an admission control, not a lock around `V`: `read_value` and
//! `write_value` expect the caller to hold read or write admission and do not check it.
//! The RAII [`ReadGuard`] and [`WriteGuard`] returned by [`ReadWriteGate::read`] and
//! [`ReadWriteGate::write`] pair begin/end automatically.
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{sync::Policy, HandoffError};

#[derive(Debug, Default)]
struct Bookkeeping {
    policy: Policy,
    active_readers: usize,
    active_writer: bool,
    waiting_readers: usize,
    waiting_writers: usize,
    shutdown: bool,
}

impl Bookkeeping {
    fn reader_must_wait(&self) -> bool {
        self.active_writer
            || (self.policy == Policy::WriterPreference && self.waiting_writers > 0)
    }

    fn writer_must_wait(&self) -> bool {
        self.active_writer || self.active_readers > 0
    }

    fn snapshot(&self) -> GateSnapshot {
        GateSnapshot {
            policy: self.policy,
            active_readers: self.active_readers,
            active_writer: self.active_writer,
            waiting_readers: self.waiting_readers,
            waiting_writers: self.waiting_writers,
        }
    }
}

/// Who to wake once the bookkeeping lock is released.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Wake {
    one_writer: bool,
    all_readers: bool,
}

impl Wake {
    const BOTH: Wake = Wake {
        one_writer: true,
        all_readers: true,
    };
}

/// Outcome of a successful `begin_read`/`begin_write`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    /// Whether the caller had to park before being admitted
    pub blocked: bool,
    /// Active readers right after admission (always 0 for a writer)
    pub readers: usize,
}

/// Point-in-time copy of the gate's bookkeeping, for observability only.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GateSnapshot {
    pub policy: Policy,
    pub active_readers: usize,
    pub active_writer: bool,
    pub waiting_readers: usize,
    pub waiting_writers: usize,
}

/// Read-shared / write-exclusive admission controller guarding a value of type `V`.
#[derive(Debug)]
pub struct ReadWriteGate<V> {
    state: Mutex<Bookkeeping>,
    readers: Condvar,
    writers: Condvar,
    value: RwLock<V>,
}

impl<V: Default> Default for ReadWriteGate<V> {
    fn default() -> Self {
        ReadWriteGate::new(V::default(), Policy::default())
    }
}

impl<V> ReadWriteGate<V> {
    pub fn new(value: V, policy: Policy) -> Self {
        Self {
            state: Mutex::new(Bookkeeping {
                policy,
                ..Bookkeeping::default()
            }),
            readers: Condvar::new(),
            writers: Condvar::new(),
            value: RwLock::new(value),
        }
    }

    /// Requests shared admission, blocking while a writer is active or, under
    /// `WriterPreference`, while any writer is waiting.
    pub fn begin_read(&self) -> Result<Admission, HandoffError> {
        let mut state = self.state.lock();
        state.waiting_readers += 1;
        let mut blocked = false;
        while !state.shutdown && state.reader_must_wait() {
            blocked = true;
            self.readers.wait(&mut state);
        }
        state.waiting_readers -= 1;
        if state.shutdown {
            return Err(HandoffError::Stopped);
        }
        state.active_readers += 1;
        Ok(Admission {
            blocked,
            readers: state.active_readers,
        })
    }

    /// Shared admission if it can be granted right now, `None` if `begin_read` would block.
    pub fn try_begin_read(&self) -> Result<Option<Admission>, HandoffError> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(HandoffError::Stopped);
        }
        if state.reader_must_wait() {
            return Ok(None);
        }
        state.active_readers += 1;
        Ok(Some(Admission {
            blocked: false,
            readers: state.active_readers,
        }))
    }

    /// Releases shared admission. The last reader out wakes one waiting writer.
    pub fn end_read(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.active_readers > 0, "end_read without matching begin_read");
        state.active_readers = state.active_readers.saturating_sub(1);
        let wake_writer = state.active_readers == 0 && state.waiting_writers > 0;
        drop(state);
        if wake_writer {
            self.writers.notify_one();
        }
    }

    /// Requests exclusive admission, blocking while a writer or any reader is active.
    pub fn begin_write(&self) -> Result<Admission, HandoffError> {
        let mut state = self.state.lock();
        state.waiting_writers += 1;
        let mut blocked = false;
        while !state.shutdown && state.writer_must_wait() {
            blocked = true;
            self.writers.wait(&mut state);
        }
        state.waiting_writers -= 1;
        if state.shutdown {
            // readers parked behind this writer under `WriterPreference` need a recheck
            drop(state);
            self.readers.notify_all();
            return Err(HandoffError::Stopped);
        }
        state.active_writer = true;
        Ok(Admission {
            blocked,
            readers: 0,
        })
    }

    /// Exclusive admission if it can be granted right now, `None` if `begin_write` would block.
    pub fn try_begin_write(&self) -> Result<Option<Admission>, HandoffError> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(HandoffError::Stopped);
        }
        if state.writer_must_wait() {
            return Ok(None);
        }
        state.active_writer = true;
        Ok(Some(Admission {
            blocked: false,
            readers: 0,
        }))
    }

    /// Releases exclusive admission and wakes waiters according to the current policy.
    pub fn end_write(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.active_writer, "end_write without matching begin_write");
        state.active_writer = false;
        let wake = match state.policy {
            Policy::WriterPreference if state.waiting_writers > 0 => Wake {
                one_writer: true,
                all_readers: false,
            },
            Policy::WriterPreference => Wake {
                one_writer: false,
                all_readers: true,
            },
            Policy::ReaderPreference if state.waiting_readers > 0 => Wake {
                one_writer: false,
                all_readers: true,
            },
            Policy::ReaderPreference => Wake {
                one_writer: state.waiting_writers > 0,
                all_readers: false,
            },
            Policy::Fair => Wake::BOTH,
        };
        drop(state);
        self.wake(wake);
    }

    /// Switches the policy and wakes one writer plus every reader so that parked
    /// threads re-evaluate under the new rules right away.
    pub fn set_policy(&self, policy: Policy) {
        self.state.lock().policy = policy;
        self.wake(Wake::BOTH);
    }

    pub fn policy(&self) -> Policy {
        self.state.lock().policy
    }

    /// Refuses all future admissions and releases every parked reader and writer with
    /// `Stopped`. Threads already admitted keep their admission until they end it.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.writers.notify_all();
        self.readers.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shutdown
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.state.lock().snapshot()
    }

    /// Reads the payload. Only call while holding read or write admission.
    pub fn read_value(&self) -> V
    where
        V: Clone,
    {
        self.value.read().clone()
    }

    /// Replaces the payload. Only call while holding write admission.
    pub fn write_value(&self, value: V) {
        *self.value.write() = value;
    }

    /// `begin_read` wrapped in a guard that ends the read when dropped.
    pub fn read(&self) -> Result<ReadGuard<'_, V>, HandoffError> {
        let admission = self.begin_read()?;
        Ok(ReadGuard {
            gate: self,
            admission,
        })
    }

    /// `begin_write` wrapped in a guard that ends the write when dropped.
    pub fn write(&self) -> Result<WriteGuard<'_, V>, HandoffError> {
        let admission = self.begin_write()?;
        Ok(WriteGuard {
            gate: self,
            admission,
        })
    }

    /// `try_begin_read` wrapped in a guard.
    pub fn try_read(&self) -> Result<Option<ReadGuard<'_, V>>, HandoffError> {
        Ok(self.try_begin_read()?.map(|admission| ReadGuard {
            gate: self,
            admission,
        }))
    }

    /// `try_begin_write` wrapped in a guard.
    pub fn try_write(&self) -> Result<Option<WriteGuard<'_, V>>, HandoffError> {
        Ok(self.try_begin_write()?.map(|admission| WriteGuard {
            gate: self,
            admission,
        }))
    }

    fn wake(&self, wake: Wake) {
        if wake.one_writer {
            self.writers.notify_one();
        }
        if wake.all_readers {
            self.readers.notify_all();
        }
    }
}

/// Shared admission held for the guard's lifetime.
#[derive(Debug)]
pub struct ReadGuard<'a, V> {
    gate: &'a ReadWriteGate<V>,
    admission: Admission,
}

impl<V> ReadGuard<'_, V> {
    pub fn admission(&self) -> Admission {
        self.admission
    }

    pub fn value(&self) -> RwLockReadGuard<'_, V> {
        self.gate.value.read()
    }
}

impl<V> Drop for ReadGuard<'_, V> {
    fn drop(&mut self) {
        self.gate.end_read();
    }
}

/// Exclusive admission held for the guard's lifetime.
#[derive(Debug)]
pub struct WriteGuard<'a, V> {
    gate: &'a ReadWriteGate<V>,
    admission: Admission,
}

impl<V> WriteGuard<'_, V> {
    pub fn admission(&self) -> Admission {
        self.admission
    }

    pub fn value(&self) -> RwLockReadGuard<'_, V> {
        self.gate.value.read()
    }

    pub fn value_mut(&mut self) -> RwLockWriteGuard<'_, V> {
        self.gate.value.write()
    }

    pub fn set(&mut self, value: V) {
        *self.gate.value.write() = value;
    }
}

impl<V> Drop for WriteGuard<'_, V> {
    fn drop(&mut self) {
        self.gate.end_write();
    }
}
