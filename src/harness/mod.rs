//! Worker threads driving the queue and the gate.
//!
//! A [`Harness`] spawns plain closures onto named OS threads; there is no worker trait
//! to implement. Each closure receives a [`Worker`] carrying its id, cadence, and a
//! shared [`StopFlag`]. [`RunState`] is the observable lifecycle of a run: presentation
//! code subscribes to phase changes and reads the live [`Counters`] instead of poking at
//! worker internals.
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::{Acquire, Relaxed, Release}};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::HandoffError;

pub mod loops;
pub mod runs;

pub use loops::{consumer_loop, producer_loop, reader_loop, writer_loop};
pub use runs::{ProducerConsumerRun, ReadersWritersRun, RunSummary};

/// Cooperative stop request shared by every worker of a run.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Acquire)
    }
}

/// What a worker thread does.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Producer,
    Consumer,
    Reader,
    Writer,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Producer => write!(f, "producer"),
            Role::Consumer => write!(f, "consumer"),
            Role::Reader => write!(f, "reader"),
            Role::Writer => write!(f, "writer"),
        }
    }
}

/// Per-thread context handed to a worker closure.
#[derive(Clone, Debug)]
pub struct Worker {
    pub id: usize,
    pub role: Role,
    pub interval: Duration,
    stop: StopFlag,
}

impl Worker {
    pub fn new(id: usize, role: Role, interval: Duration, stop: StopFlag) -> Self {
        Self {
            id,
            role,
            interval,
            stop,
        }
    }

    /// Sleeps one cadence interval, then reports whether the worker should keep going.
    pub fn pause(&self) -> bool {
        thread::sleep(self.interval);
        !self.stop.is_stop_requested()
    }

    /// "Producer #3" style label used in log lines.
    pub fn label(&self) -> String {
        let role = self.role.to_string();
        let mut chars = role.chars();
        let capitalized: String = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .into_iter()
            .chain(chars)
            .collect();
        format!("{capitalized} #{}", self.id)
    }
}

/// Spawns worker closures and joins them as a group.
#[derive(Debug, Default)]
pub struct Harness {
    stop: StopFlag,
    workers: Vec<(String, JoinHandle<()>)>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Starts `body` on its own named thread.
    pub fn spawn<F>(
        &mut self,
        role: Role,
        id: usize,
        interval: Duration,
        body: F,
    ) -> Result<(), HandoffError>
    where
        F: FnOnce(Worker) + Send + 'static,
    {
        let worker = Worker::new(id, role, interval, self.stop.clone());
        let name = format!("{role}-{id}");
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(worker))
            .map_err(|err| HandoffError::SpawnFailed {
                name: name.clone(),
                reason: err.to_string(),
            })?;
        tracing::debug!(worker = %name, ?interval, "spawned");
        self.workers.push((name, handle));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Joins every worker. Reports the first panicked worker, after joining all of them.
    pub fn join(&mut self) -> Result<(), HandoffError> {
        let mut first_panic = None;
        for (name, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!(worker = %name, "worker panicked");
                first_panic.get_or_insert(name);
            } else {
                tracing::debug!(worker = %name, "joined");
            }
        }
        match first_panic {
            Some(name) => Err(HandoffError::WorkerPanicked { name }),
            None => Ok(()),
        }
    }
}

/// Lifecycle of a run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Running => write!(f, "running"),
            Phase::Stopping => write!(f, "stopping"),
            Phase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Live operation totals for the current run.
#[derive(Debug, Default)]
pub struct Counters {
    pub produced: AtomicU64,
    pub consumed: AtomicU64,
    pub reads: AtomicU64,
    pub writes: AtomicU64,
}

/// Plain copy of [`Counters`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub produced: u64,
    pub consumed: u64,
    pub reads: u64,
    pub writes: u64,
}

impl Counters {
    pub fn totals(&self) -> Totals {
        Totals {
            produced: self.produced.load(Relaxed),
            consumed: self.consumed.load(Relaxed),
            reads: self.reads.load(Relaxed),
            writes: self.writes.load(Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [&self.produced, &self.consumed, &self.reads, &self.writes] {
            counter.store(0, Relaxed);
        }
    }
}

type Subscriber = Arc<dyn Fn(Phase) + Send + Sync>;

/// Observable state of a run, shared between the harness and whoever displays it.
#[derive(Default)]
pub struct RunState {
    phase: Mutex<Phase>,
    changed: Condvar,
    subscribers: Mutex<Vec<Subscriber>>,
    counters: Counters,
}

impl std::fmt::Debug for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunState")
            .field("phase", &*self.phase.lock())
            .field("counters", &self.counters.totals())
            .finish()
    }
}

impl RunState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn totals(&self) -> Totals {
        self.counters.totals()
    }

    /// Registers a callback invoked on every phase change, from the thread making it.
    ///
    /// Callbacks run with no lock held, so they may subscribe or start a run themselves.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(Phase) + Send + Sync + 'static,
    {
        self.subscribers.lock().push(Arc::new(callback));
    }

    /// Blocks until the run reaches `phase`, or `timeout` elapses. Returns whether it did.
    ///
    /// A timeout too large to express as a deadline waits indefinitely.
    pub fn wait_for(&self, phase: Phase, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut current = self.phase.lock();
        while *current != phase {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut current, deadline).timed_out() {
                        return *current == phase;
                    }
                }
                None => self.changed.wait(&mut current),
            }
        }
        true
    }

    /// Moves from `Idle`/`Stopped` to `Running` and zeroes the counters.
    pub(crate) fn begin(&self) -> Result<(), HandoffError> {
        {
            let mut phase = self.phase.lock();
            if matches!(*phase, Phase::Running | Phase::Stopping) {
                return Err(HandoffError::AlreadyRunning);
            }
            self.counters.reset();
            *phase = Phase::Running;
        }
        self.announce(Phase::Running);
        Ok(())
    }

    pub(crate) fn transition(&self, to: Phase) {
        *self.phase.lock() = to;
        self.announce(to);
    }

    fn announce(&self, phase: Phase) {
        self.changed.notify_all();
        let subscribers: Vec<Subscriber> = self.subscribers.lock().clone();
        for subscriber in subscribers {
            subscriber(phase);
        }
    }
}
