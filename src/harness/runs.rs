//! Ready-made sessions wiring workers to a queue or a gate.
//!
//! A run is started from a validated [`RunConfig`], reports through one shared sink,
//! and publishes its lifecycle on a [`RunState`]. Stopping is fail-fast: the stop flag
//! is raised, the primitive is stopped so parked workers wake immediately, every worker
//! is joined, and whatever is still buffered is discarded.
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;

use crate::{
    comms::BoundedQueue,
    config::RunConfig,
    harness::{
        consumer_loop, producer_loop, reader_loop, writer_loop, Harness, Phase, Role, RunState,
        Totals,
    },
    logging::LogSink,
    sync::{Policy, ReadWriteGate},
    HandoffError,
};

/// What a stopped run leaves behind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub totals: Totals,
    /// Items still buffered at stop time, dropped without being consumed
    pub discarded: usize,
    /// Final payload of a readers-writers run (0 for producer-consumer runs)
    pub final_value: u64,
}

/// Producers feeding consumers through one [`BoundedQueue`].
pub struct ProducerConsumerRun {
    queue: Arc<BoundedQueue<u64>>,
    state: Arc<RunState>,
    sink: Arc<dyn LogSink>,
    harness: Harness,
}

impl ProducerConsumerRun {
    pub fn start(config: &RunConfig, sink: Arc<dyn LogSink>) -> Result<Self, HandoffError> {
        Self::start_with(config, sink, RunState::new())
    }

    /// Starts a run publishing to an existing `state`, which must not be mid-run.
    pub fn start_with(
        config: &RunConfig,
        sink: Arc<dyn LogSink>,
        state: Arc<RunState>,
    ) -> Result<Self, HandoffError> {
        config.validate()?;
        let queue = Arc::new(BoundedQueue::new(config.capacity)?);
        state.begin()?;

        let mut run = Self {
            queue,
            state,
            sink,
            harness: Harness::new(),
        };
        tracing::info!(
            producers = config.producers,
            consumers = config.consumers,
            capacity = config.capacity,
            "producer-consumer run started"
        );
        run.sink.append(&format!(
            "Started: {} producer(s), {} consumer(s), capacity {}",
            config.producers, config.consumers, config.capacity
        ));
        if let Err(err) = run.spawn_workers(config) {
            let _ = run.shutdown();
            return Err(err);
        }
        Ok(run)
    }

    fn spawn_workers(&mut self, config: &RunConfig) -> Result<(), HandoffError> {
        let sequence = Arc::new(AtomicU64::new(0));
        for id in 1..=config.producers {
            let (queue, state, sink, sequence) = (
                Arc::clone(&self.queue),
                Arc::clone(&self.state),
                Arc::clone(&self.sink),
                Arc::clone(&sequence),
            );
            self.harness
                .spawn(Role::Producer, id, config.producer_interval(), move |worker| {
                    let next = || sequence.fetch_add(1, Relaxed) + 1;
                    producer_loop(&worker, &queue, next, &*sink, &state.counters().produced);
                })?;
        }
        for id in 1..=config.consumers {
            let (queue, state, sink) = (
                Arc::clone(&self.queue),
                Arc::clone(&self.state),
                Arc::clone(&self.sink),
            );
            self.harness
                .spawn(Role::Consumer, id, config.consumer_interval(), move |worker| {
                    consumer_loop(&worker, &queue, drop, &*sink, &state.counters().consumed);
                })?;
        }
        Ok(())
    }

    pub fn queue(&self) -> &Arc<BoundedQueue<u64>> {
        &self.queue
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    /// Stops every worker, joins them, and discards any still-buffered items.
    pub fn stop(mut self) -> Result<RunSummary, HandoffError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<RunSummary, HandoffError> {
        self.state.transition(Phase::Stopping);
        self.harness.request_stop();
        self.queue.stop();
        let joined = self.harness.join();

        let discarded = self.queue.take_remaining().len();
        let totals = self.state.totals();
        self.sink.append(&format!(
            "Stopped: produced {}, consumed {}, discarded {discarded}",
            totals.produced, totals.consumed
        ));
        tracing::info!(?totals, discarded, "producer-consumer run stopped");
        self.state.transition(Phase::Stopped);

        joined.map(|()| RunSummary {
            totals,
            discarded,
            final_value: 0,
        })
    }
}

impl Drop for ProducerConsumerRun {
    fn drop(&mut self) {
        if !self.harness.is_empty() {
            let _ = self.shutdown();
        }
    }
}

/// Readers and writers sharing one [`ReadWriteGate`] over a counter.
pub struct ReadersWritersRun {
    gate: Arc<ReadWriteGate<u64>>,
    state: Arc<RunState>,
    sink: Arc<dyn LogSink>,
    harness: Harness,
}

impl ReadersWritersRun {
    pub fn start(config: &RunConfig, sink: Arc<dyn LogSink>) -> Result<Self, HandoffError> {
        Self::start_with(config, sink, RunState::new())
    }

    /// Starts a run publishing to an existing `state`, which must not be mid-run.
    pub fn start_with(
        config: &RunConfig,
        sink: Arc<dyn LogSink>,
        state: Arc<RunState>,
    ) -> Result<Self, HandoffError> {
        config.validate()?;
        state.begin()?;

        let mut run = Self {
            gate: Arc::new(ReadWriteGate::new(0, config.policy)),
            state,
            sink,
            harness: Harness::new(),
        };
        tracing::info!(
            readers = config.readers,
            writers = config.writers,
            policy = %config.policy,
            "readers-writers run started"
        );
        run.sink.append(&format!(
            "Started: {} reader(s), {} writer(s), policy {}",
            config.readers, config.writers, config.policy
        ));
        if let Err(err) = run.spawn_workers(config) {
            let _ = run.shutdown();
            return Err(err);
        }
        Ok(run)
    }

    fn spawn_workers(&mut self, config: &RunConfig) -> Result<(), HandoffError> {
        for id in 1..=config.readers {
            let (gate, state, sink) = (
                Arc::clone(&self.gate),
                Arc::clone(&self.state),
                Arc::clone(&self.sink),
            );
            self.harness
                .spawn(Role::Reader, id, config.reader_interval(), move |worker| {
                    reader_loop(&worker, &gate, &*sink, &state.counters().reads);
                })?;
        }
        for id in 1..=config.writers {
            let (gate, state, sink) = (
                Arc::clone(&self.gate),
                Arc::clone(&self.state),
                Arc::clone(&self.sink),
            );
            self.harness
                .spawn(Role::Writer, id, config.writer_interval(), move |worker| {
                    writer_loop(&worker, &gate, |v| v + 1, &*sink, &state.counters().writes);
                })?;
        }
        Ok(())
    }

    pub fn gate(&self) -> &Arc<ReadWriteGate<u64>> {
        &self.gate
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    /// Switches the gate's policy mid-run.
    pub fn set_policy(&self, policy: Policy) {
        self.gate.set_policy(policy);
        self.sink.append(&format!("Policy switched to {policy}"));
    }

    /// Stops every worker and joins them.
    pub fn stop(mut self) -> Result<RunSummary, HandoffError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<RunSummary, HandoffError> {
        self.state.transition(Phase::Stopping);
        self.harness.request_stop();
        self.gate.shutdown();
        let joined = self.harness.join();

        let totals = self.state.totals();
        let final_value = self.gate.read_value();
        self.sink.append(&format!(
            "Stopped: {} read(s), {} write(s), value {final_value}",
            totals.reads, totals.writes
        ));
        tracing::info!(?totals, final_value, "readers-writers run stopped");
        self.state.transition(Phase::Stopped);

        joined.map(|()| RunSummary {
            totals,
            discarded: 0,
            final_value,
        })
    }
}

impl Drop for ReadersWritersRun {
    fn drop(&mut self) {
        if !self.harness.is_empty() {
            let _ = self.shutdown();
        }
    }
}
