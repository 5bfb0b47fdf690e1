//! Producer, consumer, reader, and writer loops.
//!
//! Each loop sleeps one cadence interval, checks the stop flag, performs one operation
//! against the shared primitive, and reports every state change as one line to the sink:
//! waiting (only when the operation cannot proceed at once), admitted, released, and
//! finally stopped. A queue operation is admitted and released in one step, so it gets
//! one line. Gate admissions get separate lines, and the release line is written while
//! admission is still held, so the log order matches the order in which the gate was
//! actually held. No line is written under the queue's or the gate's mutex.
//!
//! A loop ends on a stop request or when the primitive reports `Stopped`, and returns how
//! many operations it completed.
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

use crate::{
    comms::{BoundedQueue, Rejected},
    harness::Worker,
    logging::LogSink,
    sync::ReadWriteGate,
    HandoffError,
};

fn finish(
    worker: &Worker,
    sink: &dyn LogSink,
    completed: u64,
    reason: Option<HandoffError>,
) -> u64 {
    match reason {
        Some(HandoffError::Stopped) | None => {
            sink.append(&format!("{} stopped after {completed} operations", worker.label()))
        }
        Some(err) => sink.append(&format!("{} aborted: {err}", worker.label())),
    }
    completed
}

fn waited(blocked: bool) -> &'static str {
    if blocked {
        " after waiting"
    } else {
        ""
    }
}

/// Puts values from `next` into `queue` once per interval.
pub fn producer_loop<T, F>(
    worker: &Worker,
    queue: &BoundedQueue<T>,
    mut next: F,
    sink: &dyn LogSink,
    tally: &AtomicU64,
) -> u64
where
    T: Display,
    F: FnMut() -> T,
{
    let mut completed = 0;
    while worker.pause() {
        let item = next();
        let shown = item.to_string();
        let blocked = match queue.try_put(item) {
            Ok(()) => false,
            Err(Rejected {
                item,
                reason: HandoffError::Full,
            }) => {
                sink.append(&format!("{} waiting to put {shown}: buffer full", worker.label()));
                if let Err(err) = queue.put(item) {
                    return finish(worker, sink, completed, Some(err));
                }
                true
            }
            Err(rejected) => return finish(worker, sink, completed, Some(rejected.reason)),
        };
        completed += 1;
        tally.fetch_add(1, Relaxed);
        sink.append(&format!(
            "{} produced {shown}{} (buffer: {}/{})",
            worker.label(),
            waited(blocked),
            queue.size(),
            queue.capacity()
        ));
    }
    finish(worker, sink, completed, None)
}

/// Takes one item from `queue` per interval and hands it to `consume`.
pub fn consumer_loop<T, F>(
    worker: &Worker,
    queue: &BoundedQueue<T>,
    mut consume: F,
    sink: &dyn LogSink,
    tally: &AtomicU64,
) -> u64
where
    T: Display,
    F: FnMut(T),
{
    let mut completed = 0;
    while worker.pause() {
        let (item, blocked) = match queue.try_take() {
            Ok(item) => (item, false),
            Err(HandoffError::Empty) => {
                sink.append(&format!("{} waiting to take: buffer empty", worker.label()));
                match queue.take() {
                    Ok(item) => (item, true),
                    Err(err) => return finish(worker, sink, completed, Some(err)),
                }
            }
            Err(err) => return finish(worker, sink, completed, Some(err)),
        };
        completed += 1;
        tally.fetch_add(1, Relaxed);
        sink.append(&format!(
            "{} consumed {item}{} (buffer: {}/{})",
            worker.label(),
            waited(blocked),
            queue.size(),
            queue.capacity()
        ));
        consume(item);
    }
    finish(worker, sink, completed, None)
}

/// Reads the gate's payload once per interval under shared admission.
pub fn reader_loop<V>(
    worker: &Worker,
    gate: &ReadWriteGate<V>,
    sink: &dyn LogSink,
    tally: &AtomicU64,
) -> u64
where
    V: Clone + Display,
{
    let mut completed = 0;
    while worker.pause() {
        let guard = match gate.try_read() {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                sink.append(&format!("{} waiting to read", worker.label()));
                match gate.read() {
                    Ok(guard) => guard,
                    Err(err) => return finish(worker, sink, completed, Some(err)),
                }
            }
            Err(err) => return finish(worker, sink, completed, Some(err)),
        };
        let admission = guard.admission();
        let value = guard.value().clone();
        sink.append(&format!(
            "{} admitted to read {value}{} (readers: {})",
            worker.label(),
            waited(admission.blocked),
            admission.readers
        ));
        completed += 1;
        tally.fetch_add(1, Relaxed);
        sink.append(&format!("{} released read", worker.label()));
        drop(guard);
    }
    finish(worker, sink, completed, None)
}

/// Replaces the gate's payload with `update(current)` once per interval under exclusive
/// admission.
pub fn writer_loop<V, F>(
    worker: &Worker,
    gate: &ReadWriteGate<V>,
    mut update: F,
    sink: &dyn LogSink,
    tally: &AtomicU64,
) -> u64
where
    V: Display,
    F: FnMut(&V) -> V,
{
    let mut completed = 0;
    while worker.pause() {
        let mut guard = match gate.try_write() {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                sink.append(&format!("{} waiting to write", worker.label()));
                match gate.write() {
                    Ok(guard) => guard,
                    Err(err) => return finish(worker, sink, completed, Some(err)),
                }
            }
            Err(err) => return finish(worker, sink, completed, Some(err)),
        };
        let blocked = guard.admission().blocked;
        sink.append(&format!("{} admitted to write{}", worker.label(), waited(blocked)));
        let next = update(&guard.value());
        let shown = next.to_string();
        guard.set(next);
        completed += 1;
        tally.fetch_add(1, Relaxed);
        sink.append(&format!("{} wrote {shown} and released", worker.label()));
        drop(guard);
    }
    finish(worker, sink, completed, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{Role, StopFlag};
    use crate::logging::ChannelSink;
    use crate::sync::Policy;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn worker(id: usize, role: Role, stop: &StopFlag) -> Worker {
        Worker::new(id, role, Duration::from_millis(1), stop.clone())
    }

    #[test]
    fn producer_and_consumer_hand_off_everything() {
        let queue = Arc::new(BoundedQueue::new(2).unwrap());
        let sink = ChannelSink::new(1024).unwrap();
        let stop = StopFlag::new();
        let produced = Arc::new(AtomicU64::new(0));
        let consumed = Arc::new(AtomicU64::new(0));

        let producer = {
            let (queue, sink, produced) =
                (Arc::clone(&queue), sink.clone(), Arc::clone(&produced));
            let me = worker(1, Role::Producer, &stop);
            thread::spawn(move || {
                let mut values = 1..=20u32;
                producer_loop(&me, &queue, || values.next().unwrap_or(0), &sink, &produced)
            })
        };
        let consumer = {
            let (queue, sink, consumed) =
                (Arc::clone(&queue), sink.clone(), Arc::clone(&consumed));
            let me = worker(1, Role::Consumer, &stop);
            thread::spawn(move || {
                let mut seen = Vec::new();
                consumer_loop(&me, &queue, |item| seen.push(item), &sink, &consumed);
                seen
            })
        };

        // let twenty values through, then stop
        while consumed.load(Relaxed) < 20 {
            thread::sleep(Duration::from_millis(1));
        }
        stop.request_stop();
        queue.stop();

        let produced_count = producer.join().unwrap();
        let seen = consumer.join().unwrap();
        assert_eq!(&seen[..20], &(1..=20).collect::<Vec<u32>>()[..]);
        assert_eq!(produced_count, produced.load(Relaxed));

        let lines = sink.drain();
        assert!(lines.iter().any(|l| l == "Producer #1 produced 1 (buffer: 1/2)"
            || l == "Producer #1 produced 1 (buffer: 0/2)"));
        assert!(lines.iter().any(|l| l.starts_with("Consumer #1 consumed 20")));
        assert_eq!(lines.iter().filter(|l| l.contains("stopped after")).count(), 2);
    }

    #[test]
    fn consumer_exits_with_stopped_when_queue_stops() {
        let queue = Arc::new(BoundedQueue::<u8>::new(1).unwrap());
        let sink = ChannelSink::new(16).unwrap();
        let stop = StopFlag::new();
        let tally = Arc::new(AtomicU64::new(0));

        let consumer = {
            let (queue, sink, tally) = (Arc::clone(&queue), sink.clone(), Arc::clone(&tally));
            let me = worker(2, Role::Consumer, &stop);
            thread::spawn(move || consumer_loop(&me, &queue, drop, &sink, &tally))
        };

        thread::sleep(Duration::from_millis(20));
        queue.stop();
        assert_eq!(consumer.join().unwrap(), 0);
        assert_eq!(
            sink.drain(),
            vec![
                "Consumer #2 waiting to take: buffer empty",
                "Consumer #2 stopped after 0 operations"
            ]
        );
    }

    #[test]
    fn readers_and_writer_log_one_line_per_cycle() {
        let gate = Arc::new(ReadWriteGate::new(0u64, Policy::Fair));
        let sink = ChannelSink::new(4096).unwrap();
        let stop = StopFlag::new();
        let reads = Arc::new(AtomicU64::new(0));
        let writes = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for id in 1..=3 {
            let (gate, sink, reads) = (Arc::clone(&gate), sink.clone(), Arc::clone(&reads));
            let me = worker(id, Role::Reader, &stop);
            handles.push(thread::spawn(move || reader_loop(&me, &gate, &sink, &reads)));
        }
        {
            let (gate, sink, writes) = (Arc::clone(&gate), sink.clone(), Arc::clone(&writes));
            let me = worker(1, Role::Writer, &stop);
            handles.push(thread::spawn(move || {
                writer_loop(&me, &gate, |v| v + 1, &sink, &writes)
            }));
        }

        while writes.load(Relaxed) < 10 {
            thread::sleep(Duration::from_millis(1));
        }
        stop.request_stop();
        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let reads = reads.load(Relaxed);
        let writes = writes.load(Relaxed);
        assert_eq!(total, reads + writes);
        assert_eq!(gate.read_value(), writes);

        let lines = sink.drain();
        let admitted = lines.iter().filter(|l| l.contains(" admitted to ")).count() as u64;
        let released = lines.iter().filter(|l| l.ends_with("released read")).count() as u64
            + lines.iter().filter(|l| l.ends_with("and released")).count() as u64;
        assert_eq!(admitted, reads + writes);
        assert_eq!(released, reads + writes);
        assert!(lines.iter().any(|l| l == "Writer #1 wrote 1 and released"));
        replay_holders(&lines);
    }

    /// Replays admitted/released lines and checks that no writer ever appears to hold the
    /// gate alongside anyone else.
    fn replay_holders(lines: &[String]) {
        let mut readers = 0usize;
        let mut writer = false;
        for line in lines {
            if line.contains(" admitted to read ") {
                assert!(!writer, "reader admitted during a write: {line}");
                readers += 1;
            } else if line.ends_with("released read") {
                readers -= 1;
            } else if line.contains(" admitted to write") {
                assert!(!writer && readers == 0, "writer admitted while held: {line}");
                writer = true;
            } else if line.ends_with("and released") {
                writer = false;
            }
        }
        assert_eq!((readers, writer), (0, false));
    }

    #[test]
    fn parked_reader_logs_waiting_admitted_released() {
        let gate = Arc::new(ReadWriteGate::new(0u32, Policy::ReaderPreference));
        let sink = ChannelSink::new(1024).unwrap();
        let stop = StopFlag::new();
        let reads = Arc::new(AtomicU64::new(0));

        gate.begin_write().unwrap();
        gate.write_value(5);
        let reader = {
            let (gate, sink, reads) = (Arc::clone(&gate), sink.clone(), Arc::clone(&reads));
            let me = worker(1, Role::Reader, &stop);
            thread::spawn(move || reader_loop(&me, &gate, &sink, &reads))
        };
        while gate.snapshot().waiting_readers == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        gate.end_write();
        while reads.load(Relaxed) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        stop.request_stop();
        let completed = reader.join().unwrap();

        let lines = sink.drain();
        assert_eq!(
            &lines[..3],
            &[
                "Reader #1 waiting to read",
                "Reader #1 admitted to read 5 after waiting (readers: 1)",
                "Reader #1 released read",
            ]
        );
        assert_eq!(
            lines.last().unwrap(),
            &format!("Reader #1 stopped after {completed} operations")
        );
    }

    #[test]
    fn producer_on_full_buffer_logs_before_parking() {
        let queue = Arc::new(BoundedQueue::new(1).unwrap());
        let sink = ChannelSink::new(1024).unwrap();
        let stop = StopFlag::new();
        let produced = Arc::new(AtomicU64::new(0));
        queue.put(0u32).unwrap();

        let producer = {
            let (queue, sink, produced) =
                (Arc::clone(&queue), sink.clone(), Arc::clone(&produced));
            let me = worker(1, Role::Producer, &stop);
            thread::spawn(move || {
                let mut values = 1..;
                producer_loop(&me, &queue, || values.next().unwrap_or(0), &sink, &produced)
            })
        };

        // the waiting line is written before the producer parks on the full buffer
        while sink.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(produced.load(Relaxed), 0);
        assert_eq!(queue.take().unwrap(), 0);
        while produced.load(Relaxed) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        stop.request_stop();
        queue.stop();
        producer.join().unwrap();

        let lines = sink.drain();
        assert_eq!(
            &lines[..2],
            &[
                "Producer #1 waiting to put 1: buffer full",
                "Producer #1 produced 1 after waiting (buffer: 1/1)",
            ]
        );
        assert!(lines.last().unwrap().starts_with("Producer #1 stopped after"));
    }

    #[test]
    fn writer_exits_when_gate_shuts_down() {
        let gate = Arc::new(ReadWriteGate::new(0u8, Policy::WriterPreference));
        let sink = ChannelSink::new(16).unwrap();
        let stop = StopFlag::new();
        let writes = Arc::new(AtomicU64::new(0));

        // hold a read so the writer parks
        gate.begin_read().unwrap();
        let writer = {
            let (gate, sink, writes) = (Arc::clone(&gate), sink.clone(), Arc::clone(&writes));
            let me = worker(4, Role::Writer, &stop);
            thread::spawn(move || writer_loop(&me, &gate, |v| v + 1, &sink, &writes))
        };
        while gate.snapshot().waiting_writers == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        gate.shutdown();
        assert_eq!(writer.join().unwrap(), 0);
        gate.end_read();
        assert_eq!(
            sink.drain(),
            vec!["Writer #4 waiting to write", "Writer #4 stopped after 0 operations"]
        );
    }
}
