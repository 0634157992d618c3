//! Plumbing shared by every transport: the batch callback, the stop flag,
//! bounded joins, the drop-oldest queue and link counters.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use sensor_models::Observation;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Callback receiving one non-empty batch per decoded frame.
pub type BatchSink = Box<dyn FnMut(Vec<Observation>) + Send>;

/// Callback receiving the arrival time of every valid frame, empty or not.
pub type FrameTick = Box<dyn FnMut(Instant) + Send>;

/// How long `stop()` waits for each worker thread.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("cannot open serial port {port}: {source}")]
    SerialOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("cannot spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Where a running link reports: batches with targets, and optionally a
/// tick for every valid frame so consumers can tell an empty field from a
/// silent link.
pub struct LinkSink {
    batches: BatchSink,
    frames: Option<FrameTick>,
}

impl LinkSink {
    pub fn new(batches: impl FnMut(Vec<Observation>) + Send + 'static) -> Self {
        Self {
            batches: Box::new(batches),
            frames: None,
        }
    }

    pub fn with_frame_tick(mut self, tick: impl FnMut(Instant) + Send + 'static) -> Self {
        self.frames = Some(Box::new(tick));
        self
    }
}

/// A source of observation batches.
///
/// `start` is a no-op while already running. `stop` is idempotent, a no-op
/// before `start`, and guarantees the sink is not invoked after it returns.
pub trait Transport {
    fn start(&mut self, sink: LinkSink) -> Result<(), LinkError>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
    fn stats(&self) -> LinkStats;
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Snapshot of a link's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Batches handed to the sink
    pub delivered: u64,
    /// Batches discarded because the queue was full
    pub dropped: u64,
    /// Payloads or frames that failed to decode
    pub malformed: u64,
    /// Arrival of the latest valid frame
    pub last_frame: Option<Instant>,
}

#[derive(Debug, Default)]
pub(crate) struct LinkCounters {
    delivered: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
    last_frame: Mutex<Option<Instant>>,
}

impl LinkCounters {
    pub(crate) fn frame_received(&self) {
        *self.last_frame.lock() = Some(Instant::now());
    }

    pub(crate) fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LinkStats {
        LinkStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            last_frame: *self.last_frame.lock(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// The link callbacks behind a lock. Closing it waits for an in-flight
/// call, after which nothing is delivered.
#[derive(Clone)]
pub(crate) struct SharedSink(Arc<Mutex<Option<LinkSink>>>);

impl SharedSink {
    pub(crate) fn new(sink: LinkSink) -> Self {
        Self(Arc::new(Mutex::new(Some(sink))))
    }

    /// Returns `false` once the sink is closed. Empty batches are skipped.
    pub(crate) fn deliver(&self, batch: Vec<Observation>) -> bool {
        let mut guard = self.0.lock();
        match guard.as_mut() {
            Some(sink) => {
                if !batch.is_empty() {
                    (sink.batches)(batch);
                }
                true
            }
            None => false,
        }
    }

    /// Report a valid frame received at `at`. Returns `false` once closed.
    pub(crate) fn frame(&self, at: Instant) -> bool {
        let mut guard = self.0.lock();
        match guard.as_mut() {
            Some(sink) => {
                if let Some(tick) = sink.frames.as_mut() {
                    tick(at);
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn close(&self) {
        self.0.lock().take();
    }
}

// ---------------------------------------------------------------------------
// Drop-oldest queue
// ---------------------------------------------------------------------------

/// Bounded queue that makes room for new batches by discarding the oldest.
#[derive(Clone)]
pub(crate) struct BatchQueue {
    tx: Sender<Vec<Observation>>,
    rx: Receiver<Vec<Observation>>,
}

impl BatchQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Enqueue a batch, returning how many older batches were discarded.
    pub(crate) fn push(&self, mut batch: Vec<Observation>) -> u64 {
        let mut dropped = 0;
        loop {
            match self.tx.try_send(batch) {
                Ok(()) => return dropped,
                Err(TrySendError::Full(back)) => {
                    batch = back;
                    if self.rx.try_recv().is_ok() {
                        dropped += 1;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return dropped,
            }
        }
    }

    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<Vec<Observation>> {
        match self.rx.recv_timeout(timeout) {
            Ok(batch) => Some(batch),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}

// ---------------------------------------------------------------------------
// Worker threads
// ---------------------------------------------------------------------------

/// Threads of a running link plus the state needed to stop them.
pub(crate) struct LinkThreads {
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) sink: SharedSink,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl LinkThreads {
    pub(crate) fn new(sink: LinkSink) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            sink: SharedSink::new(sink),
            handles: Vec::new(),
        }
    }

    pub(crate) fn spawn<F>(&mut self, name: &str, f: F) -> Result<(), LinkError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(f)
            .map_err(|source| LinkError::Spawn {
                name: name.to_owned(),
                source,
            })?;
        self.handles.push((name.to_owned(), handle));
        Ok(())
    }

    /// Signal, close the sink, then join each thread for at most `timeout`.
    /// A thread still blocked past the deadline is detached; it can no longer
    /// reach the sink.
    pub(crate) fn shutdown(self, timeout: Duration) {
        self.running.store(false, Ordering::SeqCst);
        self.sink.close();
        let deadline = Instant::now() + timeout;
        for (name, handle) in self.handles {
            join_bounded(&name, handle, deadline);
        }
    }
}

fn join_bounded(name: &str, handle: JoinHandle<()>, deadline: Instant) {
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if !handle.is_finished() {
        warn!(thread = name, "worker did not stop in time, detaching");
        return;
    }
    if handle.join().is_err() {
        warn!(thread = name, "worker panicked");
    } else {
        debug!(thread = name, "worker joined");
    }
}
