//! Live tracking service.
//!
//! A single worker thread owns the [`Pipeline`]. Transports hand decoded
//! batches to it through a bounded inbox (see [`LiveTracker::sink`]) that
//! discards the oldest batch when full, and report every valid frame through
//! [`LiveTracker::frame_tick`] so an empty field is not mistaken for a dead
//! link. The worker applies batches, runs the expiry sweep and the data-loss
//! watchdog on every idle tick, and publishes a [`LiveView`] snapshot readers
//! can clone at any time.

use crate::{
    error::TrackerError,
    pipeline::Pipeline,
    smoothing::{SmoothedMotion, SmoothingConfig},
    track::{RecentTrack, Track},
    types::{Observation, Slot, Stamp, TrackId},
    watchdog::{LinkWatchdog, DATA_TIMEOUT},
};
use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use sensor_models::SensorMount;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct LiveConfig {
    /// Silence that triggers the data-loss watchdog
    pub data_timeout: Duration,
    /// Idle interval between sweeps when no batch arrives
    pub tick: Duration,
    /// Sensor placement used for world coordinates in the view
    pub mount: SensorMount,
    /// Batches waiting for the worker before the oldest is discarded
    pub queue_depth: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            data_timeout: DATA_TIMEOUT,
            tick: Duration::from_millis(100),
            mount: SensorMount::default(),
            queue_depth: 64,
        }
    }
}

/// Display state of one live track.
#[derive(Clone, Debug)]
pub struct TrackView {
    pub id: TrackId,
    pub slot: Slot,
    pub first_seen: DateTime<Local>,
    /// Latest raw position and kinematics (sensor frame)
    pub x_mm: f64,
    pub y_mm: f64,
    pub speed_mm_s: f64,
    pub accel_mm_s2: f64,
    /// Rolling average over the smoothing window (sensor frame)
    pub smoothed: SmoothedMotion,
    /// Smoothed position in world coordinates
    pub world_mm: (f64, f64),
}

impl TrackView {
    fn from_track(track: &Track, mount: &SensorMount) -> Option<Self> {
        let last = track.last?;
        let smoothed = track.smoothed()?;
        Some(Self {
            id: track.id,
            slot: track.slot,
            first_seen: track.first_seen,
            x_mm: last.x_mm,
            y_mm: last.y_mm,
            speed_mm_s: last.speed_mm_s,
            accel_mm_s2: last.accel_mm_s2,
            world_mm: mount.local_to_world(smoothed.x_mm, smoothed.y_mm),
            smoothed,
        })
    }
}

/// Snapshot published after every batch and tick.
#[derive(Clone, Debug, Default)]
pub struct LiveView {
    pub tracks: Vec<TrackView>,
    /// Expired tracks, most recent first
    pub recent: Vec<RecentTrack>,
    /// Fastest speed of the latest batch (mm/s)
    pub fastest_mm_s: f64,
    /// True while the feed has been silent for longer than the data timeout
    pub data_lost: bool,
    /// Outages declared since start
    pub data_losses: u64,
    /// Batches applied since start
    pub batches: u64,
    /// Batches discarded because the inbox was full
    pub dropped: u64,
}

enum Control {
    Smoothing(SmoothingConfig),
    Shutdown,
}

/// Bounded batch queue into the worker. A full queue discards its oldest
/// batch; a closed one rejects everything.
#[derive(Clone)]
struct Inbox {
    tx: Sender<(Vec<Observation>, Stamp)>,
    rx: Receiver<(Vec<Observation>, Stamp)>,
    open: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl Inbox {
    fn new(depth: usize) -> Self {
        let (tx, rx) = bounded(depth.max(1));
        Self {
            tx,
            rx,
            open: Arc::new(AtomicBool::new(true)),
            dropped: Arc::default(),
        }
    }

    /// Returns `false` once the worker has stopped.
    fn push(&self, batch: Vec<Observation>, at: Stamp) -> bool {
        if !self.open.load(Ordering::Acquire) {
            return false;
        }
        let mut item = (batch, at);
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    item = back;
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

/// Handle to the live tracking worker. Dropping it shuts the worker down,
/// which expires every live track.
pub struct LiveTracker {
    control: Sender<Control>,
    inbox: Inbox,
    pulse: Arc<Mutex<Option<Instant>>>,
    view: Arc<RwLock<LiveView>>,
    worker: Option<JoinHandle<()>>,
}

impl LiveTracker {
    pub fn spawn(pipeline: Pipeline, config: LiveConfig) -> Result<Self, TrackerError> {
        let (control, control_rx) = unbounded();
        let inbox = Inbox::new(config.queue_depth);
        let pulse = Arc::new(Mutex::new(None));
        let view = Arc::new(RwLock::new(LiveView::default()));
        let worker = {
            let worker = Worker::new(
                pipeline,
                config,
                inbox.clone(),
                Arc::clone(&pulse),
                Arc::clone(&view),
            );
            thread::Builder::new()
                .name("live-tracker".into())
                .spawn(move || worker.run(control_rx))
                .map_err(TrackerError::Spawn)?
        };
        Ok(Self {
            control,
            inbox,
            pulse,
            view,
            worker: Some(worker),
        })
    }

    /// Hand a batch to the worker, stamped with the current time.
    pub fn submit(&self, batch: Vec<Observation>) -> Result<(), TrackerError> {
        if self.inbox.push(batch, Stamp::now()) {
            Ok(())
        } else {
            Err(TrackerError::WorkerGone)
        }
    }

    /// Batch callback for a transport. Batches arriving after the worker has
    /// stopped are discarded.
    pub fn sink(&self) -> impl Fn(Vec<Observation>) + Send + Sync + 'static {
        let inbox = self.inbox.clone();
        move |batch| {
            if !inbox.push(batch, Stamp::now()) {
                debug!("live tracker stopped, batch discarded");
            }
        }
    }

    /// Frame callback for a transport: call it for every valid frame, empty
    /// or not. Only frame arrivals keep the data-loss watchdog quiet.
    pub fn frame_tick(&self) -> impl Fn(Instant) + Send + Sync + 'static {
        let pulse = Arc::clone(&self.pulse);
        move |at| {
            let mut last = pulse.lock();
            if *last < Some(at) {
                *last = Some(at);
            }
        }
    }

    pub fn set_smoothing(&self, smoothing: SmoothingConfig) -> Result<(), TrackerError> {
        self.control
            .send(Control::Smoothing(smoothing))
            .map_err(|_| TrackerError::WorkerGone)
    }

    /// Clone of the latest published snapshot.
    pub fn view(&self) -> LiveView {
        self.view.read().clone()
    }

    /// Batches waiting for the worker.
    pub fn backlog(&self) -> usize {
        self.inbox.rx.len()
    }

    /// Batches discarded so far because the inbox was full.
    pub fn dropped(&self) -> u64 {
        self.inbox.dropped.load(Ordering::Relaxed)
    }

    /// Stop the worker, expiring every live track, and wait for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.inbox.close();
        let _ = self.control.send(Control::Shutdown);
        if worker.join().is_err() {
            warn!("live tracker worker panicked");
        }
    }
}

impl Drop for LiveTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    pipeline: Pipeline,
    config: LiveConfig,
    watchdog: LinkWatchdog,
    inbox: Inbox,
    pulse: Arc<Mutex<Option<Instant>>>,
    last_pulse: Option<Instant>,
    view: Arc<RwLock<LiveView>>,
    fastest_mm_s: f64,
    batches: u64,
    data_losses: u64,
}

impl Worker {
    fn new(
        pipeline: Pipeline,
        config: LiveConfig,
        inbox: Inbox,
        pulse: Arc<Mutex<Option<Instant>>>,
        view: Arc<RwLock<LiveView>>,
    ) -> Self {
        Self {
            pipeline,
            watchdog: LinkWatchdog::new(config.data_timeout, Instant::now()),
            config,
            inbox,
            pulse,
            last_pulse: None,
            view,
            fastest_mm_s: 0.0,
            batches: 0,
            data_losses: 0,
        }
    }

    fn run(mut self, control: Receiver<Control>) {
        info!(queue_depth = self.config.queue_depth, "live tracker started");
        let batches = self.inbox.rx.clone();
        let tick = self.config.tick;
        loop {
            let running = select! {
                recv(control) -> msg => match msg {
                    Ok(Control::Smoothing(smoothing)) => {
                        self.pipeline.set_smoothing(smoothing);
                        self.maintain(Instant::now());
                        true
                    }
                    Ok(Control::Shutdown) | Err(_) => false,
                },
                recv(batches) -> msg => match msg {
                    Ok((batch, at)) => {
                        self.apply(&batch, at);
                        true
                    }
                    Err(_) => false,
                },
                default(tick) => {
                    self.maintain(Instant::now());
                    true
                }
            };
            if !running {
                break;
            }
            self.publish();
        }
        self.inbox.close();
        let expired = self.pipeline.expire_all();
        self.publish();
        info!(
            expired = expired.len(),
            dropped = self.inbox.dropped.load(Ordering::Relaxed),
            "live tracker stopped"
        );
    }

    fn apply(&mut self, batch: &[Observation], at: Stamp) {
        if self.watchdog.feed(at.mono) {
            info!("data feed recovered");
        }
        let out = self.pipeline.process_batch(batch, at);
        self.fastest_mm_s = out.fastest_mm_s;
        self.batches += 1;
    }

    /// Idle-time housekeeping: frame pulse, expiry sweep and data-loss
    /// watchdog.
    fn maintain(&mut self, now: Instant) {
        let pulse = *self.pulse.lock();
        if let Some(at) = pulse.filter(|at| self.last_pulse < Some(*at)) {
            self.last_pulse = Some(at);
            if self.watchdog.feed(at) {
                info!("data feed recovered");
            }
        }
        self.pipeline.sweep(now);
        if self.watchdog.poll(now) {
            let expired = self.pipeline.expire_all();
            self.fastest_mm_s = 0.0;
            self.data_losses += 1;
            warn!(
                silence_ms = self.watchdog.silence(now).as_millis() as u64,
                expired = expired.len(),
                "data feed lost"
            );
        }
    }

    fn publish(&self) {
        let mount = &self.config.mount;
        let snapshot = LiveView {
            tracks: self
                .pipeline
                .tracks()
                .iter()
                .filter_map(|t| TrackView::from_track(t, mount))
                .collect(),
            recent: self.pipeline.recent().iter().cloned().collect(),
            fastest_mm_s: self.fastest_mm_s,
            data_lost: self.watchdog.is_lost(),
            data_losses: self.data_losses,
            batches: self.batches,
            dropped: self.inbox.dropped.load(Ordering::Relaxed),
        };
        *self.view.write() = snapshot;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
