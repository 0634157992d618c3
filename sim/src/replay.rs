//! Replay engine: paced playback of a recorded track history.
//!
//! A [`Recording`] is the immutable row sequence of one history file. The
//! [`ReplayPlayer`] exposes one row at a time as "latest", advancing on a
//! dedicated pacing thread that waits `max(t[i+1] - t[i], 0) / speed` between
//! rows. Seeks jump immediately; pause freezes the cursor; at the end the
//! last row stays latest.
//!
//! Positions are in sensor-local millimetres, the same frame the live engine
//! records; [`Recording::world_positions`] applies the same [`SensorMount`]
//! transform as the live view.

use parking_lot::{Condvar, Mutex};
use sensor_models::SensorMount;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracker_core::history::{load_track_history, HistoryError, RecordedSample};

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 20.0;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("failed to spawn replay thread: {0}")]
    Spawn(#[source] io::Error),
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// A loaded history file.
#[derive(Clone, Debug)]
pub struct Recording {
    pub path: PathBuf,
    pub samples: Vec<RecordedSample>,
}

impl Recording {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        let samples = load_track_history(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Seconds from the first to the last row.
    pub fn duration(&self) -> f64 {
        self.samples.last().map_or(0.0, |s| s.t_rel)
    }

    /// Every row mapped into world coordinates for `mount`.
    pub fn world_positions(&self, mount: &SensorMount) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .map(|s| mount.local_to_world(s.x_mm, s.y_mm))
            .collect()
    }
}

/// Wait before advancing from row `i` to row `i + 1`. `None` at the last row.
pub fn step_delay(rows: &[RecordedSample], i: usize, speed: f64) -> Option<Duration> {
    let (a, b) = (rows.get(i)?, rows.get(i + 1)?);
    let secs = (b.t_rel - a.t_rel).max(0.0) / clamp_speed(speed);
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

/// The full pacing schedule for `rows` at `speed`.
pub fn pacing_delays(rows: &[RecordedSample], speed: f64) -> Vec<Duration> {
    (0..rows.len().saturating_sub(1))
        .filter_map(|i| step_delay(rows, i, speed))
        .collect()
}

/// Row index for a seek to `fraction` of the recording.
pub fn seek_index(len: usize, fraction: f64) -> usize {
    if len == 0 {
        return 0;
    }
    let f = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
    (f * (len - 1) as f64).round() as usize
}

fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// Playback speed multiplier
    pub speed: f64,
    /// Load recordings paused at the first row
    pub start_paused: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            start_paused: false,
        }
    }
}

struct Cursor {
    path: Option<PathBuf>,
    rows: Arc<Vec<RecordedSample>>,
    index: usize,
    latest: Option<usize>,
    paused: bool,
    speed: f64,
    finished: bool,
    stopped: bool,
    /// Bumped on every jump so an in-flight wait is abandoned
    generation: u64,
}

struct Shared {
    state: Mutex<Cursor>,
    wake: Condvar,
}

/// Paced playback of one recording at a time.
pub struct ReplayPlayer {
    config: ReplayConfig,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl ReplayPlayer {
    /// Start the pacing thread with nothing loaded.
    pub fn spawn(config: ReplayConfig) -> Result<Self, ReplayError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(Cursor {
                path: None,
                rows: Arc::new(Vec::new()),
                index: 0,
                latest: None,
                paused: config.start_paused,
                speed: clamp_speed(config.speed),
                finished: false,
                stopped: false,
                generation: 0,
            }),
            wake: Condvar::new(),
        });
        let pacer = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("replay-pacer".into())
            .spawn(move || pace(&pacer))
            .map_err(ReplayError::Spawn)?;
        Ok(Self {
            config,
            shared,
            thread: Some(thread),
        })
    }

    /// Start playing `recording` from its first row.
    pub fn start(recording: Recording, config: ReplayConfig) -> Result<Self, ReplayError> {
        let player = Self::spawn(config)?;
        player.play(recording);
        Ok(player)
    }

    /// Load a history file and play it. On error the current recording and
    /// cursor are left exactly as they were.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<usize, ReplayError> {
        let recording = Recording::load(path)?;
        let rows = recording.len();
        self.play(recording);
        Ok(rows)
    }

    /// Replace the current recording with `recording`, cursor at row 0.
    pub fn play(&self, recording: Recording) {
        info!(path = %recording.path.display(), rows = recording.len(), "replay loaded");
        let mut st = self.shared.state.lock();
        st.path = Some(recording.path);
        st.rows = Arc::new(recording.samples);
        st.paused = self.config.start_paused;
        jump(&mut st, 0);
        drop(st);
        self.shared.wake.notify_all();
    }

    /// Jump to `fraction` (clamped to `[0, 1]`) of the recording. The target
    /// row becomes latest immediately, paused or not.
    pub fn seek(&self, fraction: f64) {
        let mut st = self.shared.state.lock();
        if st.rows.is_empty() {
            return;
        }
        let index = seek_index(st.rows.len(), fraction);
        debug!(fraction, index, "replay seek");
        jump(&mut st, index);
        drop(st);
        self.shared.wake.notify_all();
    }

    pub fn pause(&self) {
        let mut st = self.shared.state.lock();
        if !st.paused {
            st.paused = true;
            st.generation += 1;
        }
        drop(st);
        self.shared.wake.notify_all();
    }

    pub fn resume(&self) {
        self.shared.state.lock().paused = false;
        self.shared.wake.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// Set the speed multiplier, clamped to `MIN_SPEED..=MAX_SPEED`. The
    /// pending wait restarts at the new pace.
    pub fn set_speed(&self, speed: f64) {
        let mut st = self.shared.state.lock();
        st.speed = clamp_speed(speed);
        st.generation += 1;
        drop(st);
        self.shared.wake.notify_all();
    }

    pub fn speed(&self) -> f64 {
        self.shared.state.lock().speed
    }

    /// Back to the first row, paused.
    pub fn restart(&self) {
        let mut st = self.shared.state.lock();
        st.paused = true;
        if !st.rows.is_empty() {
            jump(&mut st, 0);
        }
        drop(st);
        self.shared.wake.notify_all();
    }

    /// The row currently exposed, if any.
    pub fn latest(&self) -> Option<RecordedSample> {
        let st = self.shared.state.lock();
        st.latest.and_then(|i| st.rows.get(i).cloned())
    }

    pub fn cursor(&self) -> Option<usize> {
        self.shared.state.lock().latest
    }

    /// Seconds since the start of the recording at the latest row.
    pub fn current_t(&self) -> f64 {
        self.latest().map_or(0.0, |s| s.t_rel)
    }

    /// Cursor position as a fraction of the recording, `0.0` when empty.
    pub fn position_fraction(&self) -> f64 {
        let st = self.shared.state.lock();
        match (st.latest, st.rows.len()) {
            (Some(i), n) if n > 1 => i as f64 / (n - 1) as f64,
            (Some(_), _) => 1.0,
            (None, _) => 0.0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.shared.state.lock().finished
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.shared.state.lock().path.clone()
    }

    /// Stop the pacing thread and wait for it.
    pub fn stop(&mut self) {
        self.shared.state.lock().stopped = true;
        self.shared.wake.notify_all();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("replay pacing thread panicked");
            }
        }
    }
}

impl Drop for ReplayPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn jump(st: &mut Cursor, index: usize) {
    st.index = index;
    st.latest = Some(index);
    st.finished = false;
    st.generation += 1;
}

/// Pacing loop. Holds the lock except while waiting.
fn pace(shared: &Shared) {
    let mut st = shared.state.lock();
    loop {
        if st.stopped {
            break;
        }
        if st.paused || st.finished || st.rows.is_empty() {
            shared.wake.wait(&mut st);
            continue;
        }

        let i = st.index;
        st.latest = Some(i);
        let Some(delay) = step_delay(&st.rows, i, st.speed) else {
            st.finished = true;
            debug!(rows = st.rows.len(), "replay finished");
            continue;
        };

        let generation = st.generation;
        match Instant::now().checked_add(delay) {
            Some(deadline) => {
                while !interrupted(&st, generation) {
                    if shared.wake.wait_until(&mut st, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while !interrupted(&st, generation) {
                    shared.wake.wait(&mut st);
                }
            }
        }
        if interrupted(&st, generation) {
            continue;
        }
        st.index = i + 1;
    }
    debug!("replay pacing thread exiting");
}

fn interrupted(st: &Cursor, generation: u64) -> bool {
    st.stopped || st.paused || st.generation != generation
}
