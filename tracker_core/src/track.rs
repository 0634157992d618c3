//! Track: identity, last kinematic sample, owned history log and display
//! smoothing window.

use crate::{
    history::{HistoryRow, TrackLog},
    smoothing::{SmoothedMotion, SmoothingWindow},
    types::{Observation, Sample, Slot, Stamp, TrackId},
};
use chrono::{DateTime, Local};
use nalgebra::Vector2;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::error;

/// Silence after which a track is expired.
pub const END_TIMEOUT: Duration = Duration::from_secs(3);

/// Lower bound on the time step used for kinematics.
pub const MIN_DT: Duration = Duration::from_millis(1);

/// A live track bound to one sensor slot.
#[derive(Debug)]
pub struct Track {
    /// Durable identifier
    pub id: TrackId,
    /// Slot currently feeding this track
    pub slot: Slot,
    /// Wall time of birth
    pub first_seen: DateTime<Local>,
    /// Wall time of the latest observation
    pub last_seen: DateTime<Local>,
    /// Monotonic time of the latest observation
    pub last_updated: Instant,
    /// Kinematics after the latest observation (`None` before the first)
    pub last: Option<Sample>,
    /// Observations absorbed so far
    pub total_hits: u32,
    log: Option<TrackLog>,
    smoothing: SmoothingWindow,
}

impl Track {
    /// Create a track born at `born`. `log` is `None` when the history file
    /// could not be created; the track is still followed in memory.
    pub fn new(
        id: TrackId,
        slot: Slot,
        born: Stamp,
        log: Option<TrackLog>,
        window_len: usize,
    ) -> Self {
        Self {
            id,
            slot,
            first_seen: born.wall,
            last_seen: born.wall,
            last_updated: born.mono,
            last: None,
            total_hits: 0,
            log,
            smoothing: SmoothingWindow::new(window_len),
        }
    }

    /// Absorb one observation: derive speed and acceleration, persist a row
    /// and feed the smoothing window.
    pub fn observe(&mut self, obs: &Observation, at: Stamp) -> Sample {
        let p = obs.position();
        let (speed, accel) = match self.last {
            None => (0.0, 0.0),
            Some(prev) => {
                let dt = at
                    .mono
                    .saturating_duration_since(self.last_updated)
                    .max(MIN_DT)
                    .as_secs_f64();
                let speed = (p - Vector2::new(prev.x_mm, prev.y_mm)).norm() / dt;
                (speed, (speed - prev.speed_mm_s) / dt)
            }
        };

        let sample = Sample {
            x_mm: p.x,
            y_mm: p.y,
            speed_mm_s: speed,
            accel_mm_s2: accel,
            at: at.mono,
        };
        self.last = Some(sample);
        self.last_updated = at.mono;
        self.last_seen = at.wall;
        self.total_hits += 1;
        self.smoothing.push(p.x, p.y, speed);
        self.write_row(obs, &sample, at.wall);
        sample
    }

    fn write_row(&mut self, obs: &Observation, sample: &Sample, wall: DateTime<Local>) {
        let Some(log) = self.log.as_mut() else {
            return;
        };
        let row = HistoryRow {
            timestamp: wall,
            x_mm: obs.x_mm,
            y_mm: obs.y_mm,
            range_mm: obs.range_mm(),
            speed_mm_s: sample.speed_mm_s,
            accel_mm_s2: sample.accel_mm_s2,
            raw_hex: obs.raw_hex(),
        };
        if let Err(e) = log.append(&row) {
            error!(track = %self.id, error = %e, "history write failed, log disabled");
            self.log = None;
        }
    }

    /// True when the track has been silent for longer than `timeout`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_updated) > timeout
    }

    pub fn smoothed(&self) -> Option<SmoothedMotion> {
        self.smoothing.average()
    }

    pub fn set_window_len(&mut self, len: usize) {
        self.smoothing.resize(len);
    }

    pub fn history_path(&self) -> Option<PathBuf> {
        self.log.as_ref().map(|l| l.path().to_path_buf())
    }

    /// Close the history file and reduce the track to its summary.
    pub fn close(mut self) -> RecentTrack {
        let history_file = self.log.take().and_then(|log| match log.close() {
            Ok(path) => Some(path),
            Err(e) => {
                error!(track = %self.id, error = %e, "closing history failed");
                None
            }
        });
        RecentTrack {
            id: self.id,
            slot: self.slot,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            total_hits: self.total_hits,
            last: self.last,
            history_file,
        }
    }
}

/// Summary of an expired track, kept in the recent list.
#[derive(Clone, Debug)]
pub struct RecentTrack {
    pub id: TrackId,
    pub slot: Slot,
    pub first_seen: DateTime<Local>,
    pub last_seen: DateTime<Local>,
    pub total_hits: u32,
    pub last: Option<Sample>,
    pub history_file: Option<PathBuf>,
}

impl RecentTrack {
    /// Whole seconds between first and last observation.
    pub fn duration_secs(&self) -> i64 {
        (self.last_seen - self.first_seen).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(x: i32, y: i32) -> Observation {
        Observation::new(1, x, y)
    }

    #[test]
    fn first_sample_has_zero_kinematics() {
        let t0 = Stamp::now();
        let mut track = Track::new(TrackId(1), Slot(1), t0, None, 3);
        let s = track.observe(&obs(500, 900), t0);
        assert_eq!((s.speed_mm_s, s.accel_mm_s2), (0.0, 0.0));
        assert_eq!(track.total_hits, 1);
    }

    #[test]
    fn speed_and_accel_from_displacement() {
        let t0 = Stamp::now();
        let mut track = Track::new(TrackId(1), Slot(1), t0, None, 3);
        track.observe(&obs(0, 0), t0);

        let t1 = t0.after(Duration::from_millis(100));
        let s1 = track.observe(&obs(100, 0), t1);
        assert!((s1.speed_mm_s - 1000.0).abs() < 1e-6);
        assert!((s1.accel_mm_s2 - 10_000.0).abs() < 1e-3);

        let t2 = t1.after(Duration::from_millis(100));
        let s2 = track.observe(&obs(200, 0), t2);
        assert!((s2.speed_mm_s - 1000.0).abs() < 1e-6);
        assert!(s2.accel_mm_s2.abs() < 1e-3);
    }

    #[test]
    fn zero_interval_is_clamped_to_one_millisecond() {
        let t0 = Stamp::now();
        let mut track = Track::new(TrackId(1), Slot(1), t0, None, 3);
        track.observe(&obs(0, 0), t0);
        let s = track.observe(&obs(3, 4), t0);
        assert!((s.speed_mm_s - 5000.0).abs() < 1e-6);
        assert!(s.speed_mm_s.is_finite() && s.accel_mm_s2.is_finite());
    }

    #[test]
    fn staleness_uses_strict_timeout() {
        let t0 = Stamp::now();
        let mut track = Track::new(TrackId(1), Slot(2), t0, None, 3);
        track.observe(&obs(0, 0), t0);
        assert!(!track.is_stale(t0.mono + END_TIMEOUT, END_TIMEOUT));
        assert!(track.is_stale(
            t0.mono + END_TIMEOUT + Duration::from_millis(1),
            END_TIMEOUT
        ));
    }

    #[test]
    fn close_keeps_summary() {
        let t0 = Stamp::now();
        let mut track = Track::new(TrackId(7), Slot(3), t0, None, 3);
        track.observe(&obs(10, 10), t0);
        track.observe(&obs(20, 10), t0.after(Duration::from_secs(2)));
        let summary = track.close();
        assert_eq!(summary.id, TrackId(7));
        assert_eq!(summary.total_hits, 2);
        assert_eq!(summary.duration_secs(), 2);
        assert!(summary.history_file.is_none());
    }
}
