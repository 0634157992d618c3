//! Pipeline orchestrator: the track lifecycle for one observation batch.
//!
//! # Processing steps per batch
//! 1. Expiry sweep: tracks silent for longer than `end_timeout` are closed,
//!    their index rows finalized and their summaries archived
//! 2. Resolve each observation's slot to its live track, birthing a track
//!    (new serial, history file, provisional index row) for unmapped slots
//! 3. Update kinematics and append one history row per observation
//! 4. Report the fastest speed seen in the batch
//!
//! The sweep runs before the observations are applied, so an observation
//! arriving after a gap longer than `end_timeout` always starts a new track.

use crate::{
    error::TrackerError,
    history::{HistoryStore, IndexRecord},
    smoothing::SmoothingConfig,
    track::{RecentTrack, Track},
    track_manager::{TrackManager, TrackManagerConfig},
    types::{Observation, Sample, Slot, Stamp, TrackId},
};
use chrono::Local;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for the tracking pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Directory holding the day index and per-track files
    pub log_dir: PathBuf,
    /// Track management config
    pub track_manager_config: TrackManagerConfig,
    /// Display smoothing applied to every track
    pub smoothing: SmoothingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("log"),
            track_manager_config: TrackManagerConfig::default(),
            smoothing: SmoothingConfig::default(),
        }
    }
}

/// Outputs of one pipeline step.
#[derive(Clone, Debug, Default)]
pub struct BatchOutcome {
    /// Highest speed computed in this batch (mm/s), 0 for an empty batch
    pub fastest_mm_s: f64,
    /// Kinematics per observation, in batch order
    pub samples: Vec<(TrackId, Sample)>,
    /// Tracks born this step
    pub births: Vec<TrackId>,
    /// Tracks expired this step
    pub expired: Vec<TrackId>,
    /// Wall-clock time of processing
    pub total_time_us: u64,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The track lifecycle engine. Owns every live track and its history file.
pub struct Pipeline {
    pub config: PipelineConfig,
    tracks: Vec<Track>,
    pub track_manager: TrackManager,
    store: Option<HistoryStore>,
}

impl Pipeline {
    /// Open today's history store under `config.log_dir` and recover the
    /// serial counter from its index.
    pub fn new(config: PipelineConfig) -> Result<Self, TrackerError> {
        let store = HistoryStore::open(&config.log_dir, Local::now().date_naive())?;
        Ok(Self::with_store(config, Some(store)))
    }

    /// Pipeline over an already opened store, or purely in memory when
    /// `store` is `None`.
    pub fn with_store(config: PipelineConfig, store: Option<HistoryStore>) -> Self {
        let max_serial = store.as_ref().map_or(0, HistoryStore::max_serial);
        let track_manager = TrackManager::new(config.track_manager_config.clone(), max_serial);
        info!(
            next = %track_manager.peek_next_id(),
            persistent = store.is_some(),
            "track pipeline ready"
        );
        Self {
            config,
            tracks: Vec::new(),
            track_manager,
            store,
        }
    }

    /// Process a batch of observations taken at `at`.
    pub fn process_batch(&mut self, batch: &[Observation], at: Stamp) -> BatchOutcome {
        let start = Instant::now();
        let mut out = BatchOutcome {
            expired: self.sweep(at.mono),
            ..Default::default()
        };

        for obs in batch {
            let idx = match self.live_index(obs.slot) {
                Some(idx) => idx,
                None => {
                    let idx = self.birth(obs.slot, at);
                    out.births.push(self.tracks[idx].id);
                    idx
                }
            };
            let track = &mut self.tracks[idx];
            let sample = track.observe(obs, at);
            out.fastest_mm_s = out.fastest_mm_s.max(sample.speed_mm_s);
            out.samples.push((track.id, sample));
        }

        out.total_time_us = start.elapsed().as_micros() as u64;
        out
    }

    /// Expire every track silent for longer than the configured timeout.
    pub fn sweep(&mut self, now: Instant) -> Vec<TrackId> {
        let expired = self.track_manager.take_expired(&mut self.tracks, now);
        expired.into_iter().map(|t| self.expire(t)).collect()
    }

    /// Expire every live track regardless of age (data loss, shutdown).
    pub fn expire_all(&mut self) -> Vec<TrackId> {
        std::mem::take(&mut self.tracks)
            .into_iter()
            .map(|t| self.expire(t))
            .collect()
    }

    /// Change the smoothing window of every live and future track.
    pub fn set_smoothing(&mut self, smoothing: SmoothingConfig) {
        self.config.smoothing = smoothing;
        let len = smoothing.window_len();
        for track in &mut self.tracks {
            track.set_window_len(len);
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_for_slot(&self, slot: Slot) -> Option<&Track> {
        self.live_index(slot).map(|i| &self.tracks[i])
    }

    /// Expired tracks, most recent first.
    pub fn recent(&self) -> &VecDeque<RecentTrack> {
        self.track_manager.recent()
    }

    pub fn store(&self) -> Option<&HistoryStore> {
        self.store.as_ref()
    }

    fn live_index(&self, slot: Slot) -> Option<usize> {
        let id = self.track_manager.resolve(slot)?;
        self.tracks.iter().position(|t| t.id == id)
    }

    fn birth(&mut self, slot: Slot, at: Stamp) -> usize {
        let id = self.track_manager.next_track_id();
        let log = self.store.as_ref().and_then(|store| {
            let log = store
                .create_track_log(id, at.wall)
                .map_err(|e| error!(track = %id, error = %e, "cannot create history file"))
                .ok()?;
            let record = IndexRecord::provisional(id, at.wall, log.file_name());
            if let Err(e) = store.append_index(&record) {
                error!(track = %id, error = %e, "cannot append index row");
            }
            Some(log)
        });

        info!(track = %id, %slot, "track started");
        self.track_manager.assign(slot, id);
        self.tracks.push(Track::new(
            id,
            slot,
            at,
            log,
            self.config.smoothing.window_len(),
        ));
        self.tracks.len() - 1
    }

    fn expire(&mut self, track: Track) -> TrackId {
        let summary = track.close();
        if let Some(store) = &self.store {
            match store.finalize_index(summary.id, summary.first_seen, summary.last_seen) {
                Ok(true) => {}
                Ok(false) => debug!(track = %summary.id, "no index row to finalize"),
                Err(e) => error!(track = %summary.id, error = %e, "index finalize failed"),
            }
        }
        info!(
            track = %summary.id,
            hits = summary.total_hits,
            duration_s = summary.duration_secs(),
            "track ended"
        );
        let id = summary.id;
        self.track_manager.archive(summary);
        id
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.tracks.is_empty() {
            self.expire_all();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use std::time::Duration;

    fn in_memory() -> Pipeline {
        Pipeline::with_store(PipelineConfig::default(), None)
    }

    fn on_disk(dir: &std::path::Path) -> Pipeline {
        let store = HistoryStore::open(dir, Local::now().date_naive()).unwrap();
        Pipeline::with_store(
            PipelineConfig {
                log_dir: dir.to_path_buf(),
                ..Default::default()
            },
            Some(store),
        )
    }

    #[test]
    fn pipeline_births_and_tracks() {
        let mut pipeline = in_memory();
        let t0 = Stamp::now();

        let out1 = pipeline.process_batch(
            &[Observation::new(1, 100, 2000), Observation::new(2, -300, 4000)],
            t0,
        );
        assert_eq!(out1.births, vec![TrackId(1), TrackId(2)]);

        let out2 = pipeline.process_batch(
            &[Observation::new(1, 110, 2000), Observation::new(2, -300, 4010)],
            t0.after(Duration::from_millis(100)),
        );
        assert!(out2.births.is_empty(), "Existing tracks should absorb observations");
        assert_eq!(pipeline.tracks().len(), 2);
        assert_eq!(pipeline.track_for_slot(Slot(2)).unwrap().id, TrackId(2));
    }

    #[test]
    fn identity_stable_under_continuous_observation() {
        let mut pipeline = in_memory();
        let t0 = Stamp::now();
        for i in 0..40 {
            let at = t0.after(Duration::from_millis(2900) * i);
            let out = pipeline.process_batch(&[Observation::new(3, 0, 1000 + i as i32)], at);
            assert_eq!(out.samples[0].0, TrackId(1));
        }
        assert!(pipeline.recent().is_empty());
    }

    #[test]
    fn gap_beyond_timeout_yields_new_serial() {
        let mut pipeline = in_memory();
        let t0 = Stamp::now();
        pipeline.process_batch(&[Observation::new(1, 0, 1000)], t0);

        let later = t0.after(Duration::from_millis(3100));
        let out = pipeline.process_batch(&[Observation::new(1, 0, 1000)], later);
        assert_eq!(out.expired, vec![TrackId(1)]);
        assert_eq!(out.births, vec![TrackId(2)]);
        assert_eq!(pipeline.recent()[0].id, TrackId(1));
    }

    #[test]
    fn reports_speed_of_one_metre_per_second() {
        let mut pipeline = in_memory();
        let t0 = Stamp::now();
        let out = pipeline.process_batch(&[Observation::new(1, 0, 0)], t0);
        assert_eq!(out.fastest_mm_s, 0.0);
        assert_eq!(out.samples[0].1.accel_mm_s2, 0.0);

        let out = pipeline.process_batch(
            &[Observation::new(1, 1000, 0)],
            t0.after(Duration::from_secs(1)),
        );
        assert!((out.fastest_mm_s - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn empty_batch_still_sweeps() {
        let mut pipeline = in_memory();
        let t0 = Stamp::now();
        pipeline.process_batch(&[Observation::new(2, 5, 5)], t0);
        let out = pipeline.process_batch(&[], t0.after(Duration::from_secs(4)));
        assert_eq!(out.expired, vec![TrackId(2)]);
        assert_eq!(out.fastest_mm_s, 0.0);
        assert!(pipeline.tracks().is_empty());
        assert!(pipeline.track_for_slot(Slot(2)).is_none());
    }

    #[test]
    fn expiry_finalizes_index_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = on_disk(dir.path());
        let t0 = Stamp::now();
        pipeline.process_batch(&[Observation::new(1, 0, 800), Observation::new(2, 50, 900)], t0);
        pipeline.process_batch(
            &[Observation::new(1, 10, 800)],
            t0.after(Duration::from_secs(2)),
        );

        let store = pipeline.store().unwrap().clone();
        assert_eq!(store.read_index().unwrap().len(), 2);

        pipeline.sweep(t0.mono + Duration::from_secs(10));
        let rows = store.read_index().unwrap();
        assert_eq!(rows.len(), 2, "row count unchanged");
        let t1 = rows.iter().find(|r| r.serial == "T1").unwrap();
        let first = chrono::NaiveDateTime::parse_from_str(&t1.first_seen, "%Y-%m-%dT%H:%M:%S").unwrap();
        let last = chrono::NaiveDateTime::parse_from_str(&t1.last_seen, "%Y-%m-%dT%H:%M:%S").unwrap();
        assert_eq!(t1.duration_secs(), Some((last - first).num_seconds()));
        assert!(matches!(t1.duration_secs(), Some(1..=2)));

        let history = fs::read_to_string(store.day_dir().join(&t1.history_file)).unwrap();
        assert_eq!(history.lines().count(), 3);
    }

    #[test]
    fn serial_recovered_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let t0 = Stamp::now();
        {
            let mut pipeline = on_disk(dir.path());
            pipeline.process_batch(&[Observation::new(1, 0, 800)], t0);
            pipeline.process_batch(&[Observation::new(2, 0, 800)], t0);
        }
        let mut pipeline = on_disk(dir.path());
        let out = pipeline.process_batch(&[Observation::new(1, 0, 800)], Stamp::now());
        assert_eq!(out.births, vec![TrackId(3)]);
    }

    #[test]
    fn corrupt_index_restarts_serials() {
        let dir = tempfile::tempdir().unwrap();
        let day = Local::now().date_naive();
        let store = HistoryStore::open(dir.path(), day).unwrap();
        fs::write(store.index_path(), "first_seen_iso,serial\nnot,a,valid,row,at,all\n").unwrap();

        let mut pipeline = on_disk(dir.path());
        let out = pipeline.process_batch(&[Observation::new(1, 0, 800)], Stamp::now());
        assert_eq!(out.births, vec![TrackId(1)]);
    }

    #[test]
    fn drop_expires_live_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let store = {
            let mut pipeline = on_disk(dir.path());
            pipeline.process_batch(&[Observation::new(1, 0, 800)], Stamp::now());
            let store = pipeline.store().unwrap().clone();
            store
        };
        let rows = store.read_index().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].duration_secs().is_some());
        assert_eq!(store.recent_recordings(3).len(), 1);
    }

    #[test]
    fn smoothing_change_applies_to_live_tracks() {
        let mut pipeline = in_memory();
        let t0 = Stamp::now();
        for i in 0..5 {
            pipeline.process_batch(
                &[Observation::new(1, i * 100, 1000)],
                t0.after(Duration::from_millis(100) * i as u32),
            );
        }
        let avg = pipeline.tracks()[0].smoothed().unwrap();
        assert_eq!(avg.x_mm, 300.0);

        pipeline.set_smoothing(SmoothingConfig {
            enabled: false,
            level: 0,
        });
        let avg = pipeline.tracks()[0].smoothed().unwrap();
        assert_eq!(avg.x_mm, 400.0);
    }

    #[test]
    fn store_day_is_independent_of_batches() {
        let dir = tempfile::tempdir().unwrap();
        let day = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let store = HistoryStore::open(dir.path(), day).unwrap();
        let mut pipeline = Pipeline::with_store(PipelineConfig::default(), Some(store));
        pipeline.process_batch(&[Observation::new(1, 0, 800)], Stamp::now());
        let store = pipeline.store().unwrap();
        assert!(store.index_path().ends_with("2023-01-02_TrackIndex.csv"));
        assert_eq!(store.read_index().unwrap().len(), 1);
    }
}
