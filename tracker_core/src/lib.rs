//! `tracker_core` — Track lifecycle engine for LD2450 radar observations.
//!
//! # Module layout
//! - [`types`]        — Fundamental types (track IDs, stamps, kinematic samples)
//! - [`track`]        — Track struct, kinematics and owned history log
//! - [`track_manager`]— Serial allocation, slot table, expiry, recent list
//! - [`pipeline`]     — Per-batch orchestrator (sweep, birth, update)
//! - [`history`]      — Day index, per-track CSV files, replay read path
//! - [`smoothing`]    — Rolling-average display smoothing
//! - [`watchdog`]     — Data-loss detection for the live feed
//! - [`live`]         — Worker thread owning the pipeline, published view

pub mod error;
pub mod history;
pub mod live;
pub mod pipeline;
pub mod smoothing;
pub mod track;
pub mod track_manager;
pub mod types;
pub mod watchdog;

pub use error::TrackerError;
pub use history::{
    load_track_history, HistoryError, HistoryStore, IndexRecord, RecordedSample,
};
pub use live::{LiveConfig, LiveTracker, LiveView, TrackView};
pub use pipeline::{BatchOutcome, Pipeline, PipelineConfig};
pub use smoothing::SmoothingConfig;
pub use track::{RecentTrack, Track, END_TIMEOUT};
pub use types::{Observation, Sample, Slot, Stamp, TrackId};
pub use watchdog::{LinkWatchdog, DATA_TIMEOUT};
