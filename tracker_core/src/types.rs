//! Fundamental types used across the tracking engine.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

pub use sensor_models::observation::{Observation, Slot};

/// A batch of observations decoded from one frame.
pub type ObservationBatch = Vec<Observation>;

// ---------------------------------------------------------------------------
// Identifier types
// ---------------------------------------------------------------------------

/// Durable track identity, displayed and persisted as `T<n>`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TrackId(pub u64);

impl TrackId {
    /// Parse a persisted serial such as `"T17"`.
    pub fn parse(serial: &str) -> Option<Self> {
        serial.strip_prefix('T')?.parse().ok().map(TrackId)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A point in time on both clocks: monotonic for kinematics and expiry,
/// wall-clock for persisted timestamps.
#[derive(Clone, Copy, Debug)]
pub struct Stamp {
    pub mono: Instant,
    pub wall: DateTime<Local>,
}

impl Stamp {
    pub fn now() -> Self {
        Self {
            mono: Instant::now(),
            wall: Local::now(),
        }
    }

    /// The same stamp moved forward on both clocks.
    pub fn after(&self, d: Duration) -> Self {
        Self {
            mono: self.mono + d,
            wall: self.wall
                + chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }
}

// ---------------------------------------------------------------------------
// Kinematics
// ---------------------------------------------------------------------------

/// Kinematic state of a track after one observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub x_mm: f64,
    pub y_mm: f64,
    pub speed_mm_s: f64,
    pub accel_mm_s2: f64,
    /// Monotonic time of the observation
    pub at: Instant,
}
