//! Raw target observations as produced by the LD2450 frame codec.
//!
//! # Observation shapes
//! - **Legacy**: `(slot, x_mm, y_mm)`: no raw frame attached
//! - **Audited**: `(slot, x_mm, y_mm, raw_hex)`: the full 30-byte frame as
//!   lowercase hex, written verbatim to the per-track history
//!
//! Both shapes are the same type; the raw frame is simply optional.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of target slots carried by one frame.
pub const SLOT_COUNT: usize = 3;

/// Transport-level channel index (1..=3). Not a stable identity: the sensor
/// may hand the same physical target a different slot between frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot(pub u8);

impl Slot {
    /// Slot for a zero-based target block index inside a frame.
    pub fn from_block(index: usize) -> Self {
        Slot(index as u8 + 1)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// One target reported in one frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub slot: Slot,
    /// Lateral position relative to the sensor (mm)
    pub x_mm: i32,
    /// Forward position relative to the sensor (mm)
    pub y_mm: i32,
    /// Originating frame as lowercase hex, when the source kept it
    pub raw_frame: Option<String>,
}

impl Observation {
    /// Legacy 3-field observation.
    pub fn new(slot: u8, x_mm: i32, y_mm: i32) -> Self {
        Self {
            slot: Slot(slot),
            x_mm,
            y_mm,
            raw_frame: None,
        }
    }

    /// Attach the originating frame (hex) for audit logging.
    pub fn with_raw_frame(mut self, hex: impl Into<String>) -> Self {
        self.raw_frame = Some(hex.into());
        self
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x_mm as f64, self.y_mm as f64)
    }

    /// Straight-line distance from the sensor (mm).
    pub fn range_mm(&self) -> f64 {
        self.position().norm()
    }

    /// Raw frame hex, or an empty string for legacy observations.
    pub fn raw_hex(&self) -> &str {
        self.raw_frame.as_deref().unwrap_or("")
    }
}

impl From<(u8, i32, i32)> for Observation {
    fn from((slot, x_mm, y_mm): (u8, i32, i32)) -> Self {
        Observation::new(slot, x_mm, y_mm)
    }
}

impl From<(u8, i32, i32, String)> for Observation {
    fn from((slot, x_mm, y_mm, raw): (u8, i32, i32, String)) -> Self {
        Observation::new(slot, x_mm, y_mm).with_raw_frame(raw)
    }
}
