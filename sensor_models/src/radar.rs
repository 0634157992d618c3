//! Radar sensor mounting geometry.

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

/// Sensor horizontal field of view (degrees).
pub const FOV_DEG: f64 = 120.0;

/// Where the sensor sits on the site map and which way it faces.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorMount {
    /// Sensor position in world coordinates (mm)
    pub position_mm: [f64; 2],
    /// Boresight heading, degrees clockwise, within ±180
    pub heading_deg: f64,
}

impl Default for SensorMount {
    fn default() -> Self {
        Self {
            position_mm: [0.0, 0.0],
            heading_deg: 0.0,
        }
    }
}

impl SensorMount {
    pub fn new(position_mm: [f64; 2], heading_deg: f64) -> Self {
        Self {
            position_mm,
            heading_deg,
        }
    }

    /// Map sensor-local `(x, y)` (mm) into world coordinates (mm).
    ///
    /// A positive heading turns the boresight clockwise, so local points are
    /// rotated by `-heading` before the translation.
    pub fn local_to_world(&self, x_mm: f64, y_mm: f64) -> (f64, f64) {
        let rot = Rotation2::new(-self.heading_deg.to_radians());
        let w = rot * Vector2::new(x_mm, y_mm)
            + Vector2::new(self.position_mm[0], self.position_mm[1]);
        (w.x, w.y)
    }

    /// True when a sensor-local point lies inside the horizontal field of view.
    pub fn in_field_of_view(x_mm: f64, y_mm: f64) -> bool {
        if y_mm <= 0.0 {
            return false;
        }
        x_mm.atan2(y_mm).to_degrees().abs() <= FOV_DEG / 2.0
    }
}
