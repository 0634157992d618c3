//! Target trajectory models and state propagation.
//!
//! Each target has a true planar state `[px, py, vx, vy]` in the sensor frame
//! (mm, mm/s) and a `MotionSpec` describing how it moves. The sensor reports
//! each target on a slot; `slots` lets a scenario hand a target a different
//! slot over time, the way the sensor does.

use serde::{Deserialize, Serialize};

/// Describes target motion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MotionSpec {
    /// Constant velocity.
    ConstantVelocity,
    /// Constant turn rate. `omega` = yaw rate (rad/s).
    ConstantTurn { omega: f64 },
    /// Head toward each `(t, x, y)` waypoint in turn at `speed` (mm/s).
    Waypoints { waypoints: Vec<[f64; 3]>, speed: f64 },
    /// Walk toward the point, stop there.
    Loiter { x: f64, y: f64, speed: f64 },
}

/// A simulated target with ground-truth state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Target {
    /// Unique target ID (ground truth)
    pub id: u64,
    /// True state [px, py, vx, vy]
    pub state: [f64; 4],
    /// Motion model for this target
    pub motion: MotionSpec,
    /// `(t_start, slot)` sorted by time; the last entry with `t_start <= t`
    /// is the slot in use
    pub slots: Vec<(f64, u8)>,
    /// Optional: target appears after this time
    pub appear_at: Option<f64>,
    /// Optional: target disappears after this time
    pub disappear_at: Option<f64>,
}

impl Target {
    pub fn new(id: u64, pos: [f64; 2], vel: [f64; 2], motion: MotionSpec, slot: u8) -> Self {
        Self {
            id,
            state: [pos[0], pos[1], vel[0], vel[1]],
            motion,
            slots: vec![(0.0, slot)],
            appear_at: None,
            disappear_at: None,
        }
    }

    pub fn active_between(mut self, appear: Option<f64>, disappear: Option<f64>) -> Self {
        self.appear_at = appear;
        self.disappear_at = disappear;
        self
    }

    pub fn with_slot_change(mut self, at: f64, slot: u8) -> Self {
        self.slots.push((at, slot));
        self.slots.sort_by(|a, b| a.0.total_cmp(&b.0));
        self
    }

    /// Propagate true state by `dt` seconds according to motion spec.
    pub fn step(&mut self, t: f64, dt: f64) {
        let s = &mut self.state;
        match &self.motion {
            MotionSpec::ConstantVelocity => {}
            MotionSpec::ConstantTurn { omega } => {
                let v = s[2].hypot(s[3]);
                let heading = s[3].atan2(s[2]) + omega * dt;
                s[2] = v * heading.cos();
                s[3] = v * heading.sin();
            }
            MotionSpec::Waypoints { waypoints, speed } => {
                match waypoints.iter().find(|wp| wp[0] >= t) {
                    Some(wp) => head_toward(s, wp[1], wp[2], *speed),
                    None => {
                        s[2] = 0.0;
                        s[3] = 0.0;
                    }
                }
            }
            MotionSpec::Loiter { x, y, speed } => head_toward(s, *x, *y, *speed),
        }
        s[0] += s[2] * dt;
        s[1] += s[3] * dt;
    }

    /// True if target is active at time `t`.
    pub fn is_active(&self, t: f64) -> bool {
        if let Some(appear) = self.appear_at {
            if t < appear {
                return false;
            }
        }
        if let Some(disappear) = self.disappear_at {
            if t >= disappear {
                return false;
            }
        }
        true
    }

    pub fn slot_at(&self, t: f64) -> u8 {
        self.slots
            .iter()
            .filter(|(start, _)| *start <= t)
            .last()
            .or(self.slots.first())
            .map_or(1, |(_, slot)| *slot)
    }

    /// 2D position (mm)
    pub fn pos_2d(&self) -> (f64, f64) {
        (self.state[0], self.state[1])
    }

    /// Speed (mm/s)
    pub fn speed(&self) -> f64 {
        self.state[2].hypot(self.state[3])
    }
}

fn head_toward(s: &mut [f64; 4], x: f64, y: f64, speed: f64) {
    let (dx, dy) = (x - s[0], y - s[1]);
    let dist = dx.hypot(dy);
    if dist > 1.0 {
        s[2] = speed * dx / dist;
        s[3] = speed * dy / dist;
    } else {
        s[2] = 0.0;
        s[3] = 0.0;
    }
}
