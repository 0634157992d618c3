//! Scenario definitions.
//!
//! Each scenario is a named configuration of targets, sensor characteristics
//! and sensor silences (intervals with no frames at all). All scenarios are
//! deterministic given the same seed.

use crate::{
    radar_sim::{FrameSimulator, SensorParams, SimFrame},
    target::{MotionSpec, Target},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// One person walking across the field of view
    WalkBy,
    /// Two people crossing paths, each keeping its slot
    Crossing,
    /// Two people crossing paths; the sensor swaps their slots mid-way
    SlotSwap,
    /// One person lingering while the sensor goes silent for 3.5 s
    Dropout,
    /// Three wandering people over a noisy serial line
    Busy,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub duration: f64, // seconds
    pub sim_dt: f64,   // simulation step (s)
    pub targets: Vec<Target>,
    pub params: SensorParams,
    /// `(start, end)` intervals during which the sensor emits nothing
    pub silences: Vec<(f64, f64)>,
}

/// Bytes sent over the link for one frame.
#[derive(Clone, Debug)]
pub struct Transmission {
    pub time: f64,
    pub bytes: Vec<u8>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::WalkBy => Self::walk_by(seed),
            ScenarioKind::Crossing => Self::crossing(seed, false),
            ScenarioKind::SlotSwap => Self::crossing(seed, true),
            ScenarioKind::Dropout => Self::dropout(seed),
            ScenarioKind::Busy => Self::busy(seed),
        }
    }

    /// Run the targets forward and collect every emitted frame.
    pub fn frames(&self) -> Vec<SimFrame> {
        let mut sim = FrameSimulator::new(self.params.clone(), self.seed);
        self.run(&mut sim)
    }

    /// Frames as they arrive over the byte stream, including line damage.
    pub fn transmissions(&self) -> Vec<Transmission> {
        let mut sim = FrameSimulator::new(self.params.clone(), self.seed);
        let frames = self.run(&mut sim);
        frames
            .iter()
            .map(|f| Transmission {
                time: f.time,
                bytes: sim.serial_bytes(f),
            })
            .collect()
    }

    fn run(&self, sim: &mut FrameSimulator) -> Vec<SimFrame> {
        let mut targets = self.targets.clone();
        let steps = (self.duration / self.sim_dt).round() as usize;
        let mut frames = Vec::new();
        for k in 0..=steps {
            let t = k as f64 * self.sim_dt;
            if let Some(frame) = sim.generate(&targets, t) {
                if !self.is_silent(frame.time) {
                    frames.push(frame);
                }
            }
            for target in &mut targets {
                target.step(t, self.sim_dt);
            }
        }
        frames
    }

    pub fn is_silent(&self, t: f64) -> bool {
        self.silences.iter().any(|&(a, b)| t >= a && t < b)
    }

    // -----------------------------------------------------------------------
    // Walk-by
    // -----------------------------------------------------------------------
    fn walk_by(seed: u64) -> Self {
        let targets = vec![Target::new(
            0,
            [-2500., 2500.],
            [1200., 0.],
            MotionSpec::ConstantVelocity,
            1,
        )];
        Scenario {
            name: "walk_by".into(),
            seed,
            duration: 4.0,
            sim_dt: 0.02,
            targets,
            params: SensorParams::default(),
            silences: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Crossing / slot swap
    // -----------------------------------------------------------------------
    fn crossing(seed: u64, swap: bool) -> Self {
        let mut a = Target::new(0, [-2000., 3000.], [800., -200.], MotionSpec::ConstantVelocity, 1);
        let mut b = Target::new(1, [2000., 2000.], [-800., 200.], MotionSpec::ConstantVelocity, 2);
        if swap {
            a = a.with_slot_change(2.5, 2);
            b = b.with_slot_change(2.5, 1);
        }
        Scenario {
            name: if swap { "slot_swap" } else { "crossing" }.into(),
            seed,
            duration: 5.0,
            sim_dt: 0.02,
            targets: vec![a, b],
            params: SensorParams::default(),
            silences: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Dropout
    // -----------------------------------------------------------------------
    fn dropout(seed: u64) -> Self {
        let motion = MotionSpec::Loiter {
            x: 0.,
            y: 1500.,
            speed: 600.,
        };
        Scenario {
            name: "dropout".into(),
            seed,
            duration: 10.0,
            sim_dt: 0.02,
            targets: vec![Target::new(0, [500., 3000.], [0., 0.], motion, 1)],
            params: SensorParams::default(),
            silences: vec![(3.0, 6.5)],
        }
    }

    // -----------------------------------------------------------------------
    // Busy
    // -----------------------------------------------------------------------
    fn busy(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
        let duration = 30.0;

        let targets = (0..3u8)
            .map(|i| {
                let mut point = || {
                    let y = 800. + rng.gen::<f64>() * 4000.;
                    let x = (rng.gen::<f64>() - 0.5) * 1.6 * y;
                    (x, y)
                };
                let start = point();
                let waypoints = (1..=6)
                    .map(|k| {
                        let (x, y) = point();
                        [k as f64 * 5.0, x, y]
                    })
                    .collect();
                let speed = 400. + rng.gen::<f64>() * 1100.;
                let appear = rng.gen::<f64>() * 5.0;
                let disappear = duration - rng.gen::<f64>() * 5.0;
                Target::new(
                    i as u64,
                    [start.0, start.1],
                    [0., 0.],
                    MotionSpec::Waypoints { waypoints, speed },
                    i + 1,
                )
                .active_between(Some(appear), Some(disappear))
            })
            .collect();

        Scenario {
            name: "busy".into(),
            seed,
            duration,
            sim_dt: 0.02,
            targets,
            params: SensorParams {
                position_noise_mm: 40.0,
                p_detection: 0.9,
                garbage_rate: 0.2,
                byte_error_rate: 0.05,
                ..Default::default()
            },
            silences: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenarios_are_deterministic() {
        for kind in [ScenarioKind::WalkBy, ScenarioKind::Busy] {
            let a = Scenario::build(kind, 7).transmissions();
            let b = Scenario::build(kind, 7).transmissions();
            assert_eq!(a.len(), b.len());
            assert!(a.iter().zip(&b).all(|(x, y)| x.bytes == y.bytes && x.time == y.time));
        }
    }

    #[test]
    fn walk_by_reports_single_slot() {
        let frames = Scenario::build(ScenarioKind::WalkBy, 1).frames();
        assert!(frames.len() >= 35);
        assert!(frames
            .iter()
            .flat_map(|f| f.truth.iter())
            .all(|&(id, slot)| id == 0 && slot == 1));
    }

    #[test]
    fn dropout_has_silent_gap() {
        let s = Scenario::build(ScenarioKind::Dropout, 1);
        let frames = s.frames();
        let max_gap = frames
            .windows(2)
            .map(|w| w[1].time - w[0].time)
            .fold(0.0, f64::max);
        assert!(max_gap > 3.4 && max_gap < 3.8, "gap {max_gap}");
    }

    #[test]
    fn slot_swap_changes_slots() {
        let frames = Scenario::build(ScenarioKind::SlotSwap, 1).frames();
        let slots_of = |id: u64, window: fn(f64) -> bool| {
            frames
                .iter()
                .filter(|f| window(f.time))
                .flat_map(|f| f.truth.iter())
                .filter(|(t, _)| *t == id)
                .map(|(_, s)| *s)
                .collect::<std::collections::BTreeSet<u8>>()
        };
        let early: fn(f64) -> bool = |t| t < 2.0;
        let late: fn(f64) -> bool = |t| t > 3.0;
        assert_eq!(slots_of(0, early).into_iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(slots_of(0, late).into_iter().collect::<Vec<_>>(), vec![2]);
        assert_eq!(slots_of(1, late).into_iter().collect::<Vec<_>>(), vec![1]);
    }
}
