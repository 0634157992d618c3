//! `sim` — Scenario simulator and history replay.
//!
//! - [`target`]    — ground-truth trajectories with slot schedules
//! - [`radar_sim`] — LD2450 frame synthesis and serial-line damage
//! - [`scenarios`] — named, seeded scenarios
//! - [`drive`]     — run a scenario through codec and engine on simulated time
//! - [`replay`]    — paced playback of recorded track histories

pub mod drive;
pub mod radar_sim;
pub mod replay;
pub mod scenarios;
pub mod target;

pub use drive::{drive_pipeline, DriveSummary};
pub use radar_sim::{FrameSimulator, SensorParams, SimFrame};
pub use replay::{Recording, ReplayConfig, ReplayError, ReplayPlayer};
pub use scenarios::{Scenario, ScenarioKind, Transmission};
pub use target::{MotionSpec, Target};
