//! LD2450 frame simulator.
//!
//! Generates 30-byte frames at the sensor's frame rate with:
//! - Uniform position noise
//! - Miss probability (1 - P_D)
//! - Range and field-of-view limits
//! - Optional serial-line damage: garbage bursts and flipped bytes

use crate::target::Target;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use sensor_models::{encode_frame, radar::SensorMount, FRAME_LEN, SLOT_COUNT};
use serde::{Deserialize, Serialize};

/// Sensor and link characteristics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorParams {
    /// Frames per second
    pub frame_rate: f64,
    /// Maximum detection range (mm)
    pub max_range_mm: f64,
    /// Half-width of the uniform position noise (mm)
    pub position_noise_mm: f64,
    /// Probability that an in-view target is reported
    pub p_detection: f64,
    /// Probability that a garbage burst precedes a frame on the byte stream
    pub garbage_rate: f64,
    /// Probability that one byte of a frame is flipped on the byte stream
    pub byte_error_rate: f64,
}

impl Default for SensorParams {
    fn default() -> Self {
        Self {
            frame_rate: 10.0,
            max_range_mm: 6000.0,
            position_noise_mm: 20.0,
            p_detection: 0.98,
            garbage_rate: 0.0,
            byte_error_rate: 0.0,
        }
    }
}

/// One simulated frame and the ground truth behind it.
#[derive(Clone, Debug)]
pub struct SimFrame {
    pub time: f64,
    pub bytes: [u8; FRAME_LEN],
    /// `(target id, slot)` of every reported target
    pub truth: Vec<(u64, u8)>,
}

impl SimFrame {
    pub fn hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.truth.is_empty()
    }
}

/// Generates frames from a set of targets.
pub struct FrameSimulator {
    pub params: SensorParams,
    /// Next scheduled frame time
    next_scan_time: f64,
    rng: ChaCha8Rng,
}

impl FrameSimulator {
    pub fn new(params: SensorParams, seed: u64) -> Self {
        Self {
            params,
            next_scan_time: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Check if the sensor should emit a frame at the current time.
    pub fn should_scan(&self, t: f64) -> bool {
        t >= self.next_scan_time
    }

    /// Advance the schedule by one frame interval.
    pub fn advance_schedule(&mut self) {
        self.next_scan_time += 1.0 / self.params.frame_rate;
    }

    /// Generate the frame due at or before `sim_time`, if any. Frames with
    /// no target in view are still produced, like the real sensor.
    pub fn generate(&mut self, targets: &[Target], sim_time: f64) -> Option<SimFrame> {
        if !self.should_scan(sim_time) {
            return None;
        }
        let scan_time = self.next_scan_time;
        self.advance_schedule();

        let mut slots: [Option<(i32, i32)>; SLOT_COUNT] = [None; SLOT_COUNT];
        let mut truth = Vec::new();
        let sigma = self.params.position_noise_mm;

        for target in targets {
            if !target.is_active(scan_time) {
                continue;
            }
            // Miss detection?
            if self.rng.gen::<f64>() > self.params.p_detection {
                continue;
            }
            let (tx, ty) = target.pos_2d();
            if tx.hypot(ty) > self.params.max_range_mm || !SensorMount::in_field_of_view(tx, ty) {
                continue;
            }

            let slot = target.slot_at(scan_time);
            let Some(cell) = slots.get_mut(usize::from(slot).wrapping_sub(1)) else {
                continue;
            };
            if cell.is_some() {
                continue;
            }

            let nx = tx + self.rng.gen::<f64>() * sigma * 2.0 - sigma;
            let ny = ty + self.rng.gen::<f64>() * sigma * 2.0 - sigma;
            *cell = Some((nx.round() as i32, ny.round() as i32));
            truth.push((target.id, slot));
        }

        Some(SimFrame {
            time: scan_time,
            bytes: encode_frame(&slots),
            truth,
        })
    }

    /// The frame as it would arrive over a noisy serial line.
    pub fn serial_bytes(&mut self, frame: &SimFrame) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_LEN + 8);
        if self.rng.gen::<f64>() < self.params.garbage_rate {
            let n = self.rng.gen_range(1..8);
            // 0xAA is avoided so garbage never starts a spurious header.
            out.extend((0..n).map(|_| self.rng.gen_range(0x00..0xAA_u8)));
        }
        let start = out.len();
        out.extend_from_slice(&frame.bytes);
        if self.rng.gen::<f64>() < self.params.byte_error_rate {
            let idx = start + self.rng.gen_range(0..FRAME_LEN);
            out[idx] ^= 1 << self.rng.gen_range(0..8);
        }
        out
    }
}
