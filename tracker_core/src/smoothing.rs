//! Rolling-average smoothing of displayed track motion.
//!
//! The window length is derived from a 0–9 level: LOW keeps 3 samples, HIGH
//! keeps 50. Disabled smoothing keeps one sample (raw values).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const MAX_LEVEL: u8 = 9;
pub const MIN_WINDOW: usize = 3;
pub const MAX_WINDOW: usize = 50;

/// User-facing smoothing settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    pub enabled: bool,
    /// 0 (lightest) ..= 9 (heaviest); larger values are clamped
    pub level: u8,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 0,
        }
    }
}

impl SmoothingConfig {
    /// Number of samples averaged: `3 + round(level * 47 / 9)`, or 1 when off.
    pub fn window_len(&self) -> usize {
        if !self.enabled {
            return 1;
        }
        let level = self.level.min(MAX_LEVEL) as f64;
        let span = (MAX_WINDOW - MIN_WINDOW) as f64;
        MIN_WINDOW + (level * span / MAX_LEVEL as f64).round() as usize
    }
}

/// Averaged position and speed over the window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SmoothedMotion {
    pub x_mm: f64,
    pub y_mm: f64,
    pub speed_mm_s: f64,
}

/// Bounded history of `(x, y, speed)` samples for one track.
#[derive(Clone, Debug)]
pub struct SmoothingWindow {
    samples: VecDeque<SmoothedMotion>,
    capacity: usize,
}

impl SmoothingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Change the window length, keeping the most recent samples.
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.capacity {
            return;
        }
        while self.samples.len() > capacity {
            self.samples.pop_front();
        }
        self.capacity = capacity;
    }

    /// Add a sample and return the new average.
    pub fn push(&mut self, x_mm: f64, y_mm: f64, speed_mm_s: f64) -> SmoothedMotion {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(SmoothedMotion {
            x_mm,
            y_mm,
            speed_mm_s,
        });
        self.mean()
    }

    pub fn average(&self) -> Option<SmoothedMotion> {
        (!self.samples.is_empty()).then(|| self.mean())
    }

    fn mean(&self) -> SmoothedMotion {
        let n = self.samples.len().max(1) as f64;
        let (sx, sy, sv) = self.samples.iter().fold((0.0, 0.0, 0.0), |(x, y, v), s| {
            (x + s.x_mm, y + s.y_mm, v + s.speed_mm_s)
        });
        SmoothedMotion {
            x_mm: sx / n,
            y_mm: sy / n,
            speed_mm_s: sv / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_len_spans_3_to_50() {
        let len = |enabled, level| SmoothingConfig { enabled, level }.window_len();
        assert_eq!(len(true, 0), 3);
        assert_eq!(len(true, 1), 8);
        assert_eq!(len(true, 4), 24);
        assert_eq!(len(true, 9), 50);
        assert_eq!(len(true, 200), 50);
        assert_eq!(len(false, 9), 1);
    }

    #[test]
    fn average_over_bounded_window() {
        let mut w = SmoothingWindow::new(3);
        w.push(0.0, 0.0, 0.0);
        w.push(3.0, 3.0, 30.0);
        let avg = w.push(6.0, 6.0, 60.0);
        assert_eq!(avg.x_mm, 3.0);
        let avg = w.push(9.0, 9.0, 90.0);
        assert_eq!(w.len(), 3);
        assert_eq!(avg.x_mm, 6.0);
        assert_eq!(avg.speed_mm_s, 60.0);
    }

    #[test]
    fn resize_keeps_latest_samples() {
        let mut w = SmoothingWindow::new(5);
        for i in 0..5 {
            w.push(i as f64, 0.0, 0.0);
        }
        w.resize(2);
        assert_eq!(w.len(), 2);
        assert_eq!(w.average().unwrap().x_mm, 3.5);

        w.resize(1);
        assert_eq!(w.average().unwrap().x_mm, 4.0);
    }
}
