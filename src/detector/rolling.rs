//! Bounded rolling window with running mean and population variance.

use std::collections::VecDeque;

use statrs::statistics::Statistics;

use super::{ensure_finite, DetectorError, SkippedSample};
use crate::config::defaults::{CANCELLATION_TOLERANCE, MIN_MODEL_WINDOW_SIZE};

/// Mean, standard deviation, and z-score of one value against the window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowStats {
    pub mean: f64,
    /// Population standard deviation actually used for the z-score
    /// (the floor when the floor applied, 0 for a flat window).
    pub std_dev: f64,
    pub z_score: f64,
}

/// Fixed-capacity FIFO window of recent values for one signal.
///
/// Mean and variance are maintained with Welford's update extended to
/// removals, so each push is O(1). The sums are recomputed from the window
/// contents every `resync_interval` pushes to bound rounding drift, and
/// immediately when an eviction cancels most of the sum of squares.
///
/// Flatness is decided exactly from the run of identical trailing values,
/// never from the size of the running variance.
#[derive(Debug, Clone)]
pub struct RollingStatistics {
    window: VecDeque<f64>,
    capacity: usize,

    /// Running mean (Welford's algorithm)
    mean: f64,

    /// Running sum of squared deviations (Welford's algorithm)
    m2: f64,

    /// Number of trailing values equal to the newest one
    trailing_run: usize,

    std_floor: f64,
    resync_interval: usize,
    pushes_since_resync: usize,
}

impl RollingStatistics {
    /// Window of `capacity` values, no std floor, resync once per window.
    pub fn new(capacity: usize) -> Result<Self, DetectorError> {
        Self::with_options(capacity, 0.0, 0)
    }

    /// `std_floor > 0` replaces a zero standard deviation with the floor.
    /// `resync_interval == 0` means "once per `capacity` pushes".
    pub fn with_options(
        capacity: usize,
        std_floor: f64,
        resync_interval: usize,
    ) -> Result<Self, DetectorError> {
        if capacity < MIN_MODEL_WINDOW_SIZE {
            return Err(DetectorError::WindowTooSmall(capacity));
        }
        if !std_floor.is_finite() || std_floor < 0.0 {
            return Err(DetectorError::InvalidStdFloor(std_floor));
        }
        Ok(Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            mean: 0.0,
            m2: 0.0,
            trailing_run: 0,
            std_floor,
            resync_interval: if resync_interval == 0 { capacity } else { resync_interval },
            pushes_since_resync: 0,
        })
    }

    /// Admit `value` then score it against the window that now contains it.
    pub fn update(&mut self, value: f64) -> Result<WindowStats, SkippedSample> {
        self.push(value)?;
        Ok(self.score(value))
    }

    /// Admit `value`, evicting the oldest value once at capacity.
    ///
    /// Returns the evicted value, if any. Non-finite values are rejected and
    /// leave the window untouched.
    pub fn push(&mut self, value: f64) -> Result<Option<f64>, SkippedSample> {
        let value = ensure_finite("value", value)?;

        let evicted = if self.window.len() == self.capacity {
            self.window.pop_front()
        } else {
            None
        };
        if let Some(old) = evicted {
            self.remove_from_sums(old);
        }

        self.trailing_run = match self.window.back() {
            Some(&last) if last == value => self.trailing_run + 1,
            _ => 1,
        };
        self.window.push_back(value);
        let n = self.window.len() as f64;
        let delta = value - self.mean;
        self.mean += delta / n;
        self.m2 += delta * (value - self.mean);

        self.pushes_since_resync += 1;
        if self.pushes_since_resync >= self.resync_interval {
            self.resync();
        }

        Ok(evicted)
    }

    fn remove_from_sums(&mut self, old: f64) {
        let remaining = self.window.len();
        if remaining == 0 {
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let mean_before = self.mean;
        self.mean -= (old - mean_before) / remaining as f64;
        let removed = (old - mean_before) * (old - self.mean);
        self.m2 -= removed;
        if self.m2 < removed * CANCELLATION_TOLERANCE {
            self.resync();
        }
    }

    /// Every value in the window is identical.
    pub fn is_flat(&self) -> bool {
        !self.window.is_empty() && self.trailing_run >= self.window.len()
    }

    /// Recompute mean and sum of squares from the window contents.
    pub fn resync(&mut self) {
        self.pushes_since_resync = 0;
        if self.window.is_empty() {
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let mean = self.window.iter().mean();
        self.m2 = self.window.iter().map(|x| (x - mean) * (x - mean)).sum();
        self.mean = mean;
    }

    /// Score `value` against the current window without modifying it.
    pub fn score(&self, value: f64) -> WindowStats {
        if self.window.is_empty() {
            return WindowStats::default();
        }

        let std_dev = self.std_dev();
        if std_dev == 0.0 {
            // A flat window's mean is its value, free of running-sum residue
            let mean = match self.window.back() {
                Some(&last) if self.is_flat() => last,
                _ => self.mean,
            };
            if self.std_floor > 0.0 {
                return WindowStats {
                    mean,
                    std_dev: self.std_floor,
                    z_score: (value - mean) / self.std_floor,
                };
            }
            return WindowStats {
                mean,
                std_dev: 0.0,
                z_score: 0.0,
            };
        }

        WindowStats {
            mean: self.mean,
            std_dev,
            z_score: (value - self.mean) / std_dev,
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation of the window. Exactly 0 when every
    /// value is identical.
    pub fn std_dev(&self) -> f64 {
        if self.is_flat() || self.m2 <= 0.0 {
            0.0
        } else {
            (self.m2 / self.window.len() as f64).sqrt()
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.window.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Window contents, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.mean = 0.0;
        self.m2 = 0.0;
        self.trailing_run = 0;
        self.pushes_since_resync = 0;
    }
}
