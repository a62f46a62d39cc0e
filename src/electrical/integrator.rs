//! Trapezoidal integration over one cycle.

use tracing::debug;

use crate::detector::{ensure_finite, SkippedSample};

/// Running trapezoidal integral of one signal over an open cycle.
///
/// The sum is kept in `value * ms`; unit conversion happens at the caller.
#[derive(Debug, Clone, Default)]
pub struct CycleIntegrator {
    sum: f64,
    prev: Option<(f64, u64)>,
    samples: usize,
    skipped_intervals: usize,
}

impl CycleIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the trapezoid between the previous sample and this one.
    ///
    /// The first sample only sets the left edge. A duplicate or
    /// out-of-order timestamp contributes nothing but becomes the new left
    /// edge, so accumulation continues from it.
    pub fn accumulate(&mut self, value: f64, timestamp_millis: u64) -> Result<(), SkippedSample> {
        let value = ensure_finite("integrand", value)?;

        if let Some((prev_value, prev_ts)) = self.prev {
            match timestamp_millis.checked_sub(prev_ts) {
                Some(dt) if dt > 0 => {
                    self.sum += 0.5 * (prev_value + value) * dt as f64;
                }
                _ => {
                    self.skipped_intervals += 1;
                    debug!(
                        prev = prev_ts,
                        at = timestamp_millis,
                        "Non-positive time delta, interval skipped"
                    );
                }
            }
        }

        self.prev = Some((value, timestamp_millis));
        self.samples += 1;
        Ok(())
    }

    /// Integral so far in `value * ms`, without resetting.
    pub fn integral(&self) -> f64 {
        self.sum
    }

    /// Return the integral (`value * ms`) and reset for the next cycle.
    pub fn finalize(&mut self) -> f64 {
        let integral = self.sum;
        *self = Self::default();
        integral
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Intervals dropped because of a non-positive time delta.
    pub fn skipped_intervals(&self) -> usize {
        self.skipped_intervals
    }
}
