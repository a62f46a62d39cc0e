//! Three-phase current asymmetry.

use crate::config::AsymmetryMethod;

/// `(max - min) / mean` of the three phase currents, 0 when the mean is 0.
pub fn compute(l1: f64, l2: f64, l3: f64) -> f64 {
    let max = l1.max(l2).max(l3);
    let min = l1.min(l2).min(l3);
    let mean = (l1 + l2 + l3) / 3.0;
    if mean.abs() < f64::EPSILON {
        return 0.0;
    }
    (max - min) / mean
}

/// `100 * sum(|Li - mean|) / mean`, 0 when the mean is 0.
pub fn mean_absolute_deviation_percent(currents: [f64; 3]) -> f64 {
    let mean = currents.iter().sum::<f64>() / 3.0;
    if mean.abs() < f64::EPSILON {
        return 0.0;
    }
    100.0 * currents.iter().map(|c| (c - mean).abs()).sum::<f64>() / mean
}

pub fn compute_with(method: AsymmetryMethod, currents: [f64; 3]) -> f64 {
    match method {
        AsymmetryMethod::MaxMinSpread => compute(currents[0], currents[1], currents[2]),
        AsymmetryMethod::MeanAbsoluteDeviationPercent => mean_absolute_deviation_percent(currents),
    }
}

/// Per-phase running sums for cycle-average currents.
#[derive(Debug, Clone, Default)]
pub struct PhaseCurrentAccumulator {
    sums: [f64; 3],
    count: usize,
}

impl PhaseCurrentAccumulator {
    pub fn add(&mut self, currents: [f64; 3]) {
        for (sum, c) in self.sums.iter_mut().zip(currents) {
            *sum += c;
        }
        self.count += 1;
    }

    /// Average current per phase, zeros when nothing was added.
    pub fn averages(&self) -> [f64; 3] {
        if self.count == 0 {
            return [0.0; 3];
        }
        let n = self.count as f64;
        [self.sums[0] / n, self.sums[1] / n, self.sums[2] / n]
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_phases() {
        assert_eq!(compute(10.0, 10.0, 10.0), 0.0);
    }

    #[test]
    fn test_spread_ratio() {
        assert!((compute(8.0, 10.0, 12.0) - 0.4).abs() < 1e-12);
        assert!((compute(12.0, 8.0, 10.0) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_zero_mean_guard() {
        assert_eq!(compute(0.0, 0.0, 0.0), 0.0);
        assert_eq!(mean_absolute_deviation_percent([0.0; 3]), 0.0);
    }

    #[test]
    fn test_mad_percent() {
        // mean 10, deviations 2 + 0 + 2 = 4 -> 40 %
        let value = compute_with(AsymmetryMethod::MeanAbsoluteDeviationPercent, [8.0, 10.0, 12.0]);
        assert!((value - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_accumulator_averages() {
        let mut acc = PhaseCurrentAccumulator::default();
        assert_eq!(acc.averages(), [0.0; 3]);
        acc.add([8.0, 10.0, 12.0]);
        acc.add([10.0, 10.0, 10.0]);
        assert_eq!(acc.averages(), [9.0, 10.0, 11.0]);
        assert_eq!(acc.count(), 2);
    }
}
