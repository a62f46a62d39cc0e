//! Bounded history of anomaly flags.

use std::collections::VecDeque;

use super::DetectorError;

/// Circular history of the most recent anomaly flags for one signal.
///
/// The ratio is a smoothed companion to the per-sample flag; it never feeds
/// back into the decision itself.
#[derive(Debug, Clone)]
pub struct AnomalyTrendTracker {
    history: VecDeque<bool>,
    capacity: usize,
    /// Number of `true` entries currently in `history`
    anomalies: usize,
}

impl AnomalyTrendTracker {
    pub fn new(capacity: usize) -> Result<Self, DetectorError> {
        if capacity == 0 {
            return Err(DetectorError::EmptyHistory);
        }
        Ok(Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            anomalies: 0,
        })
    }

    /// Append a flag, evicting the oldest once at capacity, and return the
    /// updated ratio.
    pub fn record(&mut self, is_anomaly: bool) -> f64 {
        if self.history.len() == self.capacity {
            if let Some(true) = self.history.pop_front() {
                self.anomalies -= 1;
            }
        }
        self.history.push_back(is_anomaly);
        if is_anomaly {
            self.anomalies += 1;
        }
        self.ratio()
    }

    /// Fraction of the history flagged anomalous, 0 when empty.
    pub fn ratio(&self) -> f64 {
        if self.history.is_empty() {
            0.0
        } else {
            self.anomalies as f64 / self.history.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.anomalies = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_is_refused() {
        assert_eq!(
            AnomalyTrendTracker::new(0).unwrap_err(),
            DetectorError::EmptyHistory
        );
    }

    #[test]
    fn test_ratio_before_full() {
        let mut tracker = AnomalyTrendTracker::new(4).unwrap();
        assert_eq!(tracker.ratio(), 0.0);
        assert_eq!(tracker.record(true), 1.0);
        assert_eq!(tracker.record(false), 0.5);
        assert!((tracker.record(false) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_oldest_flag_is_evicted() {
        let mut tracker = AnomalyTrendTracker::new(2).unwrap();
        tracker.record(true);
        tracker.record(true);
        assert_eq!(tracker.record(false), 0.5);
        assert_eq!(tracker.record(false), 0.0);
        assert_eq!(tracker.anomaly_count(), 0);
        assert_eq!(tracker.len(), 2);
    }
}
