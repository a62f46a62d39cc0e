//! Per-signal z-score detector.

use tracing::{debug, info};

use super::{ensure_finite, AnomalyTrendTracker, DetectorError, RollingStatistics, SkippedSample};
use crate::config::{DetectorConfig, ScoreBasis};
use crate::types::{DecisionRecord, SignalIdentity};

/// Rolling statistics plus anomaly trend for one `SignalIdentity`.
///
/// Owned by exactly one worker; `update` mutates only this detector's own
/// window and history.
#[derive(Debug, Clone)]
pub struct ZScoreDetector {
    identity: SignalIdentity,
    stats: RollingStatistics,
    trend: AnomalyTrendTracker,
    threshold: f64,
    score_basis: ScoreBasis,
    exclude_anomalies: bool,
    suppress_warmup: bool,

    samples_scored: u64,
    anomalies_flagged: u64,
}

impl ZScoreDetector {
    /// Build a detector, refusing settings no detector can work with.
    pub fn new(identity: SignalIdentity, config: &DetectorConfig) -> Result<Self, DetectorError> {
        if !config.z_score_threshold.is_finite() || config.z_score_threshold <= 0.0 {
            return Err(DetectorError::InvalidThreshold(config.z_score_threshold));
        }
        let stats = RollingStatistics::with_options(
            config.model_window_size,
            config.min_std_floor,
            config.resync_interval,
        )?;
        let trend = AnomalyTrendTracker::new(config.anomaly_list_size)?;

        debug!(
            signal = %identity,
            window = config.model_window_size,
            threshold = config.z_score_threshold,
            basis = ?config.score_basis,
            "Detector created"
        );

        Ok(Self {
            identity,
            stats,
            trend,
            threshold: config.z_score_threshold,
            score_basis: config.score_basis,
            exclude_anomalies: config.exclude_anomalies,
            suppress_warmup: config.suppress_warmup,
            samples_scored: 0,
            anomalies_flagged: 0,
        })
    }

    /// Score one sample and record the outcome.
    ///
    /// A non-finite value is rejected without changing any state.
    pub fn update(
        &mut self,
        value: f64,
        timestamp_millis: u64,
    ) -> Result<DecisionRecord, SkippedSample> {
        let value = ensure_finite("value", value)?;

        let (stats, warming_up) = match self.score_basis {
            ScoreBasis::IncludeCurrent => {
                self.stats.push(value)?;
                (self.stats.score(value), !self.stats.is_full())
            }
            ScoreBasis::PriorWindow => (self.stats.score(value), !self.stats.is_full()),
        };

        let suppressed = self.suppress_warmup && warming_up;
        let is_anomaly = !suppressed && stats.z_score.abs() > self.threshold;

        if self.score_basis == ScoreBasis::PriorWindow && !(self.exclude_anomalies && is_anomaly) {
            self.stats.push(value)?;
        }

        let trend_ratio = if suppressed {
            self.trend.ratio()
        } else {
            self.trend.record(is_anomaly)
        };

        self.samples_scored += 1;
        if is_anomaly {
            self.anomalies_flagged += 1;
            info!(
                signal = %self.identity,
                value,
                mean = stats.mean,
                z = stats.z_score,
                trend = trend_ratio,
                "Anomaly detected"
            );
        }

        Ok(DecisionRecord {
            identity: self.identity.clone(),
            value,
            mean: stats.mean,
            std_dev: stats.std_dev,
            z_score: stats.z_score,
            threshold: self.threshold,
            is_anomaly,
            trend_ratio,
            warming_up,
            timestamp_millis,
        })
    }

    /// Drop all history, keeping the settings.
    pub fn reset(&mut self) {
        self.stats.clear();
        self.trend.clear();
    }

    pub fn identity(&self) -> &SignalIdentity {
        &self.identity
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn window(&self) -> &RollingStatistics {
        &self.stats
    }

    pub fn trend(&self) -> &AnomalyTrendTracker {
        &self.trend
    }

    pub fn samples_scored(&self) -> u64 {
        self.samples_scored
    }

    pub fn anomalies_flagged(&self) -> u64 {
        self.anomalies_flagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(window: usize, threshold: f64) -> DetectorConfig {
        DetectorConfig {
            model_window_size: window,
            anomaly_list_size: window,
            z_score_threshold: threshold,
            ..DetectorConfig::default()
        }
    }

    fn detector(cfg: &DetectorConfig) -> ZScoreDetector {
        ZScoreDetector::new(SignalIdentity::new("L1", "Oven", "temp"), cfg).unwrap()
    }

    #[test]
    fn test_invalid_threshold_is_refused() {
        let id = SignalIdentity::new("L1", "Oven", "temp");
        assert_eq!(
            ZScoreDetector::new(id.clone(), &config(5, 0.0)).unwrap_err(),
            DetectorError::InvalidThreshold(0.0)
        );
        assert!(ZScoreDetector::new(id.clone(), &config(5, f64::INFINITY)).is_err());
        assert_eq!(
            ZScoreDetector::new(id, &config(1, 2.0)).unwrap_err(),
            DetectorError::WindowTooSmall(1)
        );
    }

    #[test]
    fn test_first_sample_is_never_flagged() {
        let mut d = detector(&config(5, 0.5));
        let record = d.update(1_000.0, 1).unwrap();
        assert_eq!(record.z_score, 0.0);
        assert!(!record.is_anomaly);
        assert!(record.warming_up);
    }

    #[test]
    fn test_strict_threshold() {
        // Window [0, 0, 0, 0, 10]: z of the final sample is exactly 2
        let mut d = detector(&config(5, 2.0));
        for ts in 0..4 {
            d.update(0.0, ts).unwrap();
        }
        let record = d.update(10.0, 4).unwrap();
        assert!((record.z_score - 2.0).abs() < 1e-12);
        assert!(!record.is_anomaly, "|z| == threshold must not flag");

        let mut d = detector(&config(5, 1.9));
        for ts in 0..4 {
            d.update(0.0, ts).unwrap();
        }
        assert!(d.update(10.0, 4).unwrap().is_anomaly);
        assert_eq!(d.anomalies_flagged(), 1);
    }

    #[test]
    fn test_warmup_suppression() {
        let cfg = DetectorConfig {
            suppress_warmup: true,
            ..config(5, 1.0)
        };
        let mut d = detector(&cfg);
        for ts in 0..3 {
            d.update(0.0, ts).unwrap();
        }
        let record = d.update(10.0, 3).unwrap();
        assert!(record.warming_up);
        assert!(!record.is_anomaly);
        assert_eq!(d.trend().len(), 0, "suppressed samples are not tracked");
    }

    #[test]
    fn test_prior_window_excludes_anomalies() {
        let cfg = DetectorConfig {
            score_basis: ScoreBasis::PriorWindow,
            exclude_anomalies: true,
            min_std_floor: 0.001,
            ..config(4, 3.0)
        };
        let mut d = detector(&cfg);
        for ts in 0..4 {
            d.update(5.0, ts).unwrap();
        }
        let spike = d.update(50.0, 4).unwrap();
        assert!(spike.is_anomaly);
        assert!(!spike.warming_up);
        assert_eq!(
            d.window().values().collect::<Vec<_>>(),
            vec![5.0, 5.0, 5.0, 5.0],
            "anomalous value must not enter the window"
        );
        // History of 4: [false, false, false, true]
        assert!((spike.trend_ratio - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut d = detector(&config(3, 2.0));
        d.update(1.0, 0).unwrap();
        d.update(2.0, 1).unwrap();
        d.reset();
        assert!(d.window().is_empty());
        assert!(d.trend().is_empty());
        assert_eq!(d.samples_scored(), 2);
    }
}
