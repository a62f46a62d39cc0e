//! Vibration monitor: total RMS acceleration, optionally each axis too.

use super::MonitorError;
use crate::config::DetectorConfig;
use crate::detector::{ensure_finite, DetectorError, ZScoreDetector};
use crate::types::{AnalyticsRecord, SignalIdentity, VibrationMessage, VibrationRecord};

/// `sqrt(x^2 + y^2 + z^2)` of the three axis RMS values.
pub fn total_rms(x: f64, y: f64, z: f64) -> f64 {
    (x * x + y * y + z * z).sqrt()
}

/// Detectors for one vibration sensor.
#[derive(Debug, Clone)]
pub struct VibrationMonitor {
    identity: SignalIdentity,
    total: ZScoreDetector,
    /// X, Y, Z detectors when per-axis scoring is on
    axes: Option<[ZScoreDetector; 3]>,
}

impl VibrationMonitor {
    pub fn new(
        identity: SignalIdentity,
        config: &DetectorConfig,
        per_axis: bool,
    ) -> Result<Self, DetectorError> {
        let axes = if per_axis {
            Some([
                ZScoreDetector::new(identity.derived("x"), config)?,
                ZScoreDetector::new(identity.derived("y"), config)?,
                ZScoreDetector::new(identity.derived("z"), config)?,
            ])
        } else {
            None
        };
        Ok(Self {
            total: ZScoreDetector::new(identity.clone(), config)?,
            identity,
            axes,
        })
    }

    /// Score one reading. Emits the `VibrationRecord` first, then one
    /// decision per axis when per-axis scoring is on.
    pub fn on_sample(&mut self, msg: &VibrationMessage) -> Result<Vec<AnalyticsRecord>, MonitorError> {
        let x = ensure_finite("vib_accel_tot_rms_x", msg.vib_accel_tot_rms_x)?;
        let y = ensure_finite("vib_accel_tot_rms_y", msg.vib_accel_tot_rms_y)?;
        let z = ensure_finite("vib_accel_tot_rms_z", msg.vib_accel_tot_rms_z)?;
        let rms_total = total_rms(x, y, z);

        let decision = self.total.update(rms_total, msg.timestamp_millis)?;
        let mut records = vec![AnalyticsRecord::Vibration(VibrationRecord {
            identity: self.identity.clone(),
            rms_x: x,
            rms_y: y,
            rms_z: z,
            rms_total,
            decision,
        })];

        if let Some(axes) = self.axes.as_mut() {
            for (detector, value) in axes.iter_mut().zip([x, y, z]) {
                records.push(AnalyticsRecord::Decision(
                    detector.update(value, msg.timestamp_millis)?,
                ));
            }
        }

        Ok(records)
    }

    pub fn identity(&self) -> &SignalIdentity {
        &self.identity
    }

    pub fn total_detector(&self) -> &ZScoreDetector {
        &self.total
    }

    pub fn per_axis(&self) -> bool {
        self.axes.is_some()
    }
}
