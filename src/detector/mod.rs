//! Rolling Z-Score Anomaly Detection
//!
//! Per-signal stateful detectors that score every sample against a bounded
//! window of recent history.
//!
//! ## Architecture
//!
//! - `RollingStatistics`: bounded window with running mean / variance
//! - `AnomalyTrendTracker`: bounded history of anomaly flags, reports the
//!   fraction flagged
//! - `ZScoreDetector`: the two composed into one unit per `SignalIdentity`
//!
//! ## Usage
//!
//! ```ignore
//! let mut detector = ZScoreDetector::new(identity, &config.detector)?;
//!
//! let decision = detector.update(181.5, timestamp_millis)?;
//! if decision.is_anomaly {
//!     // persist / alert
//! }
//! ```
//!
//! Detectors never share state. A process hosting many identities owns one
//! detector per identity (see `monitor::MonitorRegistry`).

use thiserror::Error;

use crate::config::defaults::MIN_MODEL_WINDOW_SIZE;

mod rolling;
mod trend;
mod zscore;

pub use rolling::{RollingStatistics, WindowStats};
pub use trend::AnomalyTrendTracker;
pub use zscore::ZScoreDetector;

// ============================================================================
// Error Types
// ============================================================================

/// A detector cannot be built from the given settings.
///
/// Returned at construction time only; a running detector never fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("model window size {0} is too small (minimum {MIN_MODEL_WINDOW_SIZE})")]
    WindowTooSmall(usize),

    #[error("anomaly history size must be at least 1")]
    EmptyHistory,

    #[error("z-score threshold {0} must be a finite number > 0")]
    InvalidThreshold(f64),

    #[error("standard deviation floor {0} must be a finite number >= 0")]
    InvalidStdFloor(f64),
}

/// A sample was rejected before touching any state.
///
/// Recoverable and per-sample: the caller logs it, counts it, and moves on.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("skipped sample: {field} is not finite ({value})")]
pub struct SkippedSample {
    pub field: &'static str,
    pub value: f64,
}

/// Pass finite values through, reject NaN and infinities.
pub fn ensure_finite(field: &'static str, value: f64) -> Result<f64, SkippedSample> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SkippedSample { field, value })
    }
}
