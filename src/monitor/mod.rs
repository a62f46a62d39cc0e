//! Monitor variants and their per-identity registry.
//!
//! - Signal: one `ZScoreDetector` per generic scalar signal
//! - Vibration: total RMS (and optionally each axis) per sensor
//! - Electrical: one `AnalyticsOrchestrator` per device
//! - State: passed through for persistence, no detection

use thiserror::Error;

use crate::detector::{DetectorError, SkippedSample};
use crate::types::{AnalyticsRecord, SignalIdentity};

mod registry;
mod vibration;

pub use registry::MonitorRegistry;
pub use vibration::{total_rms, VibrationMonitor};

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Zero or more records produced by the owning monitor.
    Records(Vec<AnalyticsRecord>),
    /// The identity is outside this process's filter.
    Filtered,
}

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Per-sample and recoverable.
    #[error(transparent)]
    Skipped(#[from] SkippedSample),

    /// The monitor for a new identity could not be built.
    #[error("cannot create monitor for {identity}: {source}")]
    Detector {
        identity: SignalIdentity,
        #[source]
        source: DetectorError,
    },
}
