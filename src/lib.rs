//! linewatch: streaming signal analytics for production-line sensors
//!
//! Scores every incoming sample against a rolling window of its own signal
//! and segments power-meter streams into machine cycles.
//!
//! ## Architecture
//!
//! - **Detector**: rolling mean/stddev, z-score decision, anomaly trend ratio
//! - **Electrical**: cycle segmentation, energy integral, phase asymmetry,
//!   inrush peaks, and anomaly scoring of the per-cycle metrics
//! - **Monitor**: one monitor per signal identity, created on first sight
//! - **Pipeline**: message sources, the processing loop, record sinks

pub mod config;
pub mod detector;
pub mod electrical;
pub mod monitor;
pub mod pipeline;
pub mod types;

pub use config::{ConfigError, MonitorConfig};
pub use detector::{AnomalyTrendTracker, DetectorError, RollingStatistics, SkippedSample, ZScoreDetector};
pub use electrical::{AnalyticsOrchestrator, CycleIntegrator, CycleSegmenter};
pub use monitor::{MonitorError, MonitorRegistry, RouteOutcome};
pub use pipeline::{PipelineStats, ProcessingLoop};
pub use types::{
    AnalyticsRecord, CloseReason, CycleResult, DecisionRecord, InrushResult, Message,
    SignalIdentity, StateRecord, VibrationRecord,
};
