//! Output records handed to the persistence sink.
//!
//! Records are plain owned data. Once emitted the engine keeps no reference
//! to them.

use serde::{Deserialize, Serialize};

use super::SignalIdentity;

// ============================================================================
// Decision Record
// ============================================================================

/// Outcome of scoring one sample with a `ZScoreDetector`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub identity: SignalIdentity,
    pub value: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub threshold: f64,
    pub is_anomaly: bool,
    /// Fraction of recent samples flagged anomalous, in `[0, 1]`.
    pub trend_ratio: f64,
    /// Model window was not yet full when this sample was scored.
    pub warming_up: bool,
    pub timestamp_millis: u64,
}

// ============================================================================
// Cycle Result
// ============================================================================

/// Why a cycle was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Next synchronisation pulse edge: one full pulse period.
    PulsePeriod,
    /// Device stopped before the next pulse edge.
    DeviceStopped,
    /// Running-state cycle ended normally (running-only trigger policy).
    RunCompleted,
}

impl CloseReason {
    /// A cycle cut short by a device stop carries a misleading integral.
    pub fn is_partial(self) -> bool {
        matches!(self, CloseReason::DeviceStopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::PulsePeriod => "pulse_period",
            CloseReason::DeviceStopped => "device_stopped",
            CloseReason::RunCompleted => "run_completed",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Peak analysis of the cycle-local current trace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InrushResult {
    pub peak_count: usize,
    /// Largest qualifying peak, `None` when no peak qualified.
    pub max_peak_magnitude: Option<f64>,
    /// First qualifying peak in trace order.
    pub first_peak_magnitude: Option<f64>,
    /// `peak_count >= CURRENT_PEAK_NUMBER`. Informational only.
    pub inrush_detected: bool,
}

/// One phase current's analytics over a closed cycle (per-phase mode).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseCycleResult {
    /// Integral of the phase current, same time base as `integral_unit`.
    pub current_integral: f64,
    pub peak_count: usize,
    /// The `CURRENT_PEAK_NUMBER`-th qualifying peak, taken as this phase's
    /// inrush current. `None` when the trace has fewer peaks.
    pub inrush_current: Option<f64>,
}

/// Electrical analytics of one closed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub identity: SignalIdentity,
    pub cycle_start_millis: u64,
    pub cycle_end_millis: u64,
    pub sample_count: usize,
    pub integral: f64,
    /// Unit of `integral`, e.g. `"value*ms"`.
    pub integral_unit: String,
    pub asymmetry: f64,
    /// Cycle-average RMS current of L1, L2, L3.
    pub average_phase_currents: [f64; 3],
    pub inrush: InrushResult,
    /// L1, L2, L3 analytics when per-phase mode is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases: Option<[PhaseCycleResult; 3]>,
    pub partial: bool,
    pub close_reason: CloseReason,
}

impl CycleResult {
    pub fn duration_millis(&self) -> u64 {
        self.cycle_end_millis.saturating_sub(self.cycle_start_millis)
    }
}

// ============================================================================
// Vibration / State
// ============================================================================

/// Vibration axes plus the decision on their combined RMS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VibrationRecord {
    pub identity: SignalIdentity,
    pub rms_x: f64,
    pub rms_y: f64,
    pub rms_z: f64,
    pub rms_total: f64,
    pub decision: DecisionRecord,
}

/// Discrete state passed through for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub identity: SignalIdentity,
    pub value: i64,
    pub timestamp_millis: u64,
}

// ============================================================================
// Analytics Record
// ============================================================================

/// Anything the engine emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyticsRecord {
    Decision(DecisionRecord),
    /// Decision on a metric derived from a closed cycle (integral, inrush).
    CycleMetric(DecisionRecord),
    Cycle(CycleResult),
    Vibration(VibrationRecord),
    State(StateRecord),
}

impl AnalyticsRecord {
    pub fn identity(&self) -> &SignalIdentity {
        match self {
            AnalyticsRecord::Decision(r) | AnalyticsRecord::CycleMetric(r) => &r.identity,
            AnalyticsRecord::Cycle(r) => &r.identity,
            AnalyticsRecord::Vibration(r) => &r.identity,
            AnalyticsRecord::State(r) => &r.identity,
        }
    }

    /// The decision carried by this record, if any.
    pub fn decision(&self) -> Option<&DecisionRecord> {
        match self {
            AnalyticsRecord::Decision(r) | AnalyticsRecord::CycleMetric(r) => Some(r),
            AnalyticsRecord::Vibration(r) => Some(&r.decision),
            AnalyticsRecord::Cycle(_) | AnalyticsRecord::State(_) => None,
        }
    }

    /// Timestamp the record is stored under. Cycles use their end time.
    pub fn timestamp_millis(&self) -> u64 {
        match self {
            AnalyticsRecord::Decision(r) | AnalyticsRecord::CycleMetric(r) => r.timestamp_millis,
            AnalyticsRecord::Cycle(r) => r.cycle_end_millis,
            AnalyticsRecord::Vibration(r) => r.decision.timestamp_millis,
            AnalyticsRecord::State(r) => r.timestamp_millis,
        }
    }

    /// The `kind` tag, also used as the sled tree name.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyticsRecord::Decision(_) => "decision",
            AnalyticsRecord::CycleMetric(_) => "cycle_metric",
            AnalyticsRecord::Cycle(_) => "cycle",
            AnalyticsRecord::Vibration(_) => "vibration",
            AnalyticsRecord::State(_) => "state",
        }
    }

    /// True for any decision that flagged an anomaly.
    pub fn is_anomaly(&self) -> bool {
        match self {
            AnalyticsRecord::Decision(r) | AnalyticsRecord::CycleMetric(r) => r.is_anomaly,
            AnalyticsRecord::Vibration(r) => r.decision.is_anomaly,
            AnalyticsRecord::Cycle(_) | AnalyticsRecord::State(_) => false,
        }
    }
}
