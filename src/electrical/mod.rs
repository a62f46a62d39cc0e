//! Cycle-Scoped Electrical Analytics
//!
//! Splits a power meter's sample stream into machine cycles and reports, per
//! cycle, the integral of a chosen power quantity, three-phase current
//! asymmetry, and inrush peaks. The integral and inrush magnitude are then
//! scored by their own z-score detectors.
//!
//! ## Data Flow
//!
//! ```text
//! ElectricalMessage -> CycleSegmenter.advance
//!     open:   CycleIntegrator.accumulate + phase averages + current trace
//!     close:  integral, asymmetry, inrush -> CycleResult
//!             integral -> ZScoreDetector ("<device>.integral")
//!             max peak -> ZScoreDetector ("<device>.inrush")
//! ```

pub mod asymmetry;
pub mod inrush;
mod integrator;
mod orchestrator;
mod segmenter;

pub use integrator::CycleIntegrator;
pub use orchestrator::AnalyticsOrchestrator;
pub use segmenter::{CycleSegmenter, CycleState, SegmentStep};

use crate::config::{InrushSource, IntegralSource};
use crate::types::ElectricalData;

impl IntegralSource {
    /// The quantity this source integrates, read from one sample.
    pub fn value_from(self, data: &ElectricalData) -> f64 {
        match self {
            IntegralSource::ActivePowerTotal => data.active_power_total,
            IntegralSource::ReactivePowerTotal => data.reactive_power_total,
            IntegralSource::ApparentPowerTotal => data.apparent_power_total,
            IntegralSource::PhaseCurrentSum => data.phase_currents().iter().sum(),
        }
    }
}

impl InrushSource {
    /// The current this source contributes to the inrush trace.
    pub fn value_from(self, currents: [f64; 3]) -> f64 {
        match self {
            InrushSource::MaxPhaseCurrent => currents[0].max(currents[1]).max(currents[2]),
            InrushSource::MeanPhaseCurrent => currents.iter().sum::<f64>() / 3.0,
            InrushSource::L1 => currents[0],
            InrushSource::L2 => currents[1],
            InrushSource::L3 => currents[2],
        }
    }
}
