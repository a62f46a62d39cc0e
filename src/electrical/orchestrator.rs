//! Per-device electrical analytics: segmentation, integration, asymmetry,
//! inrush, and anomaly scoring of the derived cycle metrics.

use tracing::{debug, info, warn};

use super::asymmetry::{self, PhaseCurrentAccumulator};
use super::inrush;
use super::{CycleIntegrator, CycleSegmenter, SegmentStep};
use crate::config::{DetectorConfig, ElectricalConfig};
use crate::detector::{ensure_finite, DetectorError, SkippedSample, ZScoreDetector};
use crate::types::{
    AnalyticsRecord, CloseReason, CycleResult, DecisionRecord, ElectricalMessage, PhaseCycleResult,
    SignalIdentity,
};

/// Accumulators of the cycle currently open.
#[derive(Debug)]
struct OpenCycle {
    started_at: u64,
    integrator: CycleIntegrator,
    currents: PhaseCurrentAccumulator,
    /// Cycle-local current trace scanned for inrush peaks
    trace: Vec<f64>,
    phases: Option<PhaseAccumulators>,
}

/// L1, L2, L3 integrators and traces, per-phase mode only.
#[derive(Debug, Default)]
struct PhaseAccumulators {
    integrators: [CycleIntegrator; 3],
    traces: [Vec<f64>; 3],
}

impl OpenCycle {
    fn new(started_at: u64, per_phase: bool) -> Self {
        Self {
            started_at,
            integrator: CycleIntegrator::new(),
            currents: PhaseCurrentAccumulator::default(),
            trace: Vec::new(),
            phases: per_phase.then(PhaseAccumulators::default),
        }
    }

    fn samples(&self) -> usize {
        self.trace.len()
    }
}

/// Integral and inrush detectors of L1, L2, L3.
#[derive(Debug)]
struct PhaseDetectors {
    integral: [ZScoreDetector; 3],
    inrush: [ZScoreDetector; 3],
}

impl PhaseDetectors {
    fn new(identity: &SignalIdentity, config: &DetectorConfig) -> Result<Self, DetectorError> {
        Ok(Self {
            integral: [
                ZScoreDetector::new(identity.derived("integral_l1"), config)?,
                ZScoreDetector::new(identity.derived("integral_l2"), config)?,
                ZScoreDetector::new(identity.derived("integral_l3"), config)?,
            ],
            inrush: [
                ZScoreDetector::new(identity.derived("inrush_l1"), config)?,
                ZScoreDetector::new(identity.derived("inrush_l2"), config)?,
                ZScoreDetector::new(identity.derived("inrush_l3"), config)?,
            ],
        })
    }
}

/// A sample already checked for finite values.
struct CheckedSample {
    integrand: f64,
    currents: [f64; 3],
    inrush_current: f64,
    timestamp_millis: u64,
}

/// Wires segmenter, integrator, asymmetry, and inrush together for one
/// electrical device, and scores each cycle's integral and inrush magnitude
/// with their own detectors.
#[derive(Debug)]
pub struct AnalyticsOrchestrator {
    identity: SignalIdentity,
    config: ElectricalConfig,
    segmenter: CycleSegmenter,
    cycle: Option<OpenCycle>,
    integral_detector: ZScoreDetector,
    inrush_detector: ZScoreDetector,
    phase_detectors: Option<PhaseDetectors>,

    cycles_closed: u64,
    cycles_discarded: u64,
}

impl AnalyticsOrchestrator {
    pub fn new(
        identity: SignalIdentity,
        detector: &DetectorConfig,
        electrical: &ElectricalConfig,
    ) -> Result<Self, DetectorError> {
        let integral_detector = ZScoreDetector::new(identity.derived("integral"), detector)?;
        let inrush_detector = ZScoreDetector::new(identity.derived("inrush"), detector)?;
        let phase_detectors = if electrical.per_phase {
            Some(PhaseDetectors::new(&identity, detector)?)
        } else {
            None
        };
        Ok(Self {
            segmenter: CycleSegmenter::new(electrical.cycle_trigger),
            config: electrical.clone(),
            identity,
            cycle: None,
            integral_detector,
            inrush_detector,
            phase_detectors,
            cycles_closed: 0,
            cycles_discarded: 0,
        })
    }

    /// Process one power-meter sample.
    ///
    /// Returns nothing while a cycle is open, and on cycle close the
    /// `CycleResult` followed by up to two decisions (integral, inrush),
    /// then in per-phase mode the L1..L3 integral and inrush decisions.
    /// Partial cycles are reported but not scored. A sample with a
    /// non-finite field is rejected before any state changes.
    pub fn on_electrical_sample(
        &mut self,
        msg: &ElectricalMessage,
    ) -> Result<Vec<AnalyticsRecord>, SkippedSample> {
        let sample = self.check(msg)?;

        let step = self
            .segmenter
            .advance(msg.device_state, msg.synch_pulse, msg.timestamp_millis);

        let mut records = Vec::new();
        match step {
            SegmentStep::Idle => {}
            SegmentStep::Opened => {
                self.cycle = Some(OpenCycle::new(sample.timestamp_millis, self.config.per_phase));
                self.absorb(&sample);
            }
            SegmentStep::Continued => self.absorb(&sample),
            SegmentStep::ClosedAt(reason) => {
                self.absorb(&sample);
                self.close(reason, sample.timestamp_millis, &mut records);
            }
            SegmentStep::ClosedBefore(reason) => {
                self.close(reason, sample.timestamp_millis, &mut records);
            }
            SegmentStep::Rolled => {
                self.absorb(&sample);
                self.close(CloseReason::PulsePeriod, sample.timestamp_millis, &mut records);
                self.cycle = Some(OpenCycle::new(sample.timestamp_millis, self.config.per_phase));
                self.absorb(&sample);
            }
        }
        Ok(records)
    }

    fn check(&self, msg: &ElectricalMessage) -> Result<CheckedSample, SkippedSample> {
        let data = &msg.electrical_data;
        let integrand = ensure_finite(
            self.config.integral_source.as_str(),
            self.config.integral_source.value_from(data),
        )?;
        let [l1, l2, l3] = data.phase_currents();
        let currents = [
            ensure_finite("current_l1", l1)?,
            ensure_finite("current_l2", l2)?,
            ensure_finite("current_l3", l3)?,
        ];
        Ok(CheckedSample {
            integrand,
            inrush_current: self.config.inrush_source.value_from(currents),
            currents,
            timestamp_millis: msg.timestamp_millis,
        })
    }

    fn absorb(&mut self, sample: &CheckedSample) {
        let Some(cycle) = self.cycle.as_mut() else {
            // Cycle was dropped after overflowing; wait for the next one
            return;
        };

        if cycle.samples() >= self.config.max_cycle_samples {
            warn!(
                device = %self.identity,
                started_at = cycle.started_at,
                samples = cycle.samples(),
                "Cycle exceeded max_cycle_samples, discarding"
            );
            self.cycle = None;
            self.cycles_discarded += 1;
            return;
        }

        // Values were checked in `check`, accumulate cannot reject them
        if cycle
            .integrator
            .accumulate(sample.integrand, sample.timestamp_millis)
            .is_ok()
        {
            cycle.currents.add(sample.currents);
            cycle.trace.push(sample.inrush_current);

            if let Some(phases) = cycle.phases.as_mut() {
                let channels = phases.integrators.iter_mut().zip(phases.traces.iter_mut());
                for ((integrator, trace), current) in channels.zip(sample.currents) {
                    if integrator.accumulate(current, sample.timestamp_millis).is_ok() {
                        trace.push(current);
                    }
                }
            }
        }
    }

    fn close(&mut self, reason: CloseReason, ended_at: u64, records: &mut Vec<AnalyticsRecord>) {
        let Some(mut cycle) = self.cycle.take() else {
            return;
        };

        if cycle.samples() < self.config.min_cycle_samples {
            debug!(
                device = %self.identity,
                samples = cycle.samples(),
                min = self.config.min_cycle_samples,
                "Cycle too short, discarded"
            );
            self.cycles_discarded += 1;
            return;
        }

        let unit = self.config.integral_time_unit;
        let integral = unit.convert(cycle.integrator.finalize());
        let average_phase_currents = cycle.currents.averages();
        let asymmetry = asymmetry::compute_with(self.config.asymmetry_method, average_phase_currents);
        let inrush = inrush::detect(
            &cycle.trace,
            self.config.current_peak_height,
            self.config.current_peak_number,
        );
        let partial = reason.is_partial();
        let peak_number = self.config.current_peak_number;
        let phases: Option<[PhaseCycleResult; 3]> = cycle.phases.as_mut().map(|acc| {
            std::array::from_fn(|i| {
                let (inrush_current, peak_count) =
                    inrush::nth_peak(&acc.traces[i], self.config.current_peak_height, peak_number);
                PhaseCycleResult {
                    current_integral: unit.convert(acc.integrators[i].finalize()),
                    peak_count,
                    inrush_current,
                }
            })
        });

        let result = CycleResult {
            identity: self.identity.clone(),
            cycle_start_millis: cycle.started_at,
            cycle_end_millis: ended_at,
            sample_count: cycle.samples(),
            integral,
            integral_unit: unit.label().to_string(),
            asymmetry,
            average_phase_currents,
            inrush,
            phases: phases.clone(),
            partial,
            close_reason: reason,
        };
        self.cycles_closed += 1;

        info!(
            device = %self.identity,
            reason = %reason,
            samples = result.sample_count,
            duration_ms = result.duration_millis(),
            integral = result.integral,
            asymmetry = result.asymmetry,
            peaks = result.inrush.peak_count,
            "Cycle closed"
        );

        let max_peak = result.inrush.max_peak_magnitude;
        records.push(AnalyticsRecord::Cycle(result));

        if partial {
            return;
        }

        push_scored(
            records,
            &self.identity,
            self.integral_detector.update(integral, ended_at),
        );
        if let Some(magnitude) = max_peak {
            push_scored(
                records,
                &self.identity,
                self.inrush_detector.update(magnitude, ended_at),
            );
        }

        if let (Some(detectors), Some(phases)) = (self.phase_detectors.as_mut(), phases) {
            for (detector, phase) in detectors.integral.iter_mut().zip(&phases) {
                push_scored(
                    records,
                    &self.identity,
                    detector.update(phase.current_integral, ended_at),
                );
            }
            for (detector, phase) in detectors.inrush.iter_mut().zip(&phases) {
                if let Some(current) = phase.inrush_current {
                    push_scored(records, &self.identity, detector.update(current, ended_at));
                }
            }
        }
    }

    /// Discard any open cycle. Returns its sample count, if one was open.
    ///
    /// An unfinished cycle has no closing boundary, so it is dropped rather
    /// than finalized.
    pub fn shutdown(&mut self) -> Option<usize> {
        self.segmenter.reset();
        let cycle = self.cycle.take()?;
        info!(
            device = %self.identity,
            started_at = cycle.started_at,
            samples = cycle.samples(),
            "Discarding open cycle on shutdown"
        );
        Some(cycle.samples())
    }

    pub fn identity(&self) -> &SignalIdentity {
        &self.identity
    }

    pub fn is_cycle_open(&self) -> bool {
        self.cycle.is_some()
    }

    pub fn open_cycle_samples(&self) -> usize {
        self.cycle.as_ref().map_or(0, OpenCycle::samples)
    }

    pub fn segmenter(&self) -> &CycleSegmenter {
        &self.segmenter
    }

    pub fn integral_detector(&self) -> &ZScoreDetector {
        &self.integral_detector
    }

    pub fn inrush_detector(&self) -> &ZScoreDetector {
        &self.inrush_detector
    }

    /// L1..L3 integral detectors, per-phase mode only.
    pub fn phase_integral_detectors(&self) -> Option<&[ZScoreDetector; 3]> {
        self.phase_detectors.as_ref().map(|d| &d.integral)
    }

    /// L1..L3 inrush detectors, per-phase mode only.
    pub fn phase_inrush_detectors(&self) -> Option<&[ZScoreDetector; 3]> {
        self.phase_detectors.as_ref().map(|d| &d.inrush)
    }

    pub fn cycles_closed(&self) -> u64 {
        self.cycles_closed
    }

    /// Cycles dropped for being too short or too long.
    pub fn cycles_discarded(&self) -> u64 {
        self.cycles_discarded
    }
}

fn push_scored(
    records: &mut Vec<AnalyticsRecord>,
    device: &SignalIdentity,
    scored: Result<DecisionRecord, SkippedSample>,
) {
    match scored {
        Ok(decision) => records.push(AnalyticsRecord::CycleMetric(decision)),
        Err(e) => warn!(device = %device, error = %e, "Cycle metric not scored"),
    }
}
