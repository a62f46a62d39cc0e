//! Cycle boundary detection from the running flag and the sync pulse.

use tracing::debug;

use crate::config::CycleTrigger;
use crate::types::CloseReason;

/// Segmenter state. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Open { started_at: u64 },
}

/// What one observation did to the cycle.
///
/// The variant tells the caller whether the observation itself belongs to
/// the cycle that just opened, continued, or closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStep {
    /// No cycle open. The observation is not part of any cycle.
    Idle,
    /// A cycle opened; the observation is its first sample.
    Opened,
    /// The observation belongs to the open cycle.
    Continued,
    /// The observation is the last sample of a cycle that is now closed.
    ClosedAt(CloseReason),
    /// The cycle closed before this observation, which is not part of it.
    ClosedBefore(CloseReason),
    /// The observation ends one cycle (as its last sample) and starts the
    /// next (as its first).
    Rolled,
}

/// Edge-triggered state machine over `(running, pulse, timestamp)`.
///
/// Under the pulse policies one pulse period is one cycle, and a running
/// falling edge before the next pulse cuts the cycle short. Under
/// `RunningOnly` a cycle spans one run of the device.
#[derive(Debug, Clone)]
pub struct CycleSegmenter {
    trigger: CycleTrigger,
    state: CycleState,
    prev_running: bool,
    prev_pulse: bool,
}

impl CycleSegmenter {
    pub fn new(trigger: CycleTrigger) -> Self {
        Self {
            trigger,
            state: CycleState::Idle,
            prev_running: false,
            prev_pulse: false,
        }
    }

    /// Feed one observation.
    pub fn advance(&mut self, running: bool, pulse: bool, timestamp_millis: u64) -> SegmentStep {
        let pulse_edge = pulse && !self.prev_pulse;
        let run_rise = running && !self.prev_running;
        let run_fall = !running && self.prev_running;
        self.prev_running = running;
        self.prev_pulse = pulse;

        let step = match (self.trigger, self.state) {
            (CycleTrigger::RunningOnly, CycleState::Idle) => {
                if run_rise {
                    SegmentStep::Opened
                } else {
                    SegmentStep::Idle
                }
            }
            (CycleTrigger::RunningOnly, CycleState::Open { .. }) => {
                if run_fall {
                    SegmentStep::ClosedBefore(CloseReason::RunCompleted)
                } else {
                    SegmentStep::Continued
                }
            }
            (_, CycleState::Idle) => {
                if self.opens(pulse_edge, running) {
                    SegmentStep::Opened
                } else {
                    SegmentStep::Idle
                }
            }
            (_, CycleState::Open { .. }) => {
                if pulse_edge {
                    if self.opens(pulse_edge, running) {
                        SegmentStep::Rolled
                    } else {
                        SegmentStep::ClosedAt(CloseReason::PulsePeriod)
                    }
                } else if run_fall {
                    SegmentStep::ClosedBefore(CloseReason::DeviceStopped)
                } else {
                    SegmentStep::Continued
                }
            }
        };

        match step {
            SegmentStep::Opened | SegmentStep::Rolled => {
                self.state = CycleState::Open {
                    started_at: timestamp_millis,
                };
                debug!(at = timestamp_millis, ?step, "Cycle opened");
            }
            SegmentStep::ClosedAt(_) | SegmentStep::ClosedBefore(_) => {
                self.state = CycleState::Idle;
            }
            SegmentStep::Idle | SegmentStep::Continued => {}
        }

        step
    }

    fn opens(&self, pulse_edge: bool, running: bool) -> bool {
        match self.trigger {
            CycleTrigger::PulseAndRunning => pulse_edge && running,
            CycleTrigger::PulseOnly => pulse_edge,
            CycleTrigger::RunningOnly => false,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, CycleState::Open { .. })
    }

    pub fn trigger(&self) -> CycleTrigger {
        self.trigger
    }

    /// Back to Idle with both edge detectors low.
    pub fn reset(&mut self) {
        self.state = CycleState::Idle;
        self.prev_running = false;
        self.prev_pulse = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simultaneous_start_and_pulse_opens() {
        let mut seg = CycleSegmenter::new(CycleTrigger::PulseAndRunning);
        assert_eq!(seg.advance(false, false, 0), SegmentStep::Idle);
        assert_eq!(seg.advance(true, true, 100), SegmentStep::Opened);
        assert_eq!(seg.state(), CycleState::Open { started_at: 100 });
        assert_eq!(seg.advance(true, false, 200), SegmentStep::Continued);
        assert_eq!(
            seg.advance(false, false, 300),
            SegmentStep::ClosedBefore(CloseReason::DeviceStopped)
        );
        assert!(!seg.is_open());
    }

    #[test]
    fn test_pulse_without_running_does_not_open() {
        let mut seg = CycleSegmenter::new(CycleTrigger::PulseAndRunning);
        assert_eq!(seg.advance(false, true, 0), SegmentStep::Idle);
        // Held pulse is not an edge
        assert_eq!(seg.advance(true, true, 1), SegmentStep::Idle);
        assert_eq!(seg.advance(true, false, 2), SegmentStep::Idle);
        assert_eq!(seg.advance(true, true, 3), SegmentStep::Opened);
    }

    #[test]
    fn test_next_pulse_rolls_into_new_cycle() {
        let mut seg = CycleSegmenter::new(CycleTrigger::PulseAndRunning);
        seg.advance(true, true, 0);
        seg.advance(true, false, 10);
        assert_eq!(seg.advance(true, true, 20), SegmentStep::Rolled);
        assert_eq!(seg.state(), CycleState::Open { started_at: 20 });
    }

    #[test]
    fn test_pulse_only_closes_at_pulse_when_stopped() {
        let mut seg = CycleSegmenter::new(CycleTrigger::PulseOnly);
        assert_eq!(seg.advance(false, true, 0), SegmentStep::Opened);
        seg.advance(false, false, 10);
        assert_eq!(seg.advance(false, true, 20), SegmentStep::Rolled);

        let mut seg = CycleSegmenter::new(CycleTrigger::PulseAndRunning);
        seg.advance(true, true, 0);
        seg.advance(true, false, 10);
        // Pulse edge and stop together: the period completed
        assert_eq!(
            seg.advance(false, true, 20),
            SegmentStep::ClosedAt(CloseReason::PulsePeriod)
        );
    }

    #[test]
    fn test_running_only_ignores_pulse() {
        let mut seg = CycleSegmenter::new(CycleTrigger::RunningOnly);
        assert_eq!(seg.advance(false, true, 0), SegmentStep::Idle);
        assert_eq!(seg.advance(true, false, 10), SegmentStep::Opened);
        assert_eq!(seg.advance(true, true, 20), SegmentStep::Continued);
        assert_eq!(
            seg.advance(false, false, 30),
            SegmentStep::ClosedBefore(CloseReason::RunCompleted)
        );
    }

    #[test]
    fn test_stop_while_idle_is_noop() {
        let mut seg = CycleSegmenter::new(CycleTrigger::PulseAndRunning);
        seg.advance(true, false, 0);
        assert_eq!(seg.advance(false, false, 10), SegmentStep::Idle);
        assert_eq!(seg.advance(false, false, 20), SegmentStep::Idle);
        assert_eq!(seg.state(), CycleState::Idle);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut seg = CycleSegmenter::new(CycleTrigger::PulseAndRunning);
        seg.advance(true, true, 0);
        seg.reset();
        assert_eq!(seg.state(), CycleState::Idle);
        // Edge detectors are low again, so a held pulse re-triggers
        assert_eq!(seg.advance(true, true, 10), SegmentStep::Opened);
    }
}
