//! Per-identity monitor ownership for a process hosting many signals.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::info;

use super::{MonitorError, RouteOutcome, VibrationMonitor};
use crate::config::{
    DetectorConfig, ElectricalConfig, IdentityConfig, MonitorConfig, VibrationConfig,
};
use crate::detector::{DetectorError, ZScoreDetector};
use crate::electrical::AnalyticsOrchestrator;
use crate::types::{AnalyticsRecord, Message, SignalIdentity, StateRecord};

/// Routes each message to the monitor owned by its identity, creating
/// monitors on first sight.
///
/// The registry is owned by a single processing task, so every monitor has
/// exactly one writer and no locking is needed.
#[derive(Debug)]
pub struct MonitorRegistry {
    filter: IdentityConfig,
    detector: DetectorConfig,
    electrical: ElectricalConfig,
    vibration: VibrationConfig,

    signals: HashMap<SignalIdentity, ZScoreDetector>,
    vibrations: HashMap<SignalIdentity, VibrationMonitor>,
    devices: HashMap<SignalIdentity, AnalyticsOrchestrator>,
}

impl MonitorRegistry {
    /// Build an empty registry. Fails if the detector settings could never
    /// produce a detector, so the error surfaces at startup.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, DetectorError> {
        ZScoreDetector::new(SignalIdentity::new("", "", ""), &config.detector)?;

        if !config.identity.is_wildcard() {
            info!(
                line = %config.identity.line_name,
                machine = %config.identity.machine_name,
                signal = %config.identity.signal_name,
                "Identity filter active"
            );
        }

        Ok(Self {
            filter: config.identity.clone(),
            detector: config.detector.clone(),
            electrical: config.electrical.clone(),
            vibration: config.vibration.clone(),
            signals: HashMap::new(),
            vibrations: HashMap::new(),
            devices: HashMap::new(),
        })
    }

    /// Hand a message to its monitor.
    pub fn route(&mut self, msg: &Message) -> Result<RouteOutcome, MonitorError> {
        let identity = msg.identity();
        if !self.filter.matches(&identity) {
            return Ok(RouteOutcome::Filtered);
        }

        let records = match msg {
            Message::Signal(m) => {
                let detector = match self.signals.entry(identity) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let detector = ZScoreDetector::new(e.key().clone(), &self.detector)
                            .map_err(|source| MonitorError::Detector {
                                identity: e.key().clone(),
                                source,
                            })?;
                        info!(signal = %e.key(), "Signal monitor created");
                        e.insert(detector)
                    }
                };
                vec![AnalyticsRecord::Decision(
                    detector.update(m.signal_value, m.timestamp_millis)?,
                )]
            }
            Message::Vibration(m) => {
                let monitor = match self.vibrations.entry(identity) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let monitor = VibrationMonitor::new(
                            e.key().clone(),
                            &self.detector,
                            self.vibration.per_axis,
                        )
                        .map_err(|source| MonitorError::Detector {
                            identity: e.key().clone(),
                            source,
                        })?;
                        info!(sensor = %e.key(), per_axis = self.vibration.per_axis, "Vibration monitor created");
                        e.insert(monitor)
                    }
                };
                monitor.on_sample(m)?
            }
            Message::Electrical(m) => {
                let orchestrator = match self.devices.entry(identity) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let orchestrator = AnalyticsOrchestrator::new(
                            e.key().clone(),
                            &self.detector,
                            &self.electrical,
                        )
                        .map_err(|source| MonitorError::Detector {
                            identity: e.key().clone(),
                            source,
                        })?;
                        info!(
                            device = %e.key(),
                            trigger = ?self.electrical.cycle_trigger,
                            "Electrical monitor created"
                        );
                        e.insert(orchestrator)
                    }
                };
                orchestrator.on_electrical_sample(m)?
            }
            Message::State(m) => vec![AnalyticsRecord::State(StateRecord {
                identity,
                value: m.state_value,
                timestamp_millis: m.timestamp_millis,
            })],
        };

        Ok(RouteOutcome::Records(records))
    }

    /// Discard every open cycle. Returns how many were open.
    pub fn shutdown(&mut self) -> usize {
        self.devices
            .values_mut()
            .filter_map(AnalyticsOrchestrator::shutdown)
            .count()
    }

    /// Number of monitors of every kind.
    pub fn monitor_count(&self) -> usize {
        self.signals.len() + self.vibrations.len() + self.devices.len()
    }

    pub fn signal_detector(&self, identity: &SignalIdentity) -> Option<&ZScoreDetector> {
        self.signals.get(identity)
    }

    pub fn vibration_monitor(&self, identity: &SignalIdentity) -> Option<&VibrationMonitor> {
        self.vibrations.get(identity)
    }

    pub fn orchestrator(&self, identity: &SignalIdentity) -> Option<&AnalyticsOrchestrator> {
        self.devices.get(identity)
    }
}
