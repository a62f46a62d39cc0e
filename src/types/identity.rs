//! Signal identity: the (line, machine, signal) key every detector is owned by.

use serde::{Deserialize, Serialize};

/// Uniquely names one monitored signal on one machine of one production line.
///
/// One `ZScoreDetector` (and, for electrical devices, one cycle segmenter /
/// integrator pair) exists per identity. Derived metrics such as the cycle
/// integral get their own identity via [`SignalIdentity::derived`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalIdentity {
    pub line_name: String,
    pub machine_name: String,
    pub signal_name: String,
}

impl SignalIdentity {
    pub fn new(
        line_name: impl Into<String>,
        machine_name: impl Into<String>,
        signal_name: impl Into<String>,
    ) -> Self {
        Self {
            line_name: line_name.into(),
            machine_name: machine_name.into(),
            signal_name: signal_name.into(),
        }
    }

    /// Identity of a metric derived from this signal, e.g. `press.integral`.
    pub fn derived(&self, metric: &str) -> Self {
        Self {
            line_name: self.line_name.clone(),
            machine_name: self.machine_name.clone(),
            signal_name: format!("{}.{}", self.signal_name, metric),
        }
    }

    /// Slash-joined key used for storage prefixes and log fields.
    pub fn storage_key(&self) -> String {
        format!("{}/{}/{}", self.line_name, self.machine_name, self.signal_name)
    }
}

impl std::fmt::Display for SignalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.line_name, self.machine_name, self.signal_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_identity_keeps_line_and_machine() {
        let id = SignalIdentity::new("L1", "Press", "main_motor");
        let integral = id.derived("integral");
        assert_eq!(integral.line_name, "L1");
        assert_eq!(integral.machine_name, "Press");
        assert_eq!(integral.signal_name, "main_motor.integral");
        assert_ne!(id, integral);
    }

    #[test]
    fn display_matches_storage_key() {
        let id = SignalIdentity::new("L1", "Press", "vib");
        assert_eq!(id.to_string(), "L1/Press/vib");
        assert_eq!(id.storage_key(), id.to_string());
    }
}
