//! Input message payloads as delivered by the transport collaborator.
//!
//! Field names follow the plant's JSON convention (`LineName`, `TimeStamp`,
//! ...). One JSON object is one measurement cycle of one sensor or device.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use super::SignalIdentity;

/// Any message the pipeline accepts.
///
/// Variants are tried in declaration order; each is distinguished by a field
/// only it carries (`ElectricalData`, `VibAccelTotRmsX`, `SignalValue`,
/// `StateValue`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Electrical(ElectricalMessage),
    Vibration(VibrationMessage),
    Signal(SignalMessage),
    State(StateMessage),
}

impl Message {
    /// Identity of the sensor/device that produced the message.
    pub fn identity(&self) -> SignalIdentity {
        match self {
            Message::Electrical(m) => m.identity(),
            Message::Vibration(m) => m.identity(),
            Message::Signal(m) => m.identity(),
            Message::State(m) => m.identity(),
        }
    }

    pub fn timestamp_millis(&self) -> u64 {
        match self {
            Message::Electrical(m) => m.timestamp_millis,
            Message::Vibration(m) => m.timestamp_millis,
            Message::Signal(m) => m.timestamp_millis,
            Message::State(m) => m.timestamp_millis,
        }
    }

    /// Short name of the variant for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Electrical(_) => "electrical",
            Message::Vibration(_) => "vibration",
            Message::Signal(_) => "signal",
            Message::State(_) => "state",
        }
    }
}

// ============================================================================
// Generic scalar signal
// ============================================================================

/// One scalar reading of a generic signal (temperature, pressure, valve travel
/// time, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignalMessage {
    pub line_name: String,
    pub machine_name: String,
    #[serde(alias = "SensorName")]
    pub signal_name: String,
    pub signal_value: f64,
    #[serde(
        rename = "TimeStamp",
        alias = "TimestampMillis",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp_millis: u64,
}

impl SignalMessage {
    pub fn identity(&self) -> SignalIdentity {
        SignalIdentity::new(&self.line_name, &self.machine_name, &self.signal_name)
    }
}

// ============================================================================
// Vibration sensor
// ============================================================================

/// Three-axis RMS acceleration from a vibration sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VibrationMessage {
    pub line_name: String,
    pub machine_name: String,
    pub sensor_name: String,
    pub vib_accel_tot_rms_x: f64,
    pub vib_accel_tot_rms_y: f64,
    pub vib_accel_tot_rms_z: f64,
    #[serde(
        rename = "TimeStamp",
        alias = "TimestampMillis",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp_millis: u64,
}

impl VibrationMessage {
    pub fn identity(&self) -> SignalIdentity {
        SignalIdentity::new(&self.line_name, &self.machine_name, &self.sensor_name)
    }
}

// ============================================================================
// Discrete machine state
// ============================================================================

/// Discrete machine state (door open, mode, alarm word...). Persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateMessage {
    pub line_name: String,
    pub machine_name: String,
    pub state_name: String,
    #[serde(deserialize_with = "deserialize_state_value")]
    pub state_value: i64,
    #[serde(
        rename = "TimeStamp",
        alias = "TimestampMillis",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp_millis: u64,
}

impl StateMessage {
    pub fn identity(&self) -> SignalIdentity {
        SignalIdentity::new(&self.line_name, &self.machine_name, &self.state_name)
    }
}

// ============================================================================
// Electrical power meter
// ============================================================================

fn default_device_name() -> String {
    "electrical".to_string()
}

/// One power-meter sample of a three-phase device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElectricalMessage {
    pub line_name: String,
    pub machine_name: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// `true` while the device runs. Accepts a bool or the string `"Running"`.
    #[serde(deserialize_with = "deserialize_running_flag")]
    pub device_state: bool,
    /// Cycle synchronisation pulse level.
    #[serde(deserialize_with = "deserialize_running_flag")]
    pub synch_pulse: bool,
    #[serde(
        rename = "TimeStamp",
        alias = "TimestampMillis",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp_millis: u64,
    pub electrical_data: ElectricalData,
}

impl ElectricalMessage {
    pub fn identity(&self) -> SignalIdentity {
        SignalIdentity::new(&self.line_name, &self.machine_name, &self.device_name)
    }
}

/// Totals and per-phase measurements of one power-meter sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElectricalData {
    #[serde(default)]
    pub active_power_total: f64,
    #[serde(default)]
    pub reactive_power_total: f64,
    #[serde(default)]
    pub apparent_power_total: f64,
    #[serde(default)]
    pub power_factor: f64,
    #[serde(default)]
    pub power_quality_factor: f64,
    /// Phases L1, L2, L3 in that order.
    #[serde(rename = "PerPhase")]
    pub phases: [PhaseData; 3],
}

impl ElectricalData {
    /// RMS current of L1, L2, L3.
    pub fn phase_currents(&self) -> [f64; 3] {
        [
            self.phases[0].current,
            self.phases[1].current,
            self.phases[2].current,
        ]
    }
}

/// Measurements of a single phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PhaseData {
    #[serde(default)]
    pub active_power: f64,
    #[serde(default)]
    pub reactive_power: f64,
    #[serde(default)]
    pub apparent_power: f64,
    pub current: f64,
    #[serde(default)]
    pub voltage: f64,
    #[serde(default)]
    pub power_factor: f64,
    #[serde(default, rename = "VoltageTHD")]
    pub voltage_thd: f64,
    #[serde(default, rename = "CurrentTHD")]
    pub current_thd: f64,
    /// Harmonic magnitudes, index 0 = fundamental, up to order 41.
    #[serde(default)]
    pub current_harmonics: Vec<f64>,
}

// ============================================================================
// Lenient field decoding
// ============================================================================

/// Raw JSON scalar; gateways are inconsistent about quoting numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
    Text(String),
}

fn deserialize_running_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Bool(b) => b,
        Scalar::UInt(n) => n != 0,
        Scalar::Int(n) => n != 0,
        Scalar::Float(f) => f != 0.0,
        Scalar::Text(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "running" | "true" | "on" | "1"
        ),
    })
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::UInt(n) => Ok(n),
        Scalar::Int(n) => u64::try_from(n).map_err(|_| de::Error::custom("negative timestamp")),
        Scalar::Float(f) if f.is_finite() && f >= 0.0 => Ok(f as u64),
        Scalar::Text(s) => s.trim().parse::<u64>().map_err(de::Error::custom),
        Scalar::Float(_) | Scalar::Bool(_) => Err(de::Error::custom("invalid timestamp")),
    }
}

fn deserialize_state_value<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Bool(b) => Ok(i64::from(b)),
        Scalar::UInt(n) => i64::try_from(n).map_err(de::Error::custom),
        Scalar::Int(n) => Ok(n),
        Scalar::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        Scalar::Float(_) => Err(de::Error::custom("non-finite state value")),
        Scalar::Text(s) => s.trim().parse::<i64>().map_err(de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn electrical_json(state: &str) -> String {
        format!(
            r#"{{
                "LineName": "L1", "MachineName": "Press", "DeviceName": "motor",
                "DeviceState": {state}, "SynchPulse": false, "TimeStamp": 1717171717000,
                "ElectricalData": {{
                    "ActivePowerTotal": 1500.0,
                    "PerPhase": [
                        {{"Current": 10.0, "Voltage": 230.0}},
                        {{"Current": 11.0}},
                        {{"Current": 9.5, "CurrentHarmonics": [1.0, 0.1]}}
                    ]
                }}
            }}"#
        )
    }

    #[test]
    fn electrical_message_parses_with_string_state() {
        let msg: Message = serde_json::from_str(&electrical_json("\"Running\"")).unwrap();
        let Message::Electrical(m) = msg else {
            panic!("expected electrical variant");
        };
        assert!(m.device_state);
        assert_eq!(m.timestamp_millis, 1_717_171_717_000);
        assert_eq!(m.electrical_data.phase_currents(), [10.0, 11.0, 9.5]);
        assert_eq!(m.electrical_data.phases[2].current_harmonics.len(), 2);
    }

    #[test]
    fn electrical_message_parses_with_bool_state() {
        let msg: Message = serde_json::from_str(&electrical_json("false")).unwrap();
        assert_eq!(msg.kind(), "electrical");
        let Message::Electrical(m) = msg else {
            panic!("expected electrical variant");
        };
        assert!(!m.device_state);
    }

    #[test]
    fn signal_message_accepts_quoted_timestamp() {
        let raw = r#"{"LineName":"L1","MachineName":"Oven","SignalName":"temp",
                      "SignalValue":181.5,"TimeStamp":"1717171717123"}"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.kind(), "signal");
        assert_eq!(msg.timestamp_millis(), 1_717_171_717_123);
        assert_eq!(msg.identity(), SignalIdentity::new("L1", "Oven", "temp"));
    }

    #[test]
    fn vibration_and_state_messages_are_distinguished() {
        let vib = r#"{"LineName":"L1","MachineName":"Fan","SensorName":"vib1",
                      "VibAccelTotRmsX":0.1,"VibAccelTotRmsY":0.2,"VibAccelTotRmsZ":0.3,
                      "TimeStamp":1}"#;
        let state = r#"{"LineName":"L1","MachineName":"Fan","StateName":"door",
                        "StateValue":true,"TimeStamp":2}"#;
        let vib: Message = serde_json::from_str(vib).unwrap();
        let state: Message = serde_json::from_str(state).unwrap();
        assert_eq!(vib.kind(), "vibration");
        assert_eq!(state.kind(), "state");
        let Message::State(s) = state else {
            panic!("expected state variant");
        };
        assert_eq!(s.state_value, 1);
    }

    #[test]
    fn message_without_known_payload_is_rejected() {
        let raw = r#"{"LineName":"L1","MachineName":"Fan","TimeStamp":2}"#;
        assert!(serde_json::from_str::<Message>(raw).is_err());
    }

    #[test]
    fn negative_timestamp_is_rejected() {
        let raw = r#"{"LineName":"L1","MachineName":"Oven","SignalName":"temp",
                      "SignalValue":1.0,"TimeStamp":-5}"#;
        assert!(serde_json::from_str::<Message>(raw).is_err());
    }
}
