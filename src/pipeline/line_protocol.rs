//! InfluxDB line protocol encoding of analytics records.
//!
//! One record becomes one line:
//!
//! ```text
//! SignalAnomaly,line=L1,machine=Oven,signal=temp value=21.5,z_score=0.4,is_anomaly=false 1700000000000
//! ```
//!
//! Timestamps are milliseconds, so writers must use `precision=ms`.

use std::fmt::Write;

use crate::types::{AnalyticsRecord, DecisionRecord, SignalIdentity};

pub const SIGNAL_MEASUREMENT: &str = "SignalAnomaly";
pub const CYCLE_METRIC_MEASUREMENT: &str = "ElectricalMetricAnomaly";
pub const CYCLE_MEASUREMENT: &str = "ElectricalAnalytics";
pub const VIBRATION_MEASUREMENT: &str = "VibSensor";
pub const STATE_MEASUREMENT: &str = "GenericState";

const PHASE_INTEGRAL_FIELDS: [&str; 3] = ["integral_l1", "integral_l2", "integral_l3"];
const PHASE_PEAK_COUNT_FIELDS: [&str; 3] = ["peak_count_l1", "peak_count_l2", "peak_count_l3"];
const PHASE_INRUSH_FIELDS: [&str; 3] = ["inrush_l1", "inrush_l2", "inrush_l3"];

/// Field value in line protocol.
enum Field<'a> {
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(&'a str),
}

/// Encode one record as a line (no trailing newline).
pub fn encode(record: &AnalyticsRecord) -> String {
    let mut fields: Vec<(&str, Field<'_>)> = Vec::new();
    let measurement = match record {
        AnalyticsRecord::Decision(d) => {
            decision_fields(d, &mut fields);
            SIGNAL_MEASUREMENT
        }
        AnalyticsRecord::CycleMetric(d) => {
            decision_fields(d, &mut fields);
            CYCLE_METRIC_MEASUREMENT
        }
        AnalyticsRecord::Cycle(c) => {
            let [l1, l2, l3] = c.average_phase_currents;
            fields.extend([
                ("integral", Field::Float(c.integral)),
                ("integral_unit", Field::Str(&c.integral_unit)),
                ("asymmetry", Field::Float(c.asymmetry)),
                ("current_l1", Field::Float(l1)),
                ("current_l2", Field::Float(l2)),
                ("current_l3", Field::Float(l3)),
                ("sample_count", Field::Int(c.sample_count as i64)),
                ("duration_ms", Field::Int(c.duration_millis() as i64)),
                ("peak_count", Field::Int(c.inrush.peak_count as i64)),
                ("inrush_detected", Field::Bool(c.inrush.inrush_detected)),
                ("partial", Field::Bool(c.partial)),
                ("close_reason", Field::Str(c.close_reason.as_str())),
            ]);
            if let Some(max) = c.inrush.max_peak_magnitude {
                fields.push(("max_peak", Field::Float(max)));
            }
            if let Some(first) = c.inrush.first_peak_magnitude {
                fields.push(("first_peak", Field::Float(first)));
            }
            for (i, phase) in c.phases.iter().flatten().enumerate() {
                fields.push((PHASE_INTEGRAL_FIELDS[i], Field::Float(phase.current_integral)));
                fields.push((PHASE_PEAK_COUNT_FIELDS[i], Field::Int(phase.peak_count as i64)));
                if let Some(current) = phase.inrush_current {
                    fields.push((PHASE_INRUSH_FIELDS[i], Field::Float(current)));
                }
            }
            CYCLE_MEASUREMENT
        }
        AnalyticsRecord::Vibration(v) => {
            fields.extend([
                ("rms_x", Field::Float(v.rms_x)),
                ("rms_y", Field::Float(v.rms_y)),
                ("rms_z", Field::Float(v.rms_z)),
                ("rms_total", Field::Float(v.rms_total)),
                ("mean", Field::Float(v.decision.mean)),
                ("std_dev", Field::Float(v.decision.std_dev)),
                ("z_score", Field::Float(v.decision.z_score)),
                ("is_anomaly", Field::Bool(v.decision.is_anomaly)),
                ("trend_ratio", Field::Float(v.decision.trend_ratio)),
            ]);
            VIBRATION_MEASUREMENT
        }
        AnalyticsRecord::State(s) => {
            fields.push(("value", Field::Int(s.value)));
            STATE_MEASUREMENT
        }
    };

    let mut line = String::with_capacity(256);
    line.push_str(measurement);
    push_tags(&mut line, record.identity());
    line.push(' ');
    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        push_escaped(&mut line, key, false);
        line.push('=');
        push_field(&mut line, value);
    }
    let _ = write!(line, " {}", record.timestamp_millis());
    line
}

fn decision_fields<'a>(d: &'a DecisionRecord, fields: &mut Vec<(&'static str, Field<'a>)>) {
    fields.extend([
        ("value", Field::Float(d.value)),
        ("mean", Field::Float(d.mean)),
        ("std_dev", Field::Float(d.std_dev)),
        ("z_score", Field::Float(d.z_score)),
        ("threshold", Field::Float(d.threshold)),
        ("is_anomaly", Field::Bool(d.is_anomaly)),
        ("trend_ratio", Field::Float(d.trend_ratio)),
        ("warming_up", Field::Bool(d.warming_up)),
    ]);
}

fn push_tags(line: &mut String, identity: &SignalIdentity) {
    for (key, value) in [
        ("line", &identity.line_name),
        ("machine", &identity.machine_name),
        ("signal", &identity.signal_name),
    ] {
        // Empty tag values are not allowed
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(key);
        line.push('=');
        push_escaped(line, value, true);
    }
}

/// Escape commas, spaces, and (for tags) equals signs.
fn push_escaped(line: &mut String, value: &str, escape_equals: bool) {
    for c in value.chars() {
        if c == ',' || c == ' ' || (escape_equals && c == '=') {
            line.push('\\');
        }
        line.push(c);
    }
}

fn push_field(line: &mut String, value: &Field<'_>) {
    match value {
        Field::Float(v) => {
            let _ = write!(line, "{}", v);
        }
        Field::Int(v) => {
            let _ = write!(line, "{}i", v);
        }
        Field::Bool(v) => line.push_str(if *v { "true" } else { "false" }),
        Field::Str(s) => {
            line.push('"');
            for c in s.chars() {
                if c == '"' || c == '\\' {
                    line.push('\\');
                }
                line.push(c);
            }
            line.push('"');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CloseReason, CycleResult, InrushResult, PhaseCycleResult, StateRecord};

    fn decision(signal: &str) -> DecisionRecord {
        DecisionRecord {
            identity: SignalIdentity::new("L1", "Oven 2", signal),
            value: 12.5,
            mean: 10.0,
            std_dev: 1.25,
            z_score: 2.0,
            threshold: 3.0,
            is_anomaly: false,
            trend_ratio: 0.0,
            warming_up: false,
            timestamp_millis: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_decision_line() {
        let line = encode(&AnalyticsRecord::Decision(decision("temp")));
        assert_eq!(
            line,
            "SignalAnomaly,line=L1,machine=Oven\\ 2,signal=temp \
             value=12.5,mean=10,std_dev=1.25,z_score=2,threshold=3,is_anomaly=false,\
             trend_ratio=0,warming_up=false 1700000000000"
        );
    }

    #[test]
    fn test_cycle_metric_measurement() {
        let line = encode(&AnalyticsRecord::CycleMetric(decision("motor.integral")));
        assert!(line.starts_with("ElectricalMetricAnomaly,line=L1,"));
        assert!(line.contains("signal=motor.integral "));
    }

    #[test]
    fn test_state_uses_integer_field() {
        let line = encode(&AnalyticsRecord::State(StateRecord {
            identity: SignalIdentity::new("L1", "Oven", "mode=auto"),
            value: 3,
            timestamp_millis: 5,
        }));
        assert_eq!(line, "GenericState,line=L1,machine=Oven,signal=mode\\=auto value=3i 5");
    }

    #[test]
    fn test_cycle_line_carries_phase_fields() {
        let phase = |integral: f64, inrush: Option<f64>| PhaseCycleResult {
            current_integral: integral,
            peak_count: usize::from(inrush.is_some()),
            inrush_current: inrush,
        };
        let cycle = CycleResult {
            identity: SignalIdentity::new("L1", "Press", "motor"),
            cycle_start_millis: 0,
            cycle_end_millis: 1000,
            sample_count: 10,
            integral: 4.0,
            integral_unit: "value*ms".to_string(),
            asymmetry: 0.0,
            average_phase_currents: [1.0, 1.0, 1.0],
            inrush: InrushResult::default(),
            phases: Some([phase(1.5, Some(9.0)), phase(2.5, None), phase(3.5, None)]),
            partial: false,
            close_reason: CloseReason::PulsePeriod,
        };

        let line = encode(&AnalyticsRecord::Cycle(cycle.clone()));
        assert!(line.contains(",integral_l1=1.5,peak_count_l1=1i,inrush_l1=9,"));
        assert!(line.contains(",integral_l3=3.5,peak_count_l3=0i "));
        assert!(!line.contains("inrush_l2"));

        let plain = encode(&AnalyticsRecord::Cycle(CycleResult { phases: None, ..cycle }));
        assert!(!plain.contains("integral_l1"));
    }

    #[test]
    fn test_string_fields_are_quoted() {
        let mut line = String::new();
        push_field(&mut line, &Field::Str("a \"b\""));
        assert_eq!(line, "\"a \\\"b\\\"\"");
    }
}
