//! Pipeline Replay Integration Test
//!
//! Feeds recorded JSON lines through `ProcessingLoop` end to end:
//! source -> registry -> sink, for every message kind.

use std::io::Cursor;

use tokio_util::sync::CancellationToken;

use linewatch::config::{MonitorConfig, SinkConfig, SinkFormat};
use linewatch::monitor::MonitorRegistry;
use linewatch::pipeline::source::parse_json_lines;
use linewatch::pipeline::{
    open_sink, JsonLinesSource, MemorySink, ProcessingLoop, ReplaySource, SledSink, TextFormat,
    WriterSink,
};
use linewatch::types::{AnalyticsRecord, SignalIdentity};

fn signal_line(value: f64, ts: u64) -> String {
    format!(
        r#"{{"LineName":"Line1","MachineName":"Oven","SignalName":"temperature","SignalValue":{value},"TimeStamp":{ts}}}"#
    )
}

/// Electrical line in the gateway's string form (`"Running"`, quoted timestamp).
fn electrical_line(running: bool, pulse: bool, ts: u64, power: f64) -> String {
    let state = if running { "Running" } else { "Stopped" };
    let phase = r#"{"Current":10.0,"Voltage":230.0}"#;
    format!(
        r#"{{"LineName":"Line1","MachineName":"Press1","DeviceName":"motor","DeviceState":"{state}","SynchPulse":{pulse},"TimeStamp":"{ts}","ElectricalData":{{"ActivePowerTotal":{power},"PerPhase":[{phase},{phase},{phase}]}}}}"#
    )
}

fn vibration_line(x: f64, ts: u64) -> String {
    format!(
        r#"{{"LineName":"Line1","MachineName":"Fan","SensorName":"vib1","VibAccelTotRmsX":{x},"VibAccelTotRmsY":0.3,"VibAccelTotRmsZ":0.3,"TimeStamp":{ts}}}"#
    )
}

fn state_line(value: i64, ts: u64) -> String {
    format!(
        r#"{{"LineName":"Line1","MachineName":"Press1","StateName":"run_state","StateValue":{value},"TimeStamp":{ts}}}"#
    )
}

/// Mixed stream: a warmed-up signal with one spike, two full cycles and an
/// open third, vibration readings, a state change, and a malformed line.
fn recorded_stream() -> String {
    let mut lines = vec![state_line(1, 0)];
    for i in 0..30u64 {
        let value = if i == 25 { 80.0 } else { 60.0 + (i % 3) as f64 * 0.1 };
        lines.push(signal_line(value, i * 100));
        lines.push(vibration_line(0.3 + (i % 2) as f64 * 0.01, i * 100));
    }
    lines.push("{not json".to_string());
    let mut ts = 10_000;
    for _cycle in 0..3 {
        for step in 0..4 {
            lines.push(electrical_line(true, step == 0, ts, 1_000.0));
            ts += 250;
        }
    }
    lines.join("\n")
}

fn registry() -> MonitorRegistry {
    MonitorRegistry::from_config(&MonitorConfig::default()).unwrap()
}

#[tokio::test]
async fn replay_produces_records_for_every_kind() {
    let (messages, malformed) = parse_json_lines(&recorded_stream());
    assert_eq!(malformed, 1);
    assert_eq!(messages.len(), 1 + 60 + 12);

    let mut pipeline = ProcessingLoop::new(registry(), MemorySink::new(), CancellationToken::new());
    let stats = pipeline.run(&mut ReplaySource::new(messages, 0)).await;

    assert_eq!(stats.messages_received, 73);
    assert_eq!(stats.samples_skipped, 0);
    assert_eq!(stats.cycles_closed, 2);
    assert_eq!(stats.partial_cycles, 0);
    assert_eq!(stats.open_cycles_discarded, 1);
    assert_eq!(stats.monitors, 3);
    assert!(stats.anomalies_flagged >= 1, "the temperature spike is flagged");

    let sink = pipeline.into_sink();
    assert_eq!(sink.flushes, 1);
    assert_eq!(sink.records.len() as u64, stats.records_emitted);

    let kinds = |kind: &str| sink.records.iter().filter(|r| r.kind() == kind).count();
    assert_eq!(kinds("state"), 1);
    assert_eq!(kinds("decision"), 30);
    assert_eq!(kinds("vibration"), 30);
    assert_eq!(kinds("cycle"), 2);
    assert_eq!(kinds("cycle_metric"), 2, "flat current has no inrush peak");

    let spike = sink
        .records
        .iter()
        .find_map(|r| match r {
            AnalyticsRecord::Decision(d) if d.value == 80.0 => Some(d),
            _ => None,
        })
        .unwrap();
    assert!(spike.is_anomaly);
    assert!(spike.trend_ratio > 0.0);
}

#[tokio::test]
async fn identity_filter_counts_other_machines() {
    let mut config = MonitorConfig::default();
    config.identity.machine_name = "Press1".to_string();
    let registry = MonitorRegistry::from_config(&config).unwrap();

    let (messages, _) = parse_json_lines(&recorded_stream());
    let mut pipeline = ProcessingLoop::new(registry, MemorySink::new(), CancellationToken::new());
    let stats = pipeline.run(&mut ReplaySource::new(messages, 0)).await;

    assert_eq!(stats.messages_filtered, 60);
    assert!(pipeline
        .into_sink()
        .records
        .iter()
        .all(|r| r.identity().machine_name == "Press1"));
}

#[tokio::test]
async fn stdin_style_source_skips_malformed_lines() {
    let input = format!("{}\n\n{{\"broken\"\n{}\n", signal_line(1.0, 0), signal_line(2.0, 1));
    let mut source = JsonLinesSource::new(Cursor::new(input.into_bytes()), "stdin");

    let mut pipeline = ProcessingLoop::new(registry(), MemorySink::new(), CancellationToken::new());
    let stats = pipeline.run(&mut source).await;
    assert_eq!(stats.messages_received, 2);
    assert_eq!(stats.malformed_lines, 1);
    assert_eq!(stats.records_emitted, 2);
}

#[tokio::test]
async fn invalid_utf8_line_does_not_stop_the_loop() {
    let mut input = Vec::new();
    input.extend_from_slice(signal_line(1.0, 0).as_bytes());
    input.extend_from_slice(b"\n\xff\xfe garbage\n");
    input.extend_from_slice(signal_line(2.0, 1).as_bytes());
    input.push(b'\n');
    input.extend_from_slice(signal_line(3.0, 2).as_bytes());
    input.push(b'\n');
    let mut source = JsonLinesSource::new(Cursor::new(input), "stdin");

    let mut pipeline = ProcessingLoop::new(registry(), MemorySink::new(), CancellationToken::new());
    let stats = pipeline.run(&mut source).await;
    assert_eq!(stats.messages_received, 3);
    assert_eq!(stats.malformed_lines, 1);
    assert_eq!(pipeline.into_sink().records.len(), 3);
}

#[tokio::test]
async fn replay_file_with_invalid_utf8_keeps_valid_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recorded.jsonl");
    let mut content = signal_line(1.0, 0).into_bytes();
    content.extend_from_slice(b"\n\xc3\x28\n");
    content.extend_from_slice(signal_line(2.0, 1).as_bytes());
    std::fs::write(&path, content).unwrap();

    let mut source = ReplaySource::from_file(&path, 0).unwrap();
    let mut pipeline = ProcessingLoop::new(registry(), MemorySink::new(), CancellationToken::new());
    let stats = pipeline.run(&mut source).await;
    assert_eq!(stats.messages_received, 2);
    assert_eq!(stats.malformed_lines, 1);
}

#[tokio::test]
async fn sled_sink_stores_history_by_identity() {
    let dir = tempfile::tempdir().unwrap();
    let (messages, _) = parse_json_lines(&recorded_stream());

    let sink = SledSink::open(dir.path().join("records.db"), 16).unwrap();
    let mut pipeline = ProcessingLoop::new(registry(), sink, CancellationToken::new());
    let stats = pipeline.run(&mut ReplaySource::new(messages, 0)).await;
    assert_eq!(stats.sink_errors, 0);

    let sink = pipeline.into_sink();
    let temperature = SignalIdentity::new("Line1", "Oven", "temperature");
    let history = sink.history("decision", &temperature).unwrap();
    assert_eq!(history.len(), 30);
    let timestamps: Vec<u64> = history.iter().map(AnalyticsRecord::timestamp_millis).collect();
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));

    let motor = SignalIdentity::new("Line1", "Press1", "motor");
    assert_eq!(sink.history("cycle", &motor).unwrap().len(), 2);
}

#[tokio::test]
async fn open_sink_refuses_sled_without_path() {
    let config = SinkConfig {
        format: SinkFormat::Sled,
        path: String::new(),
        batch_size: 10,
    };
    assert!(open_sink(&config).await.is_err());
}

#[tokio::test]
async fn line_protocol_output_uses_measurement_per_kind() {
    let (messages, _) = parse_json_lines(&recorded_stream());
    let sink = WriterSink::new(Vec::new(), TextFormat::LineProtocol, 1_000);
    let mut pipeline = ProcessingLoop::new(registry(), sink, CancellationToken::new());
    pipeline.run(&mut ReplaySource::new(messages, 0)).await;

    let out = String::from_utf8(pipeline.into_sink().into_inner()).unwrap();
    let count = |measurement: &str| {
        out.lines()
            .filter(|l| l.starts_with(&format!("{measurement},")))
            .count()
    };
    assert_eq!(count("GenericState"), 1);
    assert_eq!(count("SignalAnomaly"), 30);
    assert_eq!(count("VibSensor"), 30);
    assert_eq!(count("ElectricalAnalytics"), 2);
    assert_eq!(count("ElectricalMetricAnomaly"), 2);
    assert!(out.lines().all(|l| l.contains(",line=Line1,")));
}
