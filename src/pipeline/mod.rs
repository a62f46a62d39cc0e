//! Streaming pipeline: message sources, the processing loop, record sinks.
//!
//! ```text
//! MessageSource ──► ProcessingLoop ──► MonitorRegistry ──► RecordSink
//!  (stdin/replay)    (select! + cancel)  (per-identity)     (jsonl/influx/sled)
//! ```

pub mod line_protocol;
pub mod processing_loop;
pub mod sink;
pub mod source;

pub use processing_loop::ProcessingLoop;
pub use sink::{open_sink, MemorySink, RecordSink, SinkError, SledSink, TextFormat, WriterSink};
pub use source::{JsonLinesSource, MessageEvent, MessageSource, ReplaySource, SourceError};

/// Counters reported when the pipeline stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub messages_received: u64,
    /// Outside the configured identity filter
    pub messages_filtered: u64,
    /// Input lines that did not decode
    pub malformed_lines: u64,
    /// Rejected for a non-finite value
    pub samples_skipped: u64,
    pub monitor_errors: u64,
    pub monitors: usize,
    pub records_emitted: u64,
    pub anomalies_flagged: u64,
    pub cycles_closed: u64,
    pub partial_cycles: u64,
    pub sink_errors: u64,
    /// Cycles still open at shutdown
    pub open_cycles_discarded: u64,
}
