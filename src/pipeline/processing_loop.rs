//! The single processing task: source -> registry -> sink.
//!
//! One loop owns the [`MonitorRegistry`], so each monitor has exactly one
//! writer. Per-sample failures are logged and counted; only a source error
//! or cancellation ends the loop.

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::sink::RecordSink;
use super::source::{MessageEvent, MessageSource};
use super::PipelineStats;
use crate::config::defaults::PROGRESS_LOG_INTERVAL;
use crate::monitor::{MonitorError, MonitorRegistry, RouteOutcome};
use crate::types::AnalyticsRecord;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

pub struct ProcessingLoop<K: RecordSink> {
    registry: MonitorRegistry,
    sink: K,
    cancel_token: CancellationToken,
    stats: PipelineStats,
}

impl<K: RecordSink> ProcessingLoop<K> {
    pub fn new(registry: MonitorRegistry, sink: K, cancel_token: CancellationToken) -> Self {
        Self {
            registry,
            sink,
            cancel_token,
            stats: PipelineStats::default(),
        }
    }

    /// Run until the source is exhausted or cancellation. Open cycles are
    /// discarded and the sink flushed before returning.
    pub async fn run<S: MessageSource>(&mut self, source: &mut S) -> PipelineStats {
        info!("📊 Processing messages from {}...", source.source_name());
        info!("{}", RULE);

        loop {
            let event = tokio::select! {
                // Cancellation wins over a ready source
                biased;
                _ = self.cancel_token.cancelled() => {
                    info!("[ProcessingLoop] Shutdown signal received");
                    break;
                }
                result = source.next_message() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!("[ProcessingLoop] Source error: {}", e);
                            break;
                        }
                    }
                }
            };

            let msg = match event {
                MessageEvent::Message(m) => m,
                MessageEvent::Eof => {
                    info!(
                        "[ProcessingLoop] Source reached end ({} messages received)",
                        self.stats.messages_received
                    );
                    break;
                }
            };
            self.stats.messages_received += 1;

            match self.registry.route(&msg) {
                Ok(RouteOutcome::Records(records)) => {
                    for record in records {
                        self.emit(record).await;
                    }
                }
                Ok(RouteOutcome::Filtered) => self.stats.messages_filtered += 1,
                Err(MonitorError::Skipped(skipped)) => {
                    self.stats.samples_skipped += 1;
                    warn!(
                        identity = %msg.identity(),
                        timestamp = msg.timestamp_millis(),
                        "{}",
                        skipped
                    );
                }
                Err(e) => {
                    self.stats.monitor_errors += 1;
                    error!(kind = msg.kind(), "{}", e);
                }
            }

            if self.stats.messages_received % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    "📈 Progress: {} messages | Monitors: {} | Anomalies: {} | Cycles: {}",
                    self.stats.messages_received,
                    self.registry.monitor_count(),
                    self.stats.anomalies_flagged,
                    self.stats.cycles_closed
                );
            }
        }

        self.stats.open_cycles_discarded = self.registry.shutdown() as u64;
        if let Err(e) = self.sink.flush().await {
            self.stats.sink_errors += 1;
            error!(sink = self.sink.sink_name(), "Final flush failed: {}", e);
        }
        self.stats.malformed_lines = source.malformed_lines();
        self.stats.monitors = self.registry.monitor_count();

        log_final_stats(&self.stats);
        self.stats.clone()
    }

    async fn emit(&mut self, record: AnalyticsRecord) {
        self.stats.records_emitted += 1;
        if record.is_anomaly() {
            self.stats.anomalies_flagged += 1;
        }
        if let AnalyticsRecord::Cycle(cycle) = &record {
            self.stats.cycles_closed += 1;
            if cycle.partial {
                self.stats.partial_cycles += 1;
            }
        }
        if let Err(e) = self.sink.write(&record).await {
            self.stats.sink_errors += 1;
            warn!(
                sink = self.sink.sink_name(),
                kind = record.kind(),
                identity = %record.identity(),
                "Failed to persist record: {}",
                e
            );
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    pub fn into_sink(self) -> K {
        self.sink
    }
}

fn log_final_stats(stats: &PipelineStats) {
    info!("");
    info!("{}", RULE);
    info!("📊 FINAL STATISTICS");
    info!("{}", RULE);
    info!("   Messages Received:     {}", stats.messages_received);
    info!("   Messages Filtered:     {}", stats.messages_filtered);
    info!("   Malformed Lines:       {}", stats.malformed_lines);
    info!("   Samples Skipped:       {}", stats.samples_skipped);
    info!("   Monitors:              {}", stats.monitors);
    info!("   Records Emitted:       {}", stats.records_emitted);
    info!("   Anomalies Flagged:     {}", stats.anomalies_flagged);
    info!(
        "   Cycles Closed:         {} ({} partial)",
        stats.cycles_closed, stats.partial_cycles
    );
    info!("   Open Cycles Discarded: {}", stats.open_cycles_discarded);
    if stats.sink_errors > 0 || stats.monitor_errors > 0 {
        info!("   Sink Errors:           {}", stats.sink_errors);
        info!("   Monitor Errors:        {}", stats.monitor_errors);
    }
    info!("{}", RULE);
}
