//! linewatch - streaming anomaly and cycle analytics for line sensors
//!
//! # Usage
//!
//! ```bash
//! # Score JSON messages from the simulator
//! simulation | linewatch --stdin
//!
//! # Replay a recorded file, 50 ms between messages, into a sled store
//! linewatch --replay data/line1.jsonl --delay-ms 50 --format sled -o data/records.db
//!
//! # Print the effective configuration
//! linewatch check-config --config linewatch.toml
//! ```
//!
//! # Environment Variables
//!
//! - `LINEWATCH_CONFIG`: Path to the TOML config (see `config` module)
//! - `LINE_NAME`, `MACHINE_NAME`, `SENSOR_NAME`/`DEVICE_NAME`: identity filter
//! - `MODEL_WINDOW_SIZE`, `ANOMALY_LIST_SIZE`, `Z_SCORE_THRESHOLD`,
//!   `CURRENT_PEAK_HEIGHT`, `CURRENT_PEAK_NUMBER`: detector overrides
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use linewatch::config::{MonitorConfig, SinkFormat};
use linewatch::monitor::MonitorRegistry;
use linewatch::pipeline::{open_sink, JsonLinesSource, ProcessingLoop, ReplaySource};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "linewatch")]
#[command(about = "Streaming anomaly and cycle analytics for production-line sensors")]
#[command(version)]
struct CliArgs {
    /// Read JSON messages from stdin (the default when no --replay is given)
    /// Use with the simulator: simulation | linewatch --stdin
    #[arg(long, conflicts_with = "replay")]
    stdin: bool,

    /// Replay a JSON-lines file instead of reading stdin
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Delay between replayed messages in milliseconds (0 = no delay)
    #[arg(long, default_value = "0")]
    delay_ms: u64,

    /// Path to the TOML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output file or sled directory (overrides [sink].path)
    #[arg(short, long, value_name = "PATH")]
    output: Option<String>,

    /// Output format: json_lines, line_protocol or sled (overrides [sink].format)
    #[arg(long)]
    format: Option<SinkFormat>,

    /// Emit logs as JSON
    #[arg(long, env = "LINEWATCH_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Load and validate the configuration, then print it as TOML
    CheckConfig,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Records may go to stdout, so logs always go to stderr
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    let mut config =
        MonitorConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(format) = args.format {
        config.sink.format = format;
    }
    if let Some(output) = &args.output {
        config.sink.path = output.clone();
    }

    if let Some(SubCommand::CheckConfig) = args.command {
        config.validate().context("Invalid configuration")?;
        print!("{}", config.to_toml()?);
        info!("✓ Configuration is valid");
        return Ok(());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  linewatch {}", env!("CARGO_PKG_VERSION"));
    info!("  Streaming Signal Analytics");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "Detector: window {} | threshold {} | trend list {} | basis {:?}",
        config.detector.model_window_size,
        config.detector.z_score_threshold,
        config.detector.anomaly_list_size,
        config.detector.score_basis
    );
    info!(
        "Cycles: trigger {:?} | integral {} in {}",
        config.electrical.cycle_trigger,
        config.electrical.integral_source.as_str(),
        config.electrical.integral_time_unit.label()
    );
    info!("");

    let registry = MonitorRegistry::from_config(&config).context("Invalid detector settings")?;
    let sink = open_sink(&config.sink)
        .await
        .context("Failed to open record sink")?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut pipeline = ProcessingLoop::new(registry, sink, cancel_token);
    let stats = if let Some(path) = &args.replay {
        info!("📥 Input: replay of {} ({}ms delay)", path.display(), args.delay_ms);
        let mut source = ReplaySource::from_file(path, args.delay_ms)?;
        pipeline.run(&mut source).await
    } else {
        info!(
            "📥 Input: stdin{} (JSON messages, one per line)",
            if args.stdin { "" } else { " [default]" }
        );
        let mut source = JsonLinesSource::stdin();
        pipeline.run(&mut source).await
    };

    info!("");
    info!(
        "✓ linewatch shutdown complete ({} records, {} anomalies)",
        stats.records_emitted, stats.anomalies_flagged
    );
    Ok(())
}

