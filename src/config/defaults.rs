//! System-wide default constants.
//!
//! Values match the plant deployment so that running without a config file
//! behaves like the per-sensor services it replaces.

// ============================================================================
// Config Loading
// ============================================================================

/// Environment variable holding an explicit config file path.
pub const CONFIG_ENV_VAR: &str = "LINEWATCH_CONFIG";

/// Config file picked up from the working directory.
pub const LOCAL_CONFIG_FILE: &str = "linewatch.toml";

// ============================================================================
// Detector
// ============================================================================

/// Samples kept in the rolling model window.
pub const DEFAULT_MODEL_WINDOW_SIZE: usize = 25;

/// Booleans kept in the anomaly trend history.
pub const DEFAULT_ANOMALY_LIST_SIZE: usize = 25;

/// `|z|` must exceed this for a sample to be flagged.
pub const DEFAULT_Z_SCORE_THRESHOLD: f64 = 2.0;

/// Removing a value whose share of the sum of squared deviations leaves less
/// than this fraction behind triggers an exact recompute. Below it the
/// subtraction has cancelled away most significant digits.
pub const CANCELLATION_TOLERANCE: f64 = 1e-8;

/// Smallest allowed model window. A single sample has no spread.
pub const MIN_MODEL_WINDOW_SIZE: usize = 2;

// ============================================================================
// Electrical
// ============================================================================

/// Minimum current (A) for a trace sample to count as an inrush peak.
pub const DEFAULT_CURRENT_PEAK_HEIGHT: f64 = 1.0;

/// Qualifying peaks needed to report a cycle as exhibiting inrush.
pub const DEFAULT_CURRENT_PEAK_NUMBER: usize = 1;

/// Cycles with fewer samples are discarded without a result.
pub const DEFAULT_MIN_CYCLE_SAMPLES: usize = 2;

/// Hard cap on samples buffered for one open cycle.
///
/// 100 000 samples = ~28 hours at 1 Hz.
pub const DEFAULT_MAX_CYCLE_SAMPLES: usize = 100_000;

// ============================================================================
// Pipeline
// ============================================================================

/// Records buffered by a sink before it flushes.
pub const DEFAULT_SINK_BATCH_SIZE: usize = 100;

/// Messages between progress log lines in the processing loop.
pub const PROGRESS_LOG_INTERVAL: u64 = 1_000;
