//! Monitor Configuration - detector, cycle, and sink settings as TOML values
//!
//! Every section implements `Default` with the plant deployment's values, so
//! an absent file or section behaves exactly like the per-sensor services it replaces.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults::*;
use crate::types::SignalIdentity;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one `linewatch` process.
///
/// Load with `MonitorConfig::load()` which searches:
/// 1. An explicit path (the `--config` flag)
/// 2. `$LINEWATCH_CONFIG`
/// 3. `./linewatch.toml`
/// 4. Built-in defaults
///
/// Deployment environment variables (`MODEL_WINDOW_SIZE`, ...) are applied on
/// top of whichever source won.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Which messages this process accepts
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Rolling z-score detector tuning
    #[serde(default)]
    pub detector: DetectorConfig,

    /// Cycle segmentation and electrical analytics
    #[serde(default)]
    pub electrical: ElectricalConfig,

    /// Vibration monitor options
    #[serde(default)]
    pub vibration: VibrationConfig,

    /// Where records are persisted
    #[serde(default)]
    pub sink: SinkConfig,
}

impl MonitorConfig {
    /// Load configuration using the standard search order, then apply
    /// environment overrides and validate.
    ///
    /// An explicit path that fails to load is an error. The env-var and
    /// local-file candidates fall back to the next source with a warning.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load_file_candidates(explicit)?;
        let applied = config.apply_env_overrides()?;
        if !applied.is_empty() {
            info!(overrides = ?applied, "Applied environment overrides");
        }
        config.validate()?;
        Ok(config)
    }

    fn load_file_candidates(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        // 1. Explicit path
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded monitor config");
            return Ok(config);
        }

        // 2. Env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded monitor config from {}", CONFIG_ENV_VAR);
                        return Ok(config);
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 3. Local file
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded monitor config from ./{}", LOCAL_CONFIG_FILE);
                    return Ok(config);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 4. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Ok(Self::default())
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::parse_checked(&contents).map_err(|e| match e {
            ParseFailure::Toml(err) => ConfigError::Parse(path.to_path_buf(), err),
            ParseFailure::Invalid(err) => err,
        })
    }

    /// Parse and validate a TOML string. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse_checked(contents).map_err(|e| match e {
            ParseFailure::Toml(err) => ConfigError::Parse(PathBuf::from("<inline>"), err),
            ParseFailure::Invalid(err) => err,
        })
    }

    fn parse_checked(contents: &str) -> Result<Self, ParseFailure> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(ParseFailure::Toml)?;
        config.validate().map_err(ParseFailure::Invalid)?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply deployment environment variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<Vec<&'static str>, ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply deployment overrides using `lookup` to resolve variable names.
    ///
    /// Returns the names of the variables that were applied. A variable that
    /// is set but does not parse is an error, never silently ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<Vec<&'static str>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = Vec::new();

        if let Some(v) = lookup("LINE_NAME") {
            self.identity.line_name = v;
            applied.push("LINE_NAME");
        }
        if let Some(v) = lookup("MACHINE_NAME") {
            self.identity.machine_name = v;
            applied.push("MACHINE_NAME");
        }
        if let Some(v) = lookup("SENSOR_NAME") {
            self.identity.signal_name = v;
            applied.push("SENSOR_NAME");
        } else if let Some(v) = lookup("DEVICE_NAME") {
            self.identity.signal_name = v;
            applied.push("DEVICE_NAME");
        }

        if let Some(v) = parse_override(&lookup, "MODEL_WINDOW_SIZE")? {
            self.detector.model_window_size = v;
            applied.push("MODEL_WINDOW_SIZE");
        }
        if let Some(v) = parse_override(&lookup, "ANOMALY_LIST_SIZE")? {
            self.detector.anomaly_list_size = v;
            applied.push("ANOMALY_LIST_SIZE");
        }
        if let Some(v) = parse_override(&lookup, "Z_SCORE_THRESHOLD")? {
            self.detector.z_score_threshold = v;
            applied.push("Z_SCORE_THRESHOLD");
        }
        if let Some(v) = parse_override(&lookup, "CURRENT_PEAK_HEIGHT")? {
            self.electrical.current_peak_height = v;
            applied.push("CURRENT_PEAK_HEIGHT");
        }
        if let Some(v) = parse_override(&lookup, "CURRENT_PEAK_NUMBER")? {
            self.electrical.current_peak_number = v;
            applied.push("CURRENT_PEAK_NUMBER");
        }

        Ok(applied)
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - Window sizes must hold enough samples to have a spread
    /// - The z threshold and std floor must be finite, threshold > 0
    /// - Cycle sample bounds must be ordered
    /// - Sled sinks need a path
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

enum ParseFailure {
    Toml(toml::de::Error),
    Invalid(ConfigError),
}

fn parse_override<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Env {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Env { var, value, reason } => {
                write!(f, "Invalid value for {var} ({value:?}): {reason}")
            }
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Identity Filter
// ============================================================================

/// Restricts which identities this process handles. Empty fields match
/// anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub line_name: String,

    #[serde(default)]
    pub machine_name: String,

    /// Sensor, device, or signal name
    #[serde(default)]
    pub signal_name: String,
}

impl IdentityConfig {
    pub fn matches(&self, identity: &SignalIdentity) -> bool {
        fn field_matches(filter: &str, value: &str) -> bool {
            filter.is_empty() || filter == value
        }
        field_matches(&self.line_name, &identity.line_name)
            && field_matches(&self.machine_name, &identity.machine_name)
            && field_matches(&self.signal_name, &identity.signal_name)
    }

    pub fn is_wildcard(&self) -> bool {
        self.line_name.is_empty() && self.machine_name.is_empty() && self.signal_name.is_empty()
    }
}

// ============================================================================
// Detector
// ============================================================================

/// Which window the z-score of a new value is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBasis {
    /// Admit the value, then score it against the window that now holds it.
    #[default]
    IncludeCurrent,
    /// Score against the window as it was, then admit the value.
    PriorWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Samples in the rolling model window (`MODEL_WINDOW_SIZE`)
    #[serde(default = "default_model_window_size")]
    pub model_window_size: usize,

    /// Booleans in the anomaly trend history (`ANOMALY_LIST_SIZE`)
    #[serde(default = "default_anomaly_list_size")]
    pub anomaly_list_size: usize,

    /// Strict `|z| >` threshold (`Z_SCORE_THRESHOLD`)
    #[serde(default = "default_z_score_threshold")]
    pub z_score_threshold: f64,

    #[serde(default)]
    pub score_basis: ScoreBasis,

    /// With `prior_window`, anomalous values never enter the window
    #[serde(default)]
    pub exclude_anomalies: bool,

    /// Floor applied to a zero standard deviation. 0 disables the floor.
    #[serde(default)]
    pub min_std_floor: f64,

    /// Never flag while the window is still filling
    #[serde(default)]
    pub suppress_warmup: bool,

    /// Updates between full recomputes of the running sums. 0 = window size.
    #[serde(default)]
    pub resync_interval: usize,
}

fn default_model_window_size() -> usize { DEFAULT_MODEL_WINDOW_SIZE }
fn default_anomaly_list_size() -> usize { DEFAULT_ANOMALY_LIST_SIZE }
fn default_z_score_threshold() -> f64 { DEFAULT_Z_SCORE_THRESHOLD }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_window_size: DEFAULT_MODEL_WINDOW_SIZE,
            anomaly_list_size: DEFAULT_ANOMALY_LIST_SIZE,
            z_score_threshold: DEFAULT_Z_SCORE_THRESHOLD,
            score_basis: ScoreBasis::default(),
            exclude_anomalies: false,
            min_std_floor: 0.0,
            suppress_warmup: false,
            resync_interval: 0,
        }
    }
}

// ============================================================================
// Electrical
// ============================================================================

/// Edge combination that opens (and closes) a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleTrigger {
    /// Pulse rising edge while the device is running.
    #[default]
    PulseAndRunning,
    /// Any pulse rising edge.
    PulseOnly,
    /// Running rising edge to running falling edge; the pulse is ignored.
    RunningOnly,
}

/// Electrical quantity integrated over a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegralSource {
    #[default]
    ActivePowerTotal,
    ReactivePowerTotal,
    ApparentPowerTotal,
    /// L1 + L2 + L3 current
    PhaseCurrentSum,
}

impl IntegralSource {
    pub fn as_str(self) -> &'static str {
        match self {
            IntegralSource::ActivePowerTotal => "active_power_total",
            IntegralSource::ReactivePowerTotal => "reactive_power_total",
            IntegralSource::ApparentPowerTotal => "apparent_power_total",
            IntegralSource::PhaseCurrentSum => "phase_current_sum",
        }
    }
}

/// Time unit the integral is reported in. Timestamps are always milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    #[default]
    Milliseconds,
    Seconds,
    Hours,
}

impl TimeUnit {
    /// Convert a `value*ms` integral into this unit.
    pub fn convert(self, value_ms: f64) -> f64 {
        match self {
            TimeUnit::Milliseconds => value_ms,
            TimeUnit::Seconds => value_ms / 1_000.0,
            TimeUnit::Hours => value_ms / 3_600_000.0,
        }
    }

    /// Unit label stored alongside the integral.
    pub fn label(self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "value*ms",
            TimeUnit::Seconds => "value*s",
            TimeUnit::Hours => "value*h",
        }
    }
}

/// Which current forms the cycle-local trace scanned for inrush peaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InrushSource {
    #[default]
    MaxPhaseCurrent,
    MeanPhaseCurrent,
    L1,
    L2,
    L3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsymmetryMethod {
    /// `(max - min) / mean`
    #[default]
    MaxMinSpread,
    /// `100 * sum(|Li - mean|) / mean`
    MeanAbsoluteDeviationPercent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectricalConfig {
    /// Minimum current for an inrush peak (`CURRENT_PEAK_HEIGHT`)
    #[serde(default = "default_current_peak_height")]
    pub current_peak_height: f64,

    /// Peaks needed to report inrush (`CURRENT_PEAK_NUMBER`)
    #[serde(default = "default_current_peak_number")]
    pub current_peak_number: usize,

    #[serde(default)]
    pub cycle_trigger: CycleTrigger,

    #[serde(default)]
    pub integral_source: IntegralSource,

    #[serde(default)]
    pub integral_time_unit: TimeUnit,

    #[serde(default)]
    pub inrush_source: InrushSource,

    #[serde(default)]
    pub asymmetry_method: AsymmetryMethod,

    /// Shorter cycles are discarded
    #[serde(default = "default_min_cycle_samples")]
    pub min_cycle_samples: usize,

    /// Longer cycles are discarded
    #[serde(default = "default_max_cycle_samples")]
    pub max_cycle_samples: usize,

    /// Also integrate each phase current and score each phase's integral
    /// and inrush current with its own detector
    #[serde(default)]
    pub per_phase: bool,
}

fn default_current_peak_height() -> f64 { DEFAULT_CURRENT_PEAK_HEIGHT }
fn default_current_peak_number() -> usize { DEFAULT_CURRENT_PEAK_NUMBER }
fn default_min_cycle_samples() -> usize { DEFAULT_MIN_CYCLE_SAMPLES }
fn default_max_cycle_samples() -> usize { DEFAULT_MAX_CYCLE_SAMPLES }

impl Default for ElectricalConfig {
    fn default() -> Self {
        Self {
            current_peak_height: DEFAULT_CURRENT_PEAK_HEIGHT,
            current_peak_number: DEFAULT_CURRENT_PEAK_NUMBER,
            cycle_trigger: CycleTrigger::default(),
            integral_source: IntegralSource::default(),
            integral_time_unit: TimeUnit::default(),
            inrush_source: InrushSource::default(),
            asymmetry_method: AsymmetryMethod::default(),
            min_cycle_samples: DEFAULT_MIN_CYCLE_SAMPLES,
            max_cycle_samples: DEFAULT_MAX_CYCLE_SAMPLES,
            per_phase: false,
        }
    }
}

// ============================================================================
// Vibration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VibrationConfig {
    /// Score each axis with its own detector besides the total RMS
    #[serde(default)]
    pub per_axis: bool,
}

// ============================================================================
// Sink
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkFormat {
    #[default]
    JsonLines,
    LineProtocol,
    Sled,
}

impl std::str::FromStr for SinkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "json_lines" | "jsonl" | "json" => Ok(SinkFormat::JsonLines),
            "line_protocol" | "influx" => Ok(SinkFormat::LineProtocol),
            "sled" => Ok(SinkFormat::Sled),
            other => Err(format!(
                "unknown sink format '{other}' (expected json_lines, line_protocol or sled)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub format: SinkFormat,

    /// Output file or sled directory. Empty = stdout.
    #[serde(default)]
    pub path: String,

    /// Records buffered before a flush
    #[serde(default = "default_sink_batch_size")]
    pub batch_size: usize,
}

fn default_sink_batch_size() -> usize { DEFAULT_SINK_BATCH_SIZE }

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            format: SinkFormat::default(),
            path: String::new(),
            batch_size: DEFAULT_SINK_BATCH_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_plant_deployment() {
        let config = MonitorConfig::default();
        assert_eq!(config.detector.model_window_size, 25);
        assert_eq!(config.detector.anomaly_list_size, 25);
        assert!((config.detector.z_score_threshold - 2.0).abs() < f64::EPSILON);
        assert!((config.electrical.current_peak_height - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.electrical.current_peak_number, 1);
        assert_eq!(config.detector.score_basis, ScoreBasis::IncludeCurrent);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_are_applied() {
        let mut config = MonitorConfig::default();
        let applied = config
            .apply_overrides_from(lookup_from(&[
                ("LINE_NAME", "L2"),
                ("DEVICE_NAME", "motor"),
                ("MODEL_WINDOW_SIZE", "100"),
                ("Z_SCORE_THRESHOLD", "3.5"),
            ]))
            .unwrap();
        assert_eq!(applied, vec!["LINE_NAME", "DEVICE_NAME", "MODEL_WINDOW_SIZE", "Z_SCORE_THRESHOLD"]);
        assert_eq!(config.identity.line_name, "L2");
        assert_eq!(config.identity.signal_name, "motor");
        assert_eq!(config.detector.model_window_size, 100);
        assert!((config.detector.z_score_threshold - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn sensor_name_wins_over_device_name() {
        let mut config = MonitorConfig::default();
        config
            .apply_overrides_from(lookup_from(&[("SENSOR_NAME", "vib"), ("DEVICE_NAME", "motor")]))
            .unwrap();
        assert_eq!(config.identity.signal_name, "vib");
    }

    #[test]
    fn unparsable_override_is_an_error() {
        let mut config = MonitorConfig::default();
        let err = config
            .apply_overrides_from(lookup_from(&[("ANOMALY_LIST_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "ANOMALY_LIST_SIZE", .. }));
        assert!(err.to_string().contains("ANOMALY_LIST_SIZE"));
    }

    #[test]
    fn identity_filter_matches_wildcards() {
        let id = SignalIdentity::new("L1", "Press", "motor");
        let mut filter = IdentityConfig::default();
        assert!(filter.is_wildcard());
        assert!(filter.matches(&id));

        filter.machine_name = "Press".to_string();
        assert!(filter.matches(&id));

        filter.signal_name = "other".to_string();
        assert!(!filter.matches(&id));
    }

    #[test]
    fn time_unit_conversion() {
        assert!((TimeUnit::Milliseconds.convert(15_000.0) - 15_000.0).abs() < 1e-9);
        assert!((TimeUnit::Seconds.convert(15_000.0) - 15.0).abs() < 1e-9);
        assert!((TimeUnit::Hours.convert(3_600_000.0) - 1.0).abs() < 1e-9);
        assert_eq!(TimeUnit::Seconds.label(), "value*s");
    }

    #[test]
    fn sink_format_parses_cli_spellings() {
        assert_eq!("json-lines".parse::<SinkFormat>().unwrap(), SinkFormat::JsonLines);
        assert_eq!("influx".parse::<SinkFormat>().unwrap(), SinkFormat::LineProtocol);
        assert_eq!("SLED".parse::<SinkFormat>().unwrap(), SinkFormat::Sled);
        assert!("csv".parse::<SinkFormat>().is_err());
    }

    #[test]
    fn toml_round_trip_keeps_enums() {
        let toml_str = r#"
[detector]
score_basis = "prior_window"
exclude_anomalies = true
min_std_floor = 0.001

[electrical]
cycle_trigger = "running_only"
integral_time_unit = "seconds"
asymmetry_method = "mean_absolute_deviation_percent"
"#;
        let config = MonitorConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.detector.score_basis, ScoreBasis::PriorWindow);
        assert_eq!(config.electrical.cycle_trigger, CycleTrigger::RunningOnly);
        assert_eq!(config.electrical.integral_time_unit, TimeUnit::Seconds);

        let reparsed = MonitorConfig::from_toml_str(&config.to_toml().unwrap()).unwrap();
        assert_eq!(reparsed.detector, config.detector);
        assert_eq!(reparsed.electrical, config.electrical);
    }
}
