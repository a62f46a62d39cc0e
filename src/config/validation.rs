//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::defaults::MIN_MODEL_WINDOW_SIZE;
use super::{MonitorConfig, ScoreBasis, SinkFormat};

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `MonitorConfig`.
///
/// Maintained by hand to match the struct hierarchy in monitor_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [identity]
        "identity",
        "identity.line_name",
        "identity.machine_name",
        "identity.signal_name",
        // [detector]
        "detector",
        "detector.model_window_size",
        "detector.anomaly_list_size",
        "detector.z_score_threshold",
        "detector.score_basis",
        "detector.exclude_anomalies",
        "detector.min_std_floor",
        "detector.suppress_warmup",
        "detector.resync_interval",
        // [electrical]
        "electrical",
        "electrical.current_peak_height",
        "electrical.current_peak_number",
        "electrical.cycle_trigger",
        "electrical.integral_source",
        "electrical.integral_time_unit",
        "electrical.inrush_source",
        "electrical.asymmetry_method",
        "electrical.min_cycle_samples",
        "electrical.max_cycle_samples",
        "electrical.per_phase",
        // [vibration]
        "vibration",
        "vibration.per_axis",
        // [sink]
        "sink",
        "sink.format",
        "sink.path",
        "sink.batch_size",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        // Tie-break on the key so the suggestion does not depend on hash order
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are reported by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate value ranges on a parsed `MonitorConfig`.
///
/// Returns (errors, warnings). Errors are values no detector can be built
/// from; warnings are legal but almost certainly not what was meant.
pub fn validate_ranges(config: &MonitorConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let d = &config.detector;

    if d.model_window_size < MIN_MODEL_WINDOW_SIZE {
        errors.push(format!(
            "detector.model_window_size = {} must be >= {}",
            d.model_window_size, MIN_MODEL_WINDOW_SIZE
        ));
    }
    if d.anomaly_list_size < 1 {
        errors.push("detector.anomaly_list_size must be >= 1".to_string());
    }
    // NaN comparisons silently pass, so finiteness is checked first
    if !d.z_score_threshold.is_finite() || d.z_score_threshold <= 0.0 {
        errors.push(format!(
            "detector.z_score_threshold = {} must be a finite number > 0",
            d.z_score_threshold
        ));
    }
    if !d.min_std_floor.is_finite() || d.min_std_floor < 0.0 {
        errors.push(format!(
            "detector.min_std_floor = {} must be a finite number >= 0",
            d.min_std_floor
        ));
    }

    let e = &config.electrical;

    if !e.current_peak_height.is_finite() {
        errors.push(format!(
            "electrical.current_peak_height = {} must be finite",
            e.current_peak_height
        ));
    }
    if e.current_peak_number < 1 {
        errors.push("electrical.current_peak_number must be >= 1".to_string());
    }
    if e.min_cycle_samples < 1 {
        errors.push("electrical.min_cycle_samples must be >= 1".to_string());
    }
    if e.max_cycle_samples < e.min_cycle_samples {
        errors.push(format!(
            "electrical.max_cycle_samples ({}) must be >= min_cycle_samples ({})",
            e.max_cycle_samples, e.min_cycle_samples
        ));
    }

    let s = &config.sink;

    if s.batch_size == 0 {
        errors.push("sink.batch_size must be > 0".to_string());
    }
    if s.format == SinkFormat::Sled && s.path.trim().is_empty() {
        errors.push("sink.path is required for the sled format".to_string());
    }

    if d.exclude_anomalies && d.score_basis == ScoreBasis::IncludeCurrent {
        warnings.push(ValidationWarning {
            field: "detector.exclude_anomalies".to_string(),
            message: "detector.exclude_anomalies has no effect with score_basis = \"include_current\""
                .to_string(),
            suggestion: None,
        });
    }

    // A window of n samples that includes the scored value bounds |z| by sqrt(n - 1)
    if d.score_basis == ScoreBasis::IncludeCurrent
        && d.model_window_size >= MIN_MODEL_WINDOW_SIZE
        && d.z_score_threshold.is_finite()
    {
        let max_z = ((d.model_window_size - 1) as f64).sqrt();
        if d.z_score_threshold >= max_z {
            warnings.push(ValidationWarning {
                field: "detector.z_score_threshold".to_string(),
                message: format!(
                    "detector.z_score_threshold = {} can never be exceeded with model_window_size = {} (max |z| = {:.3})",
                    d.z_score_threshold, d.model_window_size, max_z
                ),
                suggestion: None,
            });
        }
    }

    if d.z_score_threshold.is_finite() && d.z_score_threshold > 0.0 && d.z_score_threshold < 1.0 {
        warnings.push(ValidationWarning {
            field: "detector.z_score_threshold".to_string(),
            message: format!(
                "detector.z_score_threshold = {} will flag most samples (typical range 2-4)",
                d.z_score_threshold
            ),
            suggestion: None,
        });
    }

    if e.current_peak_height.is_finite() && e.current_peak_height < 0.0 {
        warnings.push(ValidationWarning {
            field: "electrical.current_peak_height".to_string(),
            message: format!(
                "electrical.current_peak_height = {} is negative; every local maximum will count as a peak",
                e.current_peak_height
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("treshold", "threshold"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [detector]
            model_window_size = 25
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"detector".to_string()));
        assert!(keys.contains(&"detector.model_window_size".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[detector]
z_score_treshold = 3.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "detector.z_score_treshold");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("detector.z_score_threshold")
        );
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let toml_str = r#"
[mqtt]
broker = "localhost"
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.iter().any(|w| w.field == "mqtt"));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_defaults_clean() {
        let (errors, warnings) = validate_ranges(&MonitorConfig::default());
        assert!(errors.is_empty(), "Defaults should produce no errors: {:?}", errors);
        assert!(warnings.is_empty(), "Defaults should produce no warnings: {:?}", warnings);
    }

    #[test]
    fn test_window_of_one_is_an_error() {
        let mut config = MonitorConfig::default();
        config.detector.model_window_size = 1;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("model_window_size")));
    }

    #[test]
    fn test_nan_threshold_is_an_error() {
        let mut config = MonitorConfig::default();
        config.detector.z_score_threshold = f64::NAN;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("z_score_threshold")));
    }

    #[test]
    fn test_unreachable_threshold_warns() {
        let mut config = MonitorConfig::default();
        config.detector.model_window_size = 5;
        config.detector.z_score_threshold = 3.0;
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.message.contains("never be exceeded")));
    }

    #[test]
    fn test_sled_without_path_is_an_error() {
        let mut config = MonitorConfig::default();
        config.sink.format = SinkFormat::Sled;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("sink.path")));
    }
}
