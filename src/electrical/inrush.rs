//! Peak-based inrush detection over a cycle-local current trace.

use crate::types::InrushResult;

/// Indices of local peaks above `threshold`.
///
/// A peak is strictly greater than both neighbours, so the first and last
/// samples never qualify and flat tops are not peaks.
pub fn peak_indices(trace: &[f64], threshold: f64) -> Vec<usize> {
    trace
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] > w[0] && w[1] > w[2] && w[1] > threshold)
        .map(|(i, _)| i + 1)
        .collect()
}

/// Count the qualifying peaks and report the largest and the first.
///
/// `inrush_detected` is informational: `peak_count >= min_peak_count`.
pub fn detect(trace: &[f64], threshold: f64, min_peak_count: usize) -> InrushResult {
    let peaks = peak_indices(trace, threshold);

    let first_peak_magnitude = peaks.first().map(|&i| trace[i]);
    let max_peak_magnitude = peaks.iter().map(|&i| trace[i]).reduce(f64::max);

    InrushResult {
        peak_count: peaks.len(),
        max_peak_magnitude,
        first_peak_magnitude,
        inrush_detected: !peaks.is_empty() && peaks.len() >= min_peak_count,
    }
}

/// Magnitude of the `n`-th qualifying peak (1-based) and the peak count.
pub fn nth_peak(trace: &[f64], threshold: f64, n: usize) -> (Option<f64>, usize) {
    let peaks = peak_indices(trace, threshold);
    let magnitude = n
        .checked_sub(1)
        .and_then(|k| peaks.get(k))
        .map(|&i| trace[i]);
    (magnitude, peaks.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_peaks_above_threshold() {
        let result = detect(&[1.0, 2.0, 5.0, 2.0, 1.0, 6.0, 1.0], 4.0, 1);
        assert_eq!(result.peak_count, 2);
        assert_eq!(result.max_peak_magnitude, Some(6.0));
        assert_eq!(result.first_peak_magnitude, Some(5.0));
        assert!(result.inrush_detected);
    }

    #[test]
    fn test_low_peaks_do_not_qualify() {
        let result = detect(&[1.0, 3.0, 1.0, 3.5, 1.0], 4.0, 1);
        assert_eq!(result, InrushResult::default());
    }

    #[test]
    fn test_endpoints_and_plateaus_are_not_peaks() {
        assert!(peak_indices(&[9.0, 1.0, 9.0], 0.0).is_empty());
        assert!(peak_indices(&[1.0, 7.0, 7.0, 1.0], 0.0).is_empty());
        assert!(peak_indices(&[5.0, 6.0], 0.0).is_empty());
        assert!(peak_indices(&[], 0.0).is_empty());
    }

    #[test]
    fn test_nth_peak() {
        let trace = [0.0, 5.0, 0.0, 6.0, 0.0, 2.0, 0.0];
        assert_eq!(nth_peak(&trace, 1.0, 1), (Some(5.0), 3));
        assert_eq!(nth_peak(&trace, 1.0, 3), (Some(2.0), 3));
        assert_eq!(nth_peak(&trace, 1.0, 4), (None, 3));
        assert_eq!(nth_peak(&trace, 1.0, 0), (None, 3));
    }

    #[test]
    fn test_min_peak_count() {
        let trace = [0.0, 5.0, 0.0, 6.0, 0.0];
        assert!(detect(&trace, 1.0, 2).inrush_detected);
        assert!(!detect(&trace, 1.0, 3).inrush_detected);
    }
}
