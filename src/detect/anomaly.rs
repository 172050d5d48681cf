//! Static per-metric baselines and z-score outlier detection.

use tracing::debug;

use crate::detect::series::MetricSeries;
use crate::detect::Anomaly;

/// Series shorter than this are not analysed at all.
pub const MIN_SERIES_LEN: usize = 6;
/// Lower bound of the baseline window.
pub const MIN_BASELINE: usize = 10;
/// Upper bound of the baseline window.
pub const MAX_BASELINE: usize = 30;
/// Baselines with a spread below this are treated as constant.
pub const MIN_STD: f64 = 1e-9;
/// |z| at or above this is anomalous.
pub const Z_THRESHOLD: f64 = 3.0;

/// Number of leading samples that form the baseline of a series of length `n`.
///
/// One fifth of the series, clamped into `[MIN_BASELINE, MAX_BASELINE]`.
/// For short series this may exceed `n`, leaving nothing to evaluate.
pub fn baseline_window(n: usize) -> usize {
    (n / 5).clamp(MIN_BASELINE, MAX_BASELINE)
}

/// Mean and population standard deviation of a metric's leading window.
///
/// Frozen once estimated: later points are scored against it but never
/// folded back in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub mean: f64,
    pub std_dev: f64,
    pub sample_count: usize,
}

impl Baseline {
    /// Estimate from a window of values. `None` for an empty window.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        let variance = values.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / count;

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            sample_count: values.len(),
        })
    }

    /// Z = (value - mean) / std_dev
    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.std_dev
    }

    /// Whether the spread is wide enough for z-scores to mean anything.
    pub fn is_flat(&self) -> bool {
        self.std_dev < MIN_STD
    }
}

/// Score every post-baseline sample of `series` against the series' own
/// baseline and return those with `|z| >= Z_THRESHOLD`, in series order.
///
/// Too-short series and flat baselines yield nothing.
pub fn detect(series: &MetricSeries<'_>) -> Vec<Anomaly> {
    let n = series.len();
    if n < MIN_SERIES_LEN {
        debug!(metric = series.metric_name, points = n, "series too short, skipping");
        return Vec::new();
    }

    let window = baseline_window(n).min(n);
    let values: Vec<f64> = series.samples[..window].iter().map(|s| s.value).collect();
    let Some(baseline) = Baseline::from_values(&values) else {
        return Vec::new();
    };

    if baseline.is_flat() {
        debug!(
            metric = series.metric_name,
            mean = baseline.mean,
            "baseline has no spread, skipping"
        );
        return Vec::new();
    }

    series.samples[window..]
        .iter()
        .filter_map(|sample| {
            let z = baseline.z_score(sample.value);
            (z.abs() >= Z_THRESHOLD).then(|| Anomaly {
                metric_name: series.metric_name.to_string(),
                ts: sample.ts,
                value: sample.value,
                baseline_mean: baseline.mean,
                baseline_std: baseline.std_dev,
                z_score: z,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::series::group_by_metric;
    use crate::detect::MetricSample;
    use chrono::{Duration, TimeZone, Utc};

    fn series_of(values: &[f64]) -> Vec<MetricSample> {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| MetricSample {
                metric_name: "latency_ms".to_string(),
                ts: start + Duration::seconds(i as i64 * 30),
                value,
            })
            .collect()
    }

    /// Ten alternating +/-1 values: mean 0, population std 1.
    fn unit_baseline() -> Vec<f64> {
        (0..10).map(|i| if i % 2 == 0 { -1.0 } else { 1.0 }).collect()
    }

    fn run(values: &[f64]) -> Vec<Anomaly> {
        let samples = series_of(values);
        let groups = group_by_metric(&samples);
        groups.iter().flat_map(detect).collect()
    }

    #[test]
    fn test_baseline_window_clamp() {
        assert_eq!(baseline_window(6), 10);
        assert_eq!(baseline_window(50), 10);
        assert_eq!(baseline_window(75), 15);
        assert_eq!(baseline_window(149), 29);
        assert_eq!(baseline_window(200), 30);
        for n in 0..1000 {
            let w = baseline_window(n);
            assert!((MIN_BASELINE..=MAX_BASELINE).contains(&w));
        }
    }

    #[test]
    fn test_baseline_stats() {
        let b = Baseline::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(b.mean, 3.0);
        // Population variance of 1..5 is 2.0
        assert!((b.std_dev - 2.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(b.sample_count, 5);
        // (10 - 3) / 1.414 ~ 4.95
        assert!(b.z_score(10.0) > 4.9);
        assert!(Baseline::from_values(&[]).is_none());
    }

    #[test]
    fn test_short_series_is_skipped() {
        assert!(run(&[1.0, 1.0, 1.0, 1.0, 1000.0]).is_empty());
    }

    #[test]
    fn test_flat_baseline_is_skipped() {
        let mut values = vec![100.0; 12];
        values.extend([500.0; 5]);
        assert!(run(&values).is_empty());
    }

    #[test]
    fn test_baseline_longer_than_series_yields_nothing() {
        // n = 9 -> window 10, nothing left to score.
        assert!(run(&[1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 50.0]).is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut values = unit_baseline();
        values.extend([3.0, 2.999, -3.0, 0.5]);
        let found = run(&values);
        let z: Vec<f64> = found.iter().map(|a| a.z_score).collect();
        assert_eq!(z, vec![3.0, -3.0]);
    }

    #[test]
    fn test_baseline_is_not_adaptive() {
        let mut values = unit_baseline();
        values.extend([10.0, 10.0, 10.0]);
        let found = run(&values);
        assert_eq!(found.len(), 3);
        for a in &found {
            assert_eq!(a.baseline_mean, 0.0);
            assert_eq!(a.baseline_std, 1.0);
            assert_eq!(a.z_score, 10.0);
        }
    }

    #[test]
    fn test_baseline_points_are_never_flagged() {
        let mut values = vec![1000.0];
        values.extend((0..9).map(|i| if i % 2 == 0 { -1.0 } else { 1.0 }));
        values.push(0.0);
        let found = run(&values);
        assert!(found.is_empty());
    }
}
