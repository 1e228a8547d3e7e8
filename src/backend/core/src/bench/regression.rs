//! Performance regression detection.
//!
//! Compares two [`BenchmarkResult`] snapshots and classifies the worst
//! degradation against configurable warning/critical thresholds. Latency
//! and memory degrade upward; throughput degrades downward. Improvements
//! and degradations are reported as separate human-readable lists so a CI
//! report can show both sides, not just a boolean.

use serde::{Deserialize, Serialize};

use super::BenchmarkResult;

/// Percent-change thresholds for regression classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegressionThresholds {
    pub warning_pct: f64,
    pub critical_pct: f64,
}

impl Default for RegressionThresholds {
    fn default() -> Self {
        Self {
            warning_pct: 10.0,
            critical_pct: 25.0,
        }
    }
}

/// Regression severity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressionSeverity {
    None,
    Warning,
    Critical,
}

/// Trend direction across a series of historical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Degrading => "degrading",
        };
        write!(f, "{}", name)
    }
}

/// Comparison of two benchmark runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub operation_type: String,
    /// Percent change in average duration; positive = slower.
    pub performance_change_percent: f64,
    /// Percent change in p95 duration; positive = slower.
    pub p95_change_percent: f64,
    /// Percent change in operations/second; positive = faster.
    pub throughput_change_percent: f64,
    /// Percent change in memory usage; positive = more memory.
    pub memory_change_percent: f64,
    pub regression_detected: bool,
    pub severity: RegressionSeverity,
    pub improvement_areas: Vec<String>,
    pub degradation_areas: Vec<String>,
}

/// Detects regressions between benchmark runs and trends across them.
#[derive(Debug, Clone, Default)]
pub struct RegressionDetector {
    thresholds: RegressionThresholds,
}

/// Changes below this magnitude are treated as noise.
const NOISE_BAND_PCT: f64 = 1.0;
/// Band within which successive runs count as stable for trend analysis.
const TREND_BAND_PCT: f64 = 5.0;

impl RegressionDetector {
    pub fn new(thresholds: RegressionThresholds) -> Self {
        Self { thresholds }
    }

    /// Compare a candidate run against a baseline.
    pub fn compare(
        &self,
        baseline: &BenchmarkResult,
        candidate: &BenchmarkResult,
    ) -> ComparisonResult {
        let performance_change =
            percent_change(baseline.avg_duration_ms, candidate.avg_duration_ms);
        let p95_change = percent_change(baseline.p95_duration_ms, candidate.p95_duration_ms);
        let throughput_change = percent_change(baseline.ops_per_second, candidate.ops_per_second);
        let memory_change = percent_change(baseline.memory_usage_mb, candidate.memory_usage_mb);

        // Degradation magnitude per metric: latency and memory degrade when
        // they grow, throughput when it shrinks.
        let metrics: [(&str, f64, f64); 4] = [
            ("average latency", performance_change, performance_change),
            ("p95 latency", p95_change, p95_change),
            ("throughput", throughput_change, -throughput_change),
            ("memory usage", memory_change, memory_change),
        ];

        let mut improvement_areas = Vec::new();
        let mut degradation_areas = Vec::new();
        let mut worst_degradation = 0.0f64;

        for (name, change, degradation) in metrics {
            if degradation > NOISE_BAND_PCT {
                degradation_areas.push(format!("{}: {:+.1}%", name, change));
                worst_degradation = worst_degradation.max(degradation);
            } else if degradation < -NOISE_BAND_PCT {
                improvement_areas.push(format!("{}: {:+.1}%", name, change));
            }
        }

        let severity = if worst_degradation > self.thresholds.critical_pct {
            RegressionSeverity::Critical
        } else if worst_degradation > self.thresholds.warning_pct {
            RegressionSeverity::Warning
        } else {
            RegressionSeverity::None
        };

        ComparisonResult {
            operation_type: candidate.operation_type.clone(),
            performance_change_percent: performance_change,
            p95_change_percent: p95_change,
            throughput_change_percent: throughput_change,
            memory_change_percent: memory_change,
            regression_detected: severity != RegressionSeverity::None,
            severity,
            improvement_areas,
            degradation_areas,
        }
    }

    /// Derive a trend direction from successive average durations.
    ///
    /// Each consecutive pair is classified as improving, stable, or
    /// degrading against a stability band; the majority wins. Fewer than
    /// three results are always "stable" — two points are a comparison,
    /// not a trend.
    pub fn trend(&self, results: &[BenchmarkResult]) -> TrendDirection {
        if results.len() < 3 {
            return TrendDirection::Stable;
        }

        let mut improving = 0u32;
        let mut degrading = 0u32;

        for pair in results.windows(2) {
            let change = percent_change(pair[0].avg_duration_ms, pair[1].avg_duration_ms);
            if change > TREND_BAND_PCT {
                degrading += 1;
            } else if change < -TREND_BAND_PCT {
                improving += 1;
            }
        }

        if degrading > improving {
            TrendDirection::Degrading
        } else if improving > degrading {
            TrendDirection::Improving
        } else {
            TrendDirection::Stable
        }
    }
}

fn percent_change(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        0.0
    } else {
        (new - old) / old * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn result(avg_ms: f64, p95_ms: f64, ops: f64, memory_mb: f64) -> BenchmarkResult {
        BenchmarkResult {
            run_id: Uuid::new_v4(),
            operation_type: "basic_operations".to_string(),
            iterations: 1_000,
            avg_duration_ms: avg_ms,
            min_duration_ms: avg_ms / 2.0,
            max_duration_ms: avg_ms * 3.0,
            p95_duration_ms: p95_ms,
            p99_duration_ms: p95_ms * 1.2,
            std_dev_ms: 1.0,
            ops_per_second: ops,
            success_rate: 1.0,
            memory_usage_mb: memory_mb,
            run_at: Utc::now(),
        }
    }

    #[test]
    fn test_thirty_percent_slowdown_is_critical() {
        let detector = RegressionDetector::default();
        let baseline = result(20.0, 30.0, 1_000.0, 100.0);
        let candidate = result(26.0, 30.0, 1_000.0, 100.0);

        let comparison = detector.compare(&baseline, &candidate);

        assert!(comparison.regression_detected);
        assert_eq!(comparison.severity, RegressionSeverity::Critical);
        assert!((comparison.performance_change_percent - 30.0).abs() < 0.01);
        assert!(!comparison.degradation_areas.is_empty());
    }

    #[test]
    fn test_fifteen_percent_slowdown_is_warning() {
        let detector = RegressionDetector::default();
        let baseline = result(20.0, 30.0, 1_000.0, 100.0);
        let candidate = result(23.0, 30.0, 1_000.0, 100.0);

        let comparison = detector.compare(&baseline, &candidate);
        assert_eq!(comparison.severity, RegressionSeverity::Warning);
    }

    #[test]
    fn test_no_change_is_no_regression() {
        let detector = RegressionDetector::default();
        let baseline = result(20.0, 30.0, 1_000.0, 100.0);
        let candidate = result(20.1, 30.1, 999.0, 100.2);

        let comparison = detector.compare(&baseline, &candidate);
        assert!(!comparison.regression_detected);
        assert_eq!(comparison.severity, RegressionSeverity::None);
        assert!(comparison.degradation_areas.is_empty());
    }

    #[test]
    fn test_improvement_is_reported_not_flagged() {
        let detector = RegressionDetector::default();
        let baseline = result(20.0, 30.0, 1_000.0, 100.0);
        let candidate = result(14.0, 22.0, 1_400.0, 80.0);

        let comparison = detector.compare(&baseline, &candidate);
        assert!(!comparison.regression_detected);
        assert_eq!(comparison.improvement_areas.len(), 4);
        assert!(comparison.degradation_areas.is_empty());
    }

    #[test]
    fn test_memory_growth_triggers_regression() {
        let detector = RegressionDetector::default();
        let baseline = result(20.0, 30.0, 1_000.0, 100.0);
        let candidate = result(20.0, 30.0, 1_000.0, 140.0);

        let comparison = detector.compare(&baseline, &candidate);
        assert!(comparison.regression_detected);
        assert_eq!(comparison.severity, RegressionSeverity::Critical);
        assert!((comparison.memory_change_percent - 40.0).abs() < 0.01);
    }

    #[test]
    fn test_throughput_collapse_triggers_regression() {
        let detector = RegressionDetector::default();
        let baseline = result(20.0, 30.0, 1_000.0, 100.0);
        let candidate = result(20.0, 30.0, 700.0, 100.0);

        let comparison = detector.compare(&baseline, &candidate);
        assert!(comparison.regression_detected);
        assert_eq!(comparison.severity, RegressionSeverity::Critical);
    }

    #[test]
    fn test_custom_thresholds() {
        let detector = RegressionDetector::new(RegressionThresholds {
            warning_pct: 50.0,
            critical_pct: 100.0,
        });
        let baseline = result(20.0, 30.0, 1_000.0, 100.0);
        let candidate = result(26.0, 30.0, 1_000.0, 100.0);

        let comparison = detector.compare(&baseline, &candidate);
        assert!(!comparison.regression_detected);
    }

    #[test]
    fn test_trend_degrading() {
        let detector = RegressionDetector::default();
        let history = vec![
            result(10.0, 15.0, 1_000.0, 100.0),
            result(12.0, 17.0, 900.0, 100.0),
            result(14.5, 20.0, 800.0, 100.0),
            result(17.0, 24.0, 700.0, 100.0),
        ];

        assert_eq!(detector.trend(&history), TrendDirection::Degrading);
    }

    #[test]
    fn test_trend_improving() {
        let detector = RegressionDetector::default();
        let history = vec![
            result(20.0, 30.0, 700.0, 100.0),
            result(16.0, 25.0, 850.0, 100.0),
            result(12.0, 18.0, 1_000.0, 100.0),
        ];

        assert_eq!(detector.trend(&history), TrendDirection::Improving);
    }

    #[test]
    fn test_trend_stable_within_band() {
        let detector = RegressionDetector::default();
        let history = vec![
            result(20.0, 30.0, 1_000.0, 100.0),
            result(20.4, 30.1, 1_010.0, 100.0),
            result(19.8, 29.9, 995.0, 100.0),
        ];

        assert_eq!(detector.trend(&history), TrendDirection::Stable);
    }

    #[test]
    fn test_trend_needs_history() {
        let detector = RegressionDetector::default();
        let short = vec![
            result(20.0, 30.0, 1_000.0, 100.0),
            result(40.0, 60.0, 500.0, 100.0),
        ];
        assert_eq!(detector.trend(&short), TrendDirection::Stable);
    }

    #[test]
    fn test_percent_change_guards_zero_baseline() {
        assert_eq!(percent_change(0.0, 10.0), 0.0);
    }
}
