//! Synthetic workload benchmarking.
//!
//! Drives timed get/set/delete cycles against any [`CacheStore`]
//! implementation and reduces the per-operation durations to a
//! [`BenchmarkResult`] snapshot: latency distribution, throughput, success
//! rate, and process memory. Results feed the
//! [`regression`](crate::bench::regression) detector for CI gating.

pub mod regression;

pub use regression::{
    ComparisonResult, RegressionDetector, RegressionSeverity, RegressionThresholds,
    TrendDirection,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::CacheStore;

/// Immutable snapshot of one benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub run_id: Uuid,
    pub operation_type: String,
    pub iterations: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub p99_duration_ms: f64,
    pub std_dev_ms: f64,
    pub ops_per_second: f64,
    /// Fraction of cycles where every operation behaved as expected.
    pub success_rate: f64,
    /// Process resident set size sampled after the run; 0.0 where the
    /// platform offers no cheap way to read it.
    pub memory_usage_mb: f64,
    pub run_at: DateTime<Utc>,
}

/// Benchmark driver for cache implementations.
#[derive(Debug, Clone)]
pub struct CacheBenchmark {
    iterations: usize,
    warmup_iterations: usize,
}

impl Default for CacheBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBenchmark {
    pub fn new() -> Self {
        Self {
            iterations: 1_000,
            warmup_iterations: 100,
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn with_warmup(mut self, warmup_iterations: usize) -> Self {
        self.warmup_iterations = warmup_iterations;
        self
    }

    /// Run warmed-up, timed set/get/delete cycles against `cache`.
    ///
    /// Each cycle writes a representative synthetic payload, reads it back,
    /// and deletes it; the whole cycle is one latency sample. Failed
    /// operations (a read miss, a delete of nothing) lower the success rate
    /// but never abort the run.
    pub async fn benchmark_basic_operations<C: CacheStore>(&self, cache: &C) -> BenchmarkResult {
        let run_id = Uuid::new_v4();
        debug!(%run_id, iterations = self.iterations, "starting cache benchmark");

        // Warmup phase: exercises allocator, L1 population, and connection
        // paths; samples are discarded.
        for i in 0..self.warmup_iterations {
            let key = format!("bench:{}:warmup:{}", run_id, i);
            let payload = synthetic_payload(i);
            cache.set(&key, &payload, None).await;
            cache.get(&key).await;
            cache.delete(&key).await;
        }

        let mut samples_ms: Vec<f64> = Vec::with_capacity(self.iterations);
        let mut successes = 0u64;
        let run_started = Instant::now();

        for i in 0..self.iterations {
            let key = format!("bench:{}:{}", run_id, i);
            let payload = synthetic_payload(i);

            let cycle_started = Instant::now();
            cache.set(&key, &payload, None).await;
            let read = cache.get(&key).await;
            let deleted = cache.delete(&key).await;
            samples_ms.push(cycle_started.elapsed().as_secs_f64() * 1000.0);

            if read.as_ref() == Some(&payload) && deleted {
                successes += 1;
            }
        }

        let total_elapsed = run_started.elapsed().as_secs_f64();
        let result = reduce_samples(
            run_id,
            "basic_operations",
            &mut samples_ms,
            successes,
            self.iterations as u64,
            total_elapsed,
        );
        info!(
            %run_id,
            avg_ms = result.avg_duration_ms,
            p95_ms = result.p95_duration_ms,
            ops_per_second = result.ops_per_second,
            success_rate = result.success_rate,
            "cache benchmark complete"
        );
        result
    }
}

/// Representative payloads cycled across iterations: a short string, a
/// nested document, and a large text block that crosses the default
/// compression threshold.
fn synthetic_payload(i: usize) -> Value {
    match i % 3 {
        0 => json!({"result": "positive", "confidence": 0.97}),
        1 => json!({
            "summary": "A mid-sized structured result with nested fields.",
            "entities": [
                {"name": "Alice", "type": "person", "salience": 0.8},
                {"name": "Acme Corp", "type": "org", "salience": 0.55},
            ],
            "usage": {"input_tokens": 1042, "output_tokens": 187},
        }),
        _ => json!({
            "translation": "lorem ipsum dolor sit amet consectetur adipiscing elit ".repeat(40),
            "model": "large-v3",
        }),
    }
}

fn reduce_samples(
    run_id: Uuid,
    operation_type: &str,
    samples_ms: &mut [f64],
    successes: u64,
    iterations: u64,
    total_elapsed_secs: f64,
) -> BenchmarkResult {
    samples_ms.sort_by(|a, b| a.total_cmp(b));

    let avg = mean(samples_ms);
    // Three operations (set, get, delete) per timed cycle.
    let total_ops = iterations * 3;
    let ops_per_second = if total_elapsed_secs > 0.0 {
        total_ops as f64 / total_elapsed_secs
    } else {
        0.0
    };

    BenchmarkResult {
        run_id,
        operation_type: operation_type.to_string(),
        iterations,
        avg_duration_ms: avg,
        min_duration_ms: samples_ms.first().copied().unwrap_or(0.0),
        max_duration_ms: samples_ms.last().copied().unwrap_or(0.0),
        p95_duration_ms: percentile(samples_ms, 95.0),
        p99_duration_ms: percentile(samples_ms, 99.0),
        std_dev_ms: std_dev(samples_ms, avg),
        ops_per_second,
        success_rate: if iterations > 0 {
            successes as f64 / iterations as f64
        } else {
            0.0
        },
        memory_usage_mb: process_rss_mb(),
        run_at: Utc::now(),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Nearest-rank percentile over pre-sorted samples.
fn percentile(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let index = ((percentile / 100.0) * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[index.min(sorted_values.len() - 1)]
}

/// Resident set size of the current process in megabytes.
#[cfg(target_os = "linux")]
fn process_rss_mb() -> f64 {
    let statm = match std::fs::read_to_string("/proc/self/statm") {
        Ok(content) => content,
        Err(_) => return 0.0,
    };
    let rss_pages: u64 = match statm.split_whitespace().nth(1).and_then(|v| v.parse().ok()) {
        Some(pages) => pages,
        None => return 0.0,
    };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return 0.0;
    }
    (rss_pages * page_size as u64) as f64 / (1024.0 * 1024.0)
}

#[cfg(not(target_os = "linux"))]
fn process_rss_mb() -> f64 {
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_nearest_rank() {
        let samples: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(percentile(&samples, 95.0), 95.0);
        assert_eq!(percentile(&samples, 99.0), 99.0);
        assert_eq!(percentile(&samples, 0.0), 1.0);
        assert_eq!(percentile(&samples, 100.0), 100.0);
    }

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn test_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let avg = mean(&values);
        assert!((std_dev(&values, avg) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_synthetic_payloads_vary_in_shape() {
        let small = serde_json::to_vec(&synthetic_payload(0)).unwrap();
        let large = serde_json::to_vec(&synthetic_payload(2)).unwrap();
        assert!(small.len() < 1024);
        assert!(large.len() > 1024);
    }

    #[tokio::test]
    async fn test_benchmark_against_l1() {
        let cache = crate::cache::L1MemoryCache::new(1_000);
        let bench = CacheBenchmark::new().with_iterations(50).with_warmup(5);

        let result = bench.benchmark_basic_operations(&cache).await;

        assert_eq!(result.iterations, 50);
        assert_eq!(result.success_rate, 1.0);
        assert!(result.avg_duration_ms >= 0.0);
        assert!(result.min_duration_ms <= result.avg_duration_ms);
        assert!(result.avg_duration_ms <= result.max_duration_ms);
        assert!(result.p95_duration_ms <= result.max_duration_ms);
        assert!(result.p95_duration_ms <= result.p99_duration_ms);
        assert!(result.ops_per_second > 0.0);
    }
}
