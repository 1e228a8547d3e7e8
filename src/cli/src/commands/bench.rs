//! Benchmarking commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::commands::connected_cache;
use crate::output::{self, OutputFormat};
use recall_core::bench::{
    BenchmarkResult, CacheBenchmark, RegressionDetector, RegressionSeverity, RegressionThresholds,
};
use recall_core::config::CacheSettings;

#[derive(Subcommand)]
pub enum BenchCommands {
    /// Run a benchmark against the configured cache
    Run(RunArgs),

    /// Compare two exported benchmark results
    Compare(CompareArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Timed iterations (one set/get/delete cycle each)
    #[arg(long, default_value_t = 1_000)]
    pub iterations: usize,

    /// Warmup iterations (discarded)
    #[arg(long, default_value_t = 100)]
    pub warmup: usize,

    /// Export the result as JSON to this path (for later comparison)
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompareArgs {
    /// Baseline result file (JSON, from `bench run --export`)
    pub baseline: PathBuf,

    /// Candidate result file (JSON, from `bench run --export`)
    pub candidate: PathBuf,

    /// Warning threshold in percent
    #[arg(long, default_value_t = 10.0)]
    pub warning: f64,

    /// Critical threshold in percent
    #[arg(long, default_value_t = 25.0)]
    pub critical: f64,
}

pub async fn execute(cmd: &BenchCommands, settings: CacheSettings, format: OutputFormat) -> Result<()> {
    match cmd {
        BenchCommands::Run(args) => run(args, settings, format).await,
        BenchCommands::Compare(args) => compare(args, format),
    }
}

async fn run(args: &RunArgs, settings: CacheSettings, format: OutputFormat) -> Result<()> {
    let cache = connected_cache(settings).await?;
    let bench = CacheBenchmark::new()
        .with_iterations(args.iterations)
        .with_warmup(args.warmup);

    let result = bench.benchmark_basic_operations(&cache).await;
    cache.disconnect().await;

    if let Some(ref path) = args.export {
        std::fs::write(path, serde_json::to_vec_pretty(&result)?)
            .with_context(|| format!("writing benchmark export to {}", path.display()))?;
        output::print_success(&format!("result exported to {}", path.display()));
    }

    match format {
        OutputFormat::Table => {
            output::print_header("Benchmark Result");
            output::print_detail("Run", result.run_id);
            output::print_detail("Operation", &result.operation_type);
            output::print_detail("Iterations", result.iterations);
            output::print_detail("Avg", format!("{:.3}ms", result.avg_duration_ms));
            output::print_detail("Min / Max", format!(
                "{:.3}ms / {:.3}ms",
                result.min_duration_ms, result.max_duration_ms
            ));
            output::print_detail("p95 / p99", format!(
                "{:.3}ms / {:.3}ms",
                result.p95_duration_ms, result.p99_duration_ms
            ));
            output::print_detail("Std dev", format!("{:.3}ms", result.std_dev_ms));
            output::print_detail("Throughput", format!("{:.0} ops/s", result.ops_per_second));
            output::print_detail(
                "Success rate",
                format!("{:.1}%", result.success_rate * 100.0),
            );
            output::print_detail("Memory", format!("{:.1} MB", result.memory_usage_mb));
        }
        _ => output::print_item(&result, format),
    }

    Ok(())
}

fn load_result(path: &PathBuf) -> Result<BenchmarkResult> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading benchmark result {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing benchmark result {}", path.display()))
}

fn compare(args: &CompareArgs, format: OutputFormat) -> Result<()> {
    let baseline = load_result(&args.baseline)?;
    let candidate = load_result(&args.candidate)?;

    let detector = RegressionDetector::new(RegressionThresholds {
        warning_pct: args.warning,
        critical_pct: args.critical,
    });
    let comparison = detector.compare(&baseline, &candidate);

    match format {
        OutputFormat::Table => {
            output::print_header("Benchmark Comparison");
            output::print_detail(
                "Avg latency",
                format!("{:+.1}%", comparison.performance_change_percent),
            );
            output::print_detail(
                "p95 latency",
                format!("{:+.1}%", comparison.p95_change_percent),
            );
            output::print_detail(
                "Throughput",
                format!("{:+.1}%", comparison.throughput_change_percent),
            );
            output::print_detail(
                "Memory",
                format!("{:+.1}%", comparison.memory_change_percent),
            );
            for area in &comparison.improvement_areas {
                output::print_detail("Improved", area);
            }
            for area in &comparison.degradation_areas {
                output::print_detail("Degraded", area);
            }
            match comparison.severity {
                RegressionSeverity::None => output::print_success("no regression detected"),
                RegressionSeverity::Warning => {
                    output::print_warning("performance regression: WARNING")
                }
                RegressionSeverity::Critical => {
                    output::print_error("performance regression: CRITICAL")
                }
            }
        }
        _ => output::print_item(&comparison, format),
    }

    if comparison.regression_detected {
        std::process::exit(2);
    }
    Ok(())
}
