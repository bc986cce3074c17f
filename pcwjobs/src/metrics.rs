//! Prometheus metrics instrumentation for pcwjobs.
//!
//! All metrics are conditionally compiled behind the `metrics` feature flag.
//!
//! # Metrics
//!
//! ## Counters
//! - `pcwjobs_jobs_started_total` - Total number of job executions launched
//! - `pcwjobs_jobs_finished_total` - Total number of job executions that returned
//!
//! ## Gauges
//! - `pcwjobs_jobs_running` - Job executions currently in flight
//!
//! ## Histograms
//! - `pcwjobs_job_duration_seconds` - Job execution duration in seconds
#![cfg(feature = "metrics")]

use prometheus::{exponential_buckets, CounterVec, Gauge, HistogramVec, IntCounter, Opts, Registry};
use std::sync::LazyLock;

/// Global Prometheus registry for pcwjobs metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Counter for launched job executions.
pub static JOBS_STARTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("pcwjobs_jobs_started_total", "Total number of job executions launched")
        .expect("pcwjobs_jobs_started_total metric creation failed")
});

/// Counter for finished job executions.
///
/// Labels:
/// - `status`: The persisted outcome (done, failed)
pub static JOBS_FINISHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "pcwjobs_jobs_finished_total",
        "Total number of job executions that returned",
    );
    CounterVec::new(opts, &["status"]).expect("pcwjobs_jobs_finished_total metric creation failed")
});

/// Gauge for job executions currently in flight.
pub static JOBS_RUNNING: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("pcwjobs_jobs_running", "Job executions currently in flight")
        .expect("pcwjobs_jobs_running metric creation failed")
});

/// Histogram for job execution duration in seconds.
///
/// Labels:
/// - `status`: The persisted outcome (done, failed)
pub static JOB_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    // profiling and training runs take minutes to hours
    let buckets = exponential_buckets(0.01, 4.0, 12).expect("bucket creation failed");
    let opts = prometheus::HistogramOpts::new(
        "pcwjobs_job_duration_seconds",
        "Job execution duration in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["status"]).expect("pcwjobs_job_duration_seconds metric creation failed")
});

/// Initialize all metrics by registering them with the global registry.
///
/// This function is idempotent - calling it multiple times is safe.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(JOBS_STARTED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(JOBS_FINISHED_TOTAL.clone()),
        Box::new(JOBS_RUNNING.clone()),
        Box::new(JOB_DURATION_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            let msg = e.to_string();
            if !msg.contains("Duplicate metrics collector registration attempted") {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Helper to record a launched job.
pub fn record_job_started() {
    JOBS_STARTED_TOTAL.inc();
    JOBS_RUNNING.inc();
}

/// Helper to record a finished job.
pub fn record_job_finished(status: &str) {
    JOBS_FINISHED_TOTAL.with_label_values(&[status]).inc();
    JOBS_RUNNING.dec();
}

/// Helper to observe job duration.
pub fn observe_job_duration(status: &str, duration_secs: f64) {
    JOB_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}
