//! Prometheus metrics for the bridge.
//!
//! Compiled only with the `metrics` feature.
//!
//! # Metrics
//!
//! ## Counters
//! - `preflight_jobs_submitted_total` - Runner jobs created from review requests
//! - `preflight_status_transitions_total` - Observed status changes, by new status
//! - `preflight_status_query_failures_total` - Status queries that exhausted retries
//! - `preflight_notify_failures_total` - Reviewer callbacks that failed, by review status
//! - `preflight_age_evictions_total` - Records removed by the age safety net
//!
//! ## Gauges
//! - `preflight_tracked_jobs` - Records currently in the registry
//!
//! ## Histograms
//! - `preflight_tracked_duration_seconds` - Creation to terminal status
#![cfg(feature = "metrics")]

use prometheus::{
    exponential_buckets, Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::sync::LazyLock;

/// Global Prometheus registry for bridge metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static JOBS_SUBMITTED_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    Counter::new(
        "preflight_jobs_submitted_total",
        "Total number of runner jobs submitted",
    )
    .expect("preflight_jobs_submitted_total metric creation failed")
});

/// Labels: `status` - the newly observed internal status.
pub static STATUS_TRANSITIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "preflight_status_transitions_total",
        "Total number of observed job status transitions",
    );
    CounterVec::new(opts, &["status"])
        .expect("preflight_status_transitions_total metric creation failed")
});

pub static STATUS_QUERY_FAILURES_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    Counter::new(
        "preflight_status_query_failures_total",
        "Total number of job status queries that exhausted retries",
    )
    .expect("preflight_status_query_failures_total metric creation failed")
});

/// Labels: `review_status` - pass, fail or running.
pub static NOTIFY_FAILURES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "preflight_notify_failures_total",
        "Total number of failed reviewer status updates",
    );
    CounterVec::new(opts, &["review_status"])
        .expect("preflight_notify_failures_total metric creation failed")
});

pub static AGE_EVICTIONS_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    Counter::new(
        "preflight_age_evictions_total",
        "Total number of job records evicted for age",
    )
    .expect("preflight_age_evictions_total metric creation failed")
});

pub static TRACKED_JOBS: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("preflight_tracked_jobs", "Number of jobs currently tracked")
        .expect("preflight_tracked_jobs metric creation failed")
});

/// Labels: `status` - completed or failed.
pub static TRACKED_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(1.0, 2.0, 16).expect("bucket creation failed");
    let opts = HistogramOpts::new(
        "preflight_tracked_duration_seconds",
        "Time from submission to terminal status in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["status"])
        .expect("preflight_tracked_duration_seconds metric creation failed")
});

/// Register every collector with [`REGISTRY`]. Safe to call repeatedly.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(JOBS_SUBMITTED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(STATUS_TRANSITIONS_TOTAL.clone()),
        Box::new(STATUS_QUERY_FAILURES_TOTAL.clone()),
        Box::new(NOTIFY_FAILURES_TOTAL.clone()),
        Box::new(AGE_EVICTIONS_TOTAL.clone()),
        Box::new(TRACKED_JOBS.clone()),
        Box::new(TRACKED_DURATION_SECONDS.clone()),
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

pub fn record_job_submitted() {
    JOBS_SUBMITTED_TOTAL.inc();
}

pub fn record_status_transition(status: &str) {
    STATUS_TRANSITIONS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_status_query_failure() {
    STATUS_QUERY_FAILURES_TOTAL.inc();
}

pub fn record_notify_failure(review_status: &str) {
    NOTIFY_FAILURES_TOTAL.with_label_values(&[review_status]).inc();
}

pub fn record_age_eviction() {
    AGE_EVICTIONS_TOTAL.inc();
}

pub fn set_tracked_jobs(count: f64) {
    TRACKED_JOBS.set(count);
}

pub fn observe_tracked_duration(status: &str, duration_secs: f64) {
    TRACKED_DURATION_SECONDS
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        init_metrics().expect("metrics initialization should succeed");
        init_metrics().expect("second initialization should be a no-op");
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().expect("metrics initialization should succeed");

        record_job_submitted();
        record_status_transition("running");
        record_notify_failure("pass");
        set_tracked_jobs(2.0);

        let output = gather_metrics().expect("gather should succeed");
        assert!(output.contains("preflight_jobs_submitted_total"));
        assert!(output.contains("preflight_status_transitions_total"));
        assert!(output.contains("preflight_tracked_jobs"));
    }
}
