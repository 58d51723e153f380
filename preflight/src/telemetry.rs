//! Tracing and telemetry instrumentation for the bridge.
//!
//! Span constructors and `record_*` helpers used along the submission and
//! reconciliation paths. Every helper logs through `tracing`; with the
//! `metrics` feature enabled it also updates the Prometheus collectors in
//! [`crate::metrics`].

use std::fmt::Display;

use tracing::{info_span, Span};
use tracing_subscriber::EnvFilter;

/// Install the process-wide JSON subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` is used. Calling this
/// more than once is a no-op.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Span around one reconciliation tick.
#[must_use]
pub fn tick_span(tick: u64, tracked: usize) -> Span {
    info_span!("preflight.tick", tick = tick, tracked = tracked)
}

/// Span around the reconciliation of a single job.
#[must_use]
pub fn reconcile_span(job_id: impl AsRef<str>, current_status: impl AsRef<str>) -> Span {
    info_span!(
        "preflight.reconcile",
        job_id = %job_id.as_ref(),
        current_status = %current_status.as_ref(),
    )
}

/// Span around a job submission.
#[must_use]
pub fn submit_span(change: impl AsRef<str>) -> Span {
    info_span!("preflight.submit", change = %change.as_ref())
}

/// Span around a Reviewer notification.
#[must_use]
pub fn notify_span(job_id: impl AsRef<str>, review_status: impl AsRef<str>) -> Span {
    info_span!(
        "preflight.notify",
        job_id = %job_id.as_ref(),
        review_status = %review_status.as_ref(),
    )
}

pub fn record_job_submitted(job_id: impl AsRef<str>, change: impl AsRef<str>) {
    tracing::info!(
        job_id = %job_id.as_ref(),
        change = %change.as_ref(),
        "runner job submitted"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_submitted();
}

pub fn record_status_transition(
    job_id: impl AsRef<str>,
    from: impl AsRef<str>,
    to: impl AsRef<str>,
) {
    tracing::info!(
        job_id = %job_id.as_ref(),
        from = %from.as_ref(),
        to = %to.as_ref(),
        "job status updated"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_status_transition(to.as_ref());
}

pub fn record_status_query_failure(job_id: impl AsRef<str>, error: &dyn Display) {
    tracing::error!(
        job_id = %job_id.as_ref(),
        error = %error,
        "failed to get job status"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_status_query_failure();
}

pub fn record_notify_failure(
    job_id: impl AsRef<str>,
    review_status: impl AsRef<str>,
    error: &dyn Display,
) {
    tracing::error!(
        job_id = %job_id.as_ref(),
        review_status = %review_status.as_ref(),
        error = %error,
        "failed to update reviewer status"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_notify_failure(review_status.as_ref());
}

pub fn record_age_eviction(job_id: impl AsRef<str>) {
    tracing::warn!(job_id = %job_id.as_ref(), "evicted stale job record");

    #[cfg(feature = "metrics")]
    crate::metrics::record_age_eviction();
}

pub fn set_tracked_jobs(count: usize) {
    tracing::debug!(job_count = count, "tracked jobs");

    #[cfg(feature = "metrics")]
    crate::metrics::set_tracked_jobs(count as f64);
}

/// Observe how long a job was tracked before reaching a terminal status.
pub fn observe_tracked_duration(
    job_id: impl AsRef<str>,
    status: impl AsRef<str>,
    duration_secs: f64,
) {
    tracing::info!(
        job_id = %job_id.as_ref(),
        status = %status.as_ref(),
        duration_secs = duration_secs,
        "job reached terminal status"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::observe_tracked_duration(status.as_ref(), duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_names() {
        // Spans are only created when a subscriber is interested in them.
        let subscriber = tracing_subscriber::fmt().with_max_level(tracing::Level::TRACE).finish();
        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(tick_span(1, 3).metadata().unwrap().name(), "preflight.tick");
            assert_eq!(
                reconcile_span("job-1", "pending").metadata().unwrap().name(),
                "preflight.reconcile"
            );
            assert_eq!(submit_span("1234").metadata().unwrap().name(), "preflight.submit");
            assert_eq!(
                notify_span("job-1", "pass").metadata().unwrap().name(),
                "preflight.notify"
            );
        });
    }

    #[test]
    fn test_record_helpers_do_not_panic() {
        record_job_submitted("job-1", "1234");
        record_status_transition("job-1", "pending", "running");
        record_status_query_failure("job-1", &"timeout");
        record_notify_failure("job-1", "pass", &"503");
        record_age_eviction("job-1");
        set_tracked_jobs(4);
        observe_tracked_duration("job-1", "completed", 12.5);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing("debug");
        init_tracing("info");
    }
}
