//! Reconciliation loop.
//!
//! [`JobMonitor`] polls the Runner for every tracked job on a fixed interval,
//! maps each snapshot through [`crate::status::map_snapshot`], writes status
//! changes back into the [`JobRegistry`], notifies the Reviewer and removes
//! records that reached a terminal status.
//!
//! Jobs are processed sequentially. A failed status query only skips that job
//! for the current tick; a failed notification never blocks eviction.
//!
//! Age eviction runs after each tick and only considers records the Runner
//! did not answer for during that tick, so a long-running job is never
//! dropped while it is still being observed.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Instrument};

use crate::job::{JobRecord, JobStatus, RunnerJobId};
use crate::notifier::{Notifier, ReviewStatus};
use crate::registry::JobRegistry;
use crate::retry::{retry, RetryError, RetryPolicy};
use crate::runner::RunnerApi;
use crate::shutdown::ShutdownToken;
use crate::status::map_snapshot;
use crate::telemetry;

/// Tunables for [`JobMonitor`].
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorSettings {
    /// Time between ticks.
    pub interval: Duration,
    /// Records untouched for longer than this, and not observed during the
    /// tick, are dropped after each tick. `None` disables age eviction.
    pub eviction_age: Option<chrono::Duration>,
    /// Policy for status queries.
    pub retry: RetryPolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            eviction_age: Some(chrono::Duration::hours(24)),
            retry: RetryPolicy::default(),
        }
    }
}

/// What a single tick did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records taken from the registry snapshot and queried.
    pub checked: usize,
    /// Jobs skipped because the status query exhausted its retries.
    pub query_failures: usize,
    /// Jobs whose snapshot mapped to `Unknown`.
    pub unknown: usize,
    pub transitions: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    /// Records removed after reaching a terminal status.
    pub terminal_evictions: usize,
    /// Records removed by the age safety net.
    pub age_evictions: usize,
    /// Shutdown interrupted the tick.
    pub cancelled: bool,
}

pub struct JobMonitor {
    registry: JobRegistry,
    runner: Arc<dyn RunnerApi>,
    notifier: Arc<dyn Notifier>,
    settings: MonitorSettings,
    ticks: AtomicU64,
}

impl std::fmt::Debug for JobMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobMonitor")
            .field("settings", &self.settings)
            .field("tracked", &self.registry.len())
            .field("ticks", &self.ticks.load(Ordering::Relaxed))
            .finish()
    }
}

impl JobMonitor {
    pub fn new(
        registry: JobRegistry,
        runner: Arc<dyn RunnerApi>,
        notifier: Arc<dyn Notifier>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            registry,
            runner,
            notifier,
            settings,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Tick every `interval` until `shutdown` fires.
    ///
    /// The first tick happens one interval after the call. Ticks are spaced
    /// from their scheduled start, not from the end of the previous tick; a
    /// tick that overruns delays the next one instead of bunching them up.
    pub async fn run(&self, shutdown: ShutdownToken) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            "job monitor started"
        );
        let period = self.settings.interval;
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("job monitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.reconcile_once(&shutdown).await;
                    if report.cancelled {
                        info!("job monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single reconciliation pass over the current registry snapshot.
    pub async fn reconcile_once(&self, shutdown: &ShutdownToken) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let records = self.registry.list();
        let span = telemetry::tick_span(tick, records.len());

        async {
            let mut report = TickReport::default();
            let mut observed = HashSet::new();

            for record in records {
                if shutdown.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                if let ControlFlow::Break(()) =
                    self.reconcile_job(record, shutdown, &mut report, &mut observed).await
                {
                    report.cancelled = true;
                    break;
                }
            }
            report.cancelled |= shutdown.is_cancelled();

            if !report.cancelled {
                if let Some(max_age) = self.settings.eviction_age {
                    let stale = self
                        .registry
                        .evict_older_than_unless(max_age, |id| observed.contains(id));
                    for job_id in stale {
                        telemetry::record_age_eviction(&job_id);
                        report.age_evictions += 1;
                    }
                }
            }

            telemetry::set_tracked_jobs(self.registry.len());
            debug!(?report, "tick finished");
            report
        }
        .instrument(span)
        .await
    }

    async fn reconcile_job(
        &self,
        record: JobRecord,
        shutdown: &ShutdownToken,
        report: &mut TickReport,
        observed: &mut HashSet<RunnerJobId>,
    ) -> ControlFlow<()> {
        let job_id = record.runner_job_id.clone();
        let span = telemetry::reconcile_span(&job_id, record.status.as_str());

        async {
            report.checked += 1;

            let runner = &self.runner;
            let queried = retry(&self.settings.retry, shutdown, || {
                runner.job_snapshot(&job_id)
            })
            .await;

            let snapshot = match queried {
                Ok(snapshot) => snapshot,
                Err(RetryError::Cancelled) => return ControlFlow::Break(()),
                Err(err) => {
                    telemetry::record_status_query_failure(&job_id, &err);
                    report.query_failures += 1;
                    return ControlFlow::Continue(());
                }
            };

            observed.insert(job_id.clone());

            let new_status = map_snapshot(&snapshot);
            if new_status == JobStatus::Unknown {
                debug!(state = %snapshot.state, "unrecognized runner state, skipping");
                report.unknown += 1;
                return ControlFlow::Continue(());
            }
            if new_status == record.status {
                return ControlFlow::Continue(());
            }

            let Some(updated) = self.registry.update_status(&job_id, new_status) else {
                debug!("job no longer tracked, dropping observation");
                return ControlFlow::Continue(());
            };
            telemetry::record_status_transition(&job_id, record.status.as_str(), new_status.as_str());
            report.transitions += 1;

            if let Some((review_status, message)) = ReviewStatus::for_job_status(new_status) {
                if self.notify(&updated, review_status, message, shutdown).await {
                    report.notifications_sent += 1;
                } else {
                    report.notifications_failed += 1;
                }
            }

            if new_status.is_terminal() {
                let tracked_secs =
                    (updated.updated_at - updated.created_at).num_milliseconds() as f64 / 1_000.0;
                telemetry::observe_tracked_duration(&job_id, new_status.as_str(), tracked_secs);
                if self.registry.delete(&job_id).is_some() {
                    report.terminal_evictions += 1;
                }
            }

            ControlFlow::Continue(())
        }
        .instrument(span)
        .await
    }

    /// One notification attempt. Returns whether the Reviewer accepted it.
    ///
    /// Shutdown abandons the attempt, which counts as a failure.
    async fn notify(
        &self,
        record: &JobRecord,
        status: ReviewStatus,
        message: &str,
        shutdown: &ShutdownToken,
    ) -> bool {
        let job_id = &record.runner_job_id;
        let span = telemetry::notify_span(job_id, status.as_str());
        let attempt = self
            .notifier
            .notify(
                &record.source.callback_url,
                status,
                vec![message.to_string()],
                job_id,
            )
            .instrument(span);

        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                warn!(job_id = %job_id, status = status.as_str(), "notification abandoned on shutdown");
                Err(anyhow::anyhow!("shutdown before the reviewer answered"))
            }
            result = attempt => result,
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                telemetry::record_notify_failure(job_id, status.as_str(), &format!("{err:#}"));
                false
            }
        }
    }
}

/// Spawn [`JobMonitor::run`] on the current runtime.
pub fn spawn_monitor(monitor: Arc<JobMonitor>, shutdown: ShutdownToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { monitor.run(shutdown).await })
}
