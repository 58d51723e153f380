//! Turning a Reviewer request into a tracked Runner job.

use std::sync::Arc;

use tracing::{warn, Instrument};

use crate::job::{JobRecord, ReviewRequest, RunnerJobId};
use crate::notifier::{Notifier, ReviewStatus};
use crate::registry::JobRegistry;
use crate::retry::{retry, RetryError, RetryPolicy};
use crate::runner::RunnerApi;
use crate::shutdown::ShutdownToken;
use crate::telemetry;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("failed to create runner job: {0}")]
    Runner(#[from] RetryError<anyhow::Error>),
}

/// Submits review requests to the Runner and starts tracking them.
#[derive(Clone)]
pub struct SubmissionService {
    registry: JobRegistry,
    runner: Arc<dyn RunnerApi>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    shutdown: ShutdownToken,
}

impl std::fmt::Debug for SubmissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionService")
            .field("retry", &self.retry)
            .field("tracked", &self.registry.len())
            .finish()
    }
}

impl SubmissionService {
    pub fn new(
        registry: JobRegistry,
        runner: Arc<dyn RunnerApi>,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            registry,
            runner,
            notifier,
            retry,
            shutdown,
        }
    }

    /// Validate, submit with retries, record as `Pending`, then tell the
    /// Reviewer the job started.
    ///
    /// The start notification is best effort: its failure is logged and the
    /// job id is still returned. Shutdown abandons it the same way.
    pub async fn submit(&self, request: ReviewRequest) -> Result<RunnerJobId, SubmitError> {
        if request.change.trim().is_empty() {
            return Err(SubmitError::InvalidRequest("changelist is required"));
        }
        if request.callback_url.trim().is_empty() {
            return Err(SubmitError::InvalidRequest("update_url is required"));
        }

        let span = telemetry::submit_span(&request.change);
        async {
            let runner = &self.runner;
            let change = request.change.as_str();
            let job_id = retry(&self.retry, &self.shutdown, || runner.submit_job(change)).await?;

            telemetry::record_job_submitted(&job_id, &request.change);

            let record = JobRecord::pending(job_id.clone(), request.clone(), self.registry.now());
            self.registry.store(job_id.clone(), record);

            let job_url = self.runner.job_url(&job_id);
            let attempt = self
                .notifier
                .notify(
                    &request.callback_url,
                    ReviewStatus::Running,
                    vec![format!("Started job {job_url}")],
                    &job_id,
                )
                .instrument(telemetry::notify_span(&job_id, ReviewStatus::Running.as_str()));
            let started = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    warn!(job_id = %job_id, "start notification abandoned on shutdown");
                    Err(anyhow::anyhow!("shutdown before the reviewer answered"))
                }
                result = attempt => result,
            };
            if let Err(err) = started {
                telemetry::record_notify_failure(
                    &job_id,
                    ReviewStatus::Running.as_str(),
                    &format!("{err:#}"),
                );
            }

            Ok::<_, SubmitError>(job_id)
        }
        .instrument(span)
        .await
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::runner::RunnerJobSnapshot;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyRunner {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RunnerApi for FlakyRunner {
        async fn submit_job(&self, _change: &str) -> anyhow::Result<RunnerJobId> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(anyhow!("503 service unavailable"))
            } else {
                Ok(RunnerJobId::new(format!("job-{call}")))
            }
        }

        async fn job_snapshot(&self, _id: &RunnerJobId) -> anyhow::Result<RunnerJobSnapshot> {
            Err(anyhow!("not used"))
        }

        fn job_url(&self, id: &RunnerJobId) -> String {
            crate::runner::job_url("http://runner", id)
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, ReviewStatus, Vec<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(
            &self,
            callback_url: &str,
            status: ReviewStatus,
            messages: Vec<String>,
            _job_id: &RunnerJobId,
        ) -> anyhow::Result<()> {
            self.calls
                .lock()
                .push((callback_url.to_string(), status, messages));
            if self.fail {
                Err(anyhow!("callback rejected"))
            } else {
                Ok(())
            }
        }
    }

    fn service(failures: u32, notifier: Arc<Recorder>) -> SubmissionService {
        SubmissionService::new(
            JobRegistry::new(),
            Arc::new(FlakyRunner {
                failures_before_success: failures,
                calls: AtomicU32::new(0),
            }),
            notifier,
            RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50)),
            ShutdownToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn submit_tracks_job_and_notifies_start() {
        let notifier = Arc::new(Recorder::default());
        let svc = service(1, notifier.clone());

        let id = svc
            .submit(ReviewRequest::new("12345", "http://review/cb"))
            .await
            .unwrap();

        assert_eq!(id.as_str(), "job-1");
        let record = svc.registry().get(&id).unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.source.change, "12345");

        let calls = notifier.calls.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http://review/cb");
        assert_eq!(calls[0].1, ReviewStatus::Running);
        assert_eq!(calls[0].2, vec!["Started job http://runner/job/job-1".to_string()]);
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let notifier = Arc::new(Recorder::default());
        let svc = service(0, notifier.clone());

        let err = svc
            .submit(ReviewRequest::new("", "http://review/cb"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidRequest(_)));

        let err = svc.submit(ReviewRequest::new("1", "  ")).await.unwrap_err();
        assert!(matches!(err, SubmitError::InvalidRequest(_)));

        assert!(svc.registry().is_empty());
        assert!(notifier.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_submit_tracks_nothing() {
        let notifier = Arc::new(Recorder::default());
        let svc = service(10, notifier.clone());

        let err = svc
            .submit(ReviewRequest::new("1", "http://review/cb"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Runner(RetryError::Exhausted { attempts: 3, .. })
        ));
        assert!(svc.registry().is_empty());
        assert!(notifier.calls.lock().is_empty());
    }

    #[derive(Default)]
    struct HangingNotifier {
        entered: tokio::sync::Notify,
    }

    #[async_trait]
    impl Notifier for HangingNotifier {
        async fn notify(
            &self,
            _callback_url: &str,
            _status: ReviewStatus,
            _messages: Vec<String>,
            _job_id: &RunnerJobId,
        ) -> anyhow::Result<()> {
            self.entered.notify_one();
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_a_hanging_start_notification() {
        let notifier = Arc::new(HangingNotifier::default());
        let shutdown = ShutdownToken::new();
        let svc = SubmissionService::new(
            JobRegistry::new(),
            Arc::new(FlakyRunner {
                failures_before_success: 0,
                calls: AtomicU32::new(0),
            }),
            notifier.clone(),
            RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50)),
            shutdown.clone(),
        );

        let submit = tokio::spawn({
            let svc = svc.clone();
            async move { svc.submit(ReviewRequest::new("7", "http://review/cb")).await }
        });
        notifier.entered.notified().await;
        shutdown.cancel();

        let id = tokio::time::timeout(Duration::from_secs(1), submit)
            .await
            .expect("submit hung on the notifier")
            .expect("submit task panicked")
            .unwrap();
        assert_eq!(id.as_str(), "job-0");
        assert!(svc.registry().contains(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_notification_keeps_the_job() {
        let notifier = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let svc = service(0, notifier);

        let id = svc
            .submit(ReviewRequest::new("1", "http://review/cb"))
            .await
            .unwrap();
        assert!(svc.registry().contains(&id));
    }
}
