use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::monitor::{spawn_monitor, JobMonitor, MonitorSettings};
use crate::notifier::Notifier;
use crate::registry::JobRegistry;
use crate::retry::RetryPolicy;
use crate::runner::RunnerApi;
use crate::shutdown::ShutdownToken;
use crate::submission::SubmissionService;

/// Configuration for the bridge runtime.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeSettings {
    /// Reconciliation loop settings, including the status-query retry policy.
    pub monitor: MonitorSettings,
    /// Retry policy for job submission.
    pub submit_retry: RetryPolicy,
    /// How long [`BridgeRuntime::shutdown`] waits for the monitor task.
    pub shutdown_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            monitor: MonitorSettings::default(),
            submit_retry: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for RuntimeSettings {
    fn from(config: &Config) -> Self {
        let retry = config.retry_policy();
        Self {
            monitor: MonitorSettings {
                interval: config.monitor_interval(),
                eviction_age: config.eviction_age(),
                retry: retry.clone(),
            },
            submit_retry: retry,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// Owns the shared registry, the shutdown signal and the monitor task.
pub struct BridgeRuntime {
    settings: RuntimeSettings,
    registry: JobRegistry,
    runner: Arc<dyn RunnerApi>,
    notifier: Arc<dyn Notifier>,
    monitor: Arc<JobMonitor>,
    shutdown_token: ShutdownToken,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for BridgeRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let monitor_running = self
            .monitor_handle
            .try_lock()
            .map(|handle| handle.is_some())
            .unwrap_or_default();

        f.debug_struct("BridgeRuntime")
            .field("settings", &self.settings)
            .field("tracked", &self.registry.len())
            .field("monitor_running", &monitor_running)
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl BridgeRuntime {
    pub fn new(
        settings: RuntimeSettings,
        registry: JobRegistry,
        runner: Arc<dyn RunnerApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let monitor = Arc::new(JobMonitor::new(
            registry.clone(),
            Arc::clone(&runner),
            Arc::clone(&notifier),
            settings.monitor.clone(),
        ));
        Self {
            settings,
            registry,
            runner,
            notifier,
            monitor,
            shutdown_token: ShutdownToken::new(),
            monitor_handle: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn registry(&self) -> JobRegistry {
        self.registry.clone()
    }

    pub fn monitor(&self) -> Arc<JobMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown_token.clone()
    }

    /// A submission front-end sharing this runtime's registry and shutdown
    /// signal.
    pub fn submissions(&self) -> SubmissionService {
        SubmissionService::new(
            self.registry.clone(),
            Arc::clone(&self.runner),
            Arc::clone(&self.notifier),
            self.settings.submit_retry.clone(),
            self.shutdown_token.clone(),
        )
    }

    /// Start the reconciliation loop. Starting twice is a no-op.
    pub async fn start(&self) -> anyhow::Result<()> {
        if self.shutdown_token.is_cancelled() {
            anyhow::bail!("runtime already shut down");
        }
        let mut guard = self.monitor_handle.lock().await;
        if guard.is_none() {
            *guard = Some(spawn_monitor(self.monitor(), self.shutdown_token.clone()));
        }
        Ok(())
    }

    /// Cancel in-flight work and wait for the monitor to stop.
    ///
    /// Waits at most `shutdown_timeout`; a monitor that overruns it is
    /// aborted.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        tracing::info!("initiating graceful shutdown of bridge runtime");

        self.shutdown_token.cancel();

        let handle = {
            let mut guard = self.monitor_handle.lock().await;
            guard.take()
        };

        if let Some(mut handle) = handle {
            match tokio::time::timeout(self.settings.shutdown_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("monitor task failed: {:?}", e),
                Err(_) => {
                    tracing::warn!("monitor task timed out during shutdown");
                    handle.abort();
                }
            }
        }

        tracing::info!(tracked = self.registry.len(), "bridge runtime shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRecord, ReviewRequest, RunnerJobId};
    use crate::notifier::ReviewStatus;
    use crate::runner::RunnerJobSnapshot;
    use async_trait::async_trait;
    use tokio::time::timeout;

    /// Runner whose status queries never return.
    struct HangingRunner;

    #[async_trait]
    impl RunnerApi for HangingRunner {
        async fn submit_job(&self, _change: &str) -> anyhow::Result<RunnerJobId> {
            std::future::pending().await
        }

        async fn job_snapshot(&self, _id: &RunnerJobId) -> anyhow::Result<RunnerJobSnapshot> {
            std::future::pending().await
        }

        fn job_url(&self, id: &RunnerJobId) -> String {
            crate::runner::job_url("http://runner", id)
        }
    }

    struct NoopNotifier;

    #[async_trait]
    impl Notifier for NoopNotifier {
        async fn notify(
            &self,
            _callback_url: &str,
            _status: ReviewStatus,
            _messages: Vec<String>,
            _job_id: &RunnerJobId,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn build_runtime() -> BridgeRuntime {
        let settings = RuntimeSettings {
            monitor: MonitorSettings {
                interval: Duration::from_millis(50),
                ..Default::default()
            },
            ..Default::default()
        };
        BridgeRuntime::new(
            settings,
            JobRegistry::new(),
            Arc::new(HangingRunner),
            Arc::new(NoopNotifier),
        )
    }

    #[test]
    fn settings_follow_config() {
        let config = Config::from_yaml_str(
            "runner:\n  host: h\n  api_key: k\nmonitor:\n  interval: 7\n  eviction_age: 0\ntimeouts:\n  shutdown: 9\n",
        )
        .unwrap();
        let settings = RuntimeSettings::from(&config);
        assert_eq!(settings.monitor.interval, Duration::from_secs(7));
        assert_eq!(settings.monitor.eviction_age, None);
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(9));
        assert_eq!(settings.submit_retry, settings.monitor.retry);
    }

    #[tokio::test]
    async fn shutdown_interrupts_in_flight_query() {
        let runtime = build_runtime();
        let registry = runtime.registry();
        registry.store(
            RunnerJobId::new("j1"),
            JobRecord::pending(
                RunnerJobId::new("j1"),
                ReviewRequest::new("1", "http://review/cb"),
                chrono::Utc::now(),
            ),
        );
        runtime.start().await.unwrap();

        // Let the first tick begin and block on the hanging query.
        tokio::time::sleep(Duration::from_millis(120)).await;

        let result = timeout(Duration::from_secs(2), runtime.shutdown()).await;
        assert!(result.is_ok(), "shutdown did not complete within 2 seconds");
        result.unwrap().expect("shutdown returned error");

        // The interrupted job is left as it was.
        assert!(registry.contains(&RunnerJobId::new("j1")));
    }

    #[tokio::test]
    async fn start_after_shutdown_is_rejected() {
        let runtime = build_runtime();
        runtime.shutdown().await.unwrap();
        assert!(runtime.start().await.is_err());
    }

    #[tokio::test]
    async fn submissions_share_the_registry() {
        let runtime = build_runtime();
        let submissions = runtime.submissions();
        assert!(submissions.registry().is_empty());
        runtime.registry().store(
            RunnerJobId::new("j1"),
            JobRecord::pending(
                RunnerJobId::new("j1"),
                ReviewRequest::new("1", "http://review/cb"),
                chrono::Utc::now(),
            ),
        );
        assert_eq!(submissions.registry().len(), 1);
    }
}
