use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use preflight::runner::job_url;
use preflight::*;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::job::snapshot;

/// One scripted answer to a status query.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Snapshot(RunnerJobSnapshot),
    Error(String),
}

impl ScriptStep {
    /// A clean snapshot in the given lifecycle state.
    pub fn state(state: &str) -> Self {
        ScriptStep::Snapshot(snapshot("", state))
    }
}

/// Runner fake with scripted status sequences and submit failure injection.
///
/// Each status query pops the next step of the job's script; the last step
/// repeats forever. Querying a job with no script is an error, like a
/// not-found from the real Runner.
#[derive(Clone)]
pub struct MockRunner {
    base_url: String,
    scripts: Arc<Mutex<HashMap<RunnerJobId, VecDeque<ScriptStep>>>>,
    queries: Arc<Mutex<HashMap<RunnerJobId, usize>>>,
    submitted: Arc<Mutex<Vec<String>>>,
    submit_failures: Arc<Mutex<u32>>,
    next_id: Arc<AtomicU64>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::with_base_url("http://runner.test")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            scripts: Arc::new(Mutex::new(HashMap::new())),
            queries: Arc::new(Mutex::new(HashMap::new())),
            submitted: Arc::new(Mutex::new(Vec::new())),
            submit_failures: Arc::new(Mutex::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Replace the script for `id`.
    pub fn script(&self, id: impl Into<RunnerJobId>, steps: impl IntoIterator<Item = ScriptStep>) {
        self.scripts.lock().insert(id.into(), steps.into_iter().collect());
    }

    /// Script `id` as a plain sequence of lifecycle states.
    pub fn script_states(&self, id: impl Into<RunnerJobId>, states: &[&str]) {
        self.script(id, states.iter().map(|s| ScriptStep::state(s)));
    }

    /// Fail the next `count` submissions.
    pub fn fail_submissions(&self, count: u32) {
        *self.submit_failures.lock() = count;
    }

    /// Change identifiers of successful submissions, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().clone()
    }

    pub fn query_count(&self, id: &RunnerJobId) -> usize {
        self.queries.lock().get(id).copied().unwrap_or(0)
    }

    pub fn assert_query_count_eq(&self, id: &RunnerJobId, expected: usize) {
        let actual = self.query_count(id);
        assert_eq!(
            actual, expected,
            "Expected {} status queries for {}, got {}",
            expected, id, actual
        );
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunnerApi for MockRunner {
    async fn submit_job(&self, change: &str) -> anyhow::Result<RunnerJobId> {
        {
            let mut failures = self.submit_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(anyhow!("unexpected status code: 503"));
            }
        }
        let id = RunnerJobId::new(format!("job-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        self.submitted.lock().push(change.to_string());
        Ok(id)
    }

    async fn job_snapshot(&self, id: &RunnerJobId) -> anyhow::Result<RunnerJobSnapshot> {
        *self.queries.lock().entry(id.clone()).or_default() += 1;

        let step = {
            let mut scripts = self.scripts.lock();
            let script = scripts
                .get_mut(id)
                .ok_or_else(|| anyhow!("unexpected status code: 404"))?;
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        match step {
            Some(ScriptStep::Snapshot(mut snap)) => {
                snap.id = id.to_string();
                Ok(snap)
            }
            Some(ScriptStep::Error(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("empty script for job {id}")),
        }
    }

    fn job_url(&self, id: &RunnerJobId) -> String {
        job_url(&self.base_url, id)
    }
}

/// One recorded call to [`RecordingNotifier`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotifyCall {
    pub callback_url: String,
    pub status: ReviewStatus,
    pub messages: Vec<String>,
    pub job_id: RunnerJobId,
}

/// Notifier fake that records every call and can be switched to fail.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    calls: Arc<Mutex<Vec<NotifyCall>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<NotifyCall> {
        self.calls.lock().clone()
    }

    pub fn statuses_for(&self, id: &RunnerJobId) -> Vec<ReviewStatus> {
        self.calls
            .lock()
            .iter()
            .filter(|call| &call.job_id == id)
            .map(|call| call.status)
            .collect()
    }

    pub fn assert_notify_count_eq(&self, expected: usize) {
        let actual = self.calls.lock().len();
        assert_eq!(
            actual, expected,
            "Expected {} notifications, got {}",
            expected, actual
        );
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        callback_url: &str,
        status: ReviewStatus,
        messages: Vec<String>,
        job_id: &RunnerJobId,
    ) -> anyhow::Result<()> {
        self.calls.lock().push(NotifyCall {
            callback_url: callback_url.to_string(),
            status,
            messages,
            job_id: job_id.clone(),
        });
        if self.failing.load(Ordering::SeqCst) {
            Err(anyhow!("unexpected status code: 500"))
        } else {
            Ok(())
        }
    }
}
