use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::job::{JobStatus, RunnerJobId};

/// Coarse status understood by the Reviewer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pass,
    Fail,
    Running,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pass => "pass",
            ReviewStatus::Fail => "fail",
            ReviewStatus::Running => "running",
        }
    }

    /// The Reviewer-facing status and message for an internal status, if the
    /// transition is worth reporting.
    pub fn for_job_status(status: JobStatus) -> Option<(ReviewStatus, &'static str)> {
        match status {
            JobStatus::Completed => Some((ReviewStatus::Pass, "job completed successfully")),
            JobStatus::Failed => Some((ReviewStatus::Fail, "job failed")),
            JobStatus::Running => Some((ReviewStatus::Running, "job is running")),
            JobStatus::Pending | JobStatus::Unknown => None,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body POSTed to the Reviewer callback.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReviewUpdate {
    pub status: ReviewStatus,
    /// Runner job URL.
    pub url: String,
    pub messages: Vec<String>,
}

/// Pushes status updates to the Reviewer.
///
/// One attempt per call. Callers log failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        callback_url: &str,
        status: ReviewStatus,
        messages: Vec<String>,
        job_id: &RunnerJobId,
    ) -> anyhow::Result<()>;
}

/// Notifier that POSTs JSON to the Reviewer-supplied callback URL.
#[derive(Clone, Debug)]
pub struct HttpNotifier {
    http: reqwest::Client,
    runner_base_url: String,
}

impl HttpNotifier {
    pub fn new(runner_base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building reviewer http client")?;
        Ok(Self {
            http,
            runner_base_url: runner_base_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(
        &self,
        callback_url: &str,
        status: ReviewStatus,
        messages: Vec<String>,
        job_id: &RunnerJobId,
    ) -> anyhow::Result<()> {
        let update = ReviewUpdate {
            status,
            url: crate::runner::job_url(&self.runner_base_url, job_id),
            messages,
        };

        let resp = self
            .http
            .post(callback_url)
            .json(&update)
            .send()
            .await
            .context("sending review update")?;

        if !resp.status().is_success() {
            bail!("unexpected status: {}", resp.status().as_u16());
        }
        Ok(())
    }
}
