use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identifier assigned by the Runner when a job is submitted.
///
/// Used as the registry key; never changes once a record is created.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunnerJobId(String);

impl RunnerJobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RunnerJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunnerJobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RunnerJobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for RunnerJobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Internal view of a Runner job's lifecycle.
///
/// `Completed` and `Failed` are terminal; the other three may be observed
/// any number of times, in any order, until a terminal value shows up.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Unknown,
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Unknown => "unknown",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The Reviewer request that spawned a Runner job.
///
/// Field names follow the Reviewer's webhook payload.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    #[serde(rename = "changelist")]
    pub change: String,
    #[serde(rename = "update_url")]
    pub callback_url: String,
}

impl ReviewRequest {
    pub fn new(change: impl Into<String>, callback_url: impl Into<String>) -> Self {
        Self {
            change: change.into(),
            callback_url: callback_url.into(),
        }
    }
}

/// One tracked unit of work.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub runner_job_id: RunnerJobId,
    pub source: ReviewRequest,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A freshly submitted job, not yet observed on the Runner.
    pub fn pending(runner_job_id: RunnerJobId, source: ReviewRequest, now: DateTime<Utc>) -> Self {
        Self {
            runner_job_id,
            source,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
