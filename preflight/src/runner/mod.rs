use async_trait::async_trait;

use crate::job::RunnerJobId;

/// reqwest-backed Runner client.
pub mod client;
/// Runner request and response bodies.
pub mod types;

pub use client::{HttpRunnerClient, SubmitTemplate};
pub use types::{Batch, CreateJobRequest, CreateJobResponse, RunnerJobSnapshot, Step};

/// Outbound calls to the Runner.
///
/// Implementations perform a single attempt per call; retrying is the
/// caller's business (see [`crate::retry::retry`]).
#[async_trait]
pub trait RunnerApi: Send + Sync {
    /// Submit a preflight job for `change` and return the new job id.
    async fn submit_job(&self, change: &str) -> anyhow::Result<RunnerJobId>;

    /// Fetch the current state of a job. An unknown id is an error.
    async fn job_snapshot(&self, id: &RunnerJobId) -> anyhow::Result<RunnerJobSnapshot>;

    /// Human-facing URL of a job on the Runner.
    fn job_url(&self, id: &RunnerJobId) -> String;
}

/// `{base}/job/{id}`, tolerating a trailing slash on `base`.
pub fn job_url(base: &str, id: &RunnerJobId) -> String {
    format!("{}/job/{}", base.trim_end_matches('/'), id)
}
