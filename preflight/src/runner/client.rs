use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use super::types::{CreateJobRequest, CreateJobResponse, RunnerJobSnapshot};
use super::RunnerApi;
use crate::job::RunnerJobId;

/// Fixed parts of every submission.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SubmitTemplate {
    pub stream_id: String,
    pub template_id: String,
    pub name: String,
}

/// Runner API client over HTTP.
///
/// Every request carries the service-account key and is bounded by the
/// client-wide timeout.
#[derive(Clone)]
pub struct HttpRunnerClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    template: SubmitTemplate,
}

impl fmt::Debug for HttpRunnerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRunnerClient")
            .field("base_url", &self.base_url)
            .field("api_key_set", &!self.api_key.is_empty())
            .field("template", &self.template)
            .finish()
    }
}

impl HttpRunnerClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        template: SubmitTemplate,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building runner http client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            template,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_header(&self) -> String {
        format!("ServiceAccount {}", self.api_key)
    }
}

#[async_trait]
impl RunnerApi for HttpRunnerClient {
    async fn submit_job(&self, change: &str) -> anyhow::Result<RunnerJobId> {
        let body = CreateJobRequest {
            stream_id: self.template.stream_id.clone(),
            template_id: self.template.template_id.clone(),
            name: self.template.name.clone(),
            preflight_change: change.to_string(),
            auto_submit: false,
        };
        debug!(change = %change, stream_id = %body.stream_id, template_id = %body.template_id, "submitting runner job");

        let resp = self
            .http
            .post(format!("{}/api/v1/jobs", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await
            .context("sending submit request")?;

        if resp.status() != StatusCode::OK {
            bail!("unexpected status code: {}", resp.status().as_u16());
        }

        let created: CreateJobResponse = resp.json().await.context("decoding submit response")?;
        if created.id.is_empty() {
            bail!("runner returned an empty job id");
        }
        Ok(RunnerJobId::new(created.id))
    }

    async fn job_snapshot(&self, id: &RunnerJobId) -> anyhow::Result<RunnerJobSnapshot> {
        let resp = self
            .http
            .get(format!("{}/api/v1/jobs/{}", self.base_url, id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .context("sending job status request")?;

        if resp.status() != StatusCode::OK {
            bail!("unexpected status code: {}", resp.status().as_u16());
        }

        resp.json().await.context("decoding job status response")
    }

    fn job_url(&self, id: &RunnerJobId) -> String {
        super::job_url(&self.base_url, id)
    }
}
