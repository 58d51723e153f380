//! Inbound HTTP surface.
//!
//! - `GET  /health`              liveness probe
//! - `POST /webhook/review-test` Reviewer webhook, starts a Runner job
//! - `GET  /jobs`                snapshot of tracked jobs
//! - `GET  /metrics`             Prometheus text (`metrics` feature)

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{debug, warn};

use crate::job::{JobRecord, ReviewRequest};
use crate::retry::RetryError;
use crate::submission::{SubmissionService, SubmitError};

#[derive(Clone, Debug)]
pub struct AppState {
    pub submissions: SubmissionService,
}

pub fn router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/webhook/review-test", post(review_webhook))
        .route("/jobs", get(list_jobs));

    #[cfg(feature = "metrics")]
    let router = router.route("/metrics", get(metrics));

    router.with_state(state)
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn review_webhook(
    State(state): State<AppState>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejected review webhook body");
            return json_error(StatusCode::BAD_REQUEST, "invalid_body", "invalid request body");
        }
    };
    debug!(change = %request.change, "review webhook received");

    match state.submissions.submit(request).await {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(SubmitError::InvalidRequest(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "missing_fields", msg)
        }
        Err(SubmitError::Runner(RetryError::Cancelled)) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "shutting_down",
            "server is shutting down",
        ),
        Err(err @ SubmitError::Runner(_)) => {
            warn!(error = %err, "runner job creation failed");
            json_error(StatusCode::BAD_GATEWAY, "runner_error", "failed to create job")
        }
    }
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobRecord>> {
    let mut jobs = state.submissions.registry().list();
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Json(jobs)
}

#[cfg(feature = "metrics")]
async fn metrics() -> Response {
    match crate::metrics::gather_metrics() {
        Ok(body) => (
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics_error",
            err.to_string(),
        ),
    }
}
