use serde::{Deserialize, Serialize};

/// Body of a Runner job submission.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub stream_id: String,
    pub template_id: String,
    pub name: String,
    pub preflight_change: String,
    pub auto_submit: bool,
}

/// Runner reply to a submission.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub id: String,
    #[serde(default)]
    pub state: String,
}

/// Raw job state as reported by the Runner.
///
/// Consumed by [`crate::status::map_snapshot`] and then dropped.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunnerJobSnapshot {
    pub id: String,
    pub state: String,
    #[serde(rename = "abortedByUser", default, skip_serializing_if = "Option::is_none")]
    pub aborted_by_user: Option<String>,
    #[serde(default)]
    pub batches: Vec<Batch>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// `"None"` (or empty) when the batch ran cleanly.
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "abortedByUserId", default, skip_serializing_if = "Option::is_none")]
    pub aborted_by_user_id: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub error: String,
}
