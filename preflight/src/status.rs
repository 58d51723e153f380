//! Translation of raw Runner snapshots into [`JobStatus`].
//!
//! Cancellation and step failures are checked before the coarse lifecycle
//! string: the Runner reports a finished state even for aborted or failed
//! runs.

use crate::job::JobStatus;
use crate::runner::{Batch, RunnerJobSnapshot};

/// Lifecycle strings that mean the job finished.
const COMPLETE_STATES: &[&str] = &["Complete", "Completed", "Finished"];
/// Lifecycle strings that mean the job has not started yet.
const WAITING_STATES: &[&str] = &["Waiting", "Queued", "Initializing"];

/// Map a snapshot to an internal status.
///
/// Priority: user abort, then batch/step failure, then the lifecycle state.
pub fn map_snapshot(snapshot: &RunnerJobSnapshot) -> JobStatus {
    if was_cancelled(snapshot) || has_errors(snapshot) {
        return JobStatus::Failed;
    }
    map_state(&snapshot.state)
}

/// True if the job, or any step in any batch, was aborted by a user.
pub fn was_cancelled(snapshot: &RunnerJobSnapshot) -> bool {
    snapshot.aborted_by_user.is_some()
        || snapshot
            .batches
            .iter()
            .flat_map(|batch| batch.steps.iter())
            .any(|step| step.aborted_by_user_id.is_some())
}

/// True if any batch carries an error or any step failed.
pub fn has_errors(snapshot: &RunnerJobSnapshot) -> bool {
    snapshot.batches.iter().any(|batch| {
        batch_has_error(batch)
            || batch
                .steps
                .iter()
                .any(|step| step.outcome.eq_ignore_ascii_case("failure"))
    })
}

fn batch_has_error(batch: &Batch) -> bool {
    let error = batch.error.trim();
    !error.is_empty() && !error.eq_ignore_ascii_case("none")
}

/// Map the Runner lifecycle string alone.
pub fn map_state(state: &str) -> JobStatus {
    let matches = |set: &[&str]| set.iter().any(|s| s.eq_ignore_ascii_case(state));
    if state.eq_ignore_ascii_case("Running") {
        JobStatus::Running
    } else if matches(COMPLETE_STATES) {
        JobStatus::Completed
    } else if matches(WAITING_STATES) {
        JobStatus::Pending
    } else {
        JobStatus::Unknown
    }
}
