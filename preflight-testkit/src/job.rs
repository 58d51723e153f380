use chrono::{DateTime, Utc};
use preflight::runner::{Batch, Step};
use preflight::*;

/// A clean snapshot: no abort markers, no batches.
pub fn snapshot(id: &str, state: &str) -> RunnerJobSnapshot {
    RunnerJobSnapshot {
        id: id.to_string(),
        state: state.to_string(),
        aborted_by_user: None,
        batches: Vec::new(),
    }
}

/// A snapshot aborted by `user` at job level.
pub fn aborted_snapshot(id: &str, state: &str, user: &str) -> RunnerJobSnapshot {
    RunnerJobSnapshot {
        aborted_by_user: Some(user.to_string()),
        ..snapshot(id, state)
    }
}

/// A snapshot whose single batch carries `error`.
pub fn batch_error_snapshot(id: &str, state: &str, error: &str) -> RunnerJobSnapshot {
    RunnerJobSnapshot {
        batches: vec![Batch {
            error: error.to_string(),
            steps: Vec::new(),
        }],
        ..snapshot(id, state)
    }
}

/// A snapshot with one batch of steps, each given as an outcome string.
pub fn steps_snapshot(id: &str, state: &str, outcomes: &[&str]) -> RunnerJobSnapshot {
    RunnerJobSnapshot {
        batches: vec![Batch {
            error: "None".to_string(),
            steps: outcomes
                .iter()
                .map(|outcome| Step {
                    state: "Completed".to_string(),
                    outcome: outcome.to_string(),
                    ..Default::default()
                })
                .collect(),
        }],
        ..snapshot(id, state)
    }
}

pub fn review_request(change: &str) -> ReviewRequest {
    ReviewRequest::new(change, format!("http://reviewer.test/update/{change}"))
}

pub fn pending_record(id: &str, now: DateTime<Utc>) -> JobRecord {
    JobRecord::pending(RunnerJobId::new(id), review_request(id), now)
}

/// Store a `Pending` record for each id.
pub fn track(registry: &JobRegistry, ids: &[&str]) {
    for id in ids {
        registry.store(RunnerJobId::new(*id), pending_record(id, Utc::now()));
    }
}
