//! Test doubles for the preflight bridge.
//!
//! [`MockRunner`] scripts Runner status sequences, [`RecordingNotifier`]
//! captures Reviewer callbacks and [`ManualClock`] drives registry time.

pub mod clock;
pub mod job;
pub mod mock;

pub use clock::ManualClock;
pub use job::*;
pub use mock::{MockRunner, NotifyCall, RecordingNotifier, ScriptStep};
