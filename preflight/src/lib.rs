//! Preflight - a bridge between a code-review tool and a CI job engine.
//!
//! The Reviewer posts a webhook, the bridge submits an equivalent job to the
//! Runner, tracks it until it finishes and reports each meaningful state
//! change back through the Reviewer's callback URL.
//!
//! # Core Concepts
//!
//! - **Registry**: [`JobRegistry`] is the in-memory, lock-protected map of
//!   tracked jobs keyed by [`RunnerJobId`]. Removing a record is the only way
//!   a job stops being polled.
//!
//! - **Retry**: [`retry()`] wraps any fallible async operation with bounded
//!   exponential backoff and observes a [`ShutdownToken`].
//!
//! - **Status mapping**: [`map_snapshot`] turns a raw [`RunnerJobSnapshot`]
//!   into a [`JobStatus`], checking aborts and failures before the lifecycle
//!   string.
//!
//! - **Monitor**: [`JobMonitor`] reconciles every tracked job on a fixed
//!   interval, notifies the Reviewer through a [`Notifier`] and evicts
//!   terminal jobs.
//!
//! - **Runtime**: [`BridgeRuntime`] ties the pieces together and owns the
//!   monitor task and the shutdown signal.
//!
//! # Feature Flags
//!
//! - `metrics` - Prometheus metrics and the `/metrics` route
//!
//! # Example
//!
//! ```ignore
//! use preflight::*;
//!
//! let config = Config::load("config.yaml")?;
//! let runner = Arc::new(HttpRunnerClient::new(
//!     &config.runner.host,
//!     &config.runner.api_key,
//!     config.submit_template(),
//!     config.runner_timeout(),
//! )?);
//! let notifier = Arc::new(HttpNotifier::new(&config.runner.host, config.reviewer_timeout())?);
//! let runtime = BridgeRuntimeBuilder::new(RuntimeSettings::from(&config))
//!     .with_runner(runner)
//!     .with_notifier(notifier)
//!     .build()?;
//! runtime.start().await?;
//! ```

pub mod clock;

/// Configuration file and environment overrides.
///
/// [`Config`] is read from YAML, then overridden from the environment
/// (`PORT`, `RUNNER_HOST`, `RETRY_MAX_ATTEMPTS`, ...) and validated.
pub mod config;

/// Inbound HTTP routes served by the bridge binary.
pub mod http;

/// Core data model: [`RunnerJobId`], [`JobStatus`], [`ReviewRequest`] and
/// [`JobRecord`].
pub mod job;

#[cfg(feature = "metrics")]
/// Prometheus collectors.
pub mod metrics;

/// Periodic reconciliation of tracked jobs against the Runner.
pub mod monitor;

/// Reviewer status callbacks.
pub mod notifier;

pub mod registry;

/// Bounded retry with exponential backoff.
pub mod retry;

/// Runner API client and wire types.
pub mod runner;

/// Runtime orchestration and lifecycle.
///
/// - [`BridgeRuntime`] - owns the registry, the monitor task and shutdown
/// - [`BridgeRuntimeBuilder`] - validates dependencies before construction
/// - [`RuntimeSettings`] - intervals, retry policies and shutdown timeout
pub mod runtime;

pub mod shutdown;

/// Runner snapshot to [`JobStatus`] mapping.
pub mod status;

/// Submission of Reviewer requests to the Runner.
pub mod submission;

/// Tracing setup, spans and `record_*` helpers.
pub mod telemetry;

pub use clock::*;
pub use config::*;
pub use job::*;
pub use monitor::*;
pub use notifier::*;
pub use registry::*;
pub use retry::*;
pub use runner::{HttpRunnerClient, RunnerApi, RunnerJobSnapshot, SubmitTemplate};
pub use runtime::*;
pub use shutdown::*;
pub use status::*;
pub use submission::*;
