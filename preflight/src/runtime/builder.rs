use std::fmt;
use std::sync::Arc;

use crate::clock::Clock;
use crate::notifier::Notifier;
use crate::registry::JobRegistry;
use crate::runner::RunnerApi;

use super::supervisor::{BridgeRuntime, RuntimeSettings};

/// Builder for a [`BridgeRuntime`] with explicit dependencies.
///
/// The Runner client and the notifier are required. The registry defaults to
/// a fresh one on the system clock.
///
/// # Example
///
/// ```ignore
/// use preflight::*;
///
/// let runtime = BridgeRuntimeBuilder::new(RuntimeSettings::from(&config))
///     .with_runner(runner)
///     .with_notifier(notifier)
///     .build()?;
/// runtime.start().await?;
/// ```
pub struct BridgeRuntimeBuilder {
    settings: RuntimeSettings,
    registry: Option<JobRegistry>,
    clock: Option<Arc<dyn Clock>>,
    runner: Option<Arc<dyn RunnerApi>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl fmt::Debug for BridgeRuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeRuntimeBuilder")
            .field("settings", &self.settings)
            .field("registry_set", &self.registry.is_some())
            .field("clock_set", &self.clock.is_some())
            .field("runner_set", &self.runner.is_some())
            .field("notifier_set", &self.notifier.is_some())
            .finish()
    }
}

impl BridgeRuntimeBuilder {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            settings,
            registry: None,
            clock: None,
            runner: None,
            notifier: None,
        }
    }

    /// Use an existing registry instead of a fresh one.
    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Clock for a fresh registry. Ignored when a registry is supplied.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn RunnerApi>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// # Errors
    ///
    /// Returns an error if the runner or the notifier is missing.
    pub fn build(self) -> anyhow::Result<BridgeRuntime> {
        let runner = self
            .runner
            .ok_or_else(|| anyhow::anyhow!("runner dependency missing"))?;
        let notifier = self
            .notifier
            .ok_or_else(|| anyhow::anyhow!("notifier dependency missing"))?;
        let registry = match (self.registry, self.clock) {
            (Some(registry), _) => registry,
            (None, Some(clock)) => JobRegistry::with_clock(clock),
            (None, None) => JobRegistry::new(),
        };

        Ok(BridgeRuntime::new(self.settings, registry, runner, notifier))
    }
}
