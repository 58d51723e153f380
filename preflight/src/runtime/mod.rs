/// Runtime builder with dependency validation.
pub mod builder;
/// Runtime supervisor owning the monitor task and shutdown signal.
pub mod supervisor;

pub use builder::BridgeRuntimeBuilder;
pub use supervisor::{BridgeRuntime, RuntimeSettings};
