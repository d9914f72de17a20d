// src/strategies/mod.rs
//! Resource provider layer
//!
//! Probes reach the target system only through providers registered here:
//! - [`ResourceProvider`] - connect/fetch/release contract per probe kind
//! - [`ProviderRegistry`] - one provider per kind, shared across workers
//! - [`SystemCommandExecutor`] - allowlisted process execution for providers
//!   that shell out

pub mod command_executor;
pub mod errors;
pub mod registry;
pub mod traits;

pub use command_executor::{CommandError, CommandOutput, SystemCommandExecutor};
pub use errors::{ProbeError, StrategyError};
pub use registry::{ProviderRegistry, RegistryBuilder, RegistryStatistics};
pub use traits::{
    handle_as, string_parameter, ProbeParameters, ProbeRequest, ProviderHandle, ResourceProvider,
};

/// Create a registry builder for fluent configuration
pub fn registry_builder() -> RegistryBuilder {
    RegistryBuilder::new()
}
