//! Resource providers for SQL Server hosts
//!
//! - `database-query` - [`SqlCmdProvider`]
//! - `os-registry-key` - [`RegistryKeyProvider`]
//! - `os-service` - [`ServiceProvider`]
//! - `shell-command` - [`CommandProvider`]
//!
//! [`FixtureProvider`] answers any of these kinds from recorded results.

pub mod command;
pub mod database;
pub mod fixture;
pub mod registry_key;
pub mod service;

pub use command::{split_command_line, CommandProvider, SHELL_COMMAND};
pub use database::{SqlCmdProvider, SqlConnection, DATABASE_QUERY};
pub use fixture::{FixtureEntry, FixtureError, FixtureProvider, FixtureSet};
pub use registry_key::{RegistryKeyProvider, OS_REGISTRY_KEY};
pub use service::{ServiceManager, ServiceProvider, ServiceState, OS_SERVICE};

/// Probe kinds served by the live providers
pub const PROBE_KINDS: &[&str] = &[DATABASE_QUERY, OS_REGISTRY_KEY, OS_SERVICE, SHELL_COMMAND];
