//! SQL Server host command executor configuration
//!
//! Allowlisted executor for scanning a SQL Server 2014 instance and its host.

use std::time::Duration;
use stig_engine::strategies::SystemCommandExecutor;

/// Programs the providers may run:
/// - sqlcmd: instance queries
/// - reg: registry key reads (Windows hosts)
/// - sc: service state (Windows hosts)
/// - systemctl: service state (Linux hosts)
/// - hostname, whoami: host identity for shell-command probes
pub const MSSQL_HOST_COMMANDS: &[&str] = &["sqlcmd", "reg", "sc", "systemctl", "hostname", "whoami"];

/// Create command executor configured for SQL Server STIG scanning
pub fn create_mssql_command_executor(timeout: Duration) -> SystemCommandExecutor {
    let mut executor = SystemCommandExecutor::new().with_timeout(timeout);
    executor.allow_commands(MSSQL_HOST_COMMANDS);
    executor
}
