//! Allowlisted command execution for probe providers
//!
//! Providers that shell out (`sqlcmd`, `reg`, `sc`, `systemctl`, ...) go
//! through this executor so every external call is allowlisted, runs with a
//! cleared environment and is bounded by a timeout.

use crate::strategies::errors::ProbeError;
use std::collections::{BTreeMap, HashSet};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

#[cfg(windows)]
const DEFAULT_SEARCH_PATH: &str = r"C:\Windows\System32;C:\Windows;C:\Program Files\Microsoft SQL Server\Client SDK\ODBC\110\Tools\Binn";
#[cfg(not(windows))]
const DEFAULT_SEARCH_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin:/opt/mssql-tools/bin";

/// Runs allowlisted programs with a sanitized environment
#[derive(Debug, Clone)]
pub struct SystemCommandExecutor {
    default_timeout: Duration,
    allowed_commands: HashSet<String>,
    search_path: String,
    /// Variables passed through despite the cleared environment
    environment: BTreeMap<String, String>,
}

impl SystemCommandExecutor {
    /// Executor with an empty allowlist
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            allowed_commands: HashSet::new(),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            environment: BTreeMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_search_path(mut self, path: impl Into<String>) -> Self {
        self.search_path = path.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn allow_command(&mut self, command: impl Into<String>) {
        self.allowed_commands.insert(command.into());
    }

    pub fn allow_commands(&mut self, commands: &[&str]) {
        for cmd in commands {
            self.allowed_commands.insert(cmd.to_string());
        }
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        self.allowed_commands.contains(command)
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Execute a program and capture its output
    pub fn execute(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, CommandError> {
        if !self.is_allowed(program) {
            return Err(CommandError::SecurityViolation {
                reason: format!("Command '{}' not in allowlist", program),
            });
        }

        let timeout_duration = timeout.unwrap_or(self.default_timeout);
        let start = Instant::now();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .env("PATH", &self.search_path)
            .envs(&self.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CommandError::ProgramNotFound {
                program: program.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => CommandError::PermissionDenied {
                program: program.to_string(),
            },
            _ => CommandError::ExecutionFailed {
                program: program.to_string(),
                reason: e.to_string(),
            },
        })?;

        let status = wait_timeout::ChildExt::wait_timeout(&mut child, timeout_duration).map_err(
            |e| CommandError::ExecutionFailed {
                program: program.to_string(),
                reason: e.to_string(),
            },
        )?;

        match status {
            Some(status) => {
                let output =
                    child
                        .wait_with_output()
                        .map_err(|e| CommandError::ExecutionFailed {
                            program: program.to_string(),
                            reason: e.to_string(),
                        })?;

                Ok(CommandOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code: status.code().unwrap_or(-1),
                    duration: start.elapsed(),
                })
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(CommandError::Timeout {
                    timeout_ms: timeout_duration.as_millis() as u64,
                })
            }
        }
    }
}

impl Default for SystemCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Captured process output
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Program not found: {program}")]
    ProgramNotFound { program: String },

    #[error("Execution failed for '{program}': {reason}")]
    ExecutionFailed { program: String, reason: String },

    #[error("Command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Permission denied: {program}")]
    PermissionDenied { program: String },

    #[error("Security violation: {reason}")]
    SecurityViolation { reason: String },
}

impl CommandError {
    /// Map onto the probe error taxonomy for the given kind
    pub fn into_probe_error(self, kind: &str, query: &str) -> ProbeError {
        match self {
            CommandError::Timeout { timeout_ms } => ProbeError::Timeout {
                kind: kind.to_string(),
                timeout_ms,
            },
            CommandError::ProgramNotFound { .. } | CommandError::ExecutionFailed { .. } => {
                ProbeError::unavailable(kind, self.to_string())
            }
            CommandError::PermissionDenied { .. } => ProbeError::AccessDenied {
                kind: kind.to_string(),
                reason: self.to_string(),
            },
            CommandError::SecurityViolation { .. } => {
                ProbeError::query_failed(kind, query, self.to_string())
            }
        }
    }
}
