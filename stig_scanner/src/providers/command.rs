//! `shell-command` provider
//!
//! The query is a command line. Its program must be on the executor's
//! allowlist; arguments are split on whitespace with double quotes grouping.
//! A non-zero exit status is data, not an error.

use std::sync::Arc;
use stig_engine::strategies::{
    ProbeError, ProbeParameters, ProviderHandle, ResourceProvider, SystemCommandExecutor,
};
use stig_engine::types::{ProbeValue, Table};

pub const SHELL_COMMAND: &str = "shell-command";

pub struct CommandProvider {
    executor: SystemCommandExecutor,
}

impl CommandProvider {
    pub fn new(executor: SystemCommandExecutor) -> Self {
        Self { executor }
    }
}

impl ResourceProvider for CommandProvider {
    fn kind(&self) -> &str {
        SHELL_COMMAND
    }

    fn connect(&self, _parameters: &ProbeParameters) -> Result<ProviderHandle, ProbeError> {
        Ok(Arc::new(()))
    }

    fn fetch(&self, _handle: &ProviderHandle, query: &str) -> Result<ProbeValue, ProbeError> {
        let words = split_command_line(query)
            .map_err(|reason| ProbeError::query_failed(SHELL_COMMAND, query, reason))?;
        let (program, args) = match words.split_first() {
            Some(split) => split,
            None => return Err(ProbeError::invalid_parameters(SHELL_COMMAND, "empty command line")),
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = self
            .executor
            .execute(program, &args, None)
            .map_err(|e| e.into_probe_error(SHELL_COMMAND, query))?;

        Ok(ProbeValue::Table(Table::single_row(vec![
            ("stdout".to_string(), ProbeValue::from(output.stdout.trim_end())),
            ("stderr".to_string(), ProbeValue::from(output.stderr.trim_end())),
            ("exit_status".to_string(), ProbeValue::Integer(i64::from(output.exit_code))),
        ])))
    }

    fn describe(&self) -> String {
        "allowlisted host commands".to_string()
    }
}

/// Split a command line into words; `"..."` groups, no escapes
pub fn split_command_line(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quoted {
        return Err("unterminated quote in command line".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
