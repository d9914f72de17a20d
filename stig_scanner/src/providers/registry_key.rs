//! `os-registry-key` provider backed by `reg query`
//!
//! The query is the key path. Values come back as a single-row table, one
//! column per value name; a missing key is null.

use std::sync::Arc;
use stig_engine::strategies::{
    ProbeError, ProbeParameters, ProviderHandle, ResourceProvider, SystemCommandExecutor,
};
use stig_engine::types::{ProbeValue, Table};

pub const OS_REGISTRY_KEY: &str = "os-registry-key";

const VALUE_SEPARATOR: &str = "    ";

pub struct RegistryKeyProvider {
    executor: SystemCommandExecutor,
}

impl RegistryKeyProvider {
    pub fn new(executor: SystemCommandExecutor) -> Self {
        Self { executor }
    }
}

impl ResourceProvider for RegistryKeyProvider {
    fn kind(&self) -> &str {
        OS_REGISTRY_KEY
    }

    fn connect(&self, _parameters: &ProbeParameters) -> Result<ProviderHandle, ProbeError> {
        Ok(Arc::new(()))
    }

    fn fetch(&self, _handle: &ProviderHandle, query: &str) -> Result<ProbeValue, ProbeError> {
        let key = query.trim();
        if key.is_empty() {
            return Err(ProbeError::invalid_parameters(OS_REGISTRY_KEY, "empty registry key path"));
        }

        let output = self
            .executor
            .execute("reg", &["query", key], None)
            .map_err(|e| e.into_probe_error(OS_REGISTRY_KEY, key))?;

        if output.success() {
            return Ok(ProbeValue::Table(parse_reg_query(&output.stdout)));
        }

        let message = format!("{}{}", output.stderr, output.stdout);
        if message.contains("unable to find") {
            Ok(ProbeValue::Null)
        } else if message.contains("Access is denied") {
            Err(ProbeError::AccessDenied {
                kind: OS_REGISTRY_KEY.to_string(),
                reason: message.trim().to_string(),
            })
        } else {
            Err(ProbeError::query_failed(OS_REGISTRY_KEY, key, message.trim()))
        }
    }

    fn describe(&self) -> String {
        "Windows registry values through reg query".to_string()
    }
}

/// Parse the value lines of `reg query <key>` into a single-row table
pub fn parse_reg_query(output: &str) -> Table {
    let mut fields = Vec::new();
    for line in output.lines() {
        if !line.starts_with(' ') {
            continue;
        }
        let parts: Vec<&str> = line
            .trim()
            .split(VALUE_SEPARATOR)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        let (name, value_type, data) = match parts.as_slice() {
            [name, value_type] if value_type.starts_with("REG_") => (*name, *value_type, ""),
            [name, value_type, ..] if value_type.starts_with("REG_") => {
                (*name, *value_type, data_after(line, value_type))
            }
            _ => continue,
        };
        fields.push((name.to_string(), convert_value(value_type, data)));
    }
    Table::single_row(fields)
}

/// Data may itself contain the separator; take everything after the type
fn data_after<'a>(line: &'a str, value_type: &str) -> &'a str {
    line.find(value_type)
        .map(|start| line[start + value_type.len()..].trim())
        .unwrap_or("")
}

fn convert_value(value_type: &str, data: &str) -> ProbeValue {
    match value_type {
        "REG_DWORD" | "REG_QWORD" => data
            .strip_prefix("0x")
            .and_then(|hex| i64::from_str_radix(hex, 16).ok())
            .map(ProbeValue::Integer)
            .unwrap_or_else(|| ProbeValue::from(data)),
        "REG_MULTI_SZ" => ProbeValue::List(
            data.split("\\0")
                .filter(|item| !item.is_empty())
                .map(ProbeValue::from)
                .collect(),
        ),
        _ => ProbeValue::from(data),
    }
}
