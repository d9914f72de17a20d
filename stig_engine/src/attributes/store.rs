//! # Attribute Store
//!
//! Named configuration values with declared defaults. Values are looked up
//! by precedence: explicit override, environment snapshot, profile file,
//! declared default. The store is built once per run and resolved into an
//! immutable [`ResolvedAttributes`] set shared by every control.

use super::error::AttributeError;
use crate::types::{ProbeValue, ValueType};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Explicit per-run override values
pub type AttributeOverrides = BTreeMap<String, ProbeValue>;

/// Attribute declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ProbeValue>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<ProbeValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Type every other value source must agree with
    pub fn declared_type(&self) -> Option<ValueType> {
        self.default
            .as_ref()
            .filter(|value| !value.is_null())
            .map(ProbeValue::value_type)
    }
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AttributeStore {
    declared: BTreeMap<String, Attribute>,
    profile_values: BTreeMap<String, ProbeValue>,
    environment: BTreeMap<String, String>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration; repeating an identical one is a no-op
    pub fn register(&mut self, attribute: Attribute) -> Result<(), AttributeError> {
        match self.declared.get_mut(&attribute.name) {
            Some(existing) if existing.default != attribute.default => {
                Err(AttributeError::ConflictingDeclaration {
                    name: attribute.name,
                })
            }
            Some(existing) => {
                if existing.description.is_empty() {
                    existing.description = attribute.description;
                }
                Ok(())
            }
            None => {
                self.declared.insert(attribute.name.clone(), attribute);
                Ok(())
            }
        }
    }

    pub fn declaration(&self, name: &str) -> Option<&Attribute> {
        self.declared.get(name)
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Attribute> {
        self.declared.values()
    }

    /// Values supplied by the profile's attribute file
    pub fn with_profile_values(mut self, values: BTreeMap<String, ProbeValue>) -> Self {
        self.profile_values.extend(values);
        self
    }

    /// Explicit environment snapshot, keyed by attribute name
    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// Snapshot `<prefix><NAME>` variables of the current process
    ///
    /// Names are lowercased so `STIG_ATTR_SERVER_AUDIT_IMPLEMENTED` feeds
    /// `server_audit_implemented`.
    pub fn capture_environment(self, prefix: &str) -> Self {
        self.capture_environment_from(prefix, std::env::vars())
    }

    /// Snapshot `<prefix><NAME>` entries from an explicit variable list
    pub fn capture_environment_from(
        self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let environment = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(prefix)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_lowercase(), value))
            })
            .collect();
        self.with_environment(environment)
    }

    /// Resolve one attribute
    pub fn resolve(
        &self,
        name: &str,
        overrides: &AttributeOverrides,
    ) -> Result<ProbeValue, AttributeError> {
        let declared = self.declared.get(name);
        let expected = declared.and_then(Attribute::declared_type);

        if let Some(value) = overrides.get(name) {
            check_type(name, expected, value, "override")?;
            return Ok(value.clone());
        }

        if let Some(raw) = self.environment.get(name) {
            return coerce_environment(name, expected, raw);
        }

        if let Some(value) = self.profile_values.get(name) {
            check_type(name, expected, value, "profile")?;
            return Ok(value.clone());
        }

        declared
            .and_then(|attribute| attribute.default.clone())
            .ok_or_else(|| AttributeError::Unresolved {
                name: name.to_string(),
            })
    }

    /// Resolve every named attribute once, keeping failures per name
    pub fn resolve_all<'a>(
        &self,
        names: impl IntoIterator<Item = &'a String>,
        overrides: &AttributeOverrides,
    ) -> ResolvedAttributes {
        let mut wanted: BTreeSet<&str> = self.declared.keys().map(String::as_str).collect();
        wanted.extend(names.into_iter().map(|name| -> &str { name }));

        let values = wanted
            .into_iter()
            .map(|name| {
                let outcome = self.resolve(name, overrides);
                if let Err(e) = &outcome {
                    debug!("Attribute '{}' did not resolve: {}", name, e);
                }
                (name.to_string(), outcome)
            })
            .collect();

        ResolvedAttributes { values }
    }
}

fn check_type(
    name: &str,
    expected: Option<ValueType>,
    value: &ProbeValue,
    source_name: &str,
) -> Result<(), AttributeError> {
    match expected {
        Some(expected) if value.value_type() != expected => Err(AttributeError::TypeMismatch {
            name: name.to_string(),
            expected,
            found: value.value_type(),
            source_name: source_name.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Environment values are text; they take the type of the declared default
fn coerce_environment(
    name: &str,
    expected: Option<ValueType>,
    raw: &str,
) -> Result<ProbeValue, AttributeError> {
    let trimmed = raw.trim();
    let coerced = match expected {
        None | Some(ValueType::String) => Some(ProbeValue::String(raw.to_string())),
        Some(ValueType::Boolean) => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(ProbeValue::Boolean(true)),
            "false" | "no" | "0" => Some(ProbeValue::Boolean(false)),
            _ => None,
        },
        Some(ValueType::Number) => trimmed
            .parse::<i64>()
            .map(ProbeValue::Integer)
            .ok()
            .or_else(|| trimmed.parse::<f64>().map(ProbeValue::Float).ok()),
        Some(ValueType::List) => match serde_json::from_str::<ProbeValue>(trimmed) {
            Ok(list @ ProbeValue::List(_)) => Some(list),
            _ => Some(ProbeValue::List(
                trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(ProbeValue::from)
                    .collect(),
            )),
        },
        Some(ValueType::Table) | Some(ValueType::Null) => {
            serde_json::from_str::<ProbeValue>(trimmed).ok()
        }
    };

    let value = coerced.ok_or_else(|| AttributeError::TypeMismatch {
        name: name.to_string(),
        expected: expected.unwrap_or(ValueType::String),
        found: ValueType::String,
        source_name: "environment".to_string(),
    })?;
    check_type(name, expected, &value, "environment")?;
    Ok(value)
}

/// Read a name/value file (TOML, or JSON by extension)
pub fn read_values_file(path: &Path) -> Result<BTreeMap<String, ProbeValue>, AttributeError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| AttributeError::FileRead {
        path: display.clone(),
        reason: e.to_string(),
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let parsed = if is_json {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        toml::from_str(&content).map_err(|e| e.to_string())
    };

    parsed.map_err(|reason| AttributeError::FileParse {
        path: display,
        reason,
    })
}

// ============================================================================
// RESOLVED SET
// ============================================================================

/// Immutable attribute values for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAttributes {
    values: BTreeMap<String, Result<ProbeValue, AttributeError>>,
}

impl ResolvedAttributes {
    pub fn get(&self, name: &str) -> Result<&ProbeValue, AttributeError> {
        match self.values.get(name) {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(e.clone()),
            None => Err(AttributeError::Unresolved {
                name: name.to_string(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(Ok(_)))
    }

    /// First failure among the given names, in name order
    pub fn first_failure<'a>(
        &self,
        names: impl IntoIterator<Item = &'a String>,
    ) -> Option<AttributeError> {
        names.into_iter().find_map(|name| self.get(name).err())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, ProbeValue)> for ResolvedAttributes {
    fn from_iter<I: IntoIterator<Item = (String, ProbeValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k, Ok(v))).collect(),
        }
    }
}
