// ============================================================================
// PROBE VALUE TYPES
// ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Runtime representation of every value the engine handles
///
/// Attribute values, probe results and expected values all share this
/// union so the assertion evaluator can consume them uniformly. Zero rows,
/// an empty list and `Null` are data, never errors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbeValue {
    /// Absent value (missing registry key, NULL column, unset attribute)
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ProbeValue>),
    Table(Table),
}

/// Coarse type classification used for attribute type checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Null,
    Boolean,
    Number,
    String,
    List,
    Table,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::List => "list",
            ValueType::Table => "table",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProbeValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ProbeValue::Null => ValueType::Null,
            ProbeValue::Boolean(_) => ValueType::Boolean,
            ProbeValue::Integer(_) | ProbeValue::Float(_) => ValueType::Number,
            ProbeValue::String(_) => ValueType::String,
            ProbeValue::List(_) => ValueType::List,
            ProbeValue::Table(_) => ValueType::Table,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ProbeValue::Null)
    }

    /// Get as string if possible
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ProbeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as boolean if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ProbeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as list if possible
    pub fn as_list(&self) -> Option<&[ProbeValue]> {
        match self {
            ProbeValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric view of the value; numeric strings are accepted
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ProbeValue::Integer(i) => Some(*i as f64),
            ProbeValue::Float(f) => Some(*f),
            ProbeValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Emptiness for the `empty` matcher
    ///
    /// Returns `None` for scalar kinds that have no notion of emptiness.
    pub fn emptiness(&self) -> Option<bool> {
        match self {
            ProbeValue::Null => Some(true),
            ProbeValue::String(s) => Some(s.is_empty()),
            ProbeValue::List(items) => Some(items.is_empty()),
            ProbeValue::Table(table) => Some(table.is_empty()),
            ProbeValue::Boolean(_) | ProbeValue::Integer(_) | ProbeValue::Float(_) => None,
        }
    }

    /// Textual form used by case-insensitive comparison and `join`
    pub fn to_text(&self) -> String {
        match self {
            ProbeValue::Null => String::new(),
            ProbeValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Convert a JSON value (tags, fixture payloads) into a probe value
    pub fn from_json(value: &serde_json::Value) -> ProbeValue {
        match value {
            serde_json::Value::Null => ProbeValue::Null,
            serde_json::Value::Bool(b) => ProbeValue::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ProbeValue::Integer(i),
                None => ProbeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => ProbeValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                ProbeValue::List(items.iter().map(ProbeValue::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let columns: Vec<String> = map.keys().cloned().collect();
                let row = map.values().map(ProbeValue::from_json).collect();
                ProbeValue::Table(Table {
                    columns,
                    rows: vec![row],
                })
            }
        }
    }
}

impl fmt::Display for ProbeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeValue::Null => write!(f, "nil"),
            ProbeValue::Boolean(b) => write!(f, "{}", b),
            ProbeValue::Integer(i) => write!(f, "{}", i),
            ProbeValue::Float(fl) => write!(f, "{}", fl),
            ProbeValue::String(s) => write!(f, "\"{}\"", s),
            ProbeValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ProbeValue::Table(table) => write!(
                f,
                "table({} columns, {} rows)",
                table.columns.len(),
                table.rows.len()
            ),
        }
    }
}

impl From<&str> for ProbeValue {
    fn from(value: &str) -> Self {
        ProbeValue::String(value.to_string())
    }
}

impl From<String> for ProbeValue {
    fn from(value: String) -> Self {
        ProbeValue::String(value)
    }
}

impl From<bool> for ProbeValue {
    fn from(value: bool) -> Self {
        ProbeValue::Boolean(value)
    }
}

impl From<i64> for ProbeValue {
    fn from(value: i64) -> Self {
        ProbeValue::Integer(value)
    }
}

impl From<f64> for ProbeValue {
    fn from(value: f64) -> Self {
        ProbeValue::Float(value)
    }
}

impl From<Table> for ProbeValue {
    fn from(value: Table) -> Self {
        ProbeValue::Table(value)
    }
}

impl<T: Into<ProbeValue>> From<Vec<T>> for ProbeValue {
    fn from(values: Vec<T>) -> Self {
        ProbeValue::List(values.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// TABLE - Named columns and rows (query results, registry values)
// ============================================================================

/// Tabular probe result with named columns
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ProbeValue>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a single-row table from ordered field pairs
    pub fn single_row(fields: Vec<(String, ProbeValue)>) -> Self {
        let (columns, row): (Vec<String>, Vec<ProbeValue>) = fields.into_iter().unzip();
        Self {
            columns,
            rows: vec![row],
        }
    }

    pub fn push_row(&mut self, row: Vec<ProbeValue>) {
        self.rows.push(row);
    }

    pub fn with_row(mut self, row: Vec<ProbeValue>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<ProbeValue>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).cloned().unwrap_or_default())
                .collect(),
        )
    }

    /// Rows keyed by column name, for display and fixtures
    pub fn records(&self) -> Vec<BTreeMap<String, ProbeValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}
