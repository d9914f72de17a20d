//! Subject selector chains (`column`, `field`, `lines`, `distinct`, `count`, `join`)

use super::comparisons::{collection, MatcherError};
use crate::types::{ProbeValue, Selector};

/// Apply selectors left to right
pub fn apply(value: ProbeValue, selectors: &[Selector]) -> Result<ProbeValue, MatcherError> {
    selectors
        .iter()
        .try_fold(value, |current, selector| apply_one(current, selector))
}

fn apply_one(value: ProbeValue, selector: &Selector) -> Result<ProbeValue, MatcherError> {
    match (selector, value) {
        (Selector::Column(_), ProbeValue::Null) => Ok(ProbeValue::List(Vec::new())),
        (Selector::Column(name), ProbeValue::Table(table)) => table
            .column(name)
            .map(ProbeValue::List)
            .ok_or_else(|| failed(selector, format!("no column named '{}'", name))),

        (Selector::Field(_), ProbeValue::Null) => Ok(ProbeValue::Null),
        (Selector::Field(name), ProbeValue::Table(table)) => Ok(table
            .column_index(name)
            .and_then(|index| table.rows.first().and_then(|row| row.get(index)))
            .cloned()
            .unwrap_or_default()),

        (Selector::Lines, ProbeValue::Null) => Ok(ProbeValue::List(Vec::new())),
        (Selector::Lines, ProbeValue::String(text)) => Ok(ProbeValue::List(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(ProbeValue::from)
                .collect(),
        )),

        (Selector::Distinct, ProbeValue::Null) => Ok(ProbeValue::List(Vec::new())),
        (Selector::Distinct, ProbeValue::List(items)) => {
            Ok(ProbeValue::List(collection::distinct(items)))
        }
        (Selector::Distinct, ProbeValue::Table(mut table)) => {
            let rows = std::mem::take(&mut table.rows);
            let mut unique: Vec<Vec<ProbeValue>> = Vec::with_capacity(rows.len());
            for row in rows {
                if !unique.contains(&row) {
                    unique.push(row);
                }
            }
            table.rows = unique;
            Ok(ProbeValue::Table(table))
        }

        (Selector::Count, ProbeValue::Null) => Ok(ProbeValue::Integer(0)),
        (Selector::Count, ProbeValue::List(items)) => Ok(ProbeValue::Integer(items.len() as i64)),
        (Selector::Count, ProbeValue::Table(table)) => Ok(ProbeValue::Integer(table.len() as i64)),

        (Selector::Join, ProbeValue::List(items)) => {
            Ok(ProbeValue::String(ProbeValue::List(items).to_string()))
        }
        (Selector::Join, other @ (ProbeValue::Table(_))) => Err(failed(
            selector,
            format!("cannot join a {}", other.value_type()),
        )),
        (Selector::Join, scalar) => Ok(ProbeValue::String(scalar.to_text())),

        (selector, other) => Err(failed(
            selector,
            format!("not applicable to a {} value", other.value_type()),
        )),
    }
}

fn failed(selector: &Selector, reason: String) -> MatcherError {
    MatcherError::SelectorFailed {
        selector: selector.to_string(),
        reason,
    }
}
