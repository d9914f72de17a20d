//! # Comparison Primitives
//!
//! Low-level string, collection and numeric comparisons used by the
//! assertion evaluator.

use crate::types::{ErrorKind, NumericOp, ProbeValue, ValueType};

/// Type-incompatible or otherwise inapplicable matcher use
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatcherError {
    #[error("Matcher '{matcher}' cannot compare {subject} subject with {expected} expected value")]
    TypeIncompatible {
        matcher: String,
        subject: ValueType,
        expected: ValueType,
    },

    #[error("Matcher '{matcher}' requires an expected value")]
    MissingExpected { matcher: String },

    #[error("Value {value} is not numeric")]
    NotNumeric { value: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Selector '{selector}' failed: {reason}")]
    SelectorFailed { selector: String, reason: String },
}

impl MatcherError {
    pub fn error_kind(&self) -> ErrorKind {
        ErrorKind::MatcherApplicationError
    }
}

/// String comparisons
pub mod string {
    use super::*;

    pub fn equals(actual: &str, expected: &str, case_insensitive: bool) -> bool {
        if case_insensitive {
            actual.to_lowercase() == expected.to_lowercase()
        } else {
            actual == expected
        }
    }

    /// Regex search (unanchored, like `=~`)
    pub fn matches(
        actual: &str,
        pattern: &str,
        case_insensitive: bool,
    ) -> Result<bool, MatcherError> {
        regex::RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map(|re| re.is_match(actual))
            .map_err(|e| MatcherError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

}

/// Collection comparisons
pub mod collection {
    use super::*;

    /// Structural equality; integers and floats compare numerically
    pub fn exact_equals(left: &ProbeValue, right: &ProbeValue) -> bool {
        match (left, right) {
            (ProbeValue::Integer(a), ProbeValue::Float(b))
            | (ProbeValue::Float(b), ProbeValue::Integer(a)) => (*a as f64) == *b,
            (ProbeValue::List(a), ProbeValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| exact_equals(x, y))
            }
            _ => left == right,
        }
    }

    /// Membership by exact element equality
    pub fn contains(items: &[ProbeValue], needle: &ProbeValue) -> bool {
        items.iter().any(|item| exact_equals(item, needle))
    }

    /// First-occurrence unique elements
    pub fn distinct(items: Vec<ProbeValue>) -> Vec<ProbeValue> {
        let mut unique: Vec<ProbeValue> = Vec::with_capacity(items.len());
        for item in items {
            if !contains(&unique, &item) {
                unique.push(item);
            }
        }
        unique
    }

}

/// Numeric comparisons
pub mod numeric {
    use super::*;

    pub fn compare(actual: f64, expected: f64, op: NumericOp) -> bool {
        match op {
            NumericOp::Gt => actual > expected,
            NumericOp::Ge => actual >= expected,
            NumericOp::Lt => actual < expected,
            NumericOp::Le => actual <= expected,
        }
    }

    /// Numeric view of a value, or a matcher error naming it
    pub fn coerce(value: &ProbeValue) -> Result<f64, MatcherError> {
        value.as_number().ok_or_else(|| MatcherError::NotNumeric {
            value: value.to_string(),
        })
    }

}
