//! # Assertion Evaluator
//!
//! Applies one matcher to a subject value. The result is `Ok(true)`,
//! `Ok(false)` or a [`MatcherError`] when the comparison is meaningless for
//! the value types involved. Absent subjects never error for emptiness.

use super::comparisons::{collection, numeric, string, MatcherError};
use crate::types::{Matcher, ProbeValue};

/// Evaluate `subject <matcher> expected`
pub fn evaluate(
    subject: &ProbeValue,
    matcher: &Matcher,
    expected: Option<&ProbeValue>,
) -> Result<bool, MatcherError> {
    match matcher {
        Matcher::Not { matcher } => evaluate(subject, matcher, expected).map(|held| !held),
        Matcher::Empty => subject
            .emptiness()
            .ok_or_else(|| incompatible(matcher, subject, &ProbeValue::Null)),
        Matcher::Equals { case_insensitive } => {
            let expected = require(matcher, expected)?;
            Ok(values_equal(subject, expected, *case_insensitive))
        }
        Matcher::In => {
            let expected = require(matcher, expected)?;
            let allowed = expected
                .as_list()
                .ok_or_else(|| incompatible(matcher, subject, expected))?;
            match subject {
                ProbeValue::List(items) => {
                    Ok(items.iter().all(|item| collection::contains(allowed, item)))
                }
                ProbeValue::Table(_) => Err(incompatible(matcher, subject, expected)),
                scalar => Ok(collection::contains(allowed, scalar)),
            }
        }
        Matcher::Includes => {
            let expected = require(matcher, expected)?;
            match (subject, expected) {
                (ProbeValue::Null, _) => Ok(false),
                (ProbeValue::List(items), ProbeValue::List(wanted)) => {
                    Ok(wanted.iter().all(|w| collection::contains(items, w)))
                }
                (ProbeValue::List(items), needle) => Ok(collection::contains(items, needle)),
                (ProbeValue::String(haystack), ProbeValue::String(needle)) => {
                    Ok(haystack.contains(needle.as_str()))
                }
                _ => Err(incompatible(matcher, subject, expected)),
            }
        }
        Matcher::Matches { case_insensitive } => {
            let expected = require(matcher, expected)?;
            let pattern = expected
                .as_str()
                .ok_or_else(|| incompatible(matcher, subject, expected))?;
            match subject {
                ProbeValue::Null => Ok(false),
                ProbeValue::List(items) if items.is_empty() => Ok(false),
                ProbeValue::List(items) => {
                    for item in items {
                        if !matches_scalar(matcher, item, pattern, *case_insensitive)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                scalar => matches_scalar(matcher, scalar, pattern, *case_insensitive),
            }
        }
        Matcher::Compare { op } => {
            let expected = require(matcher, expected)?;
            let actual = numeric::coerce(subject)?;
            let wanted = numeric::coerce(expected)?;
            Ok(numeric::compare(actual, wanted, *op))
        }
    }
}

/// Equality with optional `cmp`-style case-insensitive text comparison
fn values_equal(subject: &ProbeValue, expected: &ProbeValue, case_insensitive: bool) -> bool {
    if !case_insensitive {
        return collection::exact_equals(subject, expected);
    }
    match (subject, expected) {
        (ProbeValue::List(a), ProbeValue::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y, true))
        }
        (ProbeValue::Integer(_) | ProbeValue::Float(_), ProbeValue::Integer(_) | ProbeValue::Float(_)) => {
            collection::exact_equals(subject, expected)
        }
        (ProbeValue::List(_) | ProbeValue::Table(_), _)
        | (_, ProbeValue::List(_) | ProbeValue::Table(_)) => false,
        (ProbeValue::Null, other) | (other, ProbeValue::Null) => other.is_null(),
        _ => {
            if let (Some(a), Some(b)) = (subject.as_number(), expected.as_number()) {
                return a == b;
            }
            string::equals(&subject.to_text(), &expected.to_text(), true)
        }
    }
}

fn matches_scalar(
    matcher: &Matcher,
    value: &ProbeValue,
    pattern: &str,
    case_insensitive: bool,
) -> Result<bool, MatcherError> {
    match value {
        ProbeValue::Null => Ok(false),
        ProbeValue::List(_) | ProbeValue::Table(_) => Err(incompatible(
            matcher,
            value,
            &ProbeValue::String(pattern.to_string()),
        )),
        scalar => string::matches(&scalar.to_text(), pattern, case_insensitive),
    }
}

fn require<'a>(
    matcher: &Matcher,
    expected: Option<&'a ProbeValue>,
) -> Result<&'a ProbeValue, MatcherError> {
    expected.ok_or_else(|| MatcherError::MissingExpected {
        matcher: matcher.to_string(),
    })
}

fn incompatible(matcher: &Matcher, subject: &ProbeValue, expected: &ProbeValue) -> MatcherError {
    MatcherError::TypeIncompatible {
        matcher: matcher.to_string(),
        subject: subject.value_type(),
        expected: expected.value_type(),
    }
}
