//! # Combinator Engine
//!
//! Aggregates child verdicts of one group. A group moves from `Pending` to
//! `Evaluating` on its first recorded child and concludes exactly once.
//! Children that were excluded (false guard, empty expansion) are never
//! recorded, so a group with no recorded children contributes nothing.

use crate::types::Combinator;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of an assertion or group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Passed,
    Failed,
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed => write!(f, "PASSED"),
            Verdict::Failed => write!(f, "FAILED"),
            Verdict::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Pending,
    Evaluating,
    Concluded(Option<Verdict>),
}

#[derive(Debug, Clone)]
pub struct GroupEvaluation {
    combinator: Combinator,
    state: GroupState,
    passed: usize,
    failed: usize,
    errored: usize,
}

impl GroupEvaluation {
    pub fn new(combinator: Combinator) -> Self {
        Self {
            combinator,
            state: GroupState::Pending,
            passed: 0,
            failed: 0,
            errored: 0,
        }
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    /// Record one contributing child; ignored once concluded
    pub fn record(&mut self, verdict: Verdict) {
        match self.state {
            GroupState::Concluded(_) => return,
            GroupState::Pending => self.state = GroupState::Evaluating,
            GroupState::Evaluating => {}
        }
        match verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed => self.failed += 1,
            Verdict::Error => self.errored += 1,
        }
    }

    /// Final verdict; `None` when no child contributed
    pub fn conclude(&mut self) -> Option<Verdict> {
        if let GroupState::Concluded(verdict) = self.state {
            return verdict;
        }
        let verdict = match self.state {
            GroupState::Pending => None,
            _ => Some(self.aggregate()),
        };
        self.state = GroupState::Concluded(verdict);
        verdict
    }

    fn aggregate(&self) -> Verdict {
        match self.combinator {
            Combinator::All if self.failed > 0 => Verdict::Failed,
            Combinator::All if self.errored > 0 => Verdict::Error,
            Combinator::All => Verdict::Passed,
            Combinator::OneOf if self.passed > 0 => Verdict::Passed,
            Combinator::OneOf if self.errored > 0 => Verdict::Error,
            Combinator::OneOf => Verdict::Failed,
        }
    }
}

/// Combine a finished list of verdicts
pub fn combine(combinator: Combinator, verdicts: impl IntoIterator<Item = Verdict>) -> Option<Verdict> {
    let mut group = GroupEvaluation::new(combinator);
    for verdict in verdicts {
        group.record(verdict);
    }
    group.conclude()
}
