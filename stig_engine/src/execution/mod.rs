//! Assertion evaluation and control execution
//!
//! - [`evaluate`] applies one matcher to a probe value
//! - [`combinator`] folds child verdicts for ALL / ONE-OF groups
//! - [`ProbeSession`] memoizes provider calls for one control
//! - [`ControlRunner`] walks a control's tree into a result

pub mod combinator;
pub mod comparisons;
pub mod engine;
pub mod evaluator;
pub mod selectors;
pub mod session;

pub use combinator::{combine, GroupEvaluation, GroupState, Verdict};
pub use comparisons::{collection, numeric, string, MatcherError};
pub use engine::{ControlRunner, NO_APPLICABLE_ASSERTIONS};
pub use evaluator::evaluate;
pub use session::ProbeSession;
