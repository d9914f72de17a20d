pub mod common;
pub mod control;
pub mod error;

pub use common::{ProbeValue, Table, ValueType};
pub use control::{
    Assertion, AssertionGroup, Combinator, ConditionalBranch, Control, ForEachBranch, Matcher,
    Node, NumericOp, Operand, Selector, Severity, Subject,
};
pub use error::{DefinitionError, ErrorKind};
