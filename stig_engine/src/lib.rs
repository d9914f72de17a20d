//! # STIG Engine - Compliance Control Evaluation
//!
//! Evaluates declarative compliance controls against a live target:
//! attributes are resolved once per run, probes reach the target only
//! through registered resource providers, and every control yields exactly
//! one PASSED / FAILED / SKIPPED / ERROR result.

pub mod api;
pub mod attributes;
pub mod execution;
pub mod profile;
pub mod results;
pub mod strategies;
pub mod types;

// Convenience re-exports
pub use api::*;

pub mod prelude {
    pub use crate::api::{CancellationToken, ProfileRunner, RunnerConfig, RunnerError};

    pub use crate::attributes::{
        Attribute, AttributeError, AttributeOverrides, AttributeStore, ResolvedAttributes,
    };

    pub use crate::execution::{evaluate, ControlRunner, ProbeSession, Verdict};

    pub use crate::profile::{load_profile, Profile, ProfileError};

    pub use crate::results::{
        render_summary, ControlResult, ControlStatus, HostContext, Report, Reporter,
    };

    pub use crate::strategies::{
        handle_as, string_parameter, ProbeError, ProbeParameters, ProbeRequest, ProviderHandle,
        ProviderRegistry, RegistryBuilder, ResourceProvider, SystemCommandExecutor,
    };

    pub use crate::types::{
        Assertion, AssertionGroup, Combinator, Control, ErrorKind, Matcher, Node, Operand,
        ProbeValue, Severity, Subject, Table,
    };
}
