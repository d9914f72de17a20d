//! # Results Module
//!
//! Per-control results, the run reporter and report rendering.
//!
//! ## Core Types
//! - [`ControlResult`] - finalized outcome of one control
//! - [`Reporter`] - ordered accumulation of results for one run
//! - [`Report`] - serialized run output with summary counts

pub mod error;
pub mod render;
pub mod reporter;
pub mod types;

pub use error::ReportError;
pub use render::{render_result, render_summary};
pub use reporter::{Report, Reporter, SeverityCounts, StatusCounts, Summary};
pub use types::{
    AssertionDetail, ControlError, ControlResult, ControlResultBuilder, ControlStatus,
    HostContext,
};
