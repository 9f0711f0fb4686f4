//! odk-risk
//!
//! The pre-trade risk pipeline: nine ordered checks applied to every
//! candidate order, from kill-switch down to crossing tolerance.
//!
//! # Semantics
//!
//! The first failing check sets the blocking reason, but every check
//! still runs so the caller sees the complete picture. Check outcomes are
//! plain values in the returned [`RiskAssessment`] — the pipeline never
//! uses errors for control flow. Collaborator services (kill-switch,
//! position book, daily P&L) are injected per call and an unconfigured
//! collaborator simply skips its check.

mod bookwalk;
mod pipeline;
mod types;

pub use bookwalk::{walk_book, WalkResult};
pub use pipeline::{RiskDeps, RiskPipeline};
pub use types::{CheckOutcome, OrderCheckRequest, RiskAssessment, RiskConfig, Severity};
