//! odk-killswitch
//!
//! Multi-level trading kill-switches: GLOBAL, ACCOUNT, STRATEGY, MARKET.
//!
//! # Design
//!
//! [`KillSwitchEngine`] owns the active switch set and answers "is this
//! (market, strategy, account) blocked?" in one pass over the set. Every
//! state-changing operation returns the [`KillSwitchEvent`] it produced;
//! the engine holds no callbacks and performs no IO, so the runtime is the
//! only event dispatcher.
//!
//! # Invariants
//!
//! - At most one active switch per (level, target). Re-triggering updates
//!   the existing record in place, preserving its id.
//! - Blocking precedence among applicable switches is
//!   GLOBAL > ACCOUNT > STRATEGY > MARKET; ties break by most recent
//!   `triggered_at_ms`.
//! - A switch whose `auto_reset_at_ms` has passed is invisible to the
//!   evaluator even before `sweep_expired` cleans it up.

mod engine;
mod types;

pub use engine::{KillSwitchEngine, KillSwitchError};
pub use types::{
    EvalContext, Evaluation, HealthMetrics, KillSwitch, KillSwitchEvent, KillSwitchLevel,
    Thresholds, TriggerReason, TriggerRequest,
};
