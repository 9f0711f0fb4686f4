//! odk-strategy
//!
//! The strategy runtime: pluggable strategies as first-class objects, a
//! registry of strategy types, per-tick signal generation, the signal
//! evaluation chain, the thesis store, and the auto-execution gate.
//!
//! # Architecture
//!
//! - [`StrategyRegistry`] is the catalogue: `strategy_type → (defaults,
//!   factory)`. Factories produce fresh boxed instances; defaults are
//!   JSON and deep-merge with per-activation overrides.
//! - [`StrategyRuntime`] hosts the *active* instances. It mints signal
//!   and thesis ids, applies category/market filters, quarantines
//!   strategies after ten consecutive errors, and enforces the
//!   one-ACTIVE-thesis-per-market invariant.
//! - Events flow one way: the runtime dispatches [`StrategyEvent`]s into
//!   strategies; strategies hold no back-pointer to the runtime.
//!
//! [`StrategyEvent`]: odk_schemas::StrategyEvent

mod registry;
mod runtime;
pub mod strategies;
mod types;

pub use registry::{RegistryError, StrategyFactory, StrategyRegistry};
pub use runtime::{
    ExecutionResult, OrderSubmitter, RunReport, RuntimeConfig, SignalEvaluation,
    StrategyRuntime, StrategyRuntimeError, StrategySnapshot,
};
pub use types::{
    Signal, SignalDraft, SignalKind, SignalStatus, Strategy, StrategyConfig, StrategyDescriptor,
    StrategyError, StrategyStatus, Thesis, ThesisDraft, ThesisStatus, TickContext,
};
