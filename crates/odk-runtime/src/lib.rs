//! odk-runtime
//!
//! The tick pipeline glue: one [`TradingEngine`] owns every core
//! subsystem behind its own lock and drives the per-tick flow
//!
//! ```text
//! quote ─▶ StrategyRuntime.run ─▶ signals ─▶ RiskPipeline.evaluate
//!                                               │
//!                                               ▼
//!                                       OrderMachine.place ─▶ exchange
//!                                               │
//!            fills / rejects ◀──────────────────┘
//!                 │
//!                 ├─▶ StrategyRuntime.deliver_event
//!                 └─▶ PositionBook / DailyPnL ──▶ may trip KillSwitch
//! ```
//!
//! Concurrency model: core crates are synchronous; this crate guards
//! each subsystem with a mutex and holds them in a fixed order
//! (kill-switch, positions, P&L, orders, exchange, strategies) for the
//! duration of one tick. Quote backpressure is handled by
//! [`QuoteCoalescer`] — the consumer keeps only the latest quote per
//! market. Engine events fan out on a tokio broadcast channel.

mod coalesce;
mod engine;
mod stream;

pub use coalesce::{QuoteCoalescer, QuoteUpdate};
pub use engine::{EngineConfig, EngineEvent, MaintenanceReport, TickReport, TradingEngine};
pub use stream::{run_quote_consumer, spawn_event_logger};
