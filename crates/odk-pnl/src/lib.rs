//! odk-pnl
//!
//! Daily P&L window: realized/unrealized/fees accumulation, high-water
//! mark, drawdown, and the utilization-based risk status the pre-trade
//! pipeline consults.
//!
//! The tracker is pure state. When a limit utilization reaches 1.0 it
//! returns a [`BreachDirective`] from `record` — the runtime applies it to
//! the kill-switch engine. The tracker itself holds no kill-switch handle.

mod tracker;
mod types;

pub use tracker::DailyPnlTracker;
pub use types::{BreachDirective, DailyPnlSnapshot, PnlLimits, PnlOutcome, PnlStatus, PnlUpdate};
