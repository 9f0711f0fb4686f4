use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// One P&L-affecting event. Money is integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PnlUpdate {
    /// An execution happened: pay fees, count the trade.
    Fill { fees: i64 },
    /// A position was (partly) closed: book realized P&L.
    PositionClose { realized: i64 },
    /// Mark-to-market sweep: replace the unrealized component.
    MarkToMarket { unrealized: i64 },
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Loss limits for one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PnlLimits {
    /// Maximum tolerated daily net loss, in cents (positive number).
    pub max_daily_loss: i64,
    /// Maximum drawdown as a fraction of the day's peak net.
    pub max_drawdown_pct: f64,
}

impl Default for PnlLimits {
    fn default() -> Self {
        Self {
            max_daily_loss: 500_00,
            max_drawdown_pct: 0.20,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot / status
// ---------------------------------------------------------------------------

/// The day's P&L window with all derived fields materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPnlSnapshot {
    /// Trading date, `YYYY-MM-DD`.
    pub date: String,
    pub realized: i64,
    pub unrealized: i64,
    pub fees: i64,
    /// realized + unrealized.
    pub gross: i64,
    /// gross - fees.
    pub net: i64,
    /// High-water mark of net, floored at 0 (net starts the day at 0).
    pub peak: i64,
    /// peak - net.
    pub drawdown: i64,
    pub trade_count: u64,
    pub win_count: u64,
    pub loss_count: u64,
    pub breakeven_count: u64,
}

/// Risk classification derived from the current window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlStatus {
    /// `max(0, -net) / max_daily_loss`.
    pub daily_loss_util: f64,
    /// `drawdown / (peak * max_drawdown_pct)`; 0 while peak <= 0.
    pub drawdown_util: f64,
    /// Both utilizations strictly below 1.
    pub is_safe: bool,
    /// Populated at 0.8 utilization and above.
    pub warnings: Vec<String>,
}

/// Instruction to the runtime: throw the GLOBAL kill-switch, reason
/// LOSS_LIMIT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreachDirective {
    pub description: String,
    pub daily_loss_util: f64,
    pub drawdown_util: f64,
}

/// Result of one `record` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PnlOutcome {
    pub snapshot: DailyPnlSnapshot,
    pub status: PnlStatus,
    /// Present exactly once per window, on the update that crosses a
    /// utilization of 1.
    pub directive: Option<BreachDirective>,
}
