use odk_schemas::{MarketQuote, OrderBookSnapshot, Side, StrategyEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Entry,
    Exit,
    ScaleIn,
    ScaleOut,
    Hedge,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Expired,
    Cancelled,
}

impl SignalStatus {
    /// Terminal signals never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Executed | Self::Expired | Self::Cancelled
        )
    }
}

/// What a strategy emits from `generate_signals` — the runtime mints the
/// id, stamps the timestamp, and attaches the strategy id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDraft {
    pub market_id: String,
    pub side: Side,
    pub kind: SignalKind,
    /// Conviction in `[0, 1]`.
    pub strength: f64,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    /// Model fair value, cents.
    pub target_price: i64,
    /// Executable price now, cents.
    pub current_price: i64,
    pub reason: String,
}

/// A stored trading signal. `edge = target_price - current_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub strategy_id: String,
    pub market_id: String,
    pub side: Side,
    pub kind: SignalKind,
    pub strength: f64,
    pub confidence: f64,
    pub target_price: i64,
    pub current_price: i64,
    pub edge: i64,
    pub reason: String,
    pub status: SignalStatus,
    pub created_at_ms: i64,
    pub order_id: Option<String>,
    pub thesis_id: Option<String>,
}

impl Signal {
    pub(crate) fn from_draft(
        id: String,
        strategy_id: &str,
        draft: SignalDraft,
        now_ms: i64,
    ) -> Self {
        Self {
            id,
            strategy_id: strategy_id.to_string(),
            market_id: draft.market_id,
            side: draft.side,
            kind: draft.kind,
            strength: draft.strength,
            confidence: draft.confidence,
            target_price: draft.target_price,
            current_price: draft.current_price,
            edge: draft.target_price - draft.current_price,
            reason: draft.reason,
            status: SignalStatus::Pending,
            created_at_ms: now_ms,
            order_id: None,
            thesis_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Theses
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThesisStatus {
    Active,
    Executed,
    Invalidated,
    Expired,
    Superseded,
}

/// What a strategy's `evaluate_signal` returns when the signal justifies
/// a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThesisDraft {
    pub hypothesis: String,
    pub confidence: f64,
    pub target_price: i64,
    /// Minimum edge (cents) the thesis demands at execution time.
    pub edge_required: i64,
    /// Worst acceptable entry price, cents.
    pub max_price: i64,
    pub falsification_criteria: Vec<String>,
    pub expires_at_ms: Option<i64>,
}

/// A stored, falsifiable trade justification. At most one ACTIVE thesis
/// exists per market; a new one SUPERSEDES the old atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thesis {
    pub id: String,
    pub market_id: String,
    pub side: Side,
    pub hypothesis: String,
    pub confidence: f64,
    pub target_price: i64,
    pub edge_required: i64,
    pub max_price: i64,
    pub falsification_criteria: Vec<String>,
    pub status: ThesisStatus,
    pub created_at_ms: i64,
    pub expires_at_ms: Option<i64>,
}

// ---------------------------------------------------------------------------
// Strategy configuration
// ---------------------------------------------------------------------------

/// Per-instance strategy configuration. Registry defaults deep-merge
/// with activation overrides before this is deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub enabled: bool,
    pub auto_execute: bool,
    pub max_orders_per_hour: u32,
    pub max_position_size: i64,
    /// Cents.
    pub max_notional_per_trade: i64,
    /// Cents of edge required before a signal is worth evaluating.
    pub min_edge: i64,
    pub min_confidence: f64,
    pub max_spread: i64,
    pub min_liquidity: i64,
    /// Empty means all categories allowed.
    pub allowed_categories: Vec<String>,
    pub blocked_categories: Vec<String>,
    pub blocked_markets: Vec<String>,
    /// Free-form strategy parameters.
    pub params: Value,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_execute: false,
            max_orders_per_hour: 30,
            max_position_size: 500,
            max_notional_per_trade: 10_000_00,
            min_edge: 3,
            min_confidence: 0.55,
            max_spread: 10,
            min_liquidity: 100,
            allowed_categories: Vec::new(),
            blocked_categories: Vec::new(),
            blocked_markets: Vec::new(),
            params: Value::Null,
        }
    }
}

impl StrategyConfig {
    /// Whether this instance may trade `ticker` in `category`.
    pub fn permits_market(&self, ticker: &str, category: &str) -> bool {
        if !self.allowed_categories.is_empty()
            && !self.allowed_categories.iter().any(|c| c == category)
        {
            return false;
        }
        if self.blocked_categories.iter().any(|c| c == category) {
            return false;
        }
        if self.blocked_markets.iter().any(|m| m == ticker) {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Strategy contract
// ---------------------------------------------------------------------------

/// Static identity of a strategy implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    pub strategy_type: String,
    pub name: String,
}

impl StrategyDescriptor {
    pub fn new(strategy_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            strategy_type: strategy_type.into(),
            name: name.into(),
        }
    }
}

/// Lifecycle status of an active strategy instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyStatus {
    Active,
    Paused,
    /// Quarantined after ten consecutive errors; excluded from runs
    /// until manually reset.
    Error,
}

/// A strategy-side failure, caught at the per-strategy boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyError {
    pub detail: String,
}

impl StrategyError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for StrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "strategy error: {}", self.detail)
    }
}

impl std::error::Error for StrategyError {}

/// Per-market context handed to `generate_signals` on each tick.
#[derive(Debug, Clone)]
pub struct TickContext {
    pub quote: MarketQuote,
    pub book: Option<OrderBookSnapshot>,
    pub now_ms: i64,
}

/// The pluggable strategy contract.
///
/// `generate_signals` is a pure function of the context — it must not
/// submit orders. `on_event` must not fail; anything a strategy cannot
/// handle it should count internally and move on.
pub trait Strategy: Send + std::fmt::Debug {
    fn descriptor(&self) -> StrategyDescriptor;

    /// Idempotent setup with the merged instance configuration.
    fn initialize(&mut self, config: &StrategyConfig) -> Result<(), StrategyError>;

    fn generate_signals(&mut self, ctx: &TickContext) -> Result<Vec<SignalDraft>, StrategyError>;

    /// Turn an evaluated signal into a thesis, or decline.
    ///
    /// The default declines signals with `strength < 0.5` and otherwise
    /// builds a thesis directly from the signal's own prices.
    fn evaluate_signal(&self, signal: &Signal) -> Option<ThesisDraft> {
        if signal.strength < 0.5 {
            return None;
        }
        Some(ThesisDraft {
            hypothesis: signal.reason.clone(),
            confidence: signal.confidence,
            target_price: signal.target_price,
            edge_required: signal.edge.max(1),
            max_price: signal.target_price,
            falsification_criteria: Vec::new(),
            expires_at_ms: None,
        })
    }

    /// Fill / reject / kill-switch notifications from the runtime.
    fn on_event(&mut self, event: &StrategyEvent);

    /// Snapshot of internal counters for diagnostics.
    fn state(&self) -> Value {
        Value::Null
    }

    fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_from_draft_computes_edge() {
        let draft = SignalDraft {
            market_id: "M".to_string(),
            side: Side::Yes,
            kind: SignalKind::Entry,
            strength: 0.7,
            confidence: 0.8,
            target_price: 60,
            current_price: 52,
            reason: "undervalued".to_string(),
        };
        let s = Signal::from_draft("sig-1".to_string(), "strat-1", draft, 1_000);
        assert_eq!(s.edge, 8);
        assert_eq!(s.status, SignalStatus::Pending);
        assert_eq!(s.created_at_ms, 1_000);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!SignalStatus::Pending.is_terminal());
        assert!(!SignalStatus::Approved.is_terminal());
        for s in [
            SignalStatus::Rejected,
            SignalStatus::Executed,
            SignalStatus::Expired,
            SignalStatus::Cancelled,
        ] {
            assert!(s.is_terminal());
        }
    }

    #[test]
    fn config_market_filters() {
        let mut cfg = StrategyConfig {
            allowed_categories: vec!["economics".to_string()],
            blocked_markets: vec!["BAD-MKT".to_string()],
            ..StrategyConfig::default()
        };
        assert!(cfg.permits_market("FED-25DEC", "economics"));
        assert!(!cfg.permits_market("ELECTION", "politics"));
        assert!(!cfg.permits_market("BAD-MKT", "economics"));

        // Empty allow-list permits everything not blocked.
        cfg.allowed_categories.clear();
        cfg.blocked_categories = vec!["crypto".to_string()];
        assert!(cfg.permits_market("ELECTION", "politics"));
        assert!(!cfg.permits_market("BTC-100K", "crypto"));
    }
}
