use odk_schemas::{OrderAction, OrderType, Side};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Limits for the nine pipeline checks. Money values are integer cents;
/// ratios are fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Max absolute spread on the traded side, cents.
    pub max_spread: i64,
    /// Max spread as a fraction of the side's midpoint.
    pub max_spread_pct: f64,
    /// Min resting contracts at top of the consumed book half.
    pub min_depth_at_top: i64,
    /// Min total resting contracts on the consumed book half.
    pub min_total_depth: i64,
    /// Max estimated slippage, cents.
    pub max_slippage: f64,
    /// Max estimated slippage as a fraction of the effective price.
    pub max_slippage_pct: f64,
    /// Max contracts per order.
    pub max_order_size: i64,
    /// Max order notional, cents.
    pub max_order_notional: i64,
    /// Lowest tradable price, cents.
    pub min_price: i64,
    /// Highest tradable price, cents.
    pub max_price: i64,
    /// Max cents a LIMIT price may cross through the midpoint.
    pub max_crossing_tolerance: f64,
    /// When true, a missing kill-switch service fails the check instead
    /// of skipping it. Same pattern for the other two.
    pub require_kill_switch_check: bool,
    pub require_position_cap_check: bool,
    pub require_pnl_check: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_spread: 10,
            max_spread_pct: 0.25,
            min_depth_at_top: 10,
            min_total_depth: 100,
            max_slippage: 5.0,
            max_slippage_pct: 0.10,
            max_order_size: 500,
            max_order_notional: 25_000_00,
            min_price: 5,
            max_price: 95,
            max_crossing_tolerance: 5.0,
            require_kill_switch_check: false,
            require_position_cap_check: false,
            require_pnl_check: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// The candidate order being risk-checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCheckRequest {
    pub market_id: String,
    pub strategy_id: Option<String>,
    pub account_id: Option<String>,
    pub action: OrderAction,
    pub side: Side,
    pub order_type: OrderType,
    pub contracts: i64,
    pub limit_price: Option<i64>,
}

impl OrderCheckRequest {
    pub fn limit(
        market_id: impl Into<String>,
        action: OrderAction,
        side: Side,
        contracts: i64,
        limit_price: i64,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            strategy_id: None,
            account_id: None,
            action,
            side,
            order_type: OrderType::Limit,
            contracts,
            limit_price: Some(limit_price),
        }
    }

    pub fn market(
        market_id: impl Into<String>,
        action: OrderAction,
        side: Side,
        contracts: i64,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            strategy_id: None,
            account_id: None,
            action,
            side,
            order_type: OrderType::Market,
            contracts,
            limit_price: None,
        }
    }

    pub fn with_strategy(mut self, strategy_id: impl Into<String>) -> Self {
        self.strategy_id = Some(strategy_id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One check's result inside a [`RiskAssessment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub severity: Severity,
    /// The measured value, where the check has one.
    pub value: Option<f64>,
    /// The limit it was compared against.
    pub limit: Option<f64>,
    pub message: String,
}

impl CheckOutcome {
    pub fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            severity: Severity::Info,
            value: None,
            limit: None,
            message: message.into(),
        }
    }

    pub fn fail(name: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            severity,
            value: None,
            limit: None,
            message: message.into(),
        }
    }

    pub fn with_values(mut self, value: f64, limit: f64) -> Self {
        self.value = Some(value);
        self.limit = Some(limit);
        self
    }
}

/// The pipeline's verdict on one candidate order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Every check passed.
    pub approved: bool,
    /// All check outcomes, in pipeline order.
    pub checks: Vec<CheckOutcome>,
    /// The first failing check's message.
    pub blocking_reason: Option<String>,
    /// Expected slippage, cents.
    pub estimated_slippage: f64,
    /// Top-of-book price adjusted by expected slippage, signed by action.
    pub adjusted_price: f64,
}

impl RiskAssessment {
    pub fn check(&self, name: &str) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.name == name)
    }
}
