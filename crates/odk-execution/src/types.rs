use odk_schemas::{clamp_i128, mul_qty_price, OrderAction, OrderEventKind, OrderType, Side};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::oms::{OrderState, TransitionError};

// ---------------------------------------------------------------------------
// Order parameters
// ---------------------------------------------------------------------------

/// Caller-supplied parameters for a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderParams {
    pub market_id: String,
    pub action: OrderAction,
    pub side: Side,
    pub order_type: OrderType,
    pub contracts: i64,
    /// Required in `[1, 99]` for LIMIT, must be absent for MARKET.
    pub limit_price: Option<i64>,
    pub expires_at_ms: Option<i64>,
}

impl OrderParams {
    pub fn limit(
        market_id: impl Into<String>,
        action: OrderAction,
        side: Side,
        contracts: i64,
        limit_price: i64,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            action,
            side,
            order_type: OrderType::Limit,
            contracts,
            limit_price: Some(limit_price),
            expires_at_ms: None,
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
            action,
            side,
            order_type: OrderType::Market,
            contracts,
            limit_price: None,
            expires_at_ms: None,
        }
    }

    pub fn with_expiry(mut self, expires_at_ms: i64) -> Self {
        self.expires_at_ms = Some(expires_at_ms);
        self
    }
}

// ---------------------------------------------------------------------------
// Fills / transitions
// ---------------------------------------------------------------------------

/// One recorded execution against an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub quantity: i64,
    pub price: i64,
    pub ts_ms: i64,
    pub exchange_fill_id: String,
}

/// Audit record of one state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Option<OrderState>,
    pub to: OrderState,
    pub ts_ms: i64,
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Order record
// ---------------------------------------------------------------------------

/// The authoritative local view of one order.
///
/// `filled_cost` is the integer sum of `qty·price` over recorded fills;
/// the weighted-average fill price is derived from it, so the mean is
/// exact and fill-order independent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub client_token: String,
    pub exchange_id: Option<String>,
    pub market_id: String,
    pub action: OrderAction,
    pub side: Side,
    pub order_type: OrderType,
    pub contracts: i64,
    pub limit_price: Option<i64>,
    pub filled_contracts: i64,
    /// Σ qty·price over fills, cents.
    pub filled_cost: i64,
    pub state: OrderState,
    pub reject_reason: Option<String>,
    pub expires_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub transitions: Vec<TransitionRecord>,
    pub fills: Vec<Fill>,
}

impl OrderRecord {
    /// Weighted-average fill price; `None` until the first fill.
    pub fn avg_fill_price(&self) -> Option<f64> {
        if self.filled_contracts > 0 {
            Some(self.filled_cost as f64 / self.filled_contracts as f64)
        } else {
            None
        }
    }

    pub fn remaining_contracts(&self) -> i64 {
        self.contracts - self.filled_contracts
    }

    pub(crate) fn accumulate_fill(&mut self, qty: i64, price: i64) {
        self.filled_contracts += qty;
        self.filled_cost = self
            .filled_cost
            .saturating_add(clamp_i128(mul_qty_price(qty, price)));
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Emitted on every order transition; `data` carries transition-specific
/// detail (fill quantities, reject reasons, drift notes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub kind: OrderEventKind,
    pub order_id: String,
    pub ts_ms: i64,
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of [`OrderMachine::place`](crate::OrderMachine::place).
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOutcome {
    pub order: OrderRecord,
    /// An order already existed for the client token; nothing was sent.
    pub idempotent: bool,
    pub events: Vec<OrderEvent>,
    /// Submit-time exchange failure: the order is parked in `Pending`
    /// and reconciliation decides the outcome.
    pub submit_error: Option<ExchangeError>,
}

/// Result of [`OrderMachine::apply_fill`](crate::OrderMachine::apply_fill).
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    pub order: OrderRecord,
    /// `None` when the fill was a duplicate replay.
    pub event: Option<OrderEvent>,
    pub duplicate: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Exchange transport failure (network, HTTP, deadline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeError {
    pub retriable: bool,
    pub detail: String,
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exchange error ({}): {}",
            if self.retriable { "retriable" } else { "fatal" },
            self.detail
        )
    }
}

impl std::error::Error for ExchangeError {}

/// Errors surfaced by the order machine.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderError {
    /// Rejected before any external side effect; the caller fixes input.
    InvalidParams { detail: String },
    /// Programmer error: the transition is not in the graph.
    InvalidTransition(TransitionError),
    /// A fill that would exceed the order quantity.
    OverFill {
        order_id: String,
        filled: i64,
        contracts: i64,
        qty: i64,
    },
    UnknownOrder { id: String },
    Exchange(ExchangeError),
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderError::InvalidParams { detail } => write!(f, "invalid order params: {detail}"),
            OrderError::InvalidTransition(e) => write!(f, "{e}"),
            OrderError::OverFill {
                order_id,
                filled,
                contracts,
                qty,
            } => write!(
                f,
                "overfill on {order_id}: {filled} filled + {qty} > {contracts} contracts"
            ),
            OrderError::UnknownOrder { id } => write!(f, "no order with id '{id}'"),
            OrderError::Exchange(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OrderError {}

impl From<TransitionError> for OrderError {
    fn from(e: TransitionError) -> Self {
        OrderError::InvalidTransition(e)
    }
}

impl From<ExchangeError> for OrderError {
    fn from(e: ExchangeError) -> Self {
        OrderError::Exchange(e)
    }
}
