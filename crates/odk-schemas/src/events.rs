use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use std::fmt;

// ---------------------------------------------------------------------------
// Order events
// ---------------------------------------------------------------------------

/// Event kind emitted on every order state transition.
///
/// Wire names match the emitted-event contract: `ORDER_CREATED`,
/// `ORDER_STATE_CHANGED`, `ORDER_FILLED`, `ORDER_PARTIALLY_FILLED`,
/// `ORDER_CANCELED`, `ORDER_REJECTED`, `ORDER_EXPIRED`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEventKind {
    Created,
    StateChanged,
    Filled,
    PartiallyFilled,
    Canceled,
    Rejected,
    Expired,
}

impl fmt::Display for OrderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderEventKind::Created => "ORDER_CREATED",
            OrderEventKind::StateChanged => "ORDER_STATE_CHANGED",
            OrderEventKind::Filled => "ORDER_FILLED",
            OrderEventKind::PartiallyFilled => "ORDER_PARTIALLY_FILLED",
            OrderEventKind::Canceled => "ORDER_CANCELED",
            OrderEventKind::Rejected => "ORDER_REJECTED",
            OrderEventKind::Expired => "ORDER_EXPIRED",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Strategy events
// ---------------------------------------------------------------------------

/// Event kinds delivered to strategies through the runtime's dispatcher.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyEventKind {
    MarketUpdate,
    OrderFilled,
    OrderCancelled,
    OrderRejected,
    PositionOpened,
    PositionClosed,
    MarketSettled,
    KillSwitchTriggered,
    NewsAlert,
}

/// An event delivered to a strategy's `on_event` hook.
///
/// Strategies hold no back-pointer to the registry; events flow one way,
/// from the runtime dispatcher into the strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEvent {
    pub kind: StrategyEventKind,
    pub market_id: Option<String>,
    pub order_id: Option<String>,
    pub ts_ms: i64,
    pub payload: Value,
}

impl StrategyEvent {
    pub fn new(kind: StrategyEventKind, ts_ms: i64) -> Self {
        Self {
            kind,
            market_id: None,
            order_id: None,
            ts_ms,
            payload: Value::Null,
        }
    }

    pub fn with_market(mut self, market_id: impl Into<String>) -> Self {
        self.market_id = Some(market_id.into());
        self
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// Kill-switch events
// ---------------------------------------------------------------------------

/// What happened to a kill-switch entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillSwitchEventKind {
    Trigger,
    AutoTrigger,
    Reset,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Wire envelope for events checkpointed or published outside the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(topic: impl Into<String>, ts_utc: DateTime<Utc>, payload: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            ts_utc,
            topic: topic.into(),
            payload,
        }
    }
}
