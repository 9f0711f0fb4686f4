//! The exchange adapter seam.
//!
//! Real REST/WebSocket transports live outside this workspace; the order
//! machine only ever talks to this synchronous trait. Implementations
//! must be deterministic under test (see `odk-exchange-paper`).

use odk_schemas::{OrderAction, OrderType, Side};
use serde::{Deserialize, Serialize};

use crate::types::ExchangeError;

// ---------------------------------------------------------------------------
// Requests / acknowledgements
// ---------------------------------------------------------------------------

/// The submit payload handed to the exchange.
///
/// `client_token` doubles as the exchange-side idempotency key: every
/// retry of the same logical order carries the same token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeSubmitRequest {
    pub client_token: String,
    pub ticker: String,
    pub side: Side,
    pub action: OrderAction,
    pub order_type: OrderType,
    pub contracts: i64,
    pub limit_price: Option<i64>,
}

/// Immediate verdict from the exchange on a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    Accepted,
    Rejected { reason: String },
}

/// Submission acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeAck {
    pub exchange_id: String,
    pub status: AckStatus,
}

// ---------------------------------------------------------------------------
// Snapshot types (reconciliation)
// ---------------------------------------------------------------------------

/// Exchange-side order status as reported in a snapshot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeOrderStatus {
    Open,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl ExchangeOrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExchangeOrderStatus::Open)
    }
}

/// One fill as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeFill {
    pub exchange_fill_id: String,
    pub quantity: i64,
    pub price: i64,
    pub ts_ms: i64,
}

/// One order as reported by the exchange snapshot endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrderSnapshot {
    pub exchange_id: String,
    pub client_token: String,
    pub status: ExchangeOrderStatus,
    pub filled_contracts: i64,
    pub fills: Vec<ExchangeFill>,
}

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// Synchronous exchange operations the order machine requires.
pub trait ExchangeAdapter {
    fn submit_order(&mut self, req: ExchangeSubmitRequest) -> Result<ExchangeAck, ExchangeError>;

    fn cancel_order(&mut self, exchange_id: &str) -> Result<(), ExchangeError>;

    /// Full order listing for the reconciliation sweep.
    fn orders_snapshot(&self) -> Result<Vec<ExchangeOrderSnapshot>, ExchangeError>;
}
