//! Deterministic in-memory "paper" exchange adapter.
//!
//! Design decisions (kept intentionally simple/deterministic):
//! - `exchange_id` is exactly `"px-{client_token}"`.
//! - Fill ids are `"pxf-{seq}"` from a monotonic counter.
//! - No randomness. No clocks — callers supply timestamps.
//! - Fills are never auto-generated: tests inject them explicitly with
//!   [`PaperExchange::apply_fill`], and the snapshot endpoint feeds the
//!   order machine's reconciliation sweep.
//!
//! Failure modes are scripted: `script_reject` makes the next submit
//! come back rejected, `script_transport_failure` makes it fail at the
//! transport layer (the order machine must park the order in PENDING).

use std::collections::BTreeMap;

use odk_execution::{
    AckStatus, ExchangeAck, ExchangeAdapter, ExchangeError, ExchangeFill, ExchangeOrderSnapshot,
    ExchangeOrderStatus, ExchangeSubmitRequest,
};

#[derive(Debug, Clone)]
struct PaperOrder {
    exchange_id: String,
    client_token: String,
    contracts: i64,
    status: ExchangeOrderStatus,
    filled_contracts: i64,
    fills: Vec<ExchangeFill>,
}

/// In-memory exchange satisfying the adapter contract: submit, cancel,
/// snapshot.
#[derive(Debug, Default)]
pub struct PaperExchange {
    orders: BTreeMap<String, PaperOrder>,
    reject_next: Option<String>,
    fail_next: bool,
    fill_seq: u64,
    submit_count: u64,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next submit is rejected with `reason`.
    pub fn script_reject(&mut self, reason: impl Into<String>) {
        self.reject_next = Some(reason.into());
    }

    /// The next submit fails at the transport layer.
    pub fn script_transport_failure(&mut self) {
        self.fail_next = true;
    }

    /// How many submissions actually reached the exchange.
    pub fn submit_count(&self) -> u64 {
        self.submit_count
    }

    /// Inject a fill against a resting order. Returns the minted fill so
    /// tests can feed it to `OrderMachine::apply_fill`.
    pub fn apply_fill(
        &mut self,
        exchange_id: &str,
        quantity: i64,
        price: i64,
        ts_ms: i64,
    ) -> Result<ExchangeFill, ExchangeError> {
        self.fill_seq += 1;
        let fill_id = format!("pxf-{}", self.fill_seq);

        let order = self
            .orders
            .get_mut(exchange_id)
            .ok_or_else(|| ExchangeError {
                retriable: false,
                detail: format!("no such order {exchange_id}"),
            })?;

        if order.status != ExchangeOrderStatus::Open {
            return Err(ExchangeError {
                retriable: false,
                detail: format!("order {exchange_id} is not open"),
            });
        }
        if order.filled_contracts + quantity > order.contracts {
            return Err(ExchangeError {
                retriable: false,
                detail: format!("fill would exceed order size on {exchange_id}"),
            });
        }

        let fill = ExchangeFill {
            exchange_fill_id: fill_id,
            quantity,
            price,
            ts_ms,
        };
        order.filled_contracts += quantity;
        order.fills.push(fill.clone());
        if order.filled_contracts == order.contracts {
            order.status = ExchangeOrderStatus::Filled;
        }
        Ok(fill)
    }

    /// Force a remote status, for drift scenarios.
    pub fn set_status(&mut self, exchange_id: &str, status: ExchangeOrderStatus) {
        if let Some(order) = self.orders.get_mut(exchange_id) {
            order.status = status;
        }
    }

    pub fn exchange_id_for(client_token: &str) -> String {
        format!("px-{client_token}")
    }
}

impl ExchangeAdapter for PaperExchange {
    /// Accepts immediately. Re-submitting a known token is idempotent
    /// and does not create a second order.
    fn submit_order(&mut self, req: ExchangeSubmitRequest) -> Result<ExchangeAck, ExchangeError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(ExchangeError {
                retriable: true,
                detail: "paper transport failure".to_string(),
            });
        }

        let exchange_id = Self::exchange_id_for(&req.client_token);

        if self.orders.contains_key(&exchange_id) {
            return Ok(ExchangeAck {
                exchange_id,
                status: AckStatus::Accepted,
            });
        }

        self.submit_count += 1;

        if let Some(reason) = self.reject_next.take() {
            return Ok(ExchangeAck {
                exchange_id,
                status: AckStatus::Rejected { reason },
            });
        }

        self.orders.insert(
            exchange_id.clone(),
            PaperOrder {
                exchange_id: exchange_id.clone(),
                client_token: req.client_token,
                contracts: req.contracts,
                status: ExchangeOrderStatus::Open,
                filled_contracts: 0,
                fills: Vec::new(),
            },
        );

        Ok(ExchangeAck {
            exchange_id,
            status: AckStatus::Accepted,
        })
    }

    /// Idempotent: cancelling an unknown or already-terminal order is a
    /// no-op success.
    fn cancel_order(&mut self, exchange_id: &str) -> Result<(), ExchangeError> {
        if let Some(order) = self.orders.get_mut(exchange_id) {
            if order.status == ExchangeOrderStatus::Open {
                order.status = ExchangeOrderStatus::Canceled;
            }
        }
        Ok(())
    }

    /// Deterministic listing: BTreeMap iteration order is stable.
    fn orders_snapshot(&self) -> Result<Vec<ExchangeOrderSnapshot>, ExchangeError> {
        Ok(self
            .orders
            .values()
            .map(|o| ExchangeOrderSnapshot {
                exchange_id: o.exchange_id.clone(),
                client_token: o.client_token.clone(),
                status: o.status,
                filled_contracts: o.filled_contracts,
                fills: o.fills.clone(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use odk_schemas::{OrderAction, OrderType, Side};

    fn submit(token: &str, contracts: i64) -> ExchangeSubmitRequest {
        ExchangeSubmitRequest {
            client_token: token.to_string(),
            ticker: "M".to_string(),
            side: Side::Yes,
            action: OrderAction::Buy,
            order_type: OrderType::Limit,
            contracts,
            limit_price: Some(50),
        }
    }

    #[test]
    fn submit_accepts_with_stable_id() {
        let mut px = PaperExchange::new();
        let ack = px.submit_order(submit("T1", 10)).unwrap();
        assert_eq!(ack.exchange_id, "px-T1");
        assert_eq!(ack.status, AckStatus::Accepted);
        assert_eq!(px.submit_count(), 1);
    }

    #[test]
    fn resubmit_same_token_is_idempotent() {
        let mut px = PaperExchange::new();
        px.submit_order(submit("T1", 10)).unwrap();
        let ack = px.submit_order(submit("T1", 10)).unwrap();
        assert_eq!(ack.exchange_id, "px-T1");
        assert_eq!(px.submit_count(), 1);
        assert_eq!(px.orders_snapshot().unwrap().len(), 1);
    }

    #[test]
    fn scripted_reject_applies_once() {
        let mut px = PaperExchange::new();
        px.script_reject("no balance");
        let ack = px.submit_order(submit("T1", 10)).unwrap();
        assert!(matches!(ack.status, AckStatus::Rejected { .. }));

        let ack = px.submit_order(submit("T2", 10)).unwrap();
        assert_eq!(ack.status, AckStatus::Accepted);
    }

    #[test]
    fn scripted_transport_failure_applies_once() {
        let mut px = PaperExchange::new();
        px.script_transport_failure();
        let err = px.submit_order(submit("T1", 10)).unwrap_err();
        assert!(err.retriable);
        assert_eq!(px.submit_count(), 0);

        assert!(px.submit_order(submit("T1", 10)).is_ok());
    }

    #[test]
    fn fills_accumulate_and_complete_the_order() {
        let mut px = PaperExchange::new();
        px.submit_order(submit("T1", 10)).unwrap();

        let f1 = px.apply_fill("px-T1", 4, 50, 1_000).unwrap();
        assert_eq!(f1.exchange_fill_id, "pxf-1");
        px.apply_fill("px-T1", 6, 51, 2_000).unwrap();

        let snap = &px.orders_snapshot().unwrap()[0];
        assert_eq!(snap.filled_contracts, 10);
        assert_eq!(snap.status, ExchangeOrderStatus::Filled);
        assert_eq!(snap.fills.len(), 2);

        // Filled order takes no more fills.
        assert!(px.apply_fill("px-T1", 1, 50, 3_000).is_err());
    }

    #[test]
    fn overfill_is_refused() {
        let mut px = PaperExchange::new();
        px.submit_order(submit("T1", 10)).unwrap();
        assert!(px.apply_fill("px-T1", 11, 50, 1_000).is_err());
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut px = PaperExchange::new();
        px.submit_order(submit("T1", 10)).unwrap();
        px.cancel_order("px-T1").unwrap();
        px.cancel_order("px-T1").unwrap();
        px.cancel_order("px-ghost").unwrap();

        assert_eq!(
            px.orders_snapshot().unwrap()[0].status,
            ExchangeOrderStatus::Canceled
        );
    }
}
