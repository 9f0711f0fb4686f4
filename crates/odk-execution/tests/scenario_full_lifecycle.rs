//! Scenario: Full order lifecycle.
//!
//! # Invariant under test
//!
//! An order for 100 contracts filled (30 @ 40¢) then (70 @ 60¢) passes
//! through PARTIAL_FILL with avg 40 and lands in FILLED with
//! avg = (30·40 + 70·60)/100 = 54. FILLED is terminal: no further
//! transition or fill is possible, and the record stops changing.

use odk_execution::{
    AckStatus, ExchangeAck, ExchangeAdapter, ExchangeError, ExchangeOrderSnapshot,
    ExchangeSubmitRequest, OrderError, OrderMachine, OrderParams, OrderState,
};
use odk_schemas::{OrderAction, OrderEventKind, Side};

struct AcceptAll;

impl ExchangeAdapter for AcceptAll {
    fn submit_order(&mut self, req: ExchangeSubmitRequest) -> Result<ExchangeAck, ExchangeError> {
        Ok(ExchangeAck {
            exchange_id: format!("px-{}", req.client_token),
            status: AckStatus::Accepted,
        })
    }

    fn cancel_order(&mut self, _exchange_id: &str) -> Result<(), ExchangeError> {
        Ok(())
    }

    fn orders_snapshot(&self) -> Result<Vec<ExchangeOrderSnapshot>, ExchangeError> {
        Ok(Vec::new())
    }
}

#[test]
fn lifecycle_partial_then_full_fill() {
    let mut machine = OrderMachine::new();
    let mut px = AcceptAll;

    let placed = machine
        .place(
            &mut px,
            OrderParams::limit("M", OrderAction::Buy, Side::Yes, 100, 60),
            "T1",
            1_000,
        )
        .unwrap();
    let id = placed.order.id.clone();

    // First fill: 30 @ 40.
    let first = machine.apply_fill(&id, 30, 40, "f1", 2_000).unwrap();
    assert_eq!(first.order.state, OrderState::PartialFill);
    assert_eq!(first.order.filled_contracts, 30);
    assert_eq!(first.order.avg_fill_price(), Some(40.0));
    assert_eq!(
        first.event.unwrap().kind,
        OrderEventKind::PartiallyFilled
    );

    // Second fill: 70 @ 60 → complete.
    let second = machine.apply_fill(&id, 70, 60, "f2", 3_000).unwrap();
    assert_eq!(second.order.state, OrderState::Filled);
    assert_eq!(second.order.filled_contracts, 100);
    assert_eq!(second.order.avg_fill_price(), Some(54.0));
    assert_eq!(second.event.unwrap().kind, OrderEventKind::Filled);

    // Terminal: cancellation is an invalid transition...
    let err = machine.cancel(&mut px, &id, 4_000).unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition(_)));

    // ...a further fill is an overfill...
    let err = machine.apply_fill(&id, 1, 50, "f3", 5_000).unwrap_err();
    assert!(matches!(err, OrderError::OverFill { .. }));

    // ...and the record did not change under either failed attempt.
    let order = machine.order(&id).unwrap();
    assert_eq!(order.state, OrderState::Filled);
    assert_eq!(order.filled_contracts, 100);
    assert_eq!(order.avg_fill_price(), Some(54.0));
    assert_eq!(order.updated_at_ms, 3_000);
}

#[test]
fn filled_contracts_never_exceed_contracts() {
    let mut machine = OrderMachine::new();
    let mut px = AcceptAll;

    let placed = machine
        .place(
            &mut px,
            OrderParams::limit("M", OrderAction::Buy, Side::Yes, 100, 60),
            "T1",
            1_000,
        )
        .unwrap();
    let id = placed.order.id.clone();

    // Drive an arbitrary fill sequence; the invariant holds after every
    // accepted fill and every rejected one.
    for (i, (qty, price)) in [(10i64, 40i64), (50, 55), (45, 60), (40, 60), (5, 50)]
        .iter()
        .enumerate()
    {
        let _ = machine.apply_fill(&id, *qty, *price, &format!("f{i}"), 2_000 + i as i64);
        let order = machine.order(&id).unwrap();
        assert!(order.filled_contracts <= order.contracts);
    }

    let order = machine.order(&id).unwrap();
    // 10 + 50 accepted, 45 rejected (overfill), 40 accepted → 100.
    assert_eq!(order.filled_contracts, 100);
    assert_eq!(order.state, OrderState::Filled);
}
