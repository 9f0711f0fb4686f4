use std::collections::BTreeMap;

use odk_schemas::OrderType;
use serde_json::json;

use crate::adapter::{AckStatus, ExchangeAdapter, ExchangeOrderSnapshot, ExchangeOrderStatus};
use crate::oms::{event_kind_for, validate_transition, OrderState, TransitionError};
use crate::types::{
    Fill, FillOutcome, OrderError, OrderEvent, OrderParams, OrderRecord, PlaceOutcome,
    TransitionRecord,
};

// ---------------------------------------------------------------------------
// Reconciliation report
// ---------------------------------------------------------------------------

/// One detected divergence between the local book and the exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileDiff {
    /// Local order is live but the exchange reports a terminal status.
    RemoteTerminal {
        order_id: String,
        local: OrderState,
        remote: ExchangeOrderStatus,
    },
    /// The exchange has recorded more fills than we have.
    FillMismatch {
        order_id: String,
        local_filled: i64,
        remote_filled: i64,
    },
    /// We consider the order finished but the exchange still shows it open.
    LocalTerminalRemoteOpen {
        order_id: String,
        local: OrderState,
    },
    /// The exchange reports an order no local token maps to.
    UnknownExchangeOrder { exchange_id: String },
}

/// Outcome of one reconciliation sweep. Corrections are never silent:
/// every applied change is in `events`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub detected: usize,
    pub corrected: usize,
    pub diffs: Vec<ReconcileDiff>,
    pub events: Vec<OrderEvent>,
}

// ---------------------------------------------------------------------------
// OrderMachine
// ---------------------------------------------------------------------------

/// Owns every order and the persistent `client_token → order_id` index.
///
/// # Idempotency
///
/// The token index is the authoritative store: a second `place` with a
/// token that has ever been used returns the first order's current state
/// with `idempotent = true` and performs no exchange call — even when
/// that first order is terminal. Token lifetime is unbounded.
#[derive(Debug, Default)]
pub struct OrderMachine {
    orders: BTreeMap<String, OrderRecord>,
    by_token: BTreeMap<String, String>,
    next_seq: u64,
}

impl OrderMachine {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint_id(&mut self) -> String {
        self.next_seq += 1;
        format!("ord-{}", self.next_seq)
    }

    pub fn order(&self, id: &str) -> Option<&OrderRecord> {
        self.orders.get(id)
    }

    pub fn order_by_token(&self, token: &str) -> Option<&OrderRecord> {
        self.by_token.get(token).and_then(|id| self.orders.get(id))
    }

    pub fn order_by_exchange_id(&self, exchange_id: &str) -> Option<&OrderRecord> {
        self.orders
            .values()
            .find(|o| o.exchange_id.as_deref() == Some(exchange_id))
    }

    pub fn all_orders(&self) -> impl Iterator<Item = &OrderRecord> {
        self.orders.values()
    }

    /// Orders in a non-terminal state.
    pub fn open_orders(&self) -> impl Iterator<Item = &OrderRecord> {
        self.orders.values().filter(|o| !o.state.is_terminal())
    }

    // -----------------------------------------------------------------------
    // Transitions (single choke point)
    // -----------------------------------------------------------------------

    fn transition(
        order: &mut OrderRecord,
        to: OrderState,
        now_ms: i64,
        note: Option<&str>,
        data: serde_json::Value,
    ) -> Result<OrderEvent, TransitionError> {
        let from = Some(order.state);
        validate_transition(from, to)?;

        order.state = to;
        order.updated_at_ms = now_ms;
        order.transitions.push(TransitionRecord {
            from,
            to,
            ts_ms: now_ms,
            note: note.map(str::to_string),
        });

        Ok(OrderEvent {
            kind: event_kind_for(from, to),
            order_id: order.id.clone(),
            ts_ms: now_ms,
            data,
        })
    }

    // -----------------------------------------------------------------------
    // place
    // -----------------------------------------------------------------------

    /// Place an order, at most once per `client_token`.
    ///
    /// New tokens run DRAFT → PENDING → (submit) → SUBMITTED, then the
    /// acknowledgement moves the order to ACCEPTED or REJECTED. A
    /// transport failure leaves the order in PENDING for the
    /// reconciliation sweep; it is not an error of this call.
    pub fn place(
        &mut self,
        adapter: &mut dyn ExchangeAdapter,
        params: OrderParams,
        client_token: &str,
        now_ms: i64,
    ) -> Result<PlaceOutcome, OrderError> {
        if let Some(existing) = self.order_by_token(client_token) {
            return Ok(PlaceOutcome {
                order: existing.clone(),
                idempotent: true,
                events: Vec::new(),
                submit_error: None,
            });
        }

        Self::validate_params(&params)?;

        let id = self.mint_id();
        let mut events = Vec::new();

        let mut order = OrderRecord {
            id: id.clone(),
            client_token: client_token.to_string(),
            exchange_id: None,
            market_id: params.market_id.clone(),
            action: params.action,
            side: params.side,
            order_type: params.order_type,
            contracts: params.contracts,
            limit_price: params.limit_price,
            filled_contracts: 0,
            filled_cost: 0,
            state: OrderState::Draft,
            reject_reason: None,
            expires_at_ms: params.expires_at_ms,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            transitions: vec![TransitionRecord {
                from: None,
                to: OrderState::Draft,
                ts_ms: now_ms,
                note: None,
            }],
            fills: Vec::new(),
        };
        events.push(OrderEvent {
            kind: event_kind_for(None, OrderState::Draft),
            order_id: id.clone(),
            ts_ms: now_ms,
            data: json!({ "client_token": client_token, "market_id": params.market_id.clone() }),
        });

        // The token is registered before any exchange traffic, so a retry
        // after a crash between here and the submit resolves to this order.
        self.by_token.insert(client_token.to_string(), id.clone());

        events.push(
            Self::transition(&mut order, OrderState::Pending, now_ms, None, json!({}))
                .expect("DRAFT -> PENDING is in the graph"),
        );

        let submit = adapter.submit_order(crate::adapter::ExchangeSubmitRequest {
            client_token: client_token.to_string(),
            ticker: params.market_id,
            side: params.side,
            action: params.action,
            order_type: params.order_type,
            contracts: params.contracts,
            limit_price: params.limit_price,
        });

        let submit_error = match submit {
            Err(e) => Some(e),
            Ok(ack) => {
                events.push(
                    Self::transition(&mut order, OrderState::Submitted, now_ms, None, json!({}))
                        .expect("PENDING -> SUBMITTED is in the graph"),
                );
                match ack.status {
                    AckStatus::Accepted => {
                        order.exchange_id = Some(ack.exchange_id.clone());
                        events.push(
                            Self::transition(
                                &mut order,
                                OrderState::Accepted,
                                now_ms,
                                None,
                                json!({ "exchange_id": ack.exchange_id }),
                            )
                            .expect("SUBMITTED -> ACCEPTED is in the graph"),
                        );
                    }
                    AckStatus::Rejected { reason } => {
                        order.reject_reason = Some(reason.clone());
                        events.push(
                            Self::transition(
                                &mut order,
                                OrderState::Rejected,
                                now_ms,
                                Some("exchange reject"),
                                json!({ "reason": reason }),
                            )
                            .expect("SUBMITTED -> REJECTED is in the graph"),
                        );
                    }
                }
                None
            }
        };

        self.orders.insert(id.clone(), order);

        Ok(PlaceOutcome {
            order: self.orders[&id].clone(),
            idempotent: false,
            events,
            submit_error,
        })
    }

    fn validate_params(params: &OrderParams) -> Result<(), OrderError> {
        if params.contracts < 1 {
            return Err(OrderError::InvalidParams {
                detail: format!("contracts must be >= 1, got {}", params.contracts),
            });
        }
        match (params.order_type, params.limit_price) {
            (OrderType::Limit, None) => Err(OrderError::InvalidParams {
                detail: "LIMIT order without limit_price".to_string(),
            }),
            (OrderType::Limit, Some(p)) if !(1..=99).contains(&p) => {
                Err(OrderError::InvalidParams {
                    detail: format!("limit_price must be in [1, 99], got {p}"),
                })
            }
            (OrderType::Market, Some(_)) => Err(OrderError::InvalidParams {
                detail: "MARKET order must not carry a limit_price".to_string(),
            }),
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // cancel / amend
    // -----------------------------------------------------------------------

    /// Cancel a live order. Terminal orders fail with `InvalidTransition`.
    pub fn cancel(
        &mut self,
        adapter: &mut dyn ExchangeAdapter,
        order_id: &str,
        now_ms: i64,
    ) -> Result<(OrderRecord, OrderEvent), OrderError> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| OrderError::UnknownOrder {
                id: order_id.to_string(),
            })?;

        if order.state.is_terminal() {
            return Err(TransitionError {
                from: Some(order.state),
                to: OrderState::Canceled,
            }
            .into());
        }

        // Cancel on the exchange first; a transport failure leaves the
        // local state untouched for the next sweep.
        if let Some(exchange_id) = order.exchange_id.clone() {
            adapter.cancel_order(&exchange_id)?;
        }

        let event = Self::transition(order, OrderState::Canceled, now_ms, None, json!({}))?;
        Ok((order.clone(), event))
    }

    /// Amend a resting order by cancel-and-replace.
    ///
    /// Permitted only from ACCEPTED. The replacement reuses the original
    /// parameters with the new quantity/price and derives its token from
    /// the original, so replacement retries stay idempotent too.
    pub fn amend(
        &mut self,
        adapter: &mut dyn ExchangeAdapter,
        order_id: &str,
        new_contracts: i64,
        new_limit_price: Option<i64>,
        now_ms: i64,
    ) -> Result<PlaceOutcome, OrderError> {
        let order = self
            .orders
            .get(order_id)
            .ok_or_else(|| OrderError::UnknownOrder {
                id: order_id.to_string(),
            })?;

        if order.state != OrderState::Accepted {
            return Err(TransitionError {
                from: Some(order.state),
                to: OrderState::Accepted,
            }
            .into());
        }

        let params = OrderParams {
            market_id: order.market_id.clone(),
            action: order.action,
            side: order.side,
            order_type: order.order_type,
            contracts: new_contracts,
            limit_price: new_limit_price.or(order.limit_price),
            expires_at_ms: order.expires_at_ms,
        };
        let replacement_token = format!("{}:r1", order.client_token);

        let (_, cancel_event) = self.cancel(adapter, order_id, now_ms)?;
        let mut outcome = self.place(adapter, params, &replacement_token, now_ms)?;
        outcome.events.insert(0, cancel_event);
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // fills
    // -----------------------------------------------------------------------

    /// Record one fill.
    ///
    /// Replays of an already-recorded `exchange_fill_id` are no-ops. A
    /// quantity that would exceed the order is `OverFill` and must crash
    /// the current tick.
    pub fn apply_fill(
        &mut self,
        order_id: &str,
        qty: i64,
        price: i64,
        exchange_fill_id: &str,
        now_ms: i64,
    ) -> Result<FillOutcome, OrderError> {
        if qty < 1 || !(1..=99).contains(&price) {
            return Err(OrderError::InvalidParams {
                detail: format!("fill qty={qty} price={price}"),
            });
        }

        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| OrderError::UnknownOrder {
                id: order_id.to_string(),
            })?;

        if order.fills.iter().any(|f| f.exchange_fill_id == exchange_fill_id) {
            return Ok(FillOutcome {
                order: order.clone(),
                event: None,
                duplicate: true,
            });
        }

        if order.filled_contracts + qty > order.contracts {
            return Err(OrderError::OverFill {
                order_id: order_id.to_string(),
                filled: order.filled_contracts,
                contracts: order.contracts,
                qty,
            });
        }

        let to = if order.filled_contracts + qty == order.contracts {
            OrderState::Filled
        } else {
            OrderState::PartialFill
        };
        // Validate before mutating so an illegal fill leaves the order
        // untouched.
        validate_transition(Some(order.state), to)?;

        order.accumulate_fill(qty, price);
        order.fills.push(Fill {
            order_id: order_id.to_string(),
            quantity: qty,
            price,
            ts_ms: now_ms,
            exchange_fill_id: exchange_fill_id.to_string(),
        });

        let event = Self::transition(
            order,
            to,
            now_ms,
            None,
            json!({
                "quantity": qty,
                "price": price,
                "filled_contracts": order.filled_contracts,
                "avg_fill_price": order.avg_fill_price(),
            }),
        )
        .expect("validated above");

        Ok(FillOutcome {
            order: order.clone(),
            event: Some(event),
            duplicate: false,
        })
    }

    // -----------------------------------------------------------------------
    // expiry
    // -----------------------------------------------------------------------

    /// Expire live exchange-side orders whose deadline has passed.
    ///
    /// Only SUBMITTED / ACCEPTED / PARTIAL_FILL can expire; DRAFT and
    /// PENDING orders are resolved by cancel or reconciliation instead.
    pub fn expire_due(&mut self, now_ms: i64) -> Vec<OrderEvent> {
        let mut events = Vec::new();

        for order in self.orders.values_mut() {
            let due = matches!(order.expires_at_ms, Some(at) if at <= now_ms);
            if !due {
                continue;
            }
            if validate_transition(Some(order.state), OrderState::Expired).is_ok() {
                let event = Self::transition(
                    order,
                    OrderState::Expired,
                    now_ms,
                    Some("expiry sweep"),
                    json!({}),
                )
                .expect("validated above");
                events.push(event);
            }
        }

        events
    }

    // -----------------------------------------------------------------------
    // reconciliation
    // -----------------------------------------------------------------------

    /// Compare the local book against an exchange snapshot and correct
    /// drift with explicit events.
    ///
    /// Corrects the two recoverable drift families (locally open but
    /// remotely terminal, fill-count mismatch). The two uncorrectable
    /// ones (unknown exchange order, local terminal while remote open)
    /// are reported but left alone.
    pub fn reconcile(
        &mut self,
        snapshot: &[ExchangeOrderSnapshot],
        now_ms: i64,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for remote in snapshot {
            let Some(order_id) = self.by_token.get(&remote.client_token).cloned() else {
                report.detected += 1;
                report.diffs.push(ReconcileDiff::UnknownExchangeOrder {
                    exchange_id: remote.exchange_id.clone(),
                });
                continue;
            };

            // Fill drift first, so a terminal correction below sees the
            // complete fill set.
            let local_filled = self.orders[&order_id].filled_contracts;
            if remote.filled_contracts > local_filled {
                report.detected += 1;
                report.diffs.push(ReconcileDiff::FillMismatch {
                    order_id: order_id.clone(),
                    local_filled,
                    remote_filled: remote.filled_contracts,
                });

                self.catch_up_to_accepted(&order_id, remote, now_ms, &mut report);

                let missing: Vec<_> = remote
                    .fills
                    .iter()
                    .filter(|f| {
                        !self.orders[&order_id]
                            .fills
                            .iter()
                            .any(|local| local.exchange_fill_id == f.exchange_fill_id)
                    })
                    .cloned()
                    .collect();

                let mut all_applied = true;
                for fill in missing {
                    match self.apply_fill(
                        &order_id,
                        fill.quantity,
                        fill.price,
                        &fill.exchange_fill_id,
                        now_ms,
                    ) {
                        Ok(outcome) => report.events.extend(outcome.event),
                        Err(_) => all_applied = false,
                    }
                }
                if all_applied {
                    report.corrected += 1;
                }
            }

            let order = &self.orders[&order_id];
            match (order.state.is_terminal(), remote.status.is_terminal()) {
                (false, true) => {
                    report.detected += 1;
                    report.diffs.push(ReconcileDiff::RemoteTerminal {
                        order_id: order_id.clone(),
                        local: order.state,
                        remote: remote.status,
                    });
                    if self.force_terminal(&order_id, remote.status, now_ms, &mut report) {
                        report.corrected += 1;
                    }
                }
                (true, false) => {
                    report.detected += 1;
                    report.diffs.push(ReconcileDiff::LocalTerminalRemoteOpen {
                        order_id: order_id.clone(),
                        local: order.state,
                    });
                }
                _ => {}
            }
        }

        report
    }

    /// Walk a lagging order forward (PENDING → SUBMITTED → ACCEPTED) so
    /// fills and terminal corrections have a legal starting state.
    fn catch_up_to_accepted(
        &mut self,
        order_id: &str,
        remote: &ExchangeOrderSnapshot,
        now_ms: i64,
        report: &mut ReconcileReport,
    ) {
        let order = self.orders.get_mut(order_id).expect("caller verified");
        for to in [OrderState::Submitted, OrderState::Accepted] {
            if validate_transition(Some(order.state), to).is_ok() {
                if order.exchange_id.is_none() {
                    order.exchange_id = Some(remote.exchange_id.clone());
                }
                let event = Self::transition(
                    order,
                    to,
                    now_ms,
                    Some("reconcile catch-up"),
                    json!({ "exchange_id": remote.exchange_id.clone() }),
                )
                .expect("validated above");
                report.events.push(event);
            }
        }
    }

    /// Move a live order to the terminal state the exchange reports.
    /// Returns false (leaving the diff uncorrected) when the graph has no
    /// such edge.
    fn force_terminal(
        &mut self,
        order_id: &str,
        remote_status: ExchangeOrderStatus,
        now_ms: i64,
        report: &mut ReconcileReport,
    ) -> bool {
        let to = match remote_status {
            ExchangeOrderStatus::Filled => OrderState::Filled,
            ExchangeOrderStatus::Canceled => OrderState::Canceled,
            ExchangeOrderStatus::Rejected => OrderState::Rejected,
            ExchangeOrderStatus::Expired => OrderState::Expired,
            ExchangeOrderStatus::Open => return false,
        };

        let order = self.orders.get_mut(order_id).expect("caller verified");
        match Self::transition(
            order,
            to,
            now_ms,
            Some("reconcile correction"),
            json!({ "remote_status": format!("{remote_status:?}") }),
        ) {
            Ok(event) => {
                report.events.push(event);
                true
            }
            Err(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
