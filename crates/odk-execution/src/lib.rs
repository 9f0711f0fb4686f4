//! odk-execution
//!
//! The order machine: every order's lifecycle state, validated against a
//! fixed transition graph, with at-most-once exchange submission per
//! client token and weighted-average fill accounting.
//!
//! # Architecture
//!
//! - [`oms`] holds the pure transition graph and its validator. Illegal
//!   transitions are programmer errors and fail loudly.
//! - [`OrderMachine`] owns the order map and the persistent
//!   `client_token → order_id` index; it drives an [`ExchangeAdapter`]
//!   and emits an [`OrderEvent`] for every transition, creation included.
//! - Exchange transports are external collaborators behind the sync
//!   [`ExchangeAdapter`] seam; a network failure during submit leaves the
//!   order `Pending` and the reconciliation sweep decides the outcome.

mod adapter;
mod machine;
pub mod oms;
mod types;

pub use adapter::{
    AckStatus, ExchangeAck, ExchangeAdapter, ExchangeFill, ExchangeOrderSnapshot,
    ExchangeOrderStatus, ExchangeSubmitRequest,
};
pub use machine::{OrderMachine, ReconcileDiff, ReconcileReport};
pub use oms::{event_kind_for, validate_transition, OrderState, TransitionError};
pub use types::{
    ExchangeError, Fill, FillOutcome, OrderError, OrderEvent, OrderParams, OrderRecord,
    PlaceOutcome, TransitionRecord,
};
