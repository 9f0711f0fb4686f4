//! Order State Machine
//!
//! # Design
//!
//! A fixed directed transition graph for a single exchange order.
//! [`validate_transition`] is the single authority on legality: anything
//! not listed below is illegal and returns [`TransitionError`], which
//! callers MUST surface — an illegal transition is an OMS inconsistency,
//! never something to swallow.
//!
//! # State diagram
//!
//! ```text
//!   (create)
//!      ──► Draft ──► Pending ──► Submitted ──► Accepted ──► PartialFill ─┐
//!            │          │           │  │          │  │         ▲  │      │
//!            │          │           │  │          │  └─────────┘  │      │
//!            ▼          ▼           │  ▼          ▼               ▼      ▼
//!        Canceled   Canceled,    Canceled,    Canceled,       Filled  Filled
//!                   Rejected     Rejected,    Expired,
//!                                Expired      Filled*
//! ```
//!
//! `Filled`, `Canceled`, `Rejected`, `Expired` are terminal. Cancellation
//! is legal from every non-terminal state. `PartialFill → PartialFill` is
//! legal (each partial fill re-enters the state).

use odk_schemas::OrderEventKind;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// OrderState
// ---------------------------------------------------------------------------

/// All states an order can occupy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    /// Created locally; not yet validated.
    Draft,
    /// Validated; submission not yet attempted or not yet acknowledged
    /// as sent. A submit-time network failure parks the order here.
    Pending,
    /// Handed to the exchange; awaiting acceptance.
    Submitted,
    /// Resting on the exchange; no fills yet.
    Accepted,
    /// At least one fill; quantity remains.
    PartialFill,
    /// Fully filled. **Terminal.**
    Filled,
    /// Canceled locally or by the exchange. **Terminal.**
    Canceled,
    /// Rejected by validation or the exchange. **Terminal.**
    Rejected,
    /// Expired on the exchange. **Terminal.**
    Expired,
}

impl OrderState {
    /// No further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Rejected | Self::Expired
        )
    }

    /// Listed successor states (the whole graph).
    pub fn successors(&self) -> &'static [OrderState] {
        use OrderState::*;
        match self {
            Draft => &[Pending, Canceled],
            Pending => &[Submitted, Canceled, Rejected],
            Submitted => &[Accepted, Rejected, Canceled, Expired],
            Accepted => &[PartialFill, Filled, Canceled, Expired],
            PartialFill => &[PartialFill, Filled, Canceled, Expired],
            Filled | Canceled | Rejected | Expired => &[],
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::Draft => "DRAFT",
            OrderState::Pending => "PENDING",
            OrderState::Submitted => "SUBMITTED",
            OrderState::Accepted => "ACCEPTED",
            OrderState::PartialFill => "PARTIAL_FILL",
            OrderState::Filled => "FILLED",
            OrderState::Canceled => "CANCELED",
            OrderState::Rejected => "REJECTED",
            OrderState::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// An attempted transition not present in the graph.
///
/// Callers MUST treat this as a halt/alert condition: it means the local
/// view of the order and the event stream disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    /// `None` means "creation attempted on an existing order".
    pub from: Option<OrderState>,
    pub to: OrderState,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.from {
            Some(from) => write!(f, "illegal order transition: {from} -> {}", self.to),
            None => write!(f, "illegal order creation into {}", self.to),
        }
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// Validation / event selection
// ---------------------------------------------------------------------------

/// Validate one transition against the graph.
///
/// `from = None` is the creation event and is legal only into `Draft`.
pub fn validate_transition(
    from: Option<OrderState>,
    to: OrderState,
) -> Result<(), TransitionError> {
    let legal = match from {
        None => to == OrderState::Draft,
        Some(from) => from.successors().contains(&to),
    };

    if legal {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// The event kind emitted for a validated transition.
pub fn event_kind_for(from: Option<OrderState>, to: OrderState) -> OrderEventKind {
    match (from, to) {
        (None, _) => OrderEventKind::Created,
        (_, OrderState::Filled) => OrderEventKind::Filled,
        (_, OrderState::PartialFill) => OrderEventKind::PartiallyFilled,
        (_, OrderState::Canceled) => OrderEventKind::Canceled,
        (_, OrderState::Rejected) => OrderEventKind::Rejected,
        (_, OrderState::Expired) => OrderEventKind::Expired,
        _ => OrderEventKind::StateChanged,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
