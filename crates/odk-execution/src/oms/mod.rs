//! Order lifecycle state machine: states, the fixed transition graph, and
//! the event-kind selection table.

mod state_machine;

pub use state_machine::{event_kind_for, validate_transition, OrderState, TransitionError};
