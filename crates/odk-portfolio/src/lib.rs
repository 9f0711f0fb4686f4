//! odk-portfolio
//!
//! The position book: net position per (market, side), weighted-average
//! cost basis, hierarchical position caps, and admissible order sizing.
//!
//! # Accounting model
//!
//! A position stores its integer `cost_basis` (total cents paid) rather
//! than a rounded average price. The average is derived on read, so the
//! weighted-mean invariant holds exactly and fill application is
//! order-independent over a fixed fill set. All products run through
//! `i128` before clamping back to `i64`.
//!
//! YES and NO positions in the same market are independent rows; the book
//! never nets one against the other.

mod book;
mod types;

pub use book::PositionBook;
pub use types::{
    CapCheckDetail, CapConfig, CapType, CapsVerdict, Position, PositionError, PositionKey,
};
