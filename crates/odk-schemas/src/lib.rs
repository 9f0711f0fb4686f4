//! odk-schemas
//!
//! Shared domain types for the OutcomeDesk engine: market quotes, order
//! books, contract sides, market configuration, and the event vocabulary
//! every subsystem speaks.
//!
//! All prices are integer cents in `[0, 100]` (binary contracts settle at
//! 100¢). Quantities are integer contracts. Notionals are integer cents.
//! Core crates never read the wall clock — timestamps are `i64` epoch
//! milliseconds supplied by the runtime boundary.

mod events;
mod market;

pub use events::{
    EventEnvelope, KillSwitchEventKind, OrderEventKind, StrategyEvent, StrategyEventKind,
};
pub use market::{
    BookLevel, MarketConfig, MarketQuote, OrderBookSnapshot, QuoteError, RiskTier,
};

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Contract side / order action / order type
// ---------------------------------------------------------------------------

/// The side of a binary contract.
///
/// YES and NO are quoted independently; the engine never derives one side's
/// quote from the other via the binary complement.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Buy or sell the chosen contract side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderAction {
    Buy,
    Sell,
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderAction::Buy => write!(f, "BUY"),
            OrderAction::Sell => write!(f, "SELL"),
        }
    }
}

/// Order pricing type. Limit orders carry a price in `[1, 99]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
        }
    }
}

// ---------------------------------------------------------------------------
// Integer money helpers
// ---------------------------------------------------------------------------

/// `qty * price_cents` without intermediate overflow.
pub fn mul_qty_price(qty: i64, price_cents: i64) -> i128 {
    (qty as i128) * (price_cents as i128)
}

/// Clamp an `i128` product back into `i64`.
pub fn clamp_i128(x: i128) -> i64 {
    if x > i64::MAX as i128 {
        i64::MAX
    } else if x < i64::MIN as i128 {
        i64::MIN
    } else {
        x as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_displays_wire_names() {
        assert_eq!(Side::Yes.to_string(), "YES");
        assert_eq!(Side::No.to_string(), "NO");
        assert_eq!(OrderAction::Buy.to_string(), "BUY");
        assert_eq!(OrderType::Limit.to_string(), "LIMIT");
    }

    #[test]
    fn clamp_saturates_both_ends() {
        assert_eq!(clamp_i128(i128::from(i64::MAX) + 1), i64::MAX);
        assert_eq!(clamp_i128(i128::from(i64::MIN) - 1), i64::MIN);
        assert_eq!(clamp_i128(42), 42);
    }

    #[test]
    fn mul_qty_price_widens() {
        assert_eq!(mul_qty_price(i64::MAX, 2), (i64::MAX as i128) * 2);
    }
}
