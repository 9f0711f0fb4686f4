use odk_schemas::Side;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Key for one position row. YES and NO in the same market are distinct.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub market_id: String,
    pub side: Side,
}

impl PositionKey {
    pub fn new(market_id: impl Into<String>, side: Side) -> Self {
        Self {
            market_id: market_id.into(),
            side,
        }
    }
}

/// One net position. Mutated only through the book's fill/reduce/mark
/// operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub market_id: String,
    pub side: Side,
    pub quantity: i64,
    /// Total cents paid for the open quantity.
    pub cost_basis: i64,
    pub realized_pnl: i64,
    pub unrealized_pnl: i64,
}

impl Position {
    pub fn new(market_id: impl Into<String>, side: Side) -> Self {
        Self {
            market_id: market_id.into(),
            side,
            quantity: 0,
            cost_basis: 0,
            realized_pnl: 0,
            unrealized_pnl: 0,
        }
    }

    /// Cost-basis-weighted mean entry price in cents.
    /// Zero-quantity positions report 0.
    pub fn avg_price(&self) -> f64 {
        if self.quantity == 0 {
            0.0
        } else {
            self.cost_basis as f64 / self.quantity as f64
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }
}

// ---------------------------------------------------------------------------
// Caps
// ---------------------------------------------------------------------------

/// What a configured cap measures.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapType {
    /// Contracts held in the (market, side) row.
    Absolute,
    /// Row notional as a fraction of total portfolio value.
    Percentage,
    /// Row notional in cents.
    Notional,
}

impl fmt::Display for CapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapType::Absolute => "ABSOLUTE",
            CapType::Percentage => "PERCENTAGE",
            CapType::Notional => "NOTIONAL",
        };
        write!(f, "{s}")
    }
}

/// One configured cap. Units follow the cap type: contracts, fraction,
/// or cents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapConfig {
    pub cap_type: CapType,
    pub soft_limit: f64,
    pub hard_limit: f64,
}

impl CapConfig {
    /// Soft limit defaults to 80% of hard.
    pub fn new(cap_type: CapType, hard_limit: f64) -> Self {
        Self {
            cap_type,
            soft_limit: hard_limit * 0.8,
            hard_limit,
        }
    }

    pub fn with_soft_limit(mut self, soft_limit: f64) -> Self {
        self.soft_limit = soft_limit;
        self
    }
}

/// Per-cap outcome inside a [`CapsVerdict`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapCheckDetail {
    pub name: String,
    pub cap_type: CapType,
    /// The would-be value after the candidate order.
    pub value: f64,
    pub soft_limit: f64,
    pub hard_limit: f64,
    pub soft_breach: bool,
    pub hard_breach: bool,
}

/// Aggregate result of a cap check: hard breaches block, soft breaches
/// warn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapsVerdict {
    pub blocked: bool,
    pub reason: Option<String>,
    pub warnings: Vec<String>,
    pub details: Vec<CapCheckDetail>,
}

impl CapsVerdict {
    pub fn clear() -> Self {
        Self {
            blocked: false,
            reason: None,
            warnings: Vec::new(),
            details: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// Reduction larger than the open quantity.
    InsufficientQuantity {
        market_id: String,
        side: Side,
        have: i64,
        want: i64,
    },
    /// Fill or reduce with a non-positive quantity or out-of-band price.
    BadInput { detail: String },
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionError::InsufficientQuantity {
                market_id,
                side,
                have,
                want,
            } => write!(
                f,
                "cannot reduce {want} contracts of {market_id}/{side}: only {have} open"
            ),
            PositionError::BadInput { detail } => write!(f, "bad position input: {detail}"),
        }
    }
}

impl std::error::Error for PositionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_price_is_cost_basis_over_quantity() {
        let mut p = Position::new("M", Side::Yes);
        assert_eq!(p.avg_price(), 0.0);

        p.quantity = 100;
        p.cost_basis = 5_400;
        assert_eq!(p.avg_price(), 54.0);
    }

    #[test]
    fn cap_config_soft_defaults_to_80pct() {
        let cap = CapConfig::new(CapType::Absolute, 500.0);
        assert_eq!(cap.soft_limit, 400.0);

        let cap = CapConfig::new(CapType::Notional, 100_000.0).with_soft_limit(90_000.0);
        assert_eq!(cap.soft_limit, 90_000.0);
    }
}
