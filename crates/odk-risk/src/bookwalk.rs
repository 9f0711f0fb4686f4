//! Greedy book walk for slippage estimation.

use odk_schemas::{BookLevel, OrderAction};

/// Exhausted books charge the uncovered remainder this many cents past
/// the last quoted level, in the adverse direction.
const EXHAUSTION_PENALTY: i64 = 5;

/// Result of walking one book half for a requested quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkResult {
    /// Best quoted price on the consumed half.
    pub top_price: i64,
    /// Quantity-weighted expected execution price.
    pub expected_price: f64,
    /// `|expected_price - top_price|`, cents.
    pub slippage: f64,
    /// `top ± slippage`: plus for buys, minus for sells.
    pub adjusted_price: f64,
}

/// Walk `levels` (best-first) filling `contracts` greedily.
///
/// If the book cannot cover the quantity, the remainder is charged at the
/// last level's price moved [`EXHAUSTION_PENALTY`] cents against the
/// aggressor. Returns `None` for an empty book or non-positive quantity.
pub fn walk_book(levels: &[BookLevel], contracts: i64, action: OrderAction) -> Option<WalkResult> {
    if contracts <= 0 {
        return None;
    }
    let top_price = levels.first()?.price;

    let mut remaining = contracts;
    let mut cost: i128 = 0;
    let mut last_price = top_price;

    for level in levels {
        if remaining == 0 {
            break;
        }
        let take = level.contracts.min(remaining);
        cost += (take as i128) * (level.price as i128);
        remaining -= take;
        last_price = level.price;
    }

    if remaining > 0 {
        let penalty_price = match action {
            OrderAction::Buy => (last_price + EXHAUSTION_PENALTY).min(100),
            OrderAction::Sell => (last_price - EXHAUSTION_PENALTY).max(0),
        };
        cost += (remaining as i128) * (penalty_price as i128);
    }

    let expected_price = cost as f64 / contracts as f64;
    let slippage = (expected_price - top_price as f64).abs();
    let adjusted_price = match action {
        OrderAction::Buy => top_price as f64 + slippage,
        OrderAction::Sell => top_price as f64 - slippage,
    };

    Some(WalkResult {
        top_price,
        expected_price,
        slippage,
        adjusted_price,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
