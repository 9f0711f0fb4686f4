use std::collections::BTreeMap;

use odk_schemas::{clamp_i128, mul_qty_price, MarketConfig, Side};

use crate::types::{
    CapCheckDetail, CapConfig, CapType, CapsVerdict, Position, PositionError, PositionKey,
};

/// The position book: exclusive owner of every position row.
///
/// Fills only grow a row; reductions go through [`reduce`](Self::reduce)
/// and realize P&L against the average cost basis.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: BTreeMap<PositionKey, Position>,
    markets: BTreeMap<String, MarketConfig>,
    caps: Vec<CapConfig>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the per-market limit configuration.
    pub fn upsert_market(&mut self, config: MarketConfig) {
        self.markets.insert(config.ticker.clone(), config);
    }

    /// Append a portfolio-wide cap.
    pub fn add_cap(&mut self, cap: CapConfig) {
        self.caps.push(cap);
    }

    pub fn position(&self, market_id: &str, side: Side) -> Option<&Position> {
        self.positions.get(&PositionKey::new(market_id, side))
    }

    pub fn open_quantity(&self, market_id: &str, side: Side) -> i64 {
        self.position(market_id, side).map_or(0, |p| p.quantity)
    }

    pub fn all_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Σ cost basis over all open rows, in cents. Percentage caps measure
    /// against this.
    pub fn total_portfolio_value(&self) -> i64 {
        self.positions
            .values()
            .fold(0i64, |acc, p| acc.saturating_add(p.cost_basis))
    }

    // -----------------------------------------------------------------------
    // Fills
    // -----------------------------------------------------------------------

    /// Grow a position by a fill.
    ///
    /// A first fill on an empty row yields an average price equal to the
    /// fill price. Serialization per (market, side) is the caller's
    /// concern; the arithmetic here is atomic per call.
    pub fn apply_fill(
        &mut self,
        market_id: &str,
        side: Side,
        qty: i64,
        price: i64,
    ) -> Result<&Position, PositionError> {
        if qty <= 0 || !(0..=100).contains(&price) {
            return Err(PositionError::BadInput {
                detail: format!("fill qty={qty} price={price}"),
            });
        }

        let key = PositionKey::new(market_id, side);
        let pos = self
            .positions
            .entry(key.clone())
            .or_insert_with(|| Position::new(market_id, side));

        pos.quantity = pos.quantity.saturating_add(qty);
        pos.cost_basis = pos
            .cost_basis
            .saturating_add(clamp_i128(mul_qty_price(qty, price)));

        Ok(&self.positions[&key])
    }

    /// Reduce a position at an exit price, realizing P&L against the
    /// average cost of the removed quantity.
    ///
    /// Returns the realized P&L delta in cents. Flat rows are dropped.
    pub fn reduce(
        &mut self,
        market_id: &str,
        side: Side,
        qty: i64,
        exit_price: i64,
    ) -> Result<i64, PositionError> {
        if qty <= 0 || !(0..=100).contains(&exit_price) {
            return Err(PositionError::BadInput {
                detail: format!("reduce qty={qty} price={exit_price}"),
            });
        }

        let key = PositionKey::new(market_id, side);
        let pos = self
            .positions
            .get_mut(&key)
            .ok_or_else(|| PositionError::InsufficientQuantity {
                market_id: market_id.to_string(),
                side,
                have: 0,
                want: qty,
            })?;

        if qty > pos.quantity {
            return Err(PositionError::InsufficientQuantity {
                market_id: market_id.to_string(),
                side,
                have: pos.quantity,
                want: qty,
            });
        }

        // Average-cost removal; rounds half away from zero on the cent.
        let removed_cost = if qty == pos.quantity {
            pos.cost_basis
        } else {
            let num = (pos.cost_basis as i128) * (qty as i128);
            let den = pos.quantity as i128;
            clamp_i128((num + den / 2) / den)
        };

        let proceeds = clamp_i128(mul_qty_price(qty, exit_price));
        let realized = proceeds.saturating_sub(removed_cost);

        pos.quantity -= qty;
        pos.cost_basis = pos.cost_basis.saturating_sub(removed_cost);
        pos.realized_pnl = pos.realized_pnl.saturating_add(realized);

        if pos.is_flat() {
            self.positions.remove(&key);
        }

        Ok(realized)
    }

    /// Refresh unrealized P&L for one row against a mark price.
    /// Returns the new unrealized value, or 0 for a missing row.
    pub fn mark_to_market(&mut self, market_id: &str, side: Side, mark_price: i64) -> i64 {
        let key = PositionKey::new(market_id, side);
        match self.positions.get_mut(&key) {
            Some(pos) => {
                let mark_value = clamp_i128(mul_qty_price(pos.quantity, mark_price));
                pos.unrealized_pnl = mark_value.saturating_sub(pos.cost_basis);
                pos.unrealized_pnl
            }
            None => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Caps
    // -----------------------------------------------------------------------

    /// Check whether adding `quantity` contracts at `price` would breach
    /// any cap.
    ///
    /// Market-level caps (position size, notional) are tier-adjusted and
    /// checked first, then every portfolio-wide configured cap. Hard
    /// breaches block; soft breaches only warn. All caps are evaluated so
    /// the verdict carries the full picture.
    pub fn check_caps(
        &self,
        market_id: &str,
        side: Side,
        quantity: i64,
        price: i64,
    ) -> CapsVerdict {
        let current = self.open_quantity(market_id, side);
        let new_qty = current.saturating_add(quantity);
        let new_notional = clamp_i128(mul_qty_price(new_qty, price));
        let portfolio = self.total_portfolio_value();

        let mut verdict = CapsVerdict::clear();

        if let Some(market) = self.markets.get(market_id) {
            let adj_pos = market.adjusted_position_cap() as f64;
            let adj_not = market.adjusted_notional_cap() as f64;

            push_cap(
                &mut verdict,
                "market_position_size",
                CapType::Absolute,
                new_qty as f64,
                adj_pos * 0.8,
                adj_pos,
            );
            push_cap(
                &mut verdict,
                "market_notional",
                CapType::Notional,
                new_notional as f64,
                adj_not * 0.8,
                adj_not,
            );
        }

        for (i, cap) in self.caps.iter().enumerate() {
            let value = match cap.cap_type {
                CapType::Absolute => new_qty as f64,
                CapType::Notional => new_notional as f64,
                CapType::Percentage => {
                    // No portfolio yet: nothing to measure against.
                    if portfolio <= 0 {
                        continue;
                    }
                    new_notional as f64 / portfolio as f64
                }
            };
            push_cap(
                &mut verdict,
                &format!("cap_{i}_{}", cap.cap_type),
                cap.cap_type,
                value,
                cap.soft_limit,
                cap.hard_limit,
            );
        }

        verdict
    }

    /// Maximum admissible new order size for (market, side) at `price`.
    ///
    /// `max(0, min(adjPos - current, (adjNot - currentNotional) / price))`,
    /// where a missing market config means no market-level bound.
    pub fn max_order_size(&self, market_id: &str, side: Side, price: i64) -> i64 {
        let Some(market) = self.markets.get(market_id) else {
            return i64::MAX;
        };

        let current = self.open_quantity(market_id, side);
        let current_notional = self
            .position(market_id, side)
            .map_or(0, |p| p.cost_basis);

        let by_position = market.adjusted_position_cap().saturating_sub(current);
        let by_notional = if price > 0 {
            market
                .adjusted_notional_cap()
                .saturating_sub(current_notional)
                / price
        } else {
            i64::MAX
        };

        by_position.min(by_notional).max(0)
    }
}

fn push_cap(
    verdict: &mut CapsVerdict,
    name: &str,
    cap_type: CapType,
    value: f64,
    soft_limit: f64,
    hard_limit: f64,
) {
    let hard_breach = value > hard_limit;
    let soft_breach = value > soft_limit;

    if hard_breach && !verdict.blocked {
        verdict.blocked = true;
        verdict.reason = Some(format!(
            "{name}: {value:.2} exceeds hard limit {hard_limit:.2}"
        ));
    } else if soft_breach && !hard_breach {
        verdict
            .warnings
            .push(format!("{name}: {value:.2} exceeds soft limit {soft_limit:.2}"));
    }

    verdict.details.push(CapCheckDetail {
        name: name.to_string(),
        cap_type,
        value,
        soft_limit,
        hard_limit,
        soft_breach,
        hard_breach,
    });
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
