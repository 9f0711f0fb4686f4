use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderAction, Side};

// ---------------------------------------------------------------------------
// MarketQuote
// ---------------------------------------------------------------------------

/// A per-market top-of-book quote record as delivered by the market-data
/// source.
///
/// Both contract sides carry independent bid/ask quotes. The binary
/// complement (`no_bid = 100 - yes_ask`) usually holds but is NOT assumed
/// anywhere in the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub ticker: String,
    pub yes_bid: i64,
    pub yes_ask: i64,
    pub no_bid: i64,
    pub no_ask: i64,
    pub last_price: i64,
    pub volume_24h: i64,
    pub open_interest: i64,
    pub category: String,
    pub expiration_utc: DateTime<Utc>,
}

/// A quote that violates the price-band invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteError {
    pub ticker: String,
    pub detail: String,
}

impl std::fmt::Display for QuoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bad quote for {}: {}", self.ticker, self.detail)
    }
}

impl std::error::Error for QuoteError {}

impl MarketQuote {
    /// Best bid on the requested contract side.
    pub fn bid(&self, side: Side) -> i64 {
        match side {
            Side::Yes => self.yes_bid,
            Side::No => self.no_bid,
        }
    }

    /// Best ask on the requested contract side.
    pub fn ask(&self, side: Side) -> i64 {
        match side {
            Side::Yes => self.yes_ask,
            Side::No => self.no_ask,
        }
    }

    /// `ask - bid` on the requested side, in cents.
    pub fn spread(&self, side: Side) -> i64 {
        self.ask(side) - self.bid(side)
    }

    /// Midpoint of the requested side. Fractional because cent midpoints
    /// land on half-cents.
    pub fn mid(&self, side: Side) -> f64 {
        (self.bid(side) + self.ask(side)) as f64 / 2.0
    }

    /// The quoted price an aggressor pays: ask for a buy, bid for a sell.
    pub fn touch(&self, side: Side, action: OrderAction) -> i64 {
        match action {
            OrderAction::Buy => self.ask(side),
            OrderAction::Sell => self.bid(side),
        }
    }

    /// Enforce `0 <= bid <= ask <= 100` on both sides.
    pub fn validate(&self) -> Result<(), QuoteError> {
        for (label, bid, ask) in [
            ("yes", self.yes_bid, self.yes_ask),
            ("no", self.no_bid, self.no_ask),
        ] {
            if bid < 0 || ask > 100 || bid > ask {
                return Err(QuoteError {
                    ticker: self.ticker.clone(),
                    detail: format!("{label} side out of band: bid={bid} ask={ask}"),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// One resting level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: i64,
    pub contracts: i64,
}

impl BookLevel {
    pub fn new(price: i64, contracts: i64) -> Self {
        debug_assert!((0..=100).contains(&price));
        debug_assert!(contracts >= 0);
        Self { price, contracts }
    }
}

/// A full order book for one side of one market, both halves sorted
/// best-first (bids descending, asks ascending).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBookSnapshot {
    pub fn new(bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> Self {
        Self { bids, asks }
    }

    /// The book half an aggressor consumes: asks for a buy, bids for a sell.
    pub fn levels_for(&self, action: OrderAction) -> &[BookLevel] {
        match action {
            OrderAction::Buy => &self.asks,
            OrderAction::Sell => &self.bids,
        }
    }

    /// Resting contracts at the best level of the consumed half.
    pub fn depth_at_top(&self, action: OrderAction) -> i64 {
        self.levels_for(action).first().map_or(0, |l| l.contracts)
    }

    /// Total resting contracts on the consumed half.
    pub fn total_depth(&self, action: OrderAction) -> i64 {
        self.levels_for(action).iter().map(|l| l.contracts).sum()
    }
}

// ---------------------------------------------------------------------------
// Market configuration
// ---------------------------------------------------------------------------

/// Risk tier assigned to a market; the multiplier scales both position caps.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    Tier1,
    Tier2,
    Tier3,
}

impl RiskTier {
    pub fn multiplier(self) -> f64 {
        match self {
            RiskTier::Tier1 => 1.0,
            RiskTier::Tier2 => 0.5,
            RiskTier::Tier3 => 0.25,
        }
    }
}

/// Per-market position limits, scaled by the market's risk tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub ticker: String,
    pub risk_tier: RiskTier,
    /// Hard cap on contracts held per (market, side) before tier adjustment.
    pub max_position_size: i64,
    /// Hard cap on position notional in cents before tier adjustment.
    pub max_notional: i64,
}

impl MarketConfig {
    pub fn new(ticker: impl Into<String>, risk_tier: RiskTier) -> Self {
        Self {
            ticker: ticker.into(),
            risk_tier,
            max_position_size: 1_000,
            max_notional: 50_000_00,
        }
    }

    /// Position cap after the tier multiplier.
    pub fn adjusted_position_cap(&self) -> i64 {
        (self.max_position_size as f64 * self.risk_tier.multiplier()).floor() as i64
    }

    /// Notional cap (cents) after the tier multiplier.
    pub fn adjusted_notional_cap(&self) -> i64 {
        (self.max_notional as f64 * self.risk_tier.multiplier()).floor() as i64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn quote(yes_bid: i64, yes_ask: i64, no_bid: i64, no_ask: i64) -> MarketQuote {
        MarketQuote {
            ticker: "FED-25DEC".to_string(),
            yes_bid,
            yes_ask,
            no_bid,
            no_ask,
            last_price: yes_ask,
            volume_24h: 10_000,
            open_interest: 5_000,
            category: "economics".to_string(),
            expiration_utc: Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn side_accessors_pick_independent_quotes() {
        // Deliberately NOT the binary complement of the yes side.
        let q = quote(40, 44, 50, 62);
        assert_eq!(q.bid(Side::Yes), 40);
        assert_eq!(q.ask(Side::No), 62);
        assert_eq!(q.spread(Side::No), 12);
        assert_eq!(q.mid(Side::Yes), 42.0);
    }

    #[test]
    fn touch_is_ask_for_buy_and_bid_for_sell() {
        let q = quote(40, 44, 56, 60);
        assert_eq!(q.touch(Side::Yes, OrderAction::Buy), 44);
        assert_eq!(q.touch(Side::Yes, OrderAction::Sell), 40);
    }

    #[test]
    fn validate_rejects_crossed_or_out_of_band() {
        assert!(quote(40, 44, 56, 60).validate().is_ok());
        assert!(quote(45, 44, 56, 60).validate().is_err());
        assert!(quote(40, 101, 56, 60).validate().is_err());
        assert!(quote(-1, 44, 56, 60).validate().is_err());
    }

    #[test]
    fn book_depth_follows_the_consumed_half() {
        let book = OrderBookSnapshot::new(
            vec![BookLevel::new(40, 25), BookLevel::new(39, 10)],
            vec![BookLevel::new(44, 5), BookLevel::new(45, 30)],
        );
        assert_eq!(book.depth_at_top(OrderAction::Buy), 5);
        assert_eq!(book.total_depth(OrderAction::Buy), 35);
        assert_eq!(book.depth_at_top(OrderAction::Sell), 25);
        assert_eq!(book.total_depth(OrderAction::Sell), 35);
    }

    #[test]
    fn tier_multipliers_scale_caps() {
        let mut cfg = MarketConfig::new("FED-25DEC", RiskTier::Tier2);
        cfg.max_position_size = 1_000;
        cfg.max_notional = 40_000;
        assert_eq!(cfg.adjusted_position_cap(), 500);
        assert_eq!(cfg.adjusted_notional_cap(), 20_000);

        cfg.risk_tier = RiskTier::Tier3;
        assert_eq!(cfg.adjusted_position_cap(), 250);
    }
}
