use std::collections::BTreeMap;

use odk_schemas::{MarketQuote, OrderBookSnapshot};

/// One message from the market-data source.
#[derive(Debug, Clone)]
pub struct QuoteUpdate {
    pub quote: MarketQuote,
    pub book: Option<OrderBookSnapshot>,
}

/// Latest-wins quote buffer, one slot per market.
///
/// Quotes arriving faster than ticks are processed collapse into the
/// newest one; no queue of stale ticks accumulates.
#[derive(Debug, Default)]
pub struct QuoteCoalescer {
    slots: BTreeMap<String, QuoteUpdate>,
}

impl QuoteCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an update, replacing any older one for the same market.
    pub fn offer(&mut self, update: QuoteUpdate) {
        self.slots.insert(update.quote.ticker.clone(), update);
    }

    /// Take everything buffered: at most one update per market, in
    /// ticker order.
    pub fn drain(&mut self) -> Vec<QuoteUpdate> {
        std::mem::take(&mut self.slots).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn update(ticker: &str, yes_ask: i64) -> QuoteUpdate {
        QuoteUpdate {
            quote: MarketQuote {
                ticker: ticker.to_string(),
                yes_bid: yes_ask - 2,
                yes_ask,
                no_bid: 100 - yes_ask,
                no_ask: 102 - yes_ask,
                last_price: yes_ask,
                volume_24h: 0,
                open_interest: 0,
                category: "test".to_string(),
                expiration_utc: Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap(),
            },
            book: None,
        }
    }

    #[test]
    fn latest_update_wins_per_market() {
        let mut c = QuoteCoalescer::new();
        c.offer(update("A", 50));
        c.offer(update("B", 40));
        c.offer(update("A", 55));

        assert_eq!(c.len(), 2);
        let drained = c.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].quote.ticker, "A");
        assert_eq!(drained[0].quote.yes_ask, 55);
        assert!(c.is_empty());
    }
}
