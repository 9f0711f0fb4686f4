//! Fair-value mean reversion.
//!
//! Anchors on the market's last traded price. When the current touch
//! price has moved at least `band` cents away from the anchor, the
//! strategy expects reversion and signals an entry on the cheap side:
//! YES when the ask has dropped below the anchor, NO when the bid has
//! run above it. Signal strength scales with the deviation.

use odk_schemas::Side;
use serde_json::{json, Value};

use crate::types::{
    SignalDraft, SignalKind, Strategy, StrategyConfig, StrategyDescriptor, StrategyError,
    TickContext,
};

#[derive(Debug)]
pub struct MeanReversionStrategy {
    /// Minimum deviation from the anchor before signalling, cents.
    band: i64,
    confidence: f64,
    /// From the instance config: quotes wider than this are untradeable
    /// noise, not dislocations.
    max_spread: i64,
    /// Minimum 24h volume before the anchor is trustworthy.
    min_liquidity: i64,
    signals_emitted: u64,
    fills_seen: u64,
}

impl MeanReversionStrategy {
    pub fn new() -> Self {
        Self {
            band: 3,
            confidence: 0.7,
            max_spread: 10,
            min_liquidity: 0,
            signals_emitted: 0,
            fills_seen: 0,
        }
    }

    fn strength_for(&self, deviation: i64) -> f64 {
        (deviation as f64 / (self.band as f64 * 2.0)).min(1.0)
    }
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MeanReversionStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::new("mean_reversion", "Fair-Value Mean Reversion")
    }

    fn initialize(&mut self, config: &StrategyConfig) -> Result<(), StrategyError> {
        if let Some(band) = config.params.get("band").and_then(Value::as_i64) {
            if band < 1 {
                return Err(StrategyError::new(format!("band must be >= 1, got {band}")));
            }
            self.band = band;
        }
        if let Some(confidence) = config.params.get("confidence").and_then(Value::as_f64) {
            self.confidence = confidence.clamp(0.0, 1.0);
        }
        self.max_spread = config.max_spread;
        self.min_liquidity = config.min_liquidity;
        Ok(())
    }

    fn generate_signals(&mut self, ctx: &TickContext) -> Result<Vec<SignalDraft>, StrategyError> {
        let quote = &ctx.quote;

        if quote.spread(Side::Yes) > self.max_spread || quote.volume_24h < self.min_liquidity {
            return Ok(Vec::new());
        }

        let anchor = quote.last_price;

        // Ask has fallen below the anchor: YES looks cheap.
        let yes_dip = anchor - quote.yes_ask;
        // Bid has run above the anchor: NO looks cheap.
        let no_dip = quote.yes_bid - anchor;

        let draft = if yes_dip >= self.band {
            Some(SignalDraft {
                market_id: quote.ticker.clone(),
                side: Side::Yes,
                kind: SignalKind::Entry,
                strength: self.strength_for(yes_dip),
                confidence: self.confidence,
                target_price: anchor,
                current_price: quote.yes_ask,
                reason: format!("ask {} is {yes_dip}c below anchor {anchor}", quote.yes_ask),
            })
        } else if no_dip >= self.band {
            Some(SignalDraft {
                market_id: quote.ticker.clone(),
                side: Side::No,
                kind: SignalKind::Entry,
                strength: self.strength_for(no_dip),
                confidence: self.confidence,
                target_price: 100 - anchor,
                current_price: quote.no_ask,
                reason: format!("bid {} is {no_dip}c above anchor {anchor}", quote.yes_bid),
            })
        } else {
            None
        };

        if draft.is_some() {
            self.signals_emitted += 1;
        }
        Ok(draft.into_iter().collect())
    }

    fn on_event(&mut self, event: &odk_schemas::StrategyEvent) {
        if event.kind == odk_schemas::StrategyEventKind::OrderFilled {
            self.fills_seen += 1;
        }
    }

    fn state(&self) -> Value {
        json!({
            "band": self.band,
            "confidence": self.confidence,
            "signals_emitted": self.signals_emitted,
            "fills_seen": self.fills_seen,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
