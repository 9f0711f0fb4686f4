//! Async boundary: the quote-stream consumer and the event logger.
//!
//! These are the only suspension points in the crate — the engine itself
//! is synchronous. The consumer drains its channel into the coalescer
//! before ticking, so a burst of quotes for one market costs one tick.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use odk_execution::ExchangeAdapter;

use crate::coalesce::{QuoteCoalescer, QuoteUpdate};
use crate::engine::{EngineEvent, TradingEngine};

/// Consume the push-based quote stream until the sender closes.
///
/// Every wakeup drains all immediately-available updates (latest wins
/// per market) and ticks each surviving update once.
pub async fn run_quote_consumer<E>(
    engine: Arc<TradingEngine<E>>,
    mut quotes: mpsc::Receiver<QuoteUpdate>,
) where
    E: ExchangeAdapter + Send + 'static,
{
    let mut coalescer = QuoteCoalescer::new();

    while let Some(update) = quotes.recv().await {
        coalescer.offer(update);
        while let Ok(update) = quotes.try_recv() {
            coalescer.offer(update);
        }

        for update in coalescer.drain() {
            let now_ms = chrono::Utc::now().timestamp_millis();
            let ticker = update.quote.ticker.clone();
            let report = engine.tick(update.quote, update.book, now_ms);
            for error in &report.errors {
                warn!(%ticker, "tick error: {error}");
            }
        }
    }

    info!("quote stream closed; consumer exiting");
}

/// Log every engine event. Returns the logging task's handle; it ends
/// when the engine (the sender) is dropped.
pub fn spawn_event_logger(events: broadcast::Receiver<EngineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = BroadcastStream::new(events);
        while let Some(item) = stream.next().await {
            match item {
                Ok(EngineEvent::Order(event)) => {
                    info!(order_id = %event.order_id, kind = %event.kind, "order event");
                }
                Ok(EngineEvent::KillSwitch(event)) => {
                    info!(
                        level = %event.switch.level,
                        reason = %event.switch.reason,
                        active = event.switch.active,
                        "kill-switch event"
                    );
                }
                Ok(EngineEvent::PnlBreach(directive)) => {
                    warn!("P&L breach: {}", directive.description);
                }
                Ok(EngineEvent::Reconcile {
                    detected,
                    corrected,
                }) => {
                    if detected > 0 {
                        warn!(detected, corrected, "reconcile drift");
                    }
                }
                Err(lagged) => warn!("event logger lagged: {lagged}"),
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use odk_exchange_paper::PaperExchange;
    use odk_schemas::MarketQuote;
    use odk_store::MemoryStore;
    use odk_strategy::StrategyRegistry;

    use crate::engine::EngineConfig;

    fn update(ticker: &str) -> QuoteUpdate {
        QuoteUpdate {
            quote: MarketQuote {
                ticker: ticker.to_string(),
                yes_bid: 50,
                yes_ask: 52,
                no_bid: 48,
                no_ask: 50,
                last_price: 51,
                volume_24h: 0,
                open_interest: 0,
                category: "test".to_string(),
                expiration_utc: Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap(),
            },
            book: None,
        }
    }

    #[tokio::test]
    async fn consumer_exits_when_the_stream_closes() {
        let engine = Arc::new(TradingEngine::new(
            EngineConfig::default(),
            StrategyRegistry::new(),
            PaperExchange::new(),
            Box::new(MemoryStore::new()),
        ));

        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(run_quote_consumer(Arc::clone(&engine), rx));

        // A burst for one market coalesces; the consumer must survive it.
        for _ in 0..5 {
            tx.send(update("A")).await.unwrap();
        }
        tx.send(update("B")).await.unwrap();
        drop(tx);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn event_logger_ends_with_its_sender() {
        let engine = TradingEngine::new(
            EngineConfig::default(),
            StrategyRegistry::new(),
            PaperExchange::new(),
            Box::new(MemoryStore::new()),
        );

        let handle = spawn_event_logger(engine.subscribe());
        engine.emergency_stop("ops", 1_000);
        drop(engine);

        handle.await.unwrap();
    }
}
