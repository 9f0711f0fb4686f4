use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

use odk_execution::{
    ExchangeAdapter, ExchangeError, OrderError, OrderEvent, OrderMachine, OrderParams,
    OrderState, PlaceOutcome, ReconcileReport,
};
use odk_killswitch::{
    KillSwitchEngine, KillSwitchEvent, KillSwitchLevel, Thresholds, TriggerReason, TriggerRequest,
};
use odk_pnl::{BreachDirective, DailyPnlSnapshot, DailyPnlTracker, PnlLimits, PnlOutcome, PnlUpdate};
use odk_portfolio::{Position, PositionBook};
use odk_risk::{OrderCheckRequest, RiskConfig, RiskDeps, RiskPipeline};
use odk_schemas::{
    MarketConfig, MarketQuote, OrderAction, OrderBookSnapshot, OrderType, Side, StrategyEvent,
    StrategyEventKind,
};
use odk_store::{collections, DocumentStore, DocumentStoreExt, StoreError};
use odk_strategy::{
    OrderSubmitter, RuntimeConfig, Signal, SignalKind, StrategyRegistry, StrategyRuntime,
    StrategyRuntimeError, TickContext,
};
use serde_json::Value;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Config / events / reports
// ---------------------------------------------------------------------------

/// Everything the engine needs at construction, assembled by the daemon
/// from the layered config.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub risk: RiskConfig,
    pub strategy_runtime: RuntimeConfig,
    pub pnl_limits: PnlLimits,
    /// Global auto-trigger thresholds installed at boot.
    pub kill_switch_thresholds: Thresholds,
    pub account_id: Option<String>,
    /// Trading date of the initial P&L window, `YYYY-MM-DD`.
    pub trading_date: String,
    /// Contracts per auto-executed order, before cap clamping.
    pub default_order_contracts: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk: RiskConfig::default(),
            strategy_runtime: RuntimeConfig::default(),
            pnl_limits: PnlLimits::default(),
            kill_switch_thresholds: Thresholds::default(),
            account_id: None,
            trading_date: "1970-01-01".to_string(),
            default_order_contracts: 10,
        }
    }
}

/// Fan-out events published on the engine's broadcast channel.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Order(OrderEvent),
    KillSwitch(KillSwitchEvent),
    PnlBreach(BreachDirective),
    Reconcile { detected: usize, corrected: usize },
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub signals: usize,
    pub approved: usize,
    pub executed: usize,
    pub errors: Vec<String>,
}

/// Summary of one maintenance sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceReport {
    pub switches_reset: usize,
    pub orders_expired: usize,
    pub signals_expired: usize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned lock means a panicked tick; the state itself is still
    // consistent (core crates validate before mutating), so recover.
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// TradingEngine
// ---------------------------------------------------------------------------

/// Owns every subsystem and drives the per-tick pipeline.
///
/// Lock order, always: kill-switch → positions → P&L → orders →
/// exchange → strategies.
pub struct TradingEngine<E: ExchangeAdapter + Send> {
    risk: RiskPipeline,
    kill_switch: Mutex<KillSwitchEngine>,
    positions: Mutex<PositionBook>,
    pnl: Mutex<DailyPnlTracker>,
    orders: Mutex<OrderMachine>,
    exchange: Mutex<E>,
    strategies: Mutex<StrategyRuntime>,
    store: Mutex<Box<dyn DocumentStore>>,
    events: broadcast::Sender<EngineEvent>,
    account_id: Option<String>,
    default_order_contracts: i64,
}

impl<E: ExchangeAdapter + Send> std::fmt::Debug for TradingEngine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingEngine").finish_non_exhaustive()
    }
}

impl<E: ExchangeAdapter + Send> TradingEngine<E> {
    pub fn new(
        config: EngineConfig,
        registry: StrategyRegistry,
        exchange: E,
        store: Box<dyn DocumentStore>,
    ) -> Self {
        let mut kill_switch = KillSwitchEngine::new();
        kill_switch.set_thresholds(
            KillSwitchLevel::Global,
            None,
            config.kill_switch_thresholds.clone(),
        );

        let (events, _) = broadcast::channel(1024);

        Self {
            risk: RiskPipeline::new(config.risk),
            kill_switch: Mutex::new(kill_switch),
            positions: Mutex::new(PositionBook::new()),
            pnl: Mutex::new(DailyPnlTracker::new(config.trading_date, config.pnl_limits)),
            orders: Mutex::new(OrderMachine::new()),
            exchange: Mutex::new(exchange),
            strategies: Mutex::new(StrategyRuntime::new(registry, config.strategy_runtime)),
            store: Mutex::new(store),
            events,
            account_id: config.account_id,
            default_order_contracts: config.default_order_contracts.max(1),
        }
    }

    /// Subscribe to the engine's event fan-out.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn upsert_market(&self, config: MarketConfig) {
        lock(&self.positions).upsert_market(config);
    }

    pub fn activate_strategy(
        &self,
        strategy_type: &str,
        overrides: &Value,
    ) -> Result<String, StrategyRuntimeError> {
        lock(&self.strategies).activate(strategy_type, overrides)
    }

    pub fn deactivate_strategy(&self, id: &str) -> Result<(), StrategyRuntimeError> {
        lock(&self.strategies).deactivate(id)
    }

    pub fn emergency_stop(&self, by: &str, now_ms: i64) {
        let event = lock(&self.kill_switch).emergency_stop(by, now_ms);
        self.publish_kill_switch(event, now_ms);
    }

    /// Operator-placed order, bypassing strategy signals but not risk:
    /// callers are expected to have run the pipeline out of band.
    pub fn place_order(
        &self,
        params: OrderParams,
        client_token: &str,
        now_ms: i64,
    ) -> Result<PlaceOutcome, OrderError> {
        let mut orders = lock(&self.orders);
        let mut exchange = lock(&self.exchange);
        let outcome = orders.place(&mut *exchange, params, client_token, now_ms)?;
        for event in &outcome.events {
            let _ = self.events.send(EngineEvent::Order(event.clone()));
        }
        Ok(outcome)
    }

    /// Test/diagnostic access to the exchange adapter.
    pub fn with_exchange<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut lock(&self.exchange))
    }

    pub fn position(&self, market_id: &str, side: Side) -> Option<Position> {
        lock(&self.positions).position(market_id, side).cloned()
    }

    pub fn pnl_snapshot(&self) -> DailyPnlSnapshot {
        lock(&self.pnl).snapshot()
    }

    pub fn order_state(&self, order_id: &str) -> Option<OrderState> {
        lock(&self.orders).order(order_id).map(|o| o.state)
    }

    pub fn kill_switch_active(&self, now_ms: i64) -> bool {
        !lock(&self.kill_switch).active_switches(now_ms).is_empty()
    }

    pub fn strategy_snapshot(&self, id: &str) -> Option<odk_strategy::StrategySnapshot> {
        lock(&self.strategies).snapshot(id)
    }

    // -----------------------------------------------------------------------
    // Tick pipeline
    // -----------------------------------------------------------------------

    /// Run one full tick for one market.
    pub fn tick(
        &self,
        quote: MarketQuote,
        book: Option<OrderBookSnapshot>,
        now_ms: i64,
    ) -> TickReport {
        let mut report = TickReport::default();

        if let Err(e) = quote.validate() {
            warn!(ticker = %quote.ticker, "dropping invalid quote: {e}");
            report.errors.push(e.to_string());
            return report;
        }

        let mut kill_switch = lock(&self.kill_switch);
        let mut positions = lock(&self.positions);
        let mut pnl = lock(&self.pnl);
        let mut orders = lock(&self.orders);
        let mut exchange = lock(&self.exchange);
        let mut strategies = lock(&self.strategies);

        // Mark open rows at their exit value and refresh the day's
        // unrealized P&L.
        positions.mark_to_market(&quote.ticker, Side::Yes, quote.yes_bid);
        positions.mark_to_market(&quote.ticker, Side::No, quote.no_bid);
        let unrealized: i64 = positions.all_positions().map(|p| p.unrealized_pnl).sum();
        let outcome = pnl.record(PnlUpdate::MarkToMarket { unrealized });
        Self::apply_pnl_outcome(
            &self.events,
            outcome,
            &mut kill_switch,
            &mut strategies,
            now_ms,
        );

        strategies.deliver_event(
            None,
            &StrategyEvent::new(StrategyEventKind::MarketUpdate, now_ms)
                .with_market(quote.ticker.clone()),
        );

        let ctx = TickContext {
            quote: quote.clone(),
            book: book.clone(),
            now_ms,
        };
        let run = strategies.run_strategies(&ctx);
        report.signals = run.signal_ids.len();
        report.errors.extend(run.errors);

        let mut submitter = PipelineSubmitter {
            risk: &self.risk,
            kill_switch: &*kill_switch,
            positions: &*positions,
            pnl: &*pnl,
            orders: &mut *orders,
            exchange: &mut *exchange,
            quote: &quote,
            book: book.as_ref(),
            account_id: self.account_id.as_deref(),
            default_contracts: self.default_order_contracts,
            now_ms,
            order_events: Vec::new(),
        };

        for signal_id in &run.signal_ids {
            let eval = strategies.process_signal(
                signal_id,
                Some(&*kill_switch),
                Some(&mut submitter),
                now_ms,
            );
            if eval.approved {
                report.approved += 1;
            }
            if let Some(execution) = &eval.execution {
                if execution.executed {
                    report.executed += 1;
                } else if let Some(error) = &execution.error {
                    report.errors.push(format!("{signal_id}: {error}"));
                }
            }
        }

        let order_events = submitter.order_events;
        for event in order_events {
            let _ = self.events.send(EngineEvent::Order(event));
        }

        debug!(
            ticker = %quote.ticker,
            signals = report.signals,
            executed = report.executed,
            "tick complete"
        );
        report
    }

    // -----------------------------------------------------------------------
    // Exchange fill ingestion
    // -----------------------------------------------------------------------

    /// Apply one fill from the exchange's event stream: order machine,
    /// position book, P&L, and strategy notification, in that order.
    pub fn on_exchange_fill(
        &self,
        exchange_id: &str,
        qty: i64,
        price: i64,
        fees: i64,
        exchange_fill_id: &str,
        now_ms: i64,
    ) -> Result<(), OrderError> {
        let mut kill_switch = lock(&self.kill_switch);
        let mut positions = lock(&self.positions);
        let mut pnl = lock(&self.pnl);
        let mut orders = lock(&self.orders);
        let mut strategies = lock(&self.strategies);

        let order = orders
            .order_by_exchange_id(exchange_id)
            .cloned()
            .ok_or_else(|| OrderError::UnknownOrder {
                id: exchange_id.to_string(),
            })?;

        let outcome = orders.apply_fill(&order.id, qty, price, exchange_fill_id, now_ms)?;
        if outcome.duplicate {
            return Ok(());
        }
        if let Some(event) = outcome.event.clone() {
            let _ = self.events.send(EngineEvent::Order(event));
        }

        match order.action {
            OrderAction::Buy => {
                if let Err(e) = positions.apply_fill(&order.market_id, order.side, qty, price) {
                    warn!(order_id = %order.id, "position fill failed: {e}");
                }
            }
            OrderAction::Sell => match positions.reduce(&order.market_id, order.side, qty, price)
            {
                Ok(realized) => {
                    let close = pnl.record(PnlUpdate::PositionClose { realized });
                    Self::apply_pnl_outcome(
                        &self.events,
                        close,
                        &mut kill_switch,
                        &mut strategies,
                        now_ms,
                    );
                    strategies.deliver_event(
                        None,
                        &StrategyEvent::new(StrategyEventKind::PositionClosed, now_ms)
                            .with_market(order.market_id.clone())
                            .with_payload(serde_json::json!({ "realized": realized })),
                    );
                }
                Err(e) => warn!(order_id = %order.id, "position reduce failed: {e}"),
            },
        }

        let fill_outcome = pnl.record(PnlUpdate::Fill { fees });
        Self::apply_pnl_outcome(
            &self.events,
            fill_outcome,
            &mut kill_switch,
            &mut strategies,
            now_ms,
        );

        strategies.deliver_event(
            None,
            &StrategyEvent::new(StrategyEventKind::OrderFilled, now_ms)
                .with_market(order.market_id.clone())
                .with_order(order.id.clone())
                .with_payload(serde_json::json!({ "qty": qty, "price": price })),
        );

        Ok(())
    }

    /// Throw the GLOBAL switch when a P&L breach directive arrives, and
    /// notify strategies.
    fn apply_pnl_outcome(
        events: &broadcast::Sender<EngineEvent>,
        outcome: PnlOutcome,
        kill_switch: &mut KillSwitchEngine,
        strategies: &mut StrategyRuntime,
        now_ms: i64,
    ) {
        let Some(directive) = outcome.directive else {
            return;
        };

        info!("daily P&L breach: {}", directive.description);
        let _ = events.send(EngineEvent::PnlBreach(directive.clone()));

        let event = kill_switch.trigger(
            TriggerRequest::global(TriggerReason::LossLimit, "daily-pnl")
                .with_description(directive.description.clone()),
            now_ms,
        );
        let _ = events.send(EngineEvent::KillSwitch(event.clone()));

        strategies.deliver_event(
            None,
            &StrategyEvent::new(StrategyEventKind::KillSwitchTriggered, now_ms)
                .with_payload(serde_json::json!({ "reason": event.switch.reason.to_string() })),
        );
    }

    fn publish_kill_switch(&self, event: KillSwitchEvent, now_ms: i64) {
        let _ = self.events.send(EngineEvent::KillSwitch(event.clone()));
        lock(&self.strategies).deliver_event(
            None,
            &StrategyEvent::new(StrategyEventKind::KillSwitchTriggered, now_ms)
                .with_payload(serde_json::json!({ "reason": event.switch.reason.to_string() })),
        );
    }

    // -----------------------------------------------------------------------
    // Sweeps
    // -----------------------------------------------------------------------

    /// Pull the exchange's order snapshot and correct local drift.
    pub fn reconcile_sweep(&self, now_ms: i64) -> Result<ReconcileReport, ExchangeError> {
        let mut orders = lock(&self.orders);
        let exchange = lock(&self.exchange);

        let snapshot = exchange.orders_snapshot()?;
        let report = orders.reconcile(&snapshot, now_ms);

        if report.detected > 0 {
            warn!(
                detected = report.detected,
                corrected = report.corrected,
                "reconciliation drift"
            );
        }
        for event in &report.events {
            let _ = self.events.send(EngineEvent::Order(event.clone()));
        }
        let _ = self.events.send(EngineEvent::Reconcile {
            detected: report.detected,
            corrected: report.corrected,
        });
        Ok(report)
    }

    /// Expiry sweeps plus a store checkpoint.
    pub fn maintain(&self, now_ms: i64) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        {
            let mut kill_switch = lock(&self.kill_switch);
            let events = kill_switch.sweep_expired(now_ms);
            report.switches_reset = events.len();
            for event in events {
                let _ = self.events.send(EngineEvent::KillSwitch(event));
            }
        }
        {
            let mut orders = lock(&self.orders);
            let events = orders.expire_due(now_ms);
            report.orders_expired = events.len();
            for event in events {
                let _ = self.events.send(EngineEvent::Order(event));
            }
        }
        report.signals_expired = lock(&self.strategies).expire_pending(now_ms);

        if let Err(e) = self.checkpoint() {
            warn!("checkpoint failed: {e}");
        }
        report
    }

    /// Persist orders and kill-switches into the document store.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        let orders = lock(&self.orders);
        let kill_switch = lock(&self.kill_switch);
        let mut store = lock(&self.store);

        for order in orders.all_orders() {
            store.put_typed(collections::ORDERS, &order.id, order)?;
            store.put_typed(
                collections::ORDERS_BY_TOKEN,
                &order.client_token,
                &order.id,
            )?;
        }
        for switch in kill_switch.all_switches() {
            let key = format!(
                "{}/{}",
                switch.level,
                switch.target_id.as_deref().unwrap_or("*")
            );
            store.put_typed(collections::KILL_SWITCHES, &key, switch)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Signal → order bridge
// ---------------------------------------------------------------------------

/// Implements the strategy runtime's submitter seam on top of the risk
/// pipeline and the order machine. Borrows the tick's lock guards.
struct PipelineSubmitter<'a> {
    risk: &'a RiskPipeline,
    kill_switch: &'a KillSwitchEngine,
    positions: &'a PositionBook,
    pnl: &'a DailyPnlTracker,
    orders: &'a mut OrderMachine,
    exchange: &'a mut dyn ExchangeAdapter,
    quote: &'a MarketQuote,
    book: Option<&'a OrderBookSnapshot>,
    account_id: Option<&'a str>,
    default_contracts: i64,
    now_ms: i64,
    order_events: Vec<OrderEvent>,
}

impl PipelineSubmitter<'_> {
    fn action_for(kind: SignalKind) -> OrderAction {
        match kind {
            SignalKind::Entry | SignalKind::ScaleIn | SignalKind::Hedge => OrderAction::Buy,
            SignalKind::Exit | SignalKind::ScaleOut => OrderAction::Sell,
        }
    }
}

impl OrderSubmitter for PipelineSubmitter<'_> {
    fn submit_signal(&mut self, signal: &Signal) -> Result<String, String> {
        let action = Self::action_for(signal.kind);
        let limit_price = signal.current_price.clamp(1, 99);

        // Size to the tighter of the configured default and what the
        // position caps still admit.
        let cap = self
            .positions
            .max_order_size(&signal.market_id, signal.side, limit_price);
        let contracts = self.default_contracts.min(cap);
        if contracts < 1 {
            return Err("position caps admit no further size".to_string());
        }

        let request = OrderCheckRequest {
            market_id: signal.market_id.clone(),
            strategy_id: Some(signal.strategy_id.clone()),
            account_id: self.account_id.map(str::to_string),
            action,
            side: signal.side,
            order_type: OrderType::Limit,
            contracts,
            limit_price: Some(limit_price),
        };

        let deps = RiskDeps {
            kill_switch: Some(self.kill_switch),
            positions: Some(self.positions),
            pnl: Some(self.pnl),
        };
        let assessment = self
            .risk
            .evaluate(&request, self.quote, self.book, &deps, self.now_ms);
        if !assessment.approved {
            return Err(assessment
                .blocking_reason
                .unwrap_or_else(|| "risk pipeline blocked the order".to_string()));
        }

        let params = OrderParams {
            market_id: signal.market_id.clone(),
            action,
            side: signal.side,
            order_type: OrderType::Limit,
            contracts,
            limit_price: Some(limit_price),
            expires_at_ms: None,
        };
        let token = format!("sig:{}", signal.id);

        let outcome = self
            .orders
            .place(self.exchange, params, &token, self.now_ms)
            .map_err(|e| e.to_string())?;
        self.order_events.extend(outcome.events.iter().cloned());

        if let Some(e) = outcome.submit_error {
            return Err(format!("submit failed, order parked pending: {e}"));
        }
        if outcome.order.state == OrderState::Rejected {
            return Err(format!(
                "exchange rejected order: {}",
                outcome.order.reject_reason.as_deref().unwrap_or("unknown")
            ));
        }

        Ok(outcome.order.id)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
