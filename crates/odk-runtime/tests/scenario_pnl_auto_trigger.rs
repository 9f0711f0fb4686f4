//! Scenario: Daily P&L auto-trigger.
//!
//! # Invariant under test
//!
//! With a $500 daily loss limit, a realized loss of $400 puts the day at
//! 0.8 utilization (warning, still safe); a further $150 loss pushes it
//! to 1.1, and the engine throws a GLOBAL kill-switch with reason
//! LOSS_LIMIT. From then on, strategy signals are rejected.

use odk_exchange_paper::PaperExchange;
use odk_execution::OrderParams;
use odk_killswitch::{KillSwitchLevel, TriggerReason};
use odk_pnl::PnlLimits;
use odk_runtime::{EngineConfig, EngineEvent, TradingEngine};
use odk_schemas::{OrderAction, Side};
use odk_store::MemoryStore;
use odk_strategy::StrategyRegistry;

fn engine() -> TradingEngine<PaperExchange> {
    TradingEngine::new(
        EngineConfig {
            pnl_limits: PnlLimits {
                max_daily_loss: 500_00,
                max_drawdown_pct: 0.20,
            },
            trading_date: "2026-08-01".to_string(),
            ..EngineConfig::default()
        },
        StrategyRegistry::new(),
        PaperExchange::new(),
        Box::new(MemoryStore::new()),
    )
}

/// Place a limit order, fill it completely on the paper exchange, and
/// feed the fill back through the engine.
fn trade(
    engine: &TradingEngine<PaperExchange>,
    token: &str,
    action: OrderAction,
    qty: i64,
    price: i64,
    now_ms: i64,
) {
    let params = OrderParams::limit("FED-25DEC", action, Side::Yes, qty, price);
    let outcome = engine.place_order(params, token, now_ms).unwrap();
    assert!(!outcome.idempotent);

    let exchange_id = outcome.order.exchange_id.clone().unwrap();
    let fill = engine
        .with_exchange(|px| px.apply_fill(&exchange_id, qty, price, now_ms))
        .unwrap();
    engine
        .on_exchange_fill(&exchange_id, qty, price, 0, &fill.exchange_fill_id, now_ms)
        .unwrap();
}

#[test]
fn loss_sequence_trips_the_global_switch_at_1_1_utilization() {
    let engine = engine();
    let mut events = engine.subscribe();

    // Build a position: 1000 @ 50¢ ($500 cost basis).
    trade(&engine, "T1", OrderAction::Buy, 1_000, 50, 1_000);

    // Close it at 10¢: realized -$400 → utilization 0.8. Warning only.
    trade(&engine, "T2", OrderAction::Sell, 1_000, 10, 2_000);

    let pnl = engine.pnl_snapshot();
    assert_eq!(pnl.realized, -400_00);
    assert!(!engine.kill_switch_active(2_500));

    // Another -$150: utilization 1.1 → GLOBAL LOSS_LIMIT switch.
    trade(&engine, "T3", OrderAction::Buy, 500, 40, 3_000);
    trade(&engine, "T4", OrderAction::Sell, 500, 10, 4_000);

    assert_eq!(engine.pnl_snapshot().realized, -550_00);
    assert!(engine.kill_switch_active(4_500));

    // The breach and the switch both went out on the event bus.
    let mut saw_breach = false;
    let mut saw_switch = false;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::PnlBreach(directive) => {
                assert!((directive.daily_loss_util - 1.1).abs() < 1e-9);
                saw_breach = true;
            }
            EngineEvent::KillSwitch(event) => {
                assert_eq!(event.switch.level, KillSwitchLevel::Global);
                assert_eq!(event.switch.reason, TriggerReason::LossLimit);
                assert!(event.switch.active);
                saw_switch = true;
            }
            EngineEvent::Order(_) | EngineEvent::Reconcile { .. } => {}
        }
    }
    assert!(saw_breach, "P&L breach directive must be published");
    assert!(saw_switch, "GLOBAL kill-switch event must be published");
}

#[test]
fn warning_level_loss_does_not_trigger() {
    let engine = engine();

    trade(&engine, "T1", OrderAction::Buy, 1_000, 50, 1_000);
    trade(&engine, "T2", OrderAction::Sell, 1_000, 10, 2_000);

    // 0.8 utilization: warned, but trading continues.
    assert!(!engine.kill_switch_active(3_000));
    let pnl = engine.pnl_snapshot();
    assert_eq!(pnl.net, -400_00);
    assert_eq!(pnl.loss_count, 1);
}
