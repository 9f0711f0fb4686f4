//! Assemble a [`TradingEngine`] from the layered configuration.
//!
//! Recognized top-level sections: `risk`, `strategy_runtime`, `pnl`,
//! `kill_switch`, `engine`, `markets`, `strategies`. Every section is
//! optional; omissions fall back to the crate defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use odk_config::LoadedConfig;
use odk_exchange_paper::PaperExchange;
use odk_runtime::{EngineConfig, TradingEngine};
use odk_schemas::MarketConfig;
use odk_store::MemoryStore;
use odk_strategy::{strategies::MeanReversionStrategy, StrategyConfig, StrategyRegistry};

/// `engine` section: process-level knobs with no subsystem home.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub account_id: Option<String>,
    pub default_order_contracts: Option<i64>,
}

/// One entry of the `strategies` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyActivation {
    #[serde(rename = "type")]
    pub strategy_type: String,
    #[serde(default)]
    pub overrides: Value,
}

/// Translate the untyped layered config into the engine's typed config.
pub fn engine_config(loaded: &LoadedConfig, trading_date: String) -> Result<EngineConfig> {
    let section: EngineSection = loaded.section("engine")?;
    let mut config = EngineConfig {
        risk: loaded.section("risk")?,
        strategy_runtime: loaded.section("strategy_runtime")?,
        pnl_limits: loaded.section("pnl")?,
        kill_switch_thresholds: loaded.section("kill_switch")?,
        account_id: section.account_id,
        trading_date,
        ..EngineConfig::default()
    };
    if let Some(contracts) = section.default_order_contracts {
        config.default_order_contracts = contracts;
    }
    Ok(config)
}

/// The registry of built-in strategy types.
pub fn builtin_registry() -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();
    registry
        .register("mean_reversion", StrategyConfig::default(), || {
            Box::new(MeanReversionStrategy::new())
        })
        .expect("builtin registration cannot collide");
    registry
}

/// Build the engine on the paper exchange and the in-memory store, then
/// install markets and activate configured strategies.
pub fn build_engine(
    loaded: &LoadedConfig,
    trading_date: String,
) -> Result<TradingEngine<PaperExchange>> {
    let config = engine_config(loaded, trading_date)?;

    let engine = TradingEngine::new(
        config,
        builtin_registry(),
        PaperExchange::new(),
        Box::new(MemoryStore::new()),
    );

    let markets: Vec<MarketConfig> = loaded.section("markets")?;
    for market in markets {
        engine.upsert_market(market);
    }

    let activations: Vec<StrategyActivation> = loaded.section("strategies")?;
    for activation in activations {
        engine
            .activate_strategy(&activation.strategy_type, &activation.overrides)
            .with_context(|| format!("activate strategy '{}'", activation.strategy_type))?;
    }

    Ok(engine)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_boots_with_defaults() {
        let loaded = odk_config::from_value(json!({})).unwrap();
        let config = engine_config(&loaded, "2026-08-01".to_string()).unwrap();
        assert_eq!(config.risk.max_spread, 10);
        assert_eq!(config.strategy_runtime.signal_expiry_ms, 60_000);
        assert!(config.account_id.is_none());

        assert!(build_engine(&loaded, "2026-08-01".to_string()).is_ok());
    }

    #[test]
    fn sections_override_defaults() {
        let loaded = odk_config::from_value(json!({
            "risk": { "max_spread": 6 },
            "strategy_runtime": { "max_active_strategies": 3 },
            "pnl": { "max_daily_loss": 100_00 },
            "engine": { "account_id": "acct-1", "default_order_contracts": 25 },
        }))
        .unwrap();

        let config = engine_config(&loaded, "2026-08-01".to_string()).unwrap();
        assert_eq!(config.risk.max_spread, 6);
        // Untouched risk fields keep their defaults.
        assert_eq!(config.risk.min_price, 5);
        assert_eq!(config.strategy_runtime.max_active_strategies, 3);
        assert_eq!(config.pnl_limits.max_daily_loss, 100_00);
        assert_eq!(config.account_id.as_deref(), Some("acct-1"));
        assert_eq!(config.default_order_contracts, 25);
    }

    #[test]
    fn configured_strategies_are_activated_at_boot() {
        let loaded = odk_config::from_value(json!({
            "strategies": [
                { "type": "mean_reversion", "overrides": { "min_edge": 5 } }
            ],
        }))
        .unwrap();

        let engine = build_engine(&loaded, "2026-08-01".to_string()).unwrap();
        assert!(engine.strategy_snapshot("mean_reversion-1").is_some());
    }

    #[test]
    fn unknown_strategy_type_fails_boot() {
        let loaded = odk_config::from_value(json!({
            "strategies": [ { "type": "ghost" } ],
        }))
        .unwrap();

        let err = build_engine(&loaded, "2026-08-01".to_string()).unwrap_err();
        assert!(err.to_string().contains("activate strategy 'ghost'"));
    }
}
