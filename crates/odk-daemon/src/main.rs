//! odk-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads the
//! layered configuration, builds the engine, and wires the async
//! boundary — quote consumer, event logger, maintenance loop — until
//! ctrl-c. Engine assembly lives in `boot.rs`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use odk_daemon::boot;
use odk_runtime::{run_quote_consumer, spawn_event_logger, QuoteUpdate};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file
    // does not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config()?;
    info!(config_hash = %loaded.config_hash, "configuration loaded");

    let trading_date = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let engine = Arc::new(boot::build_engine(&loaded, trading_date).context("build engine")?);

    let event_logger = spawn_event_logger(engine.subscribe());

    // The market-data source is an external collaborator: it pushes
    // QuoteUpdates into this channel. Without one connected the daemon
    // idles, which is the correct paper-mode behavior.
    let (quote_tx, quote_rx) = mpsc::channel::<QuoteUpdate>(1024);
    let consumer = tokio::spawn(run_quote_consumer(Arc::clone(&engine), quote_rx));

    let maintenance = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let now_ms = chrono::Utc::now().timestamp_millis();
                let report = engine.maintain(now_ms);
                if report.orders_expired + report.signals_expired + report.switches_reset > 0 {
                    info!(?report, "maintenance sweep");
                }
                if let Err(e) = engine.reconcile_sweep(now_ms) {
                    tracing::warn!("reconcile sweep failed: {e}");
                }
            }
        }
    });

    info!("odk-daemon running; awaiting quote stream (ctrl-c to stop)");
    tokio::signal::ctrl_c().await.context("ctrl-c handler")?;
    info!("shutting down");

    maintenance.abort();
    drop(quote_tx);
    let _ = consumer.await;
    drop(engine);
    let _ = event_logger.await;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `ODK_CONFIG` holds a comma-separated list of YAML paths; absent, the
/// daemon boots on built-in defaults.
fn load_config() -> Result<odk_config::LoadedConfig> {
    match std::env::var("ODK_CONFIG") {
        Ok(paths) => {
            let paths: Vec<&str> = paths.split(',').map(str::trim).collect();
            odk_config::load_layered_yaml(&paths)
        }
        Err(_) => odk_config::from_value(serde_json::json!({})),
    }
}
