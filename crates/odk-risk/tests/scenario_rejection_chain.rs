//! Scenario: Pipeline rejection chain.
//!
//! # Invariant under test
//!
//! With quote yesBid=40 / yesAsk=60 (spread 20c against a 10c limit), a
//! BUY YES 50 @ 55 request fails the spread check. The blocking reason
//! cites the spread, yet every later check still runs and the assessment
//! enumerates all nine outcomes.

use chrono::{TimeZone, Utc};
use odk_killswitch::KillSwitchEngine;
use odk_risk::{OrderCheckRequest, RiskConfig, RiskDeps, RiskPipeline};
use odk_schemas::{MarketQuote, OrderAction, Side};

fn wide_quote() -> MarketQuote {
    MarketQuote {
        ticker: "M".to_string(),
        yes_bid: 40,
        yes_ask: 60,
        no_bid: 40,
        no_ask: 60,
        last_price: 55,
        volume_24h: 20_000,
        open_interest: 8_000,
        category: "politics".to_string(),
        expiration_utc: Utc.with_ymd_and_hms(2026, 11, 3, 0, 0, 0).unwrap(),
    }
}

#[test]
fn spread_failure_blocks_but_every_check_still_runs() {
    let pipeline = RiskPipeline::new(RiskConfig {
        max_spread: 10,
        ..RiskConfig::default()
    });

    // Kill-switch service wired but inactive.
    let ks = KillSwitchEngine::new();
    let deps = RiskDeps {
        kill_switch: Some(&ks),
        ..Default::default()
    };

    let req = OrderCheckRequest::limit("M", OrderAction::Buy, Side::Yes, 50, 55);
    let assessment = pipeline.evaluate(&req, &wide_quote(), None, &deps, 1_000);

    assert!(!assessment.approved);
    assert!(
        assessment
            .blocking_reason
            .as_deref()
            .unwrap()
            .contains("spread"),
        "blocking reason must cite the spread: {:?}",
        assessment.blocking_reason
    );

    // The full picture: all nine checks reported, in pipeline order.
    let names: Vec<&str> = assessment.checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "kill_switch",
            "spread",
            "price_bounds",
            "order_size",
            "liquidity",
            "slippage",
            "position_caps",
            "daily_pnl",
            "crossing_tolerance",
        ]
    );

    // Kill switch passed (inactive); spread is the only failure here —
    // the later checks were still evaluated on their own merits.
    assert!(assessment.check("kill_switch").unwrap().passed);
    assert!(!assessment.check("spread").unwrap().passed);
    assert!(assessment.check("order_size").unwrap().passed);
    assert!(assessment.check("crossing_tolerance").unwrap().passed);

    // Slippage estimate still computed for the caller: spread/2.
    assert_eq!(assessment.estimated_slippage, 10.0);
}
