use odk_killswitch::{EvalContext, KillSwitchEngine};
use odk_pnl::DailyPnlTracker;
use odk_portfolio::PositionBook;
use odk_schemas::{clamp_i128, mul_qty_price, MarketQuote, OrderBookSnapshot, OrderType};

use crate::bookwalk::walk_book;
use crate::types::{CheckOutcome, OrderCheckRequest, RiskAssessment, RiskConfig, Severity};

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Collaborator services consulted by the pipeline, injected per call.
/// An absent collaborator skips its check (unless the config requires it).
#[derive(Default)]
pub struct RiskDeps<'a> {
    pub kill_switch: Option<&'a KillSwitchEngine>,
    pub positions: Option<&'a PositionBook>,
    pub pnl: Option<&'a DailyPnlTracker>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Applies the ordered check sequence to one candidate order.
pub struct RiskPipeline {
    config: RiskConfig,
}

impl RiskPipeline {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Run every check, in order, against the candidate order.
    ///
    /// The first failure becomes `blocking_reason`; later checks still run
    /// so the assessment enumerates the full picture.
    pub fn evaluate(
        &self,
        req: &OrderCheckRequest,
        quote: &MarketQuote,
        book: Option<&OrderBookSnapshot>,
        deps: &RiskDeps<'_>,
        now_ms: i64,
    ) -> RiskAssessment {
        let cfg = &self.config;
        let mut checks: Vec<CheckOutcome> = Vec::with_capacity(9);

        let effective_price = req
            .limit_price
            .unwrap_or_else(|| quote.touch(req.side, req.action));

        // 1. Kill switch.
        match deps.kill_switch {
            Some(engine) => {
                let ctx = EvalContext {
                    strategy_id: req.strategy_id.clone(),
                    market_id: Some(req.market_id.clone()),
                    account_id: req.account_id.clone(),
                };
                let eval = engine.evaluate(&ctx, now_ms);
                if eval.blocked {
                    let ks = eval.blocking_switch.expect("blocked implies a switch");
                    checks.push(CheckOutcome::fail(
                        "kill_switch",
                        Severity::Error,
                        format!("kill switch active: {} ({})", ks.level, ks.reason),
                    ));
                } else {
                    checks.push(CheckOutcome::pass("kill_switch", "no applicable switch"));
                }
            }
            None if cfg.require_kill_switch_check => checks.push(CheckOutcome::fail(
                "kill_switch",
                Severity::Error,
                "kill-switch service required but not configured",
            )),
            None => checks.push(CheckOutcome::pass("kill_switch", "skipped: not configured")),
        }

        // 2. Spread.
        {
            let spread = quote.spread(req.side);
            let mid = quote.mid(req.side);
            let spread_pct = if mid > 0.0 { spread as f64 / mid } else { 0.0 };

            if spread > cfg.max_spread {
                checks.push(
                    CheckOutcome::fail(
                        "spread",
                        Severity::Error,
                        format!("spread {spread}c exceeds max {}c", cfg.max_spread),
                    )
                    .with_values(spread as f64, cfg.max_spread as f64),
                );
            } else if spread_pct > cfg.max_spread_pct {
                checks.push(
                    CheckOutcome::fail(
                        "spread",
                        Severity::Error,
                        format!(
                            "spread {:.1}% of mid exceeds max {:.1}%",
                            spread_pct * 100.0,
                            cfg.max_spread_pct * 100.0
                        ),
                    )
                    .with_values(spread_pct, cfg.max_spread_pct),
                );
            } else {
                checks.push(
                    CheckOutcome::pass("spread", format!("spread {spread}c"))
                        .with_values(spread as f64, cfg.max_spread as f64),
                );
            }
        }

        // 3. Price bounds.
        {
            if effective_price < cfg.min_price || effective_price > cfg.max_price {
                checks.push(
                    CheckOutcome::fail(
                        "price_bounds",
                        Severity::Error,
                        format!(
                            "price {effective_price}c outside [{}, {}]",
                            cfg.min_price, cfg.max_price
                        ),
                    )
                    .with_values(effective_price as f64, cfg.max_price as f64),
                );
            } else {
                checks.push(
                    CheckOutcome::pass("price_bounds", format!("price {effective_price}c"))
                        .with_values(effective_price as f64, cfg.max_price as f64),
                );
            }
        }

        // 4. Order size.
        {
            let notional = clamp_i128(mul_qty_price(req.contracts, effective_price));
            if req.contracts > cfg.max_order_size {
                checks.push(
                    CheckOutcome::fail(
                        "order_size",
                        Severity::Error,
                        format!(
                            "{} contracts exceeds max order size {}",
                            req.contracts, cfg.max_order_size
                        ),
                    )
                    .with_values(req.contracts as f64, cfg.max_order_size as f64),
                );
            } else if notional > cfg.max_order_notional {
                checks.push(
                    CheckOutcome::fail(
                        "order_size",
                        Severity::Error,
                        format!(
                            "notional {notional}c exceeds max {}c",
                            cfg.max_order_notional
                        ),
                    )
                    .with_values(notional as f64, cfg.max_order_notional as f64),
                );
            } else {
                checks.push(
                    CheckOutcome::pass("order_size", format!("notional {notional}c"))
                        .with_values(notional as f64, cfg.max_order_notional as f64),
                );
            }
        }

        // 5. Liquidity (book-dependent).
        match book {
            Some(book) => {
                let top = book.depth_at_top(req.action);
                let total = book.total_depth(req.action);
                if top < cfg.min_depth_at_top {
                    checks.push(
                        CheckOutcome::fail(
                            "liquidity",
                            Severity::Error,
                            format!("top-of-book depth {top} below min {}", cfg.min_depth_at_top),
                        )
                        .with_values(top as f64, cfg.min_depth_at_top as f64),
                    );
                } else if total < cfg.min_total_depth {
                    checks.push(
                        CheckOutcome::fail(
                            "liquidity",
                            Severity::Error,
                            format!("total depth {total} below min {}", cfg.min_total_depth),
                        )
                        .with_values(total as f64, cfg.min_total_depth as f64),
                    );
                } else {
                    checks.push(
                        CheckOutcome::pass("liquidity", format!("depth top {top}, total {total}"))
                            .with_values(total as f64, cfg.min_total_depth as f64),
                    );
                }
            }
            None => {
                let mut outcome =
                    CheckOutcome::pass("liquidity", "no order book provided; depth unknown");
                outcome.severity = Severity::Warning;
                checks.push(outcome);
            }
        }

        // 6. Slippage estimate.
        let (estimated_slippage, adjusted_price) = {
            let walk = book.and_then(|b| walk_book(b.levels_for(req.action), req.contracts, req.action));

            let (slippage, adjusted) = match walk {
                Some(w) => (w.slippage, w.adjusted_price),
                None => {
                    // No book: assume half the spread.
                    let slippage = quote.spread(req.side) as f64 / 2.0;
                    let top = quote.touch(req.side, req.action) as f64;
                    let adjusted = match req.action {
                        odk_schemas::OrderAction::Buy => top + slippage,
                        odk_schemas::OrderAction::Sell => top - slippage,
                    };
                    (slippage, adjusted)
                }
            };

            let slippage_pct = if effective_price > 0 {
                slippage / effective_price as f64
            } else {
                0.0
            };

            if slippage > cfg.max_slippage {
                checks.push(
                    CheckOutcome::fail(
                        "slippage",
                        Severity::Error,
                        format!("estimated slippage {slippage:.2}c exceeds max {:.2}c", cfg.max_slippage),
                    )
                    .with_values(slippage, cfg.max_slippage),
                );
            } else if slippage_pct > cfg.max_slippage_pct {
                checks.push(
                    CheckOutcome::fail(
                        "slippage",
                        Severity::Error,
                        format!(
                            "slippage {:.1}% of price exceeds max {:.1}%",
                            slippage_pct * 100.0,
                            cfg.max_slippage_pct * 100.0
                        ),
                    )
                    .with_values(slippage_pct, cfg.max_slippage_pct),
                );
            } else {
                checks.push(
                    CheckOutcome::pass("slippage", format!("estimated slippage {slippage:.2}c"))
                        .with_values(slippage, cfg.max_slippage),
                );
            }

            (slippage, adjusted)
        };

        // 7. Position caps.
        match deps.positions {
            Some(book) => {
                let verdict =
                    book.check_caps(&req.market_id, req.side, req.contracts, effective_price);
                if verdict.blocked {
                    checks.push(CheckOutcome::fail(
                        "position_caps",
                        Severity::Error,
                        verdict.reason.unwrap_or_else(|| "hard cap breached".to_string()),
                    ));
                } else if !verdict.warnings.is_empty() {
                    // Soft breach warns but does not block.
                    let mut outcome =
                        CheckOutcome::pass("position_caps", verdict.warnings.join("; "));
                    outcome.severity = Severity::Warning;
                    checks.push(outcome);
                } else {
                    checks.push(CheckOutcome::pass("position_caps", "within caps"));
                }
            }
            None if cfg.require_position_cap_check => checks.push(CheckOutcome::fail(
                "position_caps",
                Severity::Error,
                "position book required but not configured",
            )),
            None => checks.push(CheckOutcome::pass("position_caps", "skipped: not configured")),
        }

        // 8. Daily P&L.
        match deps.pnl {
            Some(tracker) => {
                let status = tracker.status();
                if !status.is_safe {
                    checks.push(
                        CheckOutcome::fail(
                            "daily_pnl",
                            Severity::Error,
                            format!(
                                "daily P&L not safe: loss util {:.2}, drawdown util {:.2}",
                                status.daily_loss_util, status.drawdown_util
                            ),
                        )
                        .with_values(status.daily_loss_util.max(status.drawdown_util), 1.0),
                    );
                } else {
                    checks.push(
                        CheckOutcome::pass("daily_pnl", "within loss limits").with_values(
                            status.daily_loss_util.max(status.drawdown_util),
                            1.0,
                        ),
                    );
                }
            }
            None if cfg.require_pnl_check => checks.push(CheckOutcome::fail(
                "daily_pnl",
                Severity::Error,
                "P&L tracker required but not configured",
            )),
            None => checks.push(CheckOutcome::pass("daily_pnl", "skipped: not configured")),
        }

        // 9. Crossing tolerance (LIMIT only).
        match (req.order_type, req.limit_price) {
            (OrderType::Limit, Some(limit)) => {
                let mid = quote.mid(req.side);
                let cross = match req.action {
                    odk_schemas::OrderAction::Buy => limit as f64 - mid,
                    odk_schemas::OrderAction::Sell => mid - limit as f64,
                };
                if cross > cfg.max_crossing_tolerance {
                    // Warning severity, but still blocking.
                    checks.push(
                        CheckOutcome::fail(
                            "crossing_tolerance",
                            Severity::Warning,
                            format!(
                                "limit crosses mid by {cross:.1}c, tolerance {:.1}c",
                                cfg.max_crossing_tolerance
                            ),
                        )
                        .with_values(cross, cfg.max_crossing_tolerance),
                    );
                } else {
                    checks.push(
                        CheckOutcome::pass("crossing_tolerance", format!("cross {cross:.1}c"))
                            .with_values(cross, cfg.max_crossing_tolerance),
                    );
                }
            }
            _ => checks.push(CheckOutcome::pass(
                "crossing_tolerance",
                "market order: not applicable",
            )),
        }

        let blocking_reason = checks
            .iter()
            .find(|c| !c.passed)
            .map(|c| c.message.clone());

        RiskAssessment {
            approved: blocking_reason.is_none(),
            checks,
            blocking_reason,
            estimated_slippage,
            adjusted_price,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use odk_killswitch::{TriggerReason, TriggerRequest};
    use odk_pnl::{PnlLimits, PnlUpdate};
    use odk_schemas::{BookLevel, MarketConfig, OrderAction, RiskTier, Side};

    fn quote(yes_bid: i64, yes_ask: i64) -> MarketQuote {
        MarketQuote {
            ticker: "M".to_string(),
            yes_bid,
            yes_ask,
            no_bid: 100 - yes_ask,
            no_ask: 100 - yes_bid,
            last_price: yes_ask,
            volume_24h: 10_000,
            open_interest: 5_000,
            category: "economics".to_string(),
            expiration_utc: Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap(),
        }
    }

    fn buy(contracts: i64, limit: i64) -> OrderCheckRequest {
        OrderCheckRequest::limit("M", OrderAction::Buy, Side::Yes, contracts, limit)
    }

    fn pipeline() -> RiskPipeline {
        RiskPipeline::new(RiskConfig::default())
    }

    // --- happy path / skipping ---

    #[test]
    fn tight_quote_with_no_deps_approves() {
        let a = pipeline().evaluate(&buy(10, 50), &quote(49, 51), None, &RiskDeps::default(), 0);
        assert!(a.approved, "blocking: {:?}", a.blocking_reason);
        assert_eq!(a.checks.len(), 9);
        assert!(a.check("kill_switch").unwrap().message.contains("skipped"));
    }

    #[test]
    fn required_but_missing_dependency_fails() {
        let cfg = RiskConfig {
            require_kill_switch_check: true,
            ..RiskConfig::default()
        };
        let a = RiskPipeline::new(cfg).evaluate(
            &buy(10, 50),
            &quote(49, 51),
            None,
            &RiskDeps::default(),
            0,
        );
        assert!(!a.approved);
        assert!(!a.check("kill_switch").unwrap().passed);
    }

    // --- kill switch ---

    #[test]
    fn active_global_switch_blocks() {
        let mut ks = KillSwitchEngine::new();
        ks.trigger(TriggerRequest::global(TriggerReason::Manual, "ops"), 0);

        let deps = RiskDeps {
            kill_switch: Some(&ks),
            ..Default::default()
        };
        let a = pipeline().evaluate(&buy(10, 50), &quote(49, 51), None, &deps, 1_000);
        assert!(!a.approved);
        let outcome = a.check("kill_switch").unwrap();
        assert_eq!(outcome.severity, Severity::Error);
        assert!(outcome.message.contains("GLOBAL"));
        assert_eq!(a.blocking_reason.as_deref(), Some(outcome.message.as_str()));
    }

    // --- spread ---

    #[test]
    fn wide_absolute_spread_blocks() {
        let a = pipeline().evaluate(&buy(10, 50), &quote(40, 60), None, &RiskDeps::default(), 0);
        assert!(!a.approved);
        assert!(a.blocking_reason.as_deref().unwrap().contains("spread"));
        assert_eq!(a.check("spread").unwrap().value, Some(20.0));
    }

    #[test]
    fn wide_relative_spread_blocks_cheap_contracts() {
        // Spread 4c within max_spread 10, but mid is 7 → 57% of mid.
        let a = pipeline().evaluate(&buy(10, 9), &quote(5, 9), None, &RiskDeps::default(), 0);
        assert!(!a.approved);
        assert!(a.blocking_reason.as_deref().unwrap().contains("% of mid"));
    }

    // --- price bounds ---

    #[test]
    fn effective_price_outside_bounds_blocks() {
        // Limit 97 above max_price 95.
        let a = pipeline().evaluate(&buy(10, 97), &quote(95, 98), None, &RiskDeps::default(), 0);
        assert!(!a.check("price_bounds").unwrap().passed);
    }

    #[test]
    fn market_order_uses_the_touch_for_bounds() {
        // BUY at market: effective price is the ask (96 > 95).
        let req = OrderCheckRequest::market("M", OrderAction::Buy, Side::Yes, 10);
        let a = pipeline().evaluate(&req, &quote(94, 96), None, &RiskDeps::default(), 0);
        assert!(!a.check("price_bounds").unwrap().passed);
    }

    // --- order size ---

    #[test]
    fn contract_count_over_max_blocks() {
        let a = pipeline().evaluate(&buy(600, 50), &quote(49, 51), None, &RiskDeps::default(), 0);
        assert!(!a.check("order_size").unwrap().passed);
    }

    #[test]
    fn notional_over_max_blocks() {
        let cfg = RiskConfig {
            max_order_notional: 100_00,
            ..RiskConfig::default()
        };
        // 300 * 50c = 150_00c.
        let a = RiskPipeline::new(cfg).evaluate(
            &buy(300, 50),
            &quote(49, 51),
            None,
            &RiskDeps::default(),
            0,
        );
        assert!(!a.check("order_size").unwrap().passed);
    }

    // --- liquidity ---

    #[test]
    fn thin_top_of_book_blocks() {
        let book = OrderBookSnapshot::new(
            vec![BookLevel::new(49, 200)],
            vec![BookLevel::new(51, 5), BookLevel::new(52, 200)],
        );
        let a = pipeline().evaluate(&buy(10, 50), &quote(49, 51), Some(&book), &RiskDeps::default(), 0);
        assert!(!a.check("liquidity").unwrap().passed);
    }

    #[test]
    fn missing_book_warns_but_passes() {
        let a = pipeline().evaluate(&buy(10, 50), &quote(49, 51), None, &RiskDeps::default(), 0);
        let outcome = a.check("liquidity").unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.severity, Severity::Warning);
    }

    // --- slippage ---

    #[test]
    fn book_walk_slippage_feeds_the_assessment() {
        let book = OrderBookSnapshot::new(
            vec![BookLevel::new(49, 500)],
            vec![
                BookLevel::new(50, 10),
                BookLevel::new(51, 10),
                BookLevel::new(52, 10),
            ],
        );
        let cfg = RiskConfig {
            min_depth_at_top: 1,
            min_total_depth: 1,
            ..RiskConfig::default()
        };
        let a = RiskPipeline::new(cfg).evaluate(
            &buy(30, 52),
            &quote(49, 50),
            Some(&book),
            &RiskDeps::default(),
            0,
        );
        assert!(a.approved, "blocking: {:?}", a.blocking_reason);
        assert_eq!(a.estimated_slippage, 1.0);
        assert_eq!(a.adjusted_price, 51.0);
    }

    #[test]
    fn no_book_slippage_is_half_the_spread() {
        let a = pipeline().evaluate(&buy(10, 50), &quote(48, 52), None, &RiskDeps::default(), 0);
        assert_eq!(a.estimated_slippage, 2.0);
        // BUY: touch (52) + slippage.
        assert_eq!(a.adjusted_price, 54.0);
    }

    #[test]
    fn excessive_slippage_blocks() {
        let book = OrderBookSnapshot::new(
            vec![BookLevel::new(49, 500)],
            vec![BookLevel::new(50, 10), BookLevel::new(90, 500)],
        );
        let cfg = RiskConfig {
            min_depth_at_top: 1,
            min_total_depth: 1,
            max_crossing_tolerance: 100.0,
            ..RiskConfig::default()
        };
        let a = RiskPipeline::new(cfg).evaluate(
            &buy(100, 90),
            &quote(49, 50),
            Some(&book),
            &RiskDeps::default(),
            0,
        );
        assert!(!a.check("slippage").unwrap().passed);
    }

    // --- position caps ---

    #[test]
    fn hard_cap_breach_blocks_soft_warns() {
        let mut positions = PositionBook::new();
        let mut market = MarketConfig::new("M", RiskTier::Tier1);
        market.max_position_size = 100;
        market.max_notional = 1_000_000;
        positions.upsert_market(market);

        let deps = RiskDeps {
            positions: Some(&positions),
            ..Default::default()
        };

        // 120 > 100: hard breach.
        let a = pipeline().evaluate(&buy(120, 50), &quote(49, 51), None, &deps, 0);
        assert!(!a.check("position_caps").unwrap().passed);

        // 85 > 80 soft: warning, not a block.
        let a = pipeline().evaluate(&buy(85, 50), &quote(49, 51), None, &deps, 0);
        let outcome = a.check("position_caps").unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.severity, Severity::Warning);
        assert!(a.approved);
    }

    // --- daily P&L ---

    #[test]
    fn unsafe_pnl_blocks() {
        let mut pnl = DailyPnlTracker::new("2026-08-01", PnlLimits::default());
        pnl.record(PnlUpdate::PositionClose { realized: -600_00 });

        let deps = RiskDeps {
            pnl: Some(&pnl),
            ..Default::default()
        };
        let a = pipeline().evaluate(&buy(10, 50), &quote(49, 51), None, &deps, 0);
        assert!(!a.check("daily_pnl").unwrap().passed);
    }

    // --- crossing tolerance ---

    #[test]
    fn aggressive_limit_blocks_with_warning_severity() {
        // Mid 50; limit 58 crosses by 8 > tolerance 5.
        let a = pipeline().evaluate(&buy(10, 58), &quote(49, 51), None, &RiskDeps::default(), 0);
        let outcome = a.check("crossing_tolerance").unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.severity, Severity::Warning);
        // Warning severity, but still blocking.
        assert!(!a.approved);
    }

    #[test]
    fn market_orders_skip_crossing_check() {
        let req = OrderCheckRequest::market("M", OrderAction::Buy, Side::Yes, 10);
        let a = pipeline().evaluate(&req, &quote(49, 51), None, &RiskDeps::default(), 0);
        assert!(a.check("crossing_tolerance").unwrap().passed);
    }

    // --- aggregation ---

    #[test]
    fn first_failure_wins_the_blocking_reason_but_all_checks_run() {
        let mut ks = KillSwitchEngine::new();
        ks.trigger(TriggerRequest::global(TriggerReason::Manual, "ops"), 0);
        let deps = RiskDeps {
            kill_switch: Some(&ks),
            ..Default::default()
        };

        // Kill switch AND wide spread both fail; the first sets the reason.
        let a = pipeline().evaluate(&buy(10, 50), &quote(40, 60), None, &deps, 1_000);
        assert!(!a.approved);
        assert!(a.blocking_reason.as_deref().unwrap().contains("kill switch"));
        assert_eq!(a.checks.len(), 9);
        assert!(!a.check("spread").unwrap().passed);
    }
}
