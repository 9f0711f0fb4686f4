use std::collections::BTreeMap;

use odk_schemas::KillSwitchEventKind;

use crate::types::{
    EvalContext, Evaluation, HealthMetrics, KillSwitch, KillSwitchEvent, KillSwitchLevel,
    Thresholds, TriggerReason, TriggerRequest,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillSwitchError {
    UnknownSwitch { id: String },
}

impl std::fmt::Display for KillSwitchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KillSwitchError::UnknownSwitch { id } => {
                write!(f, "no kill-switch with id '{id}'")
            }
        }
    }
}

impl std::error::Error for KillSwitchError {}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

type SwitchKey = (KillSwitchLevel, Option<String>);

/// Owns the active switch set and the per-(level, target) threshold table.
///
/// Pure guarded state: no clocks, no IO. Callers supply `now_ms` and
/// dispatch the returned events.
#[derive(Debug, Default)]
pub struct KillSwitchEngine {
    switches: BTreeMap<SwitchKey, KillSwitch>,
    thresholds: BTreeMap<SwitchKey, Thresholds>,
    next_seq: u64,
}

impl KillSwitchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint_id(&mut self) -> String {
        self.next_seq += 1;
        format!("ks-{}", self.next_seq)
    }

    /// Throw (or refresh) the switch at `(req.level, req.target_id)`.
    ///
    /// If an active switch already exists at that key it is updated in
    /// place — reason, description, trigger timestamp, and auto-reset window
    /// are refreshed and the id is preserved. This keeps the
    /// one-active-per-(level, target) invariant by construction.
    pub fn trigger(&mut self, req: TriggerRequest, now_ms: i64) -> KillSwitchEvent {
        self.trigger_kind(req, now_ms, KillSwitchEventKind::Trigger)
    }

    fn trigger_kind(
        &mut self,
        req: TriggerRequest,
        now_ms: i64,
        kind: KillSwitchEventKind,
    ) -> KillSwitchEvent {
        let key: SwitchKey = (req.level, req.target_id.clone());
        let update_in_place = matches!(self.switches.get(&key), Some(existing) if existing.active);

        let switch = if update_in_place {
            let existing = self.switches.get_mut(&key).expect("checked above");
            existing.reason = req.reason;
            existing.description = req.description;
            existing.triggered_at_ms = now_ms;
            existing.triggered_by = req.triggered_by;
            existing.auto_reset_at_ms = req.auto_reset_at_ms;
            existing.clone()
        } else {
            let id = self.mint_id();
            let created = KillSwitch {
                id,
                level: req.level,
                target_id: req.target_id,
                active: true,
                reason: req.reason,
                description: req.description,
                triggered_at_ms: now_ms,
                triggered_by: req.triggered_by,
                auto_reset_at_ms: req.auto_reset_at_ms,
                reset_at_ms: None,
                reset_by: None,
            };
            self.switches.insert(key, created.clone());
            created
        };

        KillSwitchEvent { kind, switch }
    }

    /// Convenience: throw the GLOBAL switch with reason MANUAL.
    pub fn emergency_stop(
        &mut self,
        triggered_by: impl Into<String>,
        now_ms: i64,
    ) -> KillSwitchEvent {
        self.trigger(
            TriggerRequest::global(TriggerReason::Manual, triggered_by)
                .with_description("emergency stop"),
            now_ms,
        )
    }

    /// Deactivate one switch by id, recording who and when.
    pub fn reset(
        &mut self,
        id: &str,
        reset_by: impl Into<String>,
        now_ms: i64,
    ) -> Result<KillSwitchEvent, KillSwitchError> {
        let reset_by = reset_by.into();
        let switch = self
            .switches
            .values_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| KillSwitchError::UnknownSwitch { id: id.to_string() })?;

        switch.active = false;
        switch.reset_at_ms = Some(now_ms);
        switch.reset_by = Some(reset_by);

        Ok(KillSwitchEvent {
            kind: KillSwitchEventKind::Reset,
            switch: switch.clone(),
        })
    }

    /// Deactivate every active switch at one level.
    pub fn reset_level(
        &mut self,
        level: KillSwitchLevel,
        reset_by: impl Into<String>,
        now_ms: i64,
    ) -> Vec<KillSwitchEvent> {
        let reset_by = reset_by.into();
        let mut events = Vec::new();

        for switch in self.switches.values_mut() {
            if switch.level == level && switch.active {
                switch.active = false;
                switch.reset_at_ms = Some(now_ms);
                switch.reset_by = Some(reset_by.clone());
                events.push(KillSwitchEvent {
                    kind: KillSwitchEventKind::Reset,
                    switch: switch.clone(),
                });
            }
        }

        events
    }

    /// Answer "is this context blocked?".
    ///
    /// A switch applies to the context iff its level is GLOBAL, or its
    /// target matches the context's id at that level. Among applicable
    /// switches the blocker is the one with the highest level rank; ties
    /// break by most recent `triggered_at_ms`. Switches past their
    /// auto-reset window are skipped even before cleanup.
    pub fn evaluate(&self, ctx: &EvalContext, now_ms: i64) -> Evaluation {
        let mut applicable: Vec<&KillSwitch> = self
            .switches
            .values()
            .filter(|s| s.is_effective(now_ms) && Self::applies(s, ctx))
            .collect();

        applicable.sort_by(|a, b| {
            a.level
                .rank()
                .cmp(&b.level.rank())
                .then(b.triggered_at_ms.cmp(&a.triggered_at_ms))
        });

        Evaluation {
            blocked: !applicable.is_empty(),
            blocking_switch: applicable.first().map(|s| (*s).clone()),
            active_count: applicable.len(),
        }
    }

    fn applies(switch: &KillSwitch, ctx: &EvalContext) -> bool {
        match switch.level {
            KillSwitchLevel::Global => true,
            KillSwitchLevel::Strategy => switch.target_id == ctx.strategy_id,
            KillSwitchLevel::Market => switch.target_id == ctx.market_id,
            KillSwitchLevel::Account => switch.target_id == ctx.account_id,
        }
    }

    /// Install the auto-trigger threshold set for `(level, target_id)`.
    pub fn set_thresholds(
        &mut self,
        level: KillSwitchLevel,
        target_id: Option<String>,
        thresholds: Thresholds,
    ) {
        self.thresholds.insert((level, target_id), thresholds);
    }

    /// Compare metrics against the thresholds configured at
    /// `(level, target_id)` and auto-trigger on the first breach.
    ///
    /// Breach order is fixed: daily loss, drawdown, error rate, latency.
    /// Returns `None` when no thresholds are configured or nothing breached.
    pub fn check_thresholds(
        &mut self,
        level: KillSwitchLevel,
        target_id: Option<String>,
        metrics: &HealthMetrics,
        now_ms: i64,
    ) -> Option<KillSwitchEvent> {
        let key: SwitchKey = (level, target_id.clone());
        let t = self.thresholds.get(&key)?.clone();

        let breach: Option<(TriggerReason, String)> = if matches!(
            t.max_daily_loss, Some(max) if metrics.daily_loss >= max)
        {
            Some((
                TriggerReason::LossLimit,
                format!(
                    "daily loss {}c >= limit {}c",
                    metrics.daily_loss,
                    t.max_daily_loss.unwrap_or(0)
                ),
            ))
        } else if matches!(t.max_drawdown, Some(max) if metrics.drawdown >= max) {
            Some((
                TriggerReason::LossLimit,
                format!(
                    "drawdown {:.4} >= limit {:.4}",
                    metrics.drawdown,
                    t.max_drawdown.unwrap_or(0.0)
                ),
            ))
        } else if matches!(t.max_error_rate, Some(max) if metrics.error_rate >= max) {
            Some((
                TriggerReason::ErrorRate,
                format!(
                    "error rate {:.4} >= limit {:.4}",
                    metrics.error_rate,
                    t.max_error_rate.unwrap_or(0.0)
                ),
            ))
        } else if matches!(t.max_latency_ms, Some(max) if metrics.latency_ms >= max) {
            Some((
                TriggerReason::Anomaly,
                format!(
                    "latency {}ms >= limit {}ms",
                    metrics.latency_ms,
                    t.max_latency_ms.unwrap_or(0)
                ),
            ))
        } else {
            None
        };

        let (reason, description) = breach?;

        let req = TriggerRequest {
            level,
            target_id,
            reason,
            description,
            triggered_by: "auto".to_string(),
            auto_reset_at_ms: t.auto_reset_hours.map(|h| now_ms + h * 3_600_000),
        };

        Some(self.trigger_kind(req, now_ms, KillSwitchEventKind::AutoTrigger))
    }

    /// Deactivate switches whose auto-reset window has elapsed.
    ///
    /// The evaluator already ignores them; this is the cleanup half.
    pub fn sweep_expired(&mut self, now_ms: i64) -> Vec<KillSwitchEvent> {
        let mut events = Vec::new();

        for switch in self.switches.values_mut() {
            if switch.active && switch.is_expired(now_ms) {
                switch.active = false;
                switch.reset_at_ms = Some(now_ms);
                switch.reset_by = Some("auto".to_string());
                events.push(KillSwitchEvent {
                    kind: KillSwitchEventKind::Reset,
                    switch: switch.clone(),
                });
            }
        }

        events
    }

    /// All effective switches, GLOBAL first.
    pub fn active_switches(&self, now_ms: i64) -> Vec<&KillSwitch> {
        self.switches
            .values()
            .filter(|s| s.is_effective(now_ms))
            .collect()
    }

    /// Every switch record, including reset ones (for checkpointing).
    pub fn all_switches(&self) -> Vec<&KillSwitch> {
        self.switches.values().collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn market_switch(engine: &mut KillSwitchEngine, market: &str, now_ms: i64) -> KillSwitch {
        engine
            .trigger(
                TriggerRequest::scoped(
                    KillSwitchLevel::Market,
                    market,
                    TriggerReason::Anomaly,
                    "ops",
                ),
                now_ms,
            )
            .switch
    }

    // --- trigger / one-active-per-key ---

    #[test]
    fn trigger_creates_active_switch() {
        let mut eng = KillSwitchEngine::new();
        let ev = eng.emergency_stop("ops", 1_000);
        assert_eq!(ev.kind, KillSwitchEventKind::Trigger);
        assert!(ev.switch.active);
        assert_eq!(ev.switch.level, KillSwitchLevel::Global);
        assert_eq!(ev.switch.reason, TriggerReason::Manual);
    }

    #[test]
    fn duplicate_trigger_updates_in_place() {
        let mut eng = KillSwitchEngine::new();
        let first = market_switch(&mut eng, "FED-25DEC", 1_000);

        let second = eng
            .trigger(
                TriggerRequest::scoped(
                    KillSwitchLevel::Market,
                    "FED-25DEC",
                    TriggerReason::LossLimit,
                    "risk",
                )
                .with_description("refreshed"),
                2_000,
            )
            .switch;

        // Same record, refreshed fields.
        assert_eq!(second.id, first.id);
        assert_eq!(second.reason, TriggerReason::LossLimit);
        assert_eq!(second.triggered_at_ms, 2_000);
        assert_eq!(second.description, "refreshed");
        assert_eq!(eng.active_switches(3_000).len(), 1);
    }

    #[test]
    fn distinct_targets_get_distinct_switches() {
        let mut eng = KillSwitchEngine::new();
        let a = market_switch(&mut eng, "A", 1_000);
        let b = market_switch(&mut eng, "B", 1_000);
        assert_ne!(a.id, b.id);
        assert_eq!(eng.active_switches(2_000).len(), 2);
    }

    // --- evaluate / applicability ---

    #[test]
    fn global_blocks_every_context() {
        let mut eng = KillSwitchEngine::new();
        eng.emergency_stop("ops", 1_000);

        let eval = eng.evaluate(&EvalContext::market("ANY"), 2_000);
        assert!(eval.blocked);
        assert_eq!(
            eval.blocking_switch.unwrap().level,
            KillSwitchLevel::Global
        );
    }

    #[test]
    fn market_switch_blocks_only_its_market() {
        let mut eng = KillSwitchEngine::new();
        market_switch(&mut eng, "FED-25DEC", 1_000);

        assert!(eng.evaluate(&EvalContext::market("FED-25DEC"), 2_000).blocked);
        assert!(!eng.evaluate(&EvalContext::market("OTHER"), 2_000).blocked);
        // No market in context at all: the market switch does not apply.
        assert!(!eng.evaluate(&EvalContext::default(), 2_000).blocked);
    }

    #[test]
    fn strategy_and_account_match_their_targets() {
        let mut eng = KillSwitchEngine::new();
        eng.trigger(
            TriggerRequest::scoped(
                KillSwitchLevel::Strategy,
                "mean-rev",
                TriggerReason::ErrorRate,
                "auto",
            ),
            1_000,
        );
        eng.trigger(
            TriggerRequest::scoped(
                KillSwitchLevel::Account,
                "acct-1",
                TriggerReason::Manual,
                "ops",
            ),
            1_000,
        );

        let ctx = EvalContext {
            strategy_id: Some("mean-rev".to_string()),
            market_id: None,
            account_id: None,
        };
        assert!(eng.evaluate(&ctx, 2_000).blocked);

        let ctx = EvalContext {
            strategy_id: None,
            market_id: None,
            account_id: Some("acct-1".to_string()),
        };
        assert!(eng.evaluate(&ctx, 2_000).blocked);
    }

    #[test]
    fn global_outranks_market_when_both_active() {
        // Hierarchy precedence: GLOBAL wins even though the market switch
        // is newer.
        let mut eng = KillSwitchEngine::new();
        eng.emergency_stop("ops", 1_000);
        market_switch(&mut eng, "M", 5_000);

        let eval = eng.evaluate(&EvalContext::market("M"), 6_000);
        assert!(eval.blocked);
        assert_eq!(eval.active_count, 2);
        assert_eq!(
            eval.blocking_switch.unwrap().level,
            KillSwitchLevel::Global
        );
    }

    #[test]
    fn tie_at_same_level_breaks_by_recency() {
        let mut eng = KillSwitchEngine::new();
        eng.trigger(
            TriggerRequest::scoped(KillSwitchLevel::Strategy, "s1", TriggerReason::Manual, "ops"),
            1_000,
        );
        eng.trigger(
            TriggerRequest::scoped(KillSwitchLevel::Strategy, "s2", TriggerReason::Manual, "ops"),
            9_000,
        );

        // Context matching both strategies is impossible (one strategy_id),
        // so exercise recency via two applicable levels below global.
        let ctx = EvalContext {
            strategy_id: Some("s2".to_string()),
            market_id: None,
            account_id: None,
        };
        let eval = eng.evaluate(&ctx, 10_000);
        assert_eq!(eval.blocking_switch.unwrap().triggered_at_ms, 9_000);
    }

    // --- reset ---

    #[test]
    fn reset_deactivates_and_records_who() {
        let mut eng = KillSwitchEngine::new();
        let ks = market_switch(&mut eng, "M", 1_000);

        let ev = eng.reset(&ks.id, "ops", 2_000).unwrap();
        assert_eq!(ev.kind, KillSwitchEventKind::Reset);
        assert!(!ev.switch.active);
        assert_eq!(ev.switch.reset_by.as_deref(), Some("ops"));
        assert_eq!(ev.switch.reset_at_ms, Some(2_000));
        assert!(!eng.evaluate(&EvalContext::market("M"), 3_000).blocked);
    }

    #[test]
    fn reset_unknown_id_errors() {
        let mut eng = KillSwitchEngine::new();
        let err = eng.reset("ghost", "ops", 1_000).unwrap_err();
        assert_eq!(
            err,
            KillSwitchError::UnknownSwitch {
                id: "ghost".to_string()
            }
        );
    }

    #[test]
    fn reset_level_clears_only_that_level() {
        let mut eng = KillSwitchEngine::new();
        market_switch(&mut eng, "A", 1_000);
        market_switch(&mut eng, "B", 1_000);
        eng.emergency_stop("ops", 1_000);

        let events = eng.reset_level(KillSwitchLevel::Market, "ops", 2_000);
        assert_eq!(events.len(), 2);

        // Only the global switch remains in force.
        let eval = eng.evaluate(&EvalContext::market("A"), 3_000);
        assert_eq!(eval.active_count, 1);
        assert_eq!(
            eval.blocking_switch.unwrap().level,
            KillSwitchLevel::Global
        );
    }

    #[test]
    fn retrigger_after_reset_creates_fresh_record() {
        let mut eng = KillSwitchEngine::new();
        let first = market_switch(&mut eng, "M", 1_000);
        eng.reset(&first.id, "ops", 2_000).unwrap();

        let second = market_switch(&mut eng, "M", 3_000);
        assert_ne!(second.id, first.id);
        assert!(second.active);
    }

    // --- thresholds ---

    fn loss_thresholds() -> Thresholds {
        Thresholds {
            max_daily_loss: Some(500_00),
            max_drawdown: Some(0.10),
            max_error_rate: Some(0.25),
            max_latency_ms: Some(2_000),
            auto_reset_hours: Some(4),
        }
    }

    #[test]
    fn check_thresholds_without_config_is_none() {
        let mut eng = KillSwitchEngine::new();
        let out = eng.check_thresholds(
            KillSwitchLevel::Global,
            None,
            &HealthMetrics {
                daily_loss: i64::MAX,
                ..Default::default()
            },
            1_000,
        );
        assert!(out.is_none());
    }

    #[test]
    fn daily_loss_breach_triggers_loss_limit() {
        let mut eng = KillSwitchEngine::new();
        eng.set_thresholds(KillSwitchLevel::Global, None, loss_thresholds());

        let ev = eng
            .check_thresholds(
                KillSwitchLevel::Global,
                None,
                &HealthMetrics {
                    daily_loss: 550_00,
                    ..Default::default()
                },
                1_000,
            )
            .unwrap();

        assert_eq!(ev.kind, KillSwitchEventKind::AutoTrigger);
        assert_eq!(ev.switch.reason, TriggerReason::LossLimit);
        assert_eq!(ev.switch.triggered_by, "auto");
        // auto_reset_hours=4 → 4h window.
        assert_eq!(ev.switch.auto_reset_at_ms, Some(1_000 + 4 * 3_600_000));
    }

    #[test]
    fn breach_order_daily_loss_before_error_rate() {
        let mut eng = KillSwitchEngine::new();
        eng.set_thresholds(KillSwitchLevel::Global, None, loss_thresholds());

        // Both daily loss and error rate breach; daily loss is checked first.
        let ev = eng
            .check_thresholds(
                KillSwitchLevel::Global,
                None,
                &HealthMetrics {
                    daily_loss: 600_00,
                    error_rate: 0.9,
                    ..Default::default()
                },
                1_000,
            )
            .unwrap();
        assert_eq!(ev.switch.reason, TriggerReason::LossLimit);
    }

    #[test]
    fn latency_breach_is_anomaly() {
        let mut eng = KillSwitchEngine::new();
        eng.set_thresholds(KillSwitchLevel::Global, None, loss_thresholds());

        let ev = eng
            .check_thresholds(
                KillSwitchLevel::Global,
                None,
                &HealthMetrics {
                    latency_ms: 5_000,
                    ..Default::default()
                },
                1_000,
            )
            .unwrap();
        assert_eq!(ev.switch.reason, TriggerReason::Anomaly);
    }

    #[test]
    fn below_thresholds_is_none() {
        let mut eng = KillSwitchEngine::new();
        eng.set_thresholds(KillSwitchLevel::Global, None, loss_thresholds());

        let out = eng.check_thresholds(
            KillSwitchLevel::Global,
            None,
            &HealthMetrics {
                daily_loss: 100_00,
                drawdown: 0.01,
                error_rate: 0.0,
                latency_ms: 10,
            },
            1_000,
        );
        assert!(out.is_none());
    }

    // --- auto-reset ---

    #[test]
    fn expired_switch_is_invisible_to_evaluate_before_sweep() {
        let mut eng = KillSwitchEngine::new();
        eng.trigger(
            TriggerRequest::global(TriggerReason::Anomaly, "auto").with_auto_reset_at(5_000),
            1_000,
        );

        assert!(eng.evaluate(&EvalContext::default(), 4_999).blocked);
        // Past the window: still on disk, but the evaluator skips it.
        assert!(!eng.evaluate(&EvalContext::default(), 5_000).blocked);
    }

    #[test]
    fn sweep_expired_deactivates_and_reports() {
        let mut eng = KillSwitchEngine::new();
        eng.trigger(
            TriggerRequest::global(TriggerReason::Anomaly, "auto").with_auto_reset_at(5_000),
            1_000,
        );
        market_switch(&mut eng, "M", 1_000); // no auto-reset

        let events = eng.sweep_expired(6_000);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].switch.level, KillSwitchLevel::Global);
        assert_eq!(events[0].switch.reset_by.as_deref(), Some("auto"));

        // The market switch is untouched.
        assert_eq!(eng.active_switches(7_000).len(), 1);
        // Sweeping again finds nothing.
        assert!(eng.sweep_expired(7_000).is_empty());
    }
}
