use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use odk_killswitch::{EvalContext, KillSwitchEngine};
use odk_schemas::StrategyEvent;
use serde_json::Value;

use crate::registry::{RegistryError, StrategyRegistry};
use crate::types::{
    Signal, SignalStatus, Strategy, StrategyConfig, StrategyDescriptor, StrategyStatus, Thesis,
    ThesisStatus, TickContext,
};

/// Consecutive generate-signal failures before quarantine.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

// ---------------------------------------------------------------------------
// Config / errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_active_strategies: usize,
    pub signal_expiry_ms: i64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_active_strategies: 10,
            signal_expiry_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyRuntimeError {
    /// The activation cap is full.
    CapacityExceeded { max: usize },
    UnknownStrategy { id: String },
    Registry(RegistryError),
    /// `initialize` failed; the instance was discarded.
    InitFailed { strategy_type: String, detail: String },
}

impl std::fmt::Display for StrategyRuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapacityExceeded { max } => {
                write!(f, "cannot activate: {max} strategies already active")
            }
            Self::UnknownStrategy { id } => write!(f, "no active strategy '{id}'"),
            Self::Registry(e) => write!(f, "{e}"),
            Self::InitFailed {
                strategy_type,
                detail,
            } => write!(f, "initialize failed for '{strategy_type}': {detail}"),
        }
    }
}

impl std::error::Error for StrategyRuntimeError {}

impl From<RegistryError> for StrategyRuntimeError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

// ---------------------------------------------------------------------------
// Run / evaluation results
// ---------------------------------------------------------------------------

/// Outcome of one `run_strategies` tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Ids of the signals stored this run, status PENDING.
    pub signal_ids: Vec<String>,
    /// Strategies actually invoked.
    pub ran: usize,
    /// Per-strategy failures, plus the overlap short-circuit.
    pub errors: Vec<String>,
}

/// Result of the auto-execution gate for one approved signal.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub executed: bool,
    pub order_id: Option<String>,
    /// Submission problems land here — they are not signal rejections.
    pub error: Option<String>,
}

/// Outcome of the seven-step signal evaluation chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvaluation {
    pub signal_id: String,
    pub approved: bool,
    /// Which check rejected the signal (e.g. "Minimum Edge").
    pub blocking_check: Option<String>,
    pub rejection_reason: Option<String>,
    pub thesis_id: Option<String>,
    /// Present when the auto-execution gate ran.
    pub execution: Option<ExecutionResult>,
}

impl SignalEvaluation {
    fn rejected(signal_id: &str, check: &str, reason: impl Into<String>) -> Self {
        Self {
            signal_id: signal_id.to_string(),
            approved: false,
            blocking_check: Some(check.to_string()),
            rejection_reason: Some(reason.into()),
            thesis_id: None,
            execution: None,
        }
    }
}

/// Bridge from an approved signal to the order pipeline. Implemented by
/// the runtime crate on top of the risk pipeline and order machine.
pub trait OrderSubmitter {
    /// Returns the created order id, or a human-readable failure.
    fn submit_signal(&mut self, signal: &Signal) -> Result<String, String>;
}

// ---------------------------------------------------------------------------
// Active instance bookkeeping
// ---------------------------------------------------------------------------

struct ActiveStrategy {
    id: String,
    descriptor: StrategyDescriptor,
    config: StrategyConfig,
    strategy: Box<dyn Strategy>,
    status: StrategyStatus,
    consecutive_errors: u32,
    signals_generated: u64,
    signals_executed: u64,
    events_received: u64,
    /// Submission timestamps inside the trailing hour, for the
    /// `max_orders_per_hour` throttle.
    order_times_ms: Vec<i64>,
}

impl ActiveStrategy {
    fn at_hourly_order_cap(&mut self, now_ms: i64) -> bool {
        self.order_times_ms.retain(|t| now_ms - t < 3_600_000);
        self.order_times_ms.len() >= self.config.max_orders_per_hour as usize
    }
}

/// Diagnostic snapshot of one active strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySnapshot {
    pub id: String,
    pub descriptor: StrategyDescriptor,
    pub status: StrategyStatus,
    pub consecutive_errors: u32,
    pub signals_generated: u64,
    pub signals_executed: u64,
    pub events_received: u64,
    pub internal: Value,
}

// ---------------------------------------------------------------------------
// StrategyRuntime
// ---------------------------------------------------------------------------

/// Hosts active strategy instances and owns the signal and thesis stores.
pub struct StrategyRuntime {
    registry: StrategyRegistry,
    config: RuntimeConfig,
    active: BTreeMap<String, ActiveStrategy>,
    signals: BTreeMap<String, Signal>,
    theses: BTreeMap<String, Thesis>,
    /// market_id → thesis id of the single ACTIVE thesis.
    active_thesis: BTreeMap<String, String>,
    run_in_progress: AtomicBool,
    next_seq: u64,
}

impl StrategyRuntime {
    pub fn new(registry: StrategyRegistry, config: RuntimeConfig) -> Self {
        Self {
            registry,
            config,
            active: BTreeMap::new(),
            signals: BTreeMap::new(),
            theses: BTreeMap::new(),
            active_thesis: BTreeMap::new(),
            run_in_progress: AtomicBool::new(false),
            next_seq: 0,
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    fn mint(&mut self, prefix: &str) -> String {
        self.next_seq += 1;
        format!("{prefix}-{}", self.next_seq)
    }

    // -----------------------------------------------------------------------
    // Activation lifecycle
    // -----------------------------------------------------------------------

    /// Instantiate a registered type with the merged configuration,
    /// initialize it, and start hosting it.
    pub fn activate(
        &mut self,
        strategy_type: &str,
        overrides: &Value,
    ) -> Result<String, StrategyRuntimeError> {
        if self.active.len() >= self.config.max_active_strategies {
            return Err(StrategyRuntimeError::CapacityExceeded {
                max: self.config.max_active_strategies,
            });
        }

        let (mut strategy, config) = self.registry.instantiate(strategy_type, overrides)?;

        strategy
            .initialize(&config)
            .map_err(|e| StrategyRuntimeError::InitFailed {
                strategy_type: strategy_type.to_string(),
                detail: e.detail,
            })?;

        let id = self.mint(strategy_type);
        let descriptor = strategy.descriptor();
        self.active.insert(
            id.clone(),
            ActiveStrategy {
                id: id.clone(),
                descriptor,
                config,
                strategy,
                status: StrategyStatus::Active,
                consecutive_errors: 0,
                signals_generated: 0,
                signals_executed: 0,
                events_received: 0,
                order_times_ms: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Shut the strategy down and drop every reference to it, including
    /// its still-pending signals.
    pub fn deactivate(&mut self, id: &str) -> Result<(), StrategyRuntimeError> {
        let mut entry = self
            .active
            .remove(id)
            .ok_or_else(|| StrategyRuntimeError::UnknownStrategy { id: id.to_string() })?;
        entry.strategy.shutdown();

        self.signals
            .retain(|_, s| !(s.strategy_id == id && s.status == SignalStatus::Pending));
        Ok(())
    }

    pub fn pause(&mut self, id: &str) -> Result<(), StrategyRuntimeError> {
        self.set_status(id, StrategyStatus::Paused)
    }

    pub fn resume(&mut self, id: &str) -> Result<(), StrategyRuntimeError> {
        self.set_status(id, StrategyStatus::Active)
    }

    /// Clear an ERROR quarantine and rejoin the run set.
    pub fn reset_errors(&mut self, id: &str) -> Result<(), StrategyRuntimeError> {
        let entry = self
            .active
            .get_mut(id)
            .ok_or_else(|| StrategyRuntimeError::UnknownStrategy { id: id.to_string() })?;
        entry.consecutive_errors = 0;
        entry.status = StrategyStatus::Active;
        Ok(())
    }

    fn set_status(&mut self, id: &str, status: StrategyStatus) -> Result<(), StrategyRuntimeError> {
        let entry = self
            .active
            .get_mut(id)
            .ok_or_else(|| StrategyRuntimeError::UnknownStrategy { id: id.to_string() })?;
        entry.status = status;
        Ok(())
    }

    pub fn strategy_ids(&self) -> Vec<&str> {
        self.active.keys().map(String::as_str).collect()
    }

    pub fn snapshot(&self, id: &str) -> Option<StrategySnapshot> {
        self.active.get(id).map(|e| StrategySnapshot {
            id: e.id.clone(),
            descriptor: e.descriptor.clone(),
            status: e.status,
            consecutive_errors: e.consecutive_errors,
            signals_generated: e.signals_generated,
            signals_executed: e.signals_executed,
            events_received: e.events_received,
            internal: e.strategy.state(),
        })
    }

    // -----------------------------------------------------------------------
    // Per-tick execution
    // -----------------------------------------------------------------------

    /// Run every eligible strategy against the tick context and store the
    /// produced signals as PENDING.
    ///
    /// A second run starting while one is active short-circuits with an
    /// "already running" error. A strategy that errors has its counter
    /// bumped; at ten consecutive errors it is quarantined (status ERROR)
    /// until `reset_errors`.
    pub fn run_strategies(&mut self, ctx: &TickContext) -> RunReport {
        if self.run_in_progress.swap(true, Ordering::SeqCst) {
            return RunReport {
                errors: vec!["strategy run already in progress".to_string()],
                ..RunReport::default()
            };
        }

        let mut report = RunReport::default();
        let mut drafts: Vec<(String, Vec<crate::types::SignalDraft>)> = Vec::new();

        for entry in self.active.values_mut() {
            if !entry.config.enabled || entry.status != StrategyStatus::Active {
                continue;
            }
            if !entry
                .config
                .permits_market(&ctx.quote.ticker, &ctx.quote.category)
            {
                continue;
            }

            report.ran += 1;
            match entry.strategy.generate_signals(ctx) {
                Ok(batch) => {
                    entry.consecutive_errors = 0;
                    entry.signals_generated += batch.len() as u64;
                    drafts.push((entry.id.clone(), batch));
                }
                Err(e) => {
                    entry.consecutive_errors += 1;
                    if entry.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        entry.status = StrategyStatus::Error;
                    }
                    report
                        .errors
                        .push(format!("{}: {}", entry.id, e.detail));
                }
            }
        }

        for (strategy_id, batch) in drafts {
            for draft in batch {
                let id = self.mint("sig");
                let signal = Signal::from_draft(id.clone(), &strategy_id, draft, ctx.now_ms);
                self.signals.insert(id.clone(), signal);
                report.signal_ids.push(id);
            }
        }

        self.run_in_progress.store(false, Ordering::SeqCst);
        report
    }

    // -----------------------------------------------------------------------
    // Signal evaluation
    // -----------------------------------------------------------------------

    /// The seven-step evaluation chain: existence, age, kill-switch,
    /// edge, confidence, thesis creation, approval.
    pub fn evaluate_signal(
        &mut self,
        signal_id: &str,
        kill_switch: Option<&KillSwitchEngine>,
        now_ms: i64,
    ) -> SignalEvaluation {
        let Some(signal) = self.signals.get(signal_id).cloned() else {
            return SignalEvaluation::rejected(signal_id, "Signal not found", "Signal not found");
        };

        if signal.status != SignalStatus::Pending {
            return SignalEvaluation::rejected(
                signal_id,
                "Signal not pending",
                format!("signal is {:?}", signal.status),
            );
        }

        if now_ms - signal.created_at_ms > self.config.signal_expiry_ms {
            self.set_signal_status(signal_id, SignalStatus::Expired);
            return SignalEvaluation::rejected(signal_id, "Signal Expired", "Signal Expired");
        }

        if let Some(engine) = kill_switch {
            let eval = engine.evaluate(
                &EvalContext {
                    strategy_id: Some(signal.strategy_id.clone()),
                    market_id: Some(signal.market_id.clone()),
                    account_id: None,
                },
                now_ms,
            );
            if eval.blocked {
                self.set_signal_status(signal_id, SignalStatus::Rejected);
                let ks = eval.blocking_switch.expect("blocked implies a switch");
                return SignalEvaluation::rejected(
                    signal_id,
                    "Kill Switch",
                    format!("kill switch active: {} ({})", ks.level, ks.reason),
                );
            }
        }

        let (min_edge, min_confidence) = match self.active.get(&signal.strategy_id) {
            Some(entry) => (entry.config.min_edge, entry.config.min_confidence),
            None => {
                self.set_signal_status(signal_id, SignalStatus::Rejected);
                return SignalEvaluation::rejected(
                    signal_id,
                    "Strategy not active",
                    "Strategy not active",
                );
            }
        };

        if signal.edge < min_edge {
            self.set_signal_status(signal_id, SignalStatus::Rejected);
            return SignalEvaluation::rejected(
                signal_id,
                "Minimum Edge",
                format!("edge {}c below minimum {min_edge}c", signal.edge),
            );
        }

        if signal.confidence < min_confidence {
            self.set_signal_status(signal_id, SignalStatus::Rejected);
            return SignalEvaluation::rejected(
                signal_id,
                "Minimum Confidence",
                format!(
                    "confidence {:.2} below minimum {min_confidence:.2}",
                    signal.confidence
                ),
            );
        }

        let draft = self
            .active
            .get(&signal.strategy_id)
            .and_then(|entry| entry.strategy.evaluate_signal(&signal));
        let Some(draft) = draft else {
            self.set_signal_status(signal_id, SignalStatus::Rejected);
            return SignalEvaluation::rejected(
                signal_id,
                "Strategy did not create thesis",
                "Strategy did not create thesis",
            );
        };

        let thesis_id = self.install_thesis(&signal, draft, now_ms);
        if let Some(signal) = self.signals.get_mut(signal_id) {
            signal.status = SignalStatus::Approved;
            signal.thesis_id = Some(thesis_id.clone());
        }

        SignalEvaluation {
            signal_id: signal_id.to_string(),
            approved: true,
            blocking_check: None,
            rejection_reason: None,
            thesis_id: Some(thesis_id),
            execution: None,
        }
    }

    /// Evaluate, then — when the owning strategy has `auto_execute` on —
    /// run the execution gate. A missing submitter is an execution error
    /// on the result, never a rejection of the signal.
    pub fn process_signal(
        &mut self,
        signal_id: &str,
        kill_switch: Option<&KillSwitchEngine>,
        submitter: Option<&mut dyn OrderSubmitter>,
        now_ms: i64,
    ) -> SignalEvaluation {
        let mut evaluation = self.evaluate_signal(signal_id, kill_switch, now_ms);
        if !evaluation.approved {
            return evaluation;
        }

        let signal = self.signals[signal_id].clone();
        let auto_execute = self
            .active
            .get(&signal.strategy_id)
            .map(|e| e.config.auto_execute)
            .unwrap_or(false);

        if !auto_execute {
            return evaluation;
        }

        if let Some(entry) = self.active.get_mut(&signal.strategy_id) {
            if entry.at_hourly_order_cap(now_ms) {
                evaluation.execution = Some(ExecutionResult {
                    executed: false,
                    order_id: None,
                    error: Some(format!(
                        "hourly order cap reached ({}/h)",
                        entry.config.max_orders_per_hour
                    )),
                });
                return evaluation;
            }
        }

        let execution = match submitter {
            None => ExecutionResult {
                executed: false,
                order_id: None,
                error: Some("auto-execute enabled but no order submitter configured".to_string()),
            },
            Some(submitter) => match submitter.submit_signal(&signal) {
                Ok(order_id) => {
                    if let Some(s) = self.signals.get_mut(signal_id) {
                        s.status = SignalStatus::Executed;
                        s.order_id = Some(order_id.clone());
                    }
                    if let Some(thesis_id) = &signal.thesis_id {
                        if let Some(t) = self.theses.get_mut(thesis_id) {
                            t.status = ThesisStatus::Executed;
                        }
                        // Executed theses no longer occupy the market slot.
                        self.active_thesis.remove(&signal.market_id);
                    }
                    if let Some(e) = self.active.get_mut(&signal.strategy_id) {
                        e.signals_executed += 1;
                        e.order_times_ms.push(now_ms);
                    }
                    ExecutionResult {
                        executed: true,
                        order_id: Some(order_id),
                        error: None,
                    }
                }
                Err(detail) => ExecutionResult {
                    executed: false,
                    order_id: None,
                    error: Some(detail),
                },
            },
        };

        evaluation.execution = Some(execution);
        evaluation
    }

    fn set_signal_status(&mut self, signal_id: &str, status: SignalStatus) {
        if let Some(signal) = self.signals.get_mut(signal_id) {
            if !signal.status.is_terminal() {
                signal.status = status;
            }
        }
    }

    /// Install a new ACTIVE thesis, superseding the market's previous
    /// ACTIVE one in the same operation.
    fn install_thesis(
        &mut self,
        signal: &Signal,
        draft: crate::types::ThesisDraft,
        now_ms: i64,
    ) -> String {
        let id = self.mint("th");

        if let Some(old_id) = self.active_thesis.insert(signal.market_id.clone(), id.clone()) {
            if let Some(old) = self.theses.get_mut(&old_id) {
                old.status = ThesisStatus::Superseded;
            }
        }

        self.theses.insert(
            id.clone(),
            Thesis {
                id: id.clone(),
                market_id: signal.market_id.clone(),
                side: signal.side,
                hypothesis: draft.hypothesis,
                confidence: draft.confidence,
                target_price: draft.target_price,
                edge_required: draft.edge_required,
                max_price: draft.max_price,
                falsification_criteria: draft.falsification_criteria,
                status: ThesisStatus::Active,
                created_at_ms: now_ms,
                expires_at_ms: draft.expires_at_ms,
            },
        );
        id
    }

    // -----------------------------------------------------------------------
    // Housekeeping
    // -----------------------------------------------------------------------

    /// Mark PENDING signals past the expiry window as EXPIRED.
    pub fn expire_pending(&mut self, now_ms: i64) -> usize {
        let expiry = self.config.signal_expiry_ms;
        let mut expired = 0;
        for signal in self.signals.values_mut() {
            if signal.status == SignalStatus::Pending
                && now_ms - signal.created_at_ms > expiry
            {
                signal.status = SignalStatus::Expired;
                expired += 1;
            }
        }
        expired
    }

    /// Deliver an event to one strategy, or to all when `strategy_id` is
    /// `None`.
    pub fn deliver_event(&mut self, strategy_id: Option<&str>, event: &StrategyEvent) {
        for entry in self.active.values_mut() {
            if strategy_id.map_or(true, |id| id == entry.id) {
                entry.events_received += 1;
                entry.strategy.on_event(event);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn signal(&self, id: &str) -> Option<&Signal> {
        self.signals.get(id)
    }

    pub fn pending_signals(&self) -> impl Iterator<Item = &Signal> {
        self.signals
            .values()
            .filter(|s| s.status == SignalStatus::Pending)
    }

    pub fn thesis(&self, id: &str) -> Option<&Thesis> {
        self.theses.get(id)
    }

    /// The market's single ACTIVE thesis, if any.
    pub fn active_thesis(&self, market_id: &str) -> Option<&Thesis> {
        self.active_thesis
            .get(market_id)
            .and_then(|id| self.theses.get(id))
            .filter(|t| t.status == ThesisStatus::Active)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
