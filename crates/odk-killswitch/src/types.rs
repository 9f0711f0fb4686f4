use odk_schemas::KillSwitchEventKind;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Level / reason
// ---------------------------------------------------------------------------

/// Scope of a kill-switch. Declaration order is blocking priority,
/// highest first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KillSwitchLevel {
    Global,
    Account,
    Strategy,
    Market,
}

impl KillSwitchLevel {
    /// Lower rank blocks first.
    pub fn rank(self) -> u8 {
        match self {
            KillSwitchLevel::Global => 0,
            KillSwitchLevel::Account => 1,
            KillSwitchLevel::Strategy => 2,
            KillSwitchLevel::Market => 3,
        }
    }
}

impl fmt::Display for KillSwitchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KillSwitchLevel::Global => "GLOBAL",
            KillSwitchLevel::Account => "ACCOUNT",
            KillSwitchLevel::Strategy => "STRATEGY",
            KillSwitchLevel::Market => "MARKET",
        };
        write!(f, "{s}")
    }
}

/// Why a switch was thrown.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    Manual,
    LossLimit,
    ErrorRate,
    Anomaly,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerReason::Manual => "MANUAL",
            TriggerReason::LossLimit => "LOSS_LIMIT",
            TriggerReason::ErrorRate => "ERROR_RATE",
            TriggerReason::Anomaly => "ANOMALY",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Switch record
// ---------------------------------------------------------------------------

/// One kill-switch entry. Checkpointed through the document store, so
/// everything is serde-serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillSwitch {
    pub id: String,
    pub level: KillSwitchLevel,
    /// `None` only for GLOBAL.
    pub target_id: Option<String>,
    pub active: bool,
    pub reason: TriggerReason,
    pub description: String,
    pub triggered_at_ms: i64,
    pub triggered_by: String,
    pub auto_reset_at_ms: Option<i64>,
    pub reset_at_ms: Option<i64>,
    pub reset_by: Option<String>,
}

impl KillSwitch {
    /// Whether the auto-reset window has elapsed.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.auto_reset_at_ms, Some(at) if at <= now_ms)
    }

    /// Active and not past its auto-reset window.
    pub fn is_effective(&self, now_ms: i64) -> bool {
        self.active && !self.is_expired(now_ms)
    }
}

/// Parameters for [`KillSwitchEngine::trigger`].
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub level: KillSwitchLevel,
    pub target_id: Option<String>,
    pub reason: TriggerReason,
    pub description: String,
    pub triggered_by: String,
    pub auto_reset_at_ms: Option<i64>,
}

impl TriggerRequest {
    pub fn global(reason: TriggerReason, triggered_by: impl Into<String>) -> Self {
        Self {
            level: KillSwitchLevel::Global,
            target_id: None,
            reason,
            description: String::new(),
            triggered_by: triggered_by.into(),
            auto_reset_at_ms: None,
        }
    }

    pub fn scoped(
        level: KillSwitchLevel,
        target_id: impl Into<String>,
        reason: TriggerReason,
        triggered_by: impl Into<String>,
    ) -> Self {
        debug_assert!(level != KillSwitchLevel::Global);
        Self {
            level,
            target_id: Some(target_id.into()),
            reason,
            description: String::new(),
            triggered_by: triggered_by.into(),
            auto_reset_at_ms: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_auto_reset_at(mut self, at_ms: i64) -> Self {
        self.auto_reset_at_ms = Some(at_ms);
        self
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// The (strategy, market, account) coordinates of a candidate order.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub strategy_id: Option<String>,
    pub market_id: Option<String>,
    pub account_id: Option<String>,
}

impl EvalContext {
    pub fn market(market_id: impl Into<String>) -> Self {
        Self {
            market_id: Some(market_id.into()),
            ..Self::default()
        }
    }
}

/// Answer to "is this context blocked?".
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub blocked: bool,
    pub blocking_switch: Option<KillSwitch>,
    /// Effective switches that applied to the evaluated context.
    pub active_count: usize,
}

// ---------------------------------------------------------------------------
// Thresholds / metrics
// ---------------------------------------------------------------------------

/// Auto-trigger thresholds configured at one (level, target).
/// Money values are integer cents; `max_drawdown` is a fraction of peak.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub max_daily_loss: Option<i64>,
    pub max_drawdown: Option<f64>,
    pub max_error_rate: Option<f64>,
    pub max_latency_ms: Option<i64>,
    /// When set, auto-triggered switches expire this many hours later.
    pub auto_reset_hours: Option<i64>,
}

/// Observed health metrics fed to [`KillSwitchEngine::check_thresholds`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthMetrics {
    /// Realized+unrealized loss today, positive cents when losing.
    pub daily_loss: i64,
    /// Drawdown from peak as a fraction of peak.
    pub drawdown: f64,
    pub error_rate: f64,
    pub latency_ms: i64,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Emitted by every state-changing engine operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillSwitchEvent {
    pub kind: KillSwitchEventKind,
    pub switch: KillSwitch,
}
