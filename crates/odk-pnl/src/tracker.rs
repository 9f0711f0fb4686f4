use crate::types::{
    BreachDirective, DailyPnlSnapshot, PnlLimits, PnlOutcome, PnlStatus, PnlUpdate,
};

/// Accumulates one trading day's P&L and classifies its risk status.
///
/// Deterministic: the date string is supplied by the caller, never read
/// from a clock.
#[derive(Debug)]
pub struct DailyPnlTracker {
    date: String,
    limits: PnlLimits,
    realized: i64,
    unrealized: i64,
    fees: i64,
    peak: i64,
    trade_count: u64,
    win_count: u64,
    loss_count: u64,
    breakeven_count: u64,
    /// Set once a directive has been emitted for this window.
    breach_latched: bool,
}

impl DailyPnlTracker {
    pub fn new(date: impl Into<String>, limits: PnlLimits) -> Self {
        Self {
            date: date.into(),
            limits,
            realized: 0,
            unrealized: 0,
            fees: 0,
            peak: 0,
            trade_count: 0,
            win_count: 0,
            loss_count: 0,
            breakeven_count: 0,
            breach_latched: false,
        }
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    /// Apply one update and return the refreshed window, status, and —
    /// on the update that first pushes a utilization to 1 — a breach
    /// directive for the runtime.
    pub fn record(&mut self, update: PnlUpdate) -> PnlOutcome {
        match update {
            PnlUpdate::Fill { fees } => {
                self.fees = self.fees.saturating_add(fees);
                self.trade_count += 1;
            }
            PnlUpdate::PositionClose { realized } => {
                self.realized = self.realized.saturating_add(realized);
                if realized > 0 {
                    self.win_count += 1;
                } else if realized < 0 {
                    self.loss_count += 1;
                } else {
                    self.breakeven_count += 1;
                }
            }
            PnlUpdate::MarkToMarket { unrealized } => {
                self.unrealized = unrealized;
            }
        }

        let net = self.net();
        if net > self.peak {
            self.peak = net;
        }

        let snapshot = self.snapshot();
        let status = self.status();

        let directive = if !status.is_safe && !self.breach_latched {
            self.breach_latched = true;
            Some(BreachDirective {
                description: format!(
                    "daily P&L breach: loss util {:.2}, drawdown util {:.2} (net {}c)",
                    status.daily_loss_util, status.drawdown_util, snapshot.net
                ),
                daily_loss_util: status.daily_loss_util,
                drawdown_util: status.drawdown_util,
            })
        } else {
            None
        };

        PnlOutcome {
            snapshot,
            status,
            directive,
        }
    }

    fn net(&self) -> i64 {
        self.realized
            .saturating_add(self.unrealized)
            .saturating_sub(self.fees)
    }

    pub fn snapshot(&self) -> DailyPnlSnapshot {
        let gross = self.realized.saturating_add(self.unrealized);
        let net = self.net();
        DailyPnlSnapshot {
            date: self.date.clone(),
            realized: self.realized,
            unrealized: self.unrealized,
            fees: self.fees,
            gross,
            net,
            peak: self.peak,
            drawdown: self.peak.saturating_sub(net),
            trade_count: self.trade_count,
            win_count: self.win_count,
            loss_count: self.loss_count,
            breakeven_count: self.breakeven_count,
        }
    }

    /// Classify the current window against the limits.
    pub fn status(&self) -> PnlStatus {
        let net = self.net();
        let loss = (-net).max(0);

        let daily_loss_util = if self.limits.max_daily_loss > 0 {
            loss as f64 / self.limits.max_daily_loss as f64
        } else {
            0.0
        };

        let drawdown = self.peak.saturating_sub(net);
        let dd_budget = self.peak as f64 * self.limits.max_drawdown_pct;
        let drawdown_util = if self.peak > 0 && dd_budget > 0.0 {
            drawdown as f64 / dd_budget
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        if (0.8..1.0).contains(&daily_loss_util) {
            warnings.push(format!("daily loss at {:.0}% of limit", daily_loss_util * 100.0));
        }
        if (0.8..1.0).contains(&drawdown_util) {
            warnings.push(format!("drawdown at {:.0}% of limit", drawdown_util * 100.0));
        }

        PnlStatus {
            daily_loss_util,
            drawdown_util,
            is_safe: daily_loss_util < 1.0 && drawdown_util < 1.0,
            warnings,
        }
    }

    /// Close this window and start a fresh one for `date`. Returns the
    /// archived snapshot.
    pub fn roll(&mut self, date: impl Into<String>) -> DailyPnlSnapshot {
        let archived = self.snapshot();
        *self = Self::new(date, self.limits);
        archived
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
