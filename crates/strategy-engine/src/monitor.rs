//! Per-tick P&L evaluation and exit rules.
//!
//! Rules are checked in fixed priority, first match wins:
//! 1. SESSION_CLOSE: at or after the session close time (INTRADAY only)
//! 2. TARGET: P&L% at or above `target_percent`
//! 3. STOP_LOSS: P&L% at or below `-stop_loss_percent`
//! 4. DURATION: `duration_days` trading days elapsed since entry

use std::sync::Arc;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};

use ratio_spread_core::{
    ExitReason, MarketDataFeed, MarketState, NotificationSink, Position, ProductType, Severity,
    StrategyConfig, StrategyError, StrategyEvent, TradingCalendar,
};

/// Marked-to-market view of a position.
#[derive(Debug, Clone, PartialEq)]
pub struct PnlSnapshot {
    pub aggregate_pnl: Decimal,
    pub pnl_percent: Decimal,
    /// `(symbol, mark)` per leg.
    pub marks: Vec<(String, Decimal)>,
}

/// Result of one monitor tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Hold(PnlSnapshot),
    Exit {
        reason: ExitReason,
        /// `None` when prices were unavailable and a time rule fired.
        snapshot: Option<PnlSnapshot>,
    },
    /// Prices unavailable and no time rule fired.
    FeedUnavailable { consecutive_failures: u32 },
    /// Market closed for a carried (MARGIN) position.
    Skipped,
}

/// Aggregate P&L of `position` at the given leg marks.
///
/// Legs without a mark contribute nothing. P&L% is zero when the position
/// has no deployed capital.
#[must_use]
pub fn compute_pnl(position: &Position, marks: &[(String, Decimal)]) -> PnlSnapshot {
    let aggregate_pnl: Decimal = position
        .legs
        .iter()
        .filter_map(|leg| {
            marks
                .iter()
                .find(|(symbol, _)| *symbol == leg.symbol)
                .map(|(_, mark)| leg.pnl_at(*mark))
        })
        .sum();

    let capital = position.deployed_capital();
    let pnl_percent = if capital > Decimal::ZERO {
        aggregate_pnl / capital * dec!(100)
    } else {
        Decimal::ZERO
    };

    PnlSnapshot {
        aggregate_pnl,
        pnl_percent,
        marks: marks.to_vec(),
    }
}

/// Applies the exit rules. `pnl_percent` is `None` when prices are unavailable,
/// in which case only the time rules are evaluated.
#[must_use]
pub fn check_exit_rules(
    position: &Position,
    pnl_percent: Option<Decimal>,
    now: NaiveDateTime,
    config: &StrategyConfig,
    calendar: &TradingCalendar,
) -> Option<ExitReason> {
    if config.product_type == ProductType::Intraday && now.time() >= config.session_close_time {
        return Some(ExitReason::SessionClose);
    }

    if let Some(pct) = pnl_percent {
        if pct >= config.target_percent {
            info!(instrument = %position.instrument, pnl_pct = %pct, "Target reached");
            return Some(ExitReason::Target);
        }
        if pct <= -config.stop_loss_percent {
            warn!(instrument = %position.instrument, pnl_pct = %pct, "Stop loss hit");
            return Some(ExitReason::StopLoss);
        }
    }

    let elapsed = calendar.trading_days_between(position.entry_time.date(), now.date());
    if elapsed >= config.duration_days {
        info!(instrument = %position.instrument, elapsed, "Holding period elapsed");
        return Some(ExitReason::Duration);
    }

    None
}

/// Watches the open position on every tick.
pub struct PnlMonitor {
    config: Arc<StrategyConfig>,
    calendar: TradingCalendar,
    feed: Arc<dyn MarketDataFeed>,
    sink: Arc<dyn NotificationSink>,
    consecutive_failures: u32,
}

impl PnlMonitor {
    pub fn new(
        config: Arc<StrategyConfig>,
        feed: Arc<dyn MarketDataFeed>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let calendar = TradingCalendar::from_config(&config);
        Self {
            config,
            calendar,
            feed,
            sink,
            consecutive_failures: 0,
        }
    }

    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    async fn fetch_marks(&self, position: &Position) -> Result<Vec<(String, Decimal)>, StrategyError> {
        let mut marks = Vec::with_capacity(position.legs.len());
        for leg in &position.legs {
            let mark = self.feed.get_quote(&leg.symbol).await?;
            marks.push((leg.symbol.clone(), mark));
        }
        Ok(marks)
    }

    /// Evaluates `position` at `now`.
    pub async fn tick(&mut self, position: &Position, now: NaiveDateTime) -> TickOutcome {
        if self.config.product_type == ProductType::Margin
            && self.calendar.market_state(now) != MarketState::Open
        {
            return TickOutcome::Skipped;
        }

        match self.fetch_marks(position).await {
            Ok(marks) => {
                self.consecutive_failures = 0;
                let snapshot = compute_pnl(position, &marks);
                debug!(
                    instrument = %position.instrument,
                    pnl = %snapshot.aggregate_pnl,
                    pnl_pct = %snapshot.pnl_percent.round_dp(4),
                    "Position marked"
                );
                self.sink.send(StrategyEvent::PnlUpdate {
                    instrument: position.instrument.clone(),
                    aggregate_pnl: snapshot.aggregate_pnl,
                    pnl_percent: snapshot.pnl_percent,
                    at: now,
                });
                match check_exit_rules(
                    position,
                    Some(snapshot.pnl_percent),
                    now,
                    &self.config,
                    &self.calendar,
                ) {
                    Some(reason) => TickOutcome::Exit {
                        reason,
                        snapshot: Some(snapshot),
                    },
                    None => TickOutcome::Hold(snapshot),
                }
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    instrument = %position.instrument,
                    error = %e,
                    consecutive = self.consecutive_failures,
                    "Price fetch failed"
                );
                if self.consecutive_failures % self.config.max_feed_failures == 0 {
                    self.raise_outage(position, now);
                }
                match check_exit_rules(position, None, now, &self.config, &self.calendar) {
                    Some(reason) => TickOutcome::Exit {
                        reason,
                        snapshot: None,
                    },
                    None => TickOutcome::FeedUnavailable {
                        consecutive_failures: self.consecutive_failures,
                    },
                }
            }
        }
    }

    fn raise_outage(&self, position: &Position, now: NaiveDateTime) {
        let outage = StrategyError::FeedOutage {
            instrument: position.instrument.clone(),
            consecutive_failures: self.consecutive_failures,
        };
        error!(error = %outage, "Feed outage, position left open");
        self.sink.send(StrategyEvent::Alert {
            instrument: position.instrument.clone(),
            severity: Severity::Critical,
            message: outage.to_string(),
            at: now,
        });
    }
}
