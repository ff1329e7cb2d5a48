//! Strategy runner: one interval loop driving the lifecycle.

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use ratio_spread_core::{
    BrokerSession, Clock, ClosedPosition, ExitReason, ExpiryCalendar, MarketDataFeed,
    NotificationSink, OrderGateway, Position, Severity, StrategyConfig, StrategyError,
    StrategyEvent, StrategyState, SymbolResolver, TradingCalendar,
};

use crate::basket::BasketExecutor;
use crate::commands::{StrategyCommand, StrategyHandle, StrategyStatus};
use crate::entry_gate::EntryGate;
use crate::exit::ExitExecutor;
use crate::ladder::build_ladder;
use crate::ledger::PositionLedger;
use crate::monitor::{PnlMonitor, PnlSnapshot, TickOutcome};
use crate::state_machine::{StrategyEventKind, StrategyStateMachine};

/// External collaborators the runner drives.
#[derive(Clone)]
pub struct Collaborators {
    pub session: Arc<dyn BrokerSession>,
    pub feed: Arc<dyn MarketDataFeed>,
    pub gateway: Arc<dyn OrderGateway>,
    pub expiries: Arc<dyn ExpiryCalendar>,
    pub symbols: Arc<dyn SymbolResolver>,
    pub sink: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
}

pub struct StrategyRunner {
    config: Arc<StrategyConfig>,
    calendar: TradingCalendar,
    machine: StrategyStateMachine,
    gate: EntryGate,
    basket: BasketExecutor,
    monitor: PnlMonitor,
    exit: ExitExecutor,
    ledger: Arc<PositionLedger>,
    deps: Collaborators,
    rx: mpsc::Receiver<StrategyCommand>,
    last_pnl: Option<PnlSnapshot>,
    last_error: Option<String>,
}

impl StrategyRunner {
    /// Builds the runner and its command handle.
    ///
    /// A position already in `ledger` (recovered from the journal) resumes in
    /// OPEN, or in EXITING if it was journaled mid-exit.
    pub fn new(
        config: Arc<StrategyConfig>,
        deps: Collaborators,
        ledger: Arc<PositionLedger>,
    ) -> (Self, StrategyHandle) {
        let (tx, rx) = mpsc::channel(32);

        let machine = match ledger.get(&config.instrument) {
            Some(position) => {
                if position.status == StrategyState::Exiting {
                    warn!(
                        instrument = %position.instrument,
                        reason = ?position.exit_reason,
                        fills = position.exit_fills.len(),
                        "Recovered position was mid-exit, resuming square-off"
                    );
                } else {
                    info!(
                        instrument = %position.instrument,
                        entry_time = %position.entry_time,
                        capital = %position.deployed_capital(),
                        "Recovered open position"
                    );
                }
                StrategyStateMachine::recovered(position.status, position.entry_time.date())
            }
            None => StrategyStateMachine::new(),
        };

        let runner = Self {
            calendar: TradingCalendar::from_config(&config),
            machine,
            gate: EntryGate::new(config.clone(), deps.expiries.clone()),
            basket: BasketExecutor::new(deps.gateway.clone(), ledger.clone(), config.clone()),
            monitor: PnlMonitor::new(config.clone(), deps.feed.clone(), deps.sink.clone()),
            exit: ExitExecutor::new(
                deps.gateway.clone(),
                ledger.clone(),
                deps.sink.clone(),
                deps.clock.clone(),
                config.clone(),
            ),
            ledger,
            deps,
            rx,
            last_pnl: None,
            last_error: None,
            config,
        };
        (runner, StrategyHandle::new(tx))
    }

    #[must_use]
    pub const fn state(&self) -> StrategyState {
        self.machine.state()
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<PositionLedger> {
        &self.ledger
    }

    #[must_use]
    pub fn status(&self) -> StrategyStatus {
        let archive = self.ledger.archive();
        StrategyStatus {
            instrument: self.config.instrument.clone(),
            state: self.machine.state(),
            position: self.ledger.get(&self.config.instrument),
            last_pnl: self.last_pnl.as_ref().map(|s| s.aggregate_pnl),
            last_pnl_percent: self.last_pnl.as_ref().map(|s| s.pnl_percent),
            consecutive_feed_failures: self.monitor.consecutive_failures(),
            last_error: self.last_error.clone(),
            closed_cycles: archive.len(),
            total_realized_pnl: archive.iter().map(ClosedPosition::realized_pnl).sum::<Decimal>(),
        }
    }

    fn transition(&mut self, event: StrategyEventKind, now: NaiveDateTime) -> Result<(), StrategyError> {
        let (from, to) = self.machine.apply(event)?;
        self.deps.sink.send(StrategyEvent::StateChanged {
            instrument: self.config.instrument.clone(),
            from,
            to,
            at: now,
        });
        Ok(())
    }

    /// Runs one evaluation at the clock's current time.
    ///
    /// # Errors
    ///
    /// Fatal errors ([`StrategyError::RollbackFailure`]) and internal
    /// inconsistencies. Ordinary entry failures are reported through the
    /// sink and end the cycle without an error.
    pub async fn step(&mut self) -> Result<(), StrategyError> {
        let now = self.deps.clock.now();
        match self.machine.state() {
            StrategyState::Idle => self.try_enter(now).await,
            StrategyState::Open => self.monitor_open(now).await,
            StrategyState::Exiting => self.resume_exit().await.map(|_| ()),
            StrategyState::Closed | StrategyState::Aborted => {
                self.transition(StrategyEventKind::Reset, now)
            }
            state => {
                warn!(%state, "Runner stepped in a transient state");
                Ok(())
            }
        }
    }

    async fn try_enter(&mut self, now: NaiveDateTime) -> Result<(), StrategyError> {
        let today = now.date();
        if self.machine.attempted_on(today) {
            return Ok(());
        }

        match self.gate.can_enter(now, self.calendar.market_state(now)) {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "Entry window open but no matching expiry, skipping today");
                self.machine.mark_attempted(today);
                self.last_error = Some(e.to_string());
                self.deps.sink.send(StrategyEvent::Alert {
                    instrument: self.config.instrument.clone(),
                    severity: Severity::Warning,
                    message: e.to_string(),
                    at: now,
                });
                return Ok(());
            }
        }

        self.transition(StrategyEventKind::GatePassed, now)?;

        let ladder = match self.prepare_ladder(now).await {
            Ok(ladder) => ladder,
            Err(e) => {
                warn!(error = %e, "Could not build ladder, retrying next tick");
                self.last_error = Some(e.to_string());
                self.deps.sink.send(StrategyEvent::EntryAborted {
                    instrument: self.config.instrument.clone(),
                    error: e.to_string(),
                    at: now,
                });
                return self.transition(StrategyEventKind::LadderFailed, now);
            }
        };

        self.machine.mark_attempted(today);
        self.transition(StrategyEventKind::LadderBuilt, now)?;

        match self.basket.open(&ladder, now).await {
            Ok(position) => {
                self.transition(StrategyEventKind::EntryFilled, now)?;
                self.deps.sink.send(StrategyEvent::PositionOpened {
                    instrument: position.instrument.clone(),
                    legs: position.legs.len(),
                    deployed_capital: position.deployed_capital(),
                    at: now,
                });
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                self.transition(StrategyEventKind::EntryFailed, now)?;
                self.last_error = Some(e.to_string());
                self.deps.sink.send(StrategyEvent::EntryAborted {
                    instrument: self.config.instrument.clone(),
                    error: e.to_string(),
                    at: now,
                });
                self.transition(StrategyEventKind::Reset, now)?;
                if e.is_fatal() {
                    self.deps.sink.send(StrategyEvent::Alert {
                        instrument: self.config.instrument.clone(),
                        severity: Severity::Critical,
                        message: e.to_string(),
                        at: now,
                    });
                    return Err(e);
                }
                warn!(error = %e, "Entry aborted, broker left flat");
                Ok(())
            }
        }
    }

    async fn prepare_ladder(&self, now: NaiveDateTime) -> Result<crate::ladder::Ladder, StrategyError> {
        let session = self
            .deps
            .session
            .handle()
            .await
            .map_err(|e| StrategyError::Gateway(e.to_string()))?;
        info!(session = session.as_str(), "Broker session ready");

        let spot = self.deps.feed.get_spot(&self.config.instrument).await?;
        build_ladder(
            spot,
            now.date(),
            &self.config,
            self.deps.expiries.as_ref(),
            self.deps.symbols.as_ref(),
        )
    }

    async fn monitor_open(&mut self, now: NaiveDateTime) -> Result<(), StrategyError> {
        let position = self
            .ledger
            .get(&self.config.instrument)
            .ok_or_else(|| StrategyError::NoOpenPosition(self.config.instrument.clone()))?;

        match self.monitor.tick(&position, now).await {
            TickOutcome::Hold(snapshot) => {
                self.last_pnl = Some(snapshot);
                Ok(())
            }
            TickOutcome::Exit { reason, snapshot } => {
                if snapshot.is_some() {
                    self.last_pnl = snapshot;
                }
                self.close(reason, StrategyEventKind::ExitTriggered).await.map(|_| ())
            }
            TickOutcome::FeedUnavailable { .. } | TickOutcome::Skipped => Ok(()),
        }
    }

    async fn close(
        &mut self,
        reason: ExitReason,
        event: StrategyEventKind,
    ) -> Result<ClosedPosition, StrategyError> {
        let position = self
            .ledger
            .get(&self.config.instrument)
            .ok_or_else(|| StrategyError::NoOpenPosition(self.config.instrument.clone()))?;

        self.transition(event, self.deps.clock.now())?;
        self.finish_exit(&position, reason).await
    }

    /// Completes a square-off recovered from the journal.
    async fn resume_exit(&mut self) -> Result<ClosedPosition, StrategyError> {
        let position = self
            .ledger
            .get(&self.config.instrument)
            .ok_or_else(|| StrategyError::NoOpenPosition(self.config.instrument.clone()))?;
        let reason = position.exit_reason.unwrap_or_else(|| {
            warn!(instrument = %position.instrument, "Recovered exit has no reason, recording manual");
            ExitReason::Manual
        });
        self.finish_exit(&position, reason).await
    }

    async fn finish_exit(
        &mut self,
        position: &Position,
        reason: ExitReason,
    ) -> Result<ClosedPosition, StrategyError> {
        let closed = self.exit.close(position, reason).await?;
        let now = self.deps.clock.now();
        self.transition(StrategyEventKind::ExitConfirmed, now)?;
        self.transition(StrategyEventKind::Reset, now)?;
        Ok(closed)
    }

    /// Squares off the open position immediately.
    ///
    /// # Errors
    ///
    /// [`StrategyError::IllegalTransition`] unless the strategy is OPEN.
    pub async fn manual_exit(&mut self) -> Result<ClosedPosition, StrategyError> {
        if self.machine.state() != StrategyState::Open {
            return Err(StrategyError::IllegalTransition {
                from: self.machine.state(),
                event: StrategyEventKind::ManualExit.to_string(),
            });
        }
        info!(instrument = %self.config.instrument, "Manual exit requested");
        self.close(ExitReason::Manual, StrategyEventKind::ManualExit).await
    }

    /// Runs until shutdown or a fatal error.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that stopped the loop.
    pub async fn run(mut self) -> Result<()> {
        info!(
            instrument = %self.config.instrument,
            poll_secs = self.config.poll_interval_seconds,
            product = ?self.config.product_type,
            state = %self.machine.state(),
            "Strategy runner started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.step().await {
                        if e.is_fatal() {
                            error!(error = %e, "Fatal error, stopping runner");
                            return Err(e.into());
                        }
                        error!(error = %e, "Strategy step failed");
                        self.last_error = Some(e.to_string());
                    }
                }
                cmd = self.rx.recv() => match cmd {
                    Some(StrategyCommand::ManualExit(reply)) => {
                        let result = self.manual_exit().await.map(|_| ());
                        if let Err(e) = &result {
                            warn!(error = %e, "Manual exit refused");
                        }
                        let _ = reply.send(result);
                    }
                    Some(StrategyCommand::GetStatus(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(StrategyCommand::Shutdown) | None => {
                        if self.machine.state() == StrategyState::Open {
                            warn!(
                                instrument = %self.config.instrument,
                                "Shutting down with an open position; it remains in the ledger"
                            );
                        }
                        info!("Strategy runner stopped");
                        return Ok(());
                    }
                },
            }
        }
    }
}
