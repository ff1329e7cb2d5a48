//! Position square-off with unbounded retry.
//!
//! Each attempt sends an opposite-side order for whatever quantity of each
//! leg is still open. Failed attempts back off exponentially, then settle on
//! a slow cadence that repeats until every leg is flat. Once past the fast
//! phase every failed attempt raises a critical alert carrying the count.
//!
//! Every confirmed closing fill is written to the ledger as it lands, so a
//! restart resumes with only the unclosed remainder. An order that could be
//! neither confirmed nor cancelled is resolved before its leg is re-sent.

use std::sync::Arc;

use tracing::{error, info, warn};

use ratio_spread_core::{
    Clock, ClosedPosition, ExitFill, ExitReason, Fill, GatewayError, Leg, NotificationSink,
    OrderGateway, OrderRequest, Position, Severity, StrategyConfig, StrategyError, StrategyEvent,
};

use crate::ledger::PositionLedger;
use crate::orders::{place_and_confirm, settle};

/// Quantity of one leg still waiting to be closed.
#[derive(Debug, Clone)]
struct OpenRemainder {
    leg: usize,
    quantity: u32,
    /// Closing order whose outcome is unknown.
    pending_order: Option<String>,
}

pub struct ExitExecutor {
    gateway: Arc<dyn OrderGateway>,
    ledger: Arc<PositionLedger>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: Arc<StrategyConfig>,
}

impl ExitExecutor {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        ledger: Arc<PositionLedger>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: Arc<StrategyConfig>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            sink,
            clock,
            config,
        }
    }

    async fn send(&self, leg: &Leg, quantity: u32) -> Result<Fill, GatewayError> {
        let request = OrderRequest {
            symbol: leg.symbol.clone(),
            side: leg.side.opposite(),
            quantity,
            price: None,
            tag: format!("EXIT_{}", leg.label),
            product: self.config.product_type,
        };
        place_and_confirm(self.gateway.as_ref(), &request, self.config.fill_timeout()).await
    }

    /// Squares off every leg of `position`, archives it and frees the ledger slot.
    ///
    /// Does not return until all legs are confirmed closed. A position the
    /// ledger already holds as EXITING keeps its original reason and only its
    /// unclosed quantities are sent.
    ///
    /// # Errors
    ///
    /// [`StrategyError::NoOpenPosition`] if the ledger holds no position for
    /// the instrument. Order failures are retried, never returned.
    pub async fn close(
        &self,
        position: &Position,
        reason: ExitReason,
    ) -> Result<ClosedPosition, StrategyError> {
        let position = self.ledger.begin_exit(&position.instrument, reason)?;
        let reason = position.exit_reason.unwrap_or(reason);
        let instrument = position.instrument.clone();
        if position.exit_fills.is_empty() {
            info!(%instrument, %reason, "Closing position");
        } else {
            info!(
                %instrument,
                %reason,
                fills = position.exit_fills.len(),
                "Resuming interrupted close"
            );
        }

        let mut remaining: Vec<OpenRemainder> = (0..position.legs.len())
            .map(|leg| OpenRemainder {
                leg,
                quantity: position.unclosed_quantity(leg),
                pending_order: None,
            })
            .collect();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            for open in remaining.iter_mut().filter(|r| r.quantity > 0) {
                let leg = &position.legs[open.leg];
                let result = match open.pending_order.take() {
                    Some(order_id) => match settle(
                        self.gateway.as_ref(),
                        &order_id,
                        self.config.fill_timeout(),
                    )
                    .await
                    {
                        Ok(Some(fill)) => Ok(fill),
                        Ok(None) => self.send(leg, open.quantity).await,
                        Err(e) => Err(e),
                    },
                    None => self.send(leg, open.quantity).await,
                };

                match result {
                    Ok(fill) => {
                        let closed = fill.quantity.min(open.quantity);
                        open.quantity -= closed;
                        info!(
                            symbol = %fill.symbol,
                            quantity = closed,
                            price = %fill.price,
                            attempt,
                            "Exit leg filled"
                        );
                        self.ledger.record_exit_fill(
                            &instrument,
                            ExitFill {
                                leg: open.leg,
                                symbol: fill.symbol,
                                side: fill.side,
                                quantity: closed,
                                price: fill.price,
                                order_id: fill.order_id,
                            },
                        )?;
                    }
                    Err(GatewayError::Unconfirmed { order_id, reason }) => {
                        warn!(
                            symbol = %leg.symbol,
                            %order_id,
                            %reason,
                            attempt,
                            "Exit order state unknown, holding re-send"
                        );
                        open.pending_order = Some(order_id);
                    }
                    Err(e) => {
                        warn!(symbol = %leg.symbol, attempt, error = %e, "Exit order failed");
                    }
                }
            }

            let unclosed: Vec<&str> = remaining
                .iter()
                .filter(|r| r.quantity > 0)
                .map(|r| position.legs[r.leg].symbol.as_str())
                .collect();
            if unclosed.is_empty() {
                break;
            }

            let delay = self.config.exit_retry.delay_for(attempt);
            if attempt >= self.config.exit_retry.max_fast_attempts {
                let message = format!(
                    "exit incomplete after {attempt} attempts, unclosed {unclosed:?}, retrying in {}s",
                    delay.as_secs()
                );
                error!(%instrument, attempt, "{message}");
                self.sink.send(StrategyEvent::Alert {
                    instrument: instrument.clone(),
                    severity: Severity::Critical,
                    message,
                    at: self.clock.now(),
                });
            }
            tokio::time::sleep(delay).await;
        }

        let mut flat = self
            .ledger
            .get(&instrument)
            .ok_or_else(|| StrategyError::NoOpenPosition(instrument.clone()))?;
        let fills = std::mem::take(&mut flat.exit_fills);
        let closed = ClosedPosition::new(flat, fills, reason, self.clock.now());
        info!(
            %instrument,
            %reason,
            realized_pnl = %closed.realized_pnl(),
            attempts = attempt,
            "Position closed"
        );
        self.ledger.close(&instrument, closed.clone())?;
        self.sink.send(StrategyEvent::PositionClosed {
            instrument,
            reason,
            realized_pnl: closed.realized_pnl(),
            at: closed.closed_at,
        });
        Ok(closed)
    }
}
