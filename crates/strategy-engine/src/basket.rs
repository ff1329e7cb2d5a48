//! All-or-nothing basket entry.
//!
//! Legs are submitted one at a time. Every confirmed fill pushes its
//! compensating order onto the transaction. If any later leg fails, the
//! remaining legs are never sent and the compensations run in reverse order,
//! so the broker ends flat or the failure is escalated as a
//! [`StrategyError::RollbackFailure`]. A leg whose order could be neither
//! confirmed nor cancelled counts as possibly open and is always escalated.

use std::sync::Arc;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use ratio_spread_core::{
    Fill, FillStatus, GatewayError, Leg, OrderGateway, OrderRequest, Position, Side, StrategyConfig,
    StrategyError, SubmissionOrder,
};

use crate::ladder::Ladder;
use crate::ledger::PositionLedger;
use crate::orders::place_and_confirm;

/// Order in which ladder legs are sent.
#[must_use]
pub fn submission_sequence(legs: &[Leg], order: SubmissionOrder) -> Vec<usize> {
    match order {
        SubmissionOrder::Declared => (0..legs.len()).collect(),
        SubmissionOrder::ShortsLast => {
            let (buys, sells): (Vec<usize>, Vec<usize>) =
                (0..legs.len()).partition(|i| legs[*i].side == Side::Buy);
            buys.into_iter().chain(sells).collect()
        }
    }
}

/// A compensating order owed for a filled entry leg.
#[derive(Debug, Clone)]
struct Compensation {
    symbol: String,
    request: OrderRequest,
}

/// In-flight basket entry.
#[derive(Debug)]
pub struct BasketTransaction {
    legs: Vec<Leg>,
    compensations: Vec<Compensation>,
    /// Symbols with an order in unknown state at the broker.
    unconfirmed: Vec<String>,
}

impl BasketTransaction {
    #[must_use]
    pub fn new(ladder: &Ladder) -> Self {
        Self {
            legs: ladder.legs.clone(),
            compensations: Vec::with_capacity(ladder.legs.len()),
            unconfirmed: Vec::new(),
        }
    }

    /// Symbols whose entry order has (at least partly) filled.
    #[must_use]
    pub fn entered(&self) -> Vec<String> {
        self.compensations.iter().map(|c| c.symbol.clone()).collect()
    }

    #[must_use]
    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    fn record_fill(&mut self, index: usize, fill: &Fill, request: &OrderRequest) {
        if fill.quantity > 0 {
            self.compensations.push(Compensation {
                symbol: fill.symbol.clone(),
                request: OrderRequest {
                    symbol: fill.symbol.clone(),
                    side: fill.side.opposite(),
                    quantity: fill.quantity,
                    price: None,
                    tag: format!("ROLLBACK_{}", request.tag),
                    product: request.product,
                },
            });
        }
        let leg = &mut self.legs[index];
        leg.order_id = Some(fill.order_id.clone());
        leg.filled_price = Some(fill.price);
        leg.fill_status = if fill.quantity == leg.quantity {
            FillStatus::Filled
        } else {
            FillStatus::Failed
        };
    }

    fn mark_failed(&mut self, index: usize) {
        self.legs[index].fill_status = FillStatus::Failed;
    }

    fn mark_unconfirmed(&mut self, index: usize, order_id: &str) {
        let leg = &mut self.legs[index];
        leg.fill_status = FillStatus::Pending;
        leg.order_id = Some(order_id.to_string());
        self.unconfirmed.push(leg.symbol.clone());
    }

    /// Undoes every filled leg, newest first, and maps the outcome to the
    /// error the caller reports.
    async fn rollback(
        self,
        gateway: &dyn OrderGateway,
        timeout: std::time::Duration,
        cause: StrategyError,
    ) -> StrategyError {
        if self.compensations.is_empty() && self.unconfirmed.is_empty() {
            return cause;
        }

        let entered = self.entered();
        let mut rolled_back = Vec::new();
        let mut unclosed = Vec::new();
        let mut failures = Vec::new();

        for compensation in self.compensations.iter().rev() {
            match place_and_confirm(gateway, &compensation.request, timeout).await {
                Ok(fill) if fill.quantity == compensation.request.quantity => {
                    info!(symbol = %compensation.symbol, price = %fill.price, "Entry leg rolled back");
                    rolled_back.push(compensation.symbol.clone());
                }
                Ok(fill) => {
                    failures.push(format!(
                        "{}: closed {} of {}",
                        compensation.symbol, fill.quantity, compensation.request.quantity
                    ));
                    unclosed.push(compensation.symbol.clone());
                }
                Err(e) => {
                    error!(symbol = %compensation.symbol, error = %e, "Compensating order failed");
                    failures.push(format!("{}: {e}", compensation.symbol));
                    unclosed.push(compensation.symbol.clone());
                }
            }
        }

        for symbol in &self.unconfirmed {
            failures.push(format!("{symbol}: order neither filled nor cancelled"));
            unclosed.push(symbol.clone());
        }

        if unclosed.is_empty() {
            warn!(?entered, ?rolled_back, cause = %cause, "Partial entry rolled back");
            StrategyError::PartialFill {
                entered,
                rolled_back,
                cause: cause.to_string(),
            }
        } else {
            error!(?unclosed, "Rollback incomplete, positions remain open at the broker");
            StrategyError::RollbackFailure {
                unclosed,
                cause: format!("{cause}; {}", failures.join("; ")),
            }
        }
    }
}

/// Opens a ladder as one all-or-nothing basket.
pub struct BasketExecutor {
    gateway: Arc<dyn OrderGateway>,
    ledger: Arc<PositionLedger>,
    config: Arc<StrategyConfig>,
}

impl BasketExecutor {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        ledger: Arc<PositionLedger>,
        config: Arc<StrategyConfig>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            config,
        }
    }

    /// Opens every leg of `ladder` or none of them, and records the
    /// position in the ledger on success.
    ///
    /// # Errors
    ///
    /// - [`StrategyError::PositionAlreadyOpen`] before any order is sent if
    ///   the ledger already holds a position for the instrument.
    /// - The failing leg's own error (`InsufficientMargin`, `OrderRejected`,
    ///   `OrderTimeout`) when nothing had filled yet.
    /// - [`StrategyError::PartialFill`] when filled legs were rolled back.
    /// - [`StrategyError::RollbackFailure`] when a compensating order failed
    ///   or a leg's order could be neither confirmed nor cancelled.
    pub async fn open(&self, ladder: &Ladder, now: NaiveDateTime) -> Result<Position, StrategyError> {
        if self.ledger.get(&ladder.instrument).is_some() {
            return Err(StrategyError::PositionAlreadyOpen(ladder.instrument.clone()));
        }

        let timeout = self.config.fill_timeout();
        let timeout_secs = self.config.fill_timeout_seconds;
        let mut tx = BasketTransaction::new(ladder);

        for index in submission_sequence(&ladder.legs, self.config.submission_order) {
            let leg = &ladder.legs[index];
            let request = OrderRequest {
                symbol: leg.symbol.clone(),
                side: leg.side,
                quantity: leg.quantity,
                price: leg.requested_price,
                tag: leg.label.clone(),
                product: self.config.product_type,
            };

            let failure = match place_and_confirm(self.gateway.as_ref(), &request, timeout).await {
                Ok(fill) if fill.quantity == leg.quantity => {
                    info!(
                        label = %leg.label,
                        symbol = %leg.symbol,
                        quantity = fill.quantity,
                        price = %fill.price,
                        "Entry leg filled"
                    );
                    tx.record_fill(index, &fill, &request);
                    continue;
                }
                Ok(fill) => {
                    let reason = format!("filled {} of {}", fill.quantity, leg.quantity);
                    tx.record_fill(index, &fill, &request);
                    StrategyError::OrderRejected {
                        symbol: leg.symbol.clone(),
                        reason,
                    }
                }
                Err(GatewayError::Unconfirmed { order_id, reason }) => {
                    error!(label = %leg.label, %order_id, %reason, "Entry order state unknown");
                    tx.mark_unconfirmed(index, &order_id);
                    StrategyError::OrderTimeout {
                        symbol: leg.symbol.clone(),
                        order_id,
                        timeout_secs,
                    }
                }
                Err(e) => {
                    tx.mark_failed(index);
                    e.into_leg_error(&leg.symbol, timeout_secs)
                }
            };

            warn!(label = %leg.label, error = %failure, "Entry leg failed, unwinding basket");
            return Err(tx.rollback(self.gateway.as_ref(), timeout, failure).await);
        }

        let deployed_capital = self.deployed_capital(tx.legs()).await;
        info!(
            instrument = %ladder.instrument,
            %deployed_capital,
            legs = tx.legs().len(),
            "Basket filled"
        );
        let position = Position::open(
            ladder.instrument.clone(),
            tx.legs,
            now,
            ladder.expiry,
            deployed_capital,
        );
        self.ledger.open(position.clone())?;
        Ok(position)
    }

    /// Long premium paid plus margin blocked for the shorts.
    ///
    /// Uses the broker's figure when it reports one, else estimates the short
    /// margin as a fraction of the premium received.
    async fn deployed_capital(&self, legs: &[Leg]) -> Decimal {
        let premium = |side: Side| -> Decimal {
            legs.iter().filter(|l| l.side == side).map(Leg::premium).sum()
        };
        let long_premium = premium(Side::Buy);

        let margin = match self.gateway.blocked_margin().await {
            Ok(Some(margin)) => margin,
            Ok(None) => premium(Side::Sell) * self.config.short_margin_factor,
            Err(e) => {
                warn!(error = %e, "Broker margin unavailable, using estimate");
                premium(Side::Sell) * self.config.short_margin_factor
            }
        };
        long_premium + margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ratio_spread_core::OptionType;
    use rust_decimal_macros::dec;

    fn leg(symbol: &str, side: Side) -> Leg {
        Leg {
            label: symbol.to_string(),
            symbol: symbol.to_string(),
            side,
            quantity: 50,
            strike: dec!(26200),
            option_type: OptionType::Ce,
            requested_price: None,
            filled_price: None,
            fill_status: FillStatus::Pending,
            order_id: None,
        }
    }

    #[test]
    fn declared_order_is_ladder_order() {
        let legs = vec![leg("A", Side::Buy), leg("B", Side::Sell), leg("C", Side::Buy)];
        assert_eq!(submission_sequence(&legs, SubmissionOrder::Declared), vec![0, 1, 2]);
    }

    #[test]
    fn shorts_last_moves_sells_behind_buys() {
        let legs = vec![leg("A", Side::Buy), leg("B", Side::Sell), leg("C", Side::Buy)];
        assert_eq!(submission_sequence(&legs, SubmissionOrder::ShortsLast), vec![0, 2, 1]);
    }

    #[test]
    fn compensation_reverses_side_and_quantity() {
        let ladder = Ladder {
            instrument: "NIFTY".to_string(),
            expiry: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            spot: dec!(26015),
            atm: dec!(26000),
            legs: vec![leg("A", Side::Sell)],
        };
        let mut tx = BasketTransaction::new(&ladder);
        let request = OrderRequest {
            symbol: "A".to_string(),
            side: Side::Sell,
            quantity: 50,
            price: None,
            tag: "LEG1".to_string(),
            product: ratio_spread_core::ProductType::Intraday,
        };
        let fill = Fill {
            order_id: "1".to_string(),
            symbol: "A".to_string(),
            side: Side::Sell,
            quantity: 50,
            price: dec!(40),
        };
        tx.record_fill(0, &fill, &request);

        assert_eq!(tx.entered(), vec!["A".to_string()]);
        let comp = &tx.compensations[0].request;
        assert_eq!(comp.side, Side::Buy);
        assert_eq!(comp.quantity, 50);
        assert_eq!(comp.tag, "ROLLBACK_LEG1");
        assert_eq!(tx.legs()[0].fill_status, FillStatus::Filled);
    }
}
