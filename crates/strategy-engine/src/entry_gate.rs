//! Weekly entry window check.

use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime};
use ratio_spread_core::{ExpiryCalendar, MarketState, StrategyConfig, StrategyError};
use tracing::debug;

/// Decides whether a new cycle may start at a given instant.
///
/// The gate is pure: it holds no state, so asking twice at the same instant
/// gives the same answer. Re-entry on the same day is blocked by the state
/// machine, not here.
pub struct EntryGate {
    config: Arc<StrategyConfig>,
    expiries: Arc<dyn ExpiryCalendar>,
}

impl EntryGate {
    pub fn new(config: Arc<StrategyConfig>, expiries: Arc<dyn ExpiryCalendar>) -> Self {
        Self { config, expiries }
    }

    /// Returns `Ok(true)` when every entry condition holds at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::ExpiryNotFound`] when the calendar and clock
    /// conditions pass but no expiry is exactly `target_dte` days away.
    pub fn can_enter(&self, now: NaiveDateTime, market: MarketState) -> Result<bool, StrategyError> {
        if now.weekday() != self.config.entry_weekday {
            return Ok(false);
        }
        if now.time() < self.config.entry_time {
            return Ok(false);
        }
        if market != MarketState::Open {
            debug!(?market, "Entry window reached but market not open");
            return Ok(false);
        }

        let today = now.date();
        match self.expiries.resolve_expiry(today, self.config.target_dte) {
            Some(expiry) => {
                debug!(%today, %expiry, "Entry gate passed");
                Ok(true)
            }
            None => Err(StrategyError::ExpiryNotFound {
                from_date: today,
                target_dte: self.config.target_dte,
            }),
        }
    }
}
