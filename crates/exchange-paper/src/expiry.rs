//! NSE weekly expiry schedule.
//!
//! Contracts expire on a fixed weekday. When that day is a holiday the
//! expiry moves to the previous trading day.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use ratio_spread_core::{ExpiryCalendar, StrategyConfig, TradingCalendar};
use tracing::debug;

/// Weeks scanned ahead of `from_date` before giving up.
const LOOKAHEAD_WEEKS: i64 = 10;

#[derive(Debug, Clone)]
pub struct WeeklyExpiryCalendar {
    expiry_weekday: Weekday,
    trading: TradingCalendar,
}

impl WeeklyExpiryCalendar {
    #[must_use]
    pub fn new(expiry_weekday: Weekday, trading: TradingCalendar) -> Self {
        Self {
            expiry_weekday,
            trading,
        }
    }

    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.expiry_weekday, TradingCalendar::from_config(config))
    }

    /// Actual expiry dates on or after `from_date`, in order.
    pub fn expiries_from(&self, from_date: NaiveDate) -> impl Iterator<Item = NaiveDate> + '_ {
        let ahead = (i64::from(self.expiry_weekday.num_days_from_monday())
            - i64::from(from_date.weekday().num_days_from_monday()))
        .rem_euclid(7);
        let first = from_date + Duration::days(ahead);
        (0..=LOOKAHEAD_WEEKS)
            .map(move |week| first + Duration::weeks(week))
            .map(move |nominal| self.trading.trading_day_on_or_before(nominal))
            .filter(move |actual| *actual >= from_date)
    }
}

impl ExpiryCalendar for WeeklyExpiryCalendar {
    fn resolve_expiry(&self, from_date: NaiveDate, target_dte: i64) -> Option<NaiveDate> {
        let target = from_date + Duration::days(target_dte);
        let found = self.expiries_from(from_date).find(|expiry| *expiry == target);
        debug!(%from_date, target_dte, ?found, "Expiry lookup");
        found
    }
}
