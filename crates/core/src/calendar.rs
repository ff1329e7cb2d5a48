//! Exchange trading calendar.
//!
//! A trading day is a Monday-Friday date that is not a configured holiday.
//! Elapsed trading days since entry count the trading days strictly after the
//! entry date up to and including the current date, so the entry day is day 0
//! and a position entered on a Monday reaches day 5 on the following Monday.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::config::StrategyConfig;
use crate::types::MarketState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingCalendar {
    holidays: BTreeSet<NaiveDate>,
    session_open: NaiveTime,
    session_close: NaiveTime,
}

impl TradingCalendar {
    #[must_use]
    pub fn new(holidays: BTreeSet<NaiveDate>, session_open: NaiveTime, session_close: NaiveTime) -> Self {
        Self {
            holidays,
            session_open,
            session_close,
        }
    }

    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(
            config.holidays.clone(),
            config.session_open_time,
            config.session_close_time,
        )
    }

    #[must_use]
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Session state at `now` (exchange-local). The close instant itself counts as open.
    #[must_use]
    pub fn market_state(&self, now: NaiveDateTime) -> MarketState {
        if !self.is_trading_day(now.date()) {
            return MarketState::Closed;
        }
        let t = now.time();
        if t < self.session_open {
            MarketState::PreOpen
        } else if t <= self.session_close {
            MarketState::Open
        } else {
            MarketState::Closed
        }
    }

    /// Trading days in `(from, to]`. Zero when `to <= from`.
    #[must_use]
    pub fn trading_days_between(&self, from: NaiveDate, to: NaiveDate) -> u32 {
        let mut count = 0;
        let mut day = from;
        while day < to {
            day += Duration::days(1);
            if self.is_trading_day(day) {
                count += 1;
            }
        }
        count
    }

    /// Latest trading day on or before `date`.
    #[must_use]
    pub fn trading_day_on_or_before(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date;
        // Bounded: a week of holidays on top of a weekend is already absurd.
        for _ in 0..14 {
            if self.is_trading_day(day) {
                return day;
            }
            day -= Duration::days(1);
        }
        date
    }
}
