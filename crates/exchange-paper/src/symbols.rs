//! Fyers option symbol construction.
//!
//! Weekly contracts: `NSE:NIFTY{YY}{M}{DD}{STRIKE}{CE|PE}` where the month is
//! a single character (`1`-`9`, `O`, `N`, `D`). The last expiry of a month
//! trades under the monthly form `NSE:NIFTY{YY}{MMM}{STRIKE}{CE|PE}`.

use chrono::{Datelike, Duration, NaiveDate};
use ratio_spread_core::{OptionType, SymbolResolver};
use rust_decimal::Decimal;

const MONTH_ABBREV: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

#[derive(Debug, Clone)]
pub struct FyersSymbolResolver {
    exchange: String,
}

impl FyersSymbolResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::with_exchange("NSE")
    }

    pub fn with_exchange(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
        }
    }

    /// True when no later weekly expiry falls in the same month.
    fn is_monthly(expiry: NaiveDate) -> bool {
        (expiry + Duration::days(7)).month() != expiry.month()
    }

    fn weekly_month_code(month: u32) -> char {
        match month {
            10 => 'O',
            11 => 'N',
            12 => 'D',
            m => char::from_digit(m, 10).unwrap_or('0'),
        }
    }
}

impl Default for FyersSymbolResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn format_strike(strike: Decimal) -> String {
    strike.normalize().to_string()
}

impl SymbolResolver for FyersSymbolResolver {
    fn build_symbol(
        &self,
        instrument: &str,
        expiry: NaiveDate,
        strike: Decimal,
        option_type: OptionType,
    ) -> String {
        let yy = expiry.year() % 100;
        let strike = format_strike(strike);
        if Self::is_monthly(expiry) {
            let month = MONTH_ABBREV[expiry.month0() as usize];
            format!("{}:{instrument}{yy:02}{month}{strike}{option_type}", self.exchange)
        } else {
            let month = Self::weekly_month_code(expiry.month());
            format!(
                "{}:{instrument}{yy:02}{month}{:02}{strike}{option_type}",
                self.exchange,
                expiry.day()
            )
        }
    }
}
