//! Strategy configuration.
//!
//! Loaded once at startup, validated, then shared immutably with every
//! component. Nothing mutates it after [`StrategyConfig::validate`] passes.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StrategyError;
use crate::types::Side;

/// Broker product type. Decides whether positions are squared off at session close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductType {
    /// Squared off by the session-close rule.
    #[default]
    Intraday,
    /// Carried overnight; only target, stop and duration rules apply.
    Margin,
}

/// Order in which basket legs are sent to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionOrder {
    /// Ladder order as configured.
    #[default]
    Declared,
    /// All BUY legs first, then SELL legs, each group in ladder order.
    ShortsLast,
}

/// Retry schedule for closing orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRetryConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Attempts with exponential backoff before dropping to the slow cadence.
    #[serde(default = "default_max_fast_attempts")]
    pub max_fast_attempts: u32,
    #[serde(default = "default_slow_retry_seconds")]
    pub slow_retry_seconds: u64,
}

impl Default for ExitRetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_fast_attempts: default_max_fast_attempts(),
            slow_retry_seconds: default_slow_retry_seconds(),
        }
    }
}

impl ExitRetryConfig {
    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt > self.max_fast_attempts {
            return Duration::from_secs(self.slow_retry_seconds);
        }
        let exp = attempt.saturating_sub(1).min(20);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Complete strategy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Underlying index, e.g. `NIFTY`.
    pub instrument: String,
    pub entry_weekday: Weekday,
    #[serde(with = "clock_time")]
    pub entry_time: NaiveTime,
    /// Calendar days from entry date to expiry, matched exactly.
    pub target_dte: i64,
    /// Profit target as percent of deployed capital.
    pub target_percent: Decimal,
    /// Stop loss as percent of deployed capital (positive number).
    pub stop_loss_percent: Decimal,
    pub lot_size: u32,
    /// Holding limit in trading days.
    pub duration_days: u32,
    pub strike_offsets: Vec<i64>,
    pub sides: Vec<Side>,
    pub ratio: Vec<u32>,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_session_close_time", with = "clock_time")]
    pub session_close_time: NaiveTime,

    #[serde(default = "default_session_open_time", with = "clock_time")]
    pub session_open_time: NaiveTime,
    #[serde(default = "default_strike_increment")]
    pub strike_increment: Decimal,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_expiry_weekday")]
    pub expiry_weekday: Weekday,
    #[serde(default)]
    pub holidays: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub product_type: ProductType,
    #[serde(default)]
    pub submission_order: SubmissionOrder,
    #[serde(default = "default_fill_timeout_seconds")]
    pub fill_timeout_seconds: u64,
    /// Fraction of short premium assumed as blocked margin when the broker does not report it.
    #[serde(default = "default_short_margin_factor")]
    pub short_margin_factor: Decimal,
    /// Consecutive failed monitor ticks before a feed-outage alert.
    #[serde(default = "default_max_feed_failures")]
    pub max_feed_failures: u32,
    #[serde(default)]
    pub exit_retry: ExitRetryConfig,
    /// Ledger journal file. No journaling when absent.
    #[serde(default)]
    pub journal_path: Option<String>,
}

fn default_poll_interval_seconds() -> u64 {
    30
}

fn default_session_close_time() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN)
}

fn default_session_open_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN)
}

fn default_strike_increment() -> Decimal {
    Decimal::from(100)
}

fn default_timezone() -> String {
    "Asia/Kolkata".to_string()
}

const fn default_expiry_weekday() -> Weekday {
    Weekday::Tue
}

const fn default_fill_timeout_seconds() -> u64 {
    10
}

fn default_short_margin_factor() -> Decimal {
    Decimal::new(3, 1)
}

const fn default_max_feed_failures() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    1_000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_max_fast_attempts() -> u32 {
    5
}

const fn default_slow_retry_seconds() -> u64 {
    60
}

impl StrategyConfig {
    /// The Monday 8-DTE NIFTY 1:3:2 call ladder.
    #[must_use]
    pub fn nifty_ratio_spread() -> Self {
        Self {
            instrument: "NIFTY".to_string(),
            entry_weekday: Weekday::Mon,
            entry_time: NaiveTime::from_hms_opt(9, 45, 0).unwrap_or(NaiveTime::MIN),
            target_dte: 8,
            target_percent: Decimal::ONE,
            stop_loss_percent: Decimal::ONE,
            lot_size: 50,
            duration_days: 5,
            strike_offsets: vec![200, 400, 600],
            sides: vec![Side::Buy, Side::Sell, Side::Buy],
            ratio: vec![1, 3, 2],
            poll_interval_seconds: default_poll_interval_seconds(),
            session_close_time: default_session_close_time(),
            session_open_time: default_session_open_time(),
            strike_increment: default_strike_increment(),
            timezone: default_timezone(),
            expiry_weekday: default_expiry_weekday(),
            holidays: BTreeSet::new(),
            product_type: ProductType::default(),
            submission_order: SubmissionOrder::default(),
            fill_timeout_seconds: default_fill_timeout_seconds(),
            short_margin_factor: default_short_margin_factor(),
            max_feed_failures: default_max_feed_failures(),
            exit_retry: ExitRetryConfig::default(),
            journal_path: None,
        }
    }

    /// Checks the configuration for malformed or contradictory values.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::Config`] naming the first violation.
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.instrument.trim().is_empty() {
            return Err(StrategyError::config("instrument must not be empty"));
        }
        if self.strike_offsets.is_empty() {
            return Err(StrategyError::config("strike_offsets must not be empty"));
        }
        let legs = self.strike_offsets.len();
        if self.sides.len() != legs || self.ratio.len() != legs {
            return Err(StrategyError::config(format!(
                "strike_offsets ({legs}), sides ({}) and ratio ({}) must have the same length",
                self.sides.len(),
                self.ratio.len()
            )));
        }
        if self.ratio.iter().any(|r| *r == 0) {
            return Err(StrategyError::config("ratio entries must be positive"));
        }
        if self.lot_size == 0 {
            return Err(StrategyError::config("lot_size must be positive"));
        }
        if self.target_dte < 0 {
            return Err(StrategyError::config("target_dte must not be negative"));
        }
        if self.target_percent <= Decimal::ZERO {
            return Err(StrategyError::config("target_percent must be positive"));
        }
        if self.stop_loss_percent <= Decimal::ZERO {
            return Err(StrategyError::config("stop_loss_percent must be positive"));
        }
        if self.duration_days == 0 {
            return Err(StrategyError::config("duration_days must be positive"));
        }
        if self.poll_interval_seconds == 0 {
            return Err(StrategyError::config("poll_interval_seconds must be positive"));
        }
        if self.fill_timeout_seconds == 0 {
            return Err(StrategyError::config("fill_timeout_seconds must be positive"));
        }
        if self.strike_increment <= Decimal::ZERO {
            return Err(StrategyError::config("strike_increment must be positive"));
        }
        if self.short_margin_factor < Decimal::ZERO {
            return Err(StrategyError::config("short_margin_factor must not be negative"));
        }
        if self.max_feed_failures == 0 {
            return Err(StrategyError::config("max_feed_failures must be positive"));
        }
        if self.session_open_time >= self.session_close_time {
            return Err(StrategyError::config(format!(
                "session_open_time {} must be before session_close_time {}",
                self.session_open_time, self.session_close_time
            )));
        }
        if self.entry_time >= self.session_close_time {
            return Err(StrategyError::config(format!(
                "entry_time {} is at or after session_close_time {}",
                self.entry_time, self.session_close_time
            )));
        }
        if self.exit_retry.initial_backoff_ms == 0 || self.exit_retry.slow_retry_seconds == 0 {
            return Err(StrategyError::config("exit_retry delays must be positive"));
        }
        self.tz()?;
        Ok(())
    }

    /// Exchange timezone.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::Config`] for an unknown IANA name.
    pub fn tz(&self) -> Result<Tz, StrategyError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| StrategyError::config(format!("unknown timezone {}: {e}", self.timezone)))
    }

    /// Per-leg quantities (ratio x lot size).
    #[must_use]
    pub fn quantities(&self) -> Vec<u32> {
        self.ratio.iter().map(|r| r * self.lot_size).collect()
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    #[must_use]
    pub const fn fill_timeout(&self) -> Duration {
        Duration::from_secs(self.fill_timeout_seconds)
    }
}

/// `HH:MM` or `HH:MM:SS` clock times.
mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
            .map_err(|e| serde::de::Error::custom(format!("invalid time {raw:?}: {e}")))
    }
}
