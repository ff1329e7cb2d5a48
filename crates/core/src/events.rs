use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ExitReason, StrategyState};

/// How urgently a human needs to look at an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Events emitted to the notification sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StrategyEvent {
    StateChanged {
        instrument: String,
        from: StrategyState,
        to: StrategyState,
        at: NaiveDateTime,
    },
    PositionOpened {
        instrument: String,
        legs: usize,
        deployed_capital: Decimal,
        at: NaiveDateTime,
    },
    PnlUpdate {
        instrument: String,
        aggregate_pnl: Decimal,
        pnl_percent: Decimal,
        at: NaiveDateTime,
    },
    PositionClosed {
        instrument: String,
        reason: ExitReason,
        realized_pnl: Decimal,
        at: NaiveDateTime,
    },
    EntryAborted {
        instrument: String,
        error: String,
        at: NaiveDateTime,
    },
    /// Risk alert: rollback failure, feed outage, exit retries.
    Alert {
        instrument: String,
        severity: Severity,
        message: String,
        at: NaiveDateTime,
    },
}

impl StrategyEvent {
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::Alert { severity, .. } => *severity,
            Self::EntryAborted { .. } => Severity::Warning,
            _ => Severity::Info,
        }
    }
}
