//! Error types for the strategy engine.
//!
//! Every failure the engine can surface maps onto one variant here. Callers
//! decide on propagation: pre-trade errors end the cycle cleanly, entry errors
//! roll back, exit errors are retried, and `RollbackFailure` / `FeedOutage`
//! are escalated as standing alerts.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::StrategyState;

/// Errors raised by the strategy engine and its collaborators.
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    /// Configuration is malformed or contradictory.
    #[error("configuration error: {0}")]
    Config(String),

    /// No expiry has exactly the requested days-to-expiry.
    #[error("no expiry found {target_dte} days from {from_date}")]
    ExpiryNotFound {
        /// Date the DTE was measured from.
        from_date: chrono::NaiveDate,
        /// Requested days to expiry.
        target_dte: i64,
    },

    /// Broker rejected an order for lack of margin.
    #[error("insufficient margin for {symbol}: {message}")]
    InsufficientMargin {
        /// Symbol of the rejected leg.
        symbol: String,
        /// Broker message.
        message: String,
    },

    /// Broker rejected a leg order.
    #[error("order rejected for {symbol}: {reason}")]
    OrderRejected {
        /// Symbol of the rejected leg.
        symbol: String,
        /// Rejection reason.
        reason: String,
    },

    /// A leg did not confirm within the fill timeout.
    #[error("order {order_id} for {symbol} not confirmed within {timeout_secs}s")]
    OrderTimeout {
        /// Symbol of the unconfirmed leg.
        symbol: String,
        /// Broker order id.
        order_id: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// Entry failed after some legs filled; every filled leg was closed again.
    #[error("partial fill rolled back: entered {entered:?}, rolled back {rolled_back:?} ({cause})")]
    PartialFill {
        /// Symbols that filled before the failure.
        entered: Vec<String>,
        /// Symbols whose compensating close confirmed.
        rolled_back: Vec<String>,
        /// The leg failure that triggered the rollback.
        cause: String,
    },

    /// A compensating close failed. Positions are left open at the broker.
    #[error("ROLLBACK FAILED, manual intervention required: unclosed {unclosed:?} ({cause})")]
    RollbackFailure {
        /// Symbols still open at the broker.
        unclosed: Vec<String>,
        /// Failure reported by the compensating order.
        cause: String,
    },

    /// Prices unavailable for too many consecutive ticks.
    #[error("feed outage: {consecutive_failures} consecutive failed ticks for {instrument}")]
    FeedOutage {
        /// Instrument being monitored.
        instrument: String,
        /// Consecutive failed ticks so far.
        consecutive_failures: u32,
    },

    /// The ledger slot for this instrument is already taken.
    #[error("position already open for {0}")]
    PositionAlreadyOpen(String),

    /// No open position exists for this instrument.
    #[error("no open position for {0}")]
    NoOpenPosition(String),

    /// State machine refused a transition.
    #[error("illegal transition from {from} on {event}")]
    IllegalTransition {
        /// State the machine was in.
        from: StrategyState,
        /// Event that was applied.
        event: String,
    },

    /// Market data could not be fetched.
    #[error("market data error: {0}")]
    Feed(String),

    /// Order gateway failure outside the cases above.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Ledger journal could not be read or written.
    #[error("journal error: {0}")]
    Journal(String),
}

impl StrategyError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true for errors that must never be silently absorbed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RollbackFailure { .. })
    }
}

/// Errors returned by an order gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Broker refused the order.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Broker refused the order for lack of margin.
    #[error("insufficient margin: required {required}, available {available}")]
    InsufficientMargin {
        /// Margin the order needs.
        required: Decimal,
        /// Margin available.
        available: Decimal,
    },

    /// Fill was not confirmed in time.
    #[error("timed out waiting for order {0}")]
    Timeout(String),

    /// Unknown order id.
    #[error("order not found: {0}")]
    NotFound(String),

    /// Transport or session failure.
    #[error("network error: {0}")]
    Network(String),

    /// Order timed out and could not be cancelled; it may still fill.
    #[error("order {order_id} unconfirmed and not cancelled: {reason}")]
    Unconfirmed {
        /// Broker order id.
        order_id: String,
        /// Why the cancel failed.
        reason: String,
    },
}

impl GatewayError {
    /// Converts a leg failure into the engine error for that leg.
    #[must_use]
    pub fn into_leg_error(self, symbol: &str, timeout_secs: u64) -> StrategyError {
        match self {
            Self::Rejected(reason) => StrategyError::OrderRejected {
                symbol: symbol.to_string(),
                reason,
            },
            Self::InsufficientMargin { .. } => StrategyError::InsufficientMargin {
                symbol: symbol.to_string(),
                message: self.to_string(),
            },
            Self::Timeout(order_id) => StrategyError::OrderTimeout {
                symbol: symbol.to_string(),
                order_id,
                timeout_secs,
            },
            Self::NotFound(_) | Self::Network(_) | Self::Unconfirmed { .. } => {
                StrategyError::OrderRejected {
                    symbol: symbol.to_string(),
                    reason: self.to_string(),
                }
            }
        }
    }
}

/// Errors returned by a market data feed.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// No quote available for the symbol.
    #[error("no quote for {0}")]
    NoQuote(String),

    /// Transport failure.
    #[error("network error: {0}")]
    Network(String),
}

impl From<FeedError> for StrategyError {
    fn from(e: FeedError) -> Self {
        Self::Feed(e.to_string())
    }
}
