//! Collaborator interfaces consumed by the engine.
//!
//! Broker sessions, quotes, expiries, symbols, orders and notifications all
//! live outside the engine. The engine only sees these traits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ProductType;
use crate::error::{FeedError, GatewayError};
use crate::events::StrategyEvent;
use crate::types::{OptionType, Side};

/// Opaque authenticated broker handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait BrokerSession: Send + Sync {
    async fn handle(&self) -> Result<SessionHandle, GatewayError>;
}

#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Last traded price of the underlying index.
    async fn get_spot(&self, instrument: &str) -> Result<Decimal, FeedError>;

    /// Mark price of an option symbol.
    async fn get_quote(&self, symbol: &str) -> Result<Decimal, FeedError>;
}

pub trait ExpiryCalendar: Send + Sync {
    /// Expiry exactly `target_dte` calendar days after `from_date`, if one exists.
    fn resolve_expiry(&self, from_date: NaiveDate, target_dte: i64) -> Option<NaiveDate>;
}

pub trait SymbolResolver: Send + Sync {
    fn build_symbol(
        &self,
        instrument: &str,
        expiry: NaiveDate,
        strike: Decimal,
        option_type: OptionType,
    ) -> String;
}

/// A single-leg order sent to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: u32,
    /// Limit price; `None` sends a market order.
    pub price: Option<Decimal>,
    /// Broker order tag.
    pub tag: String,
    pub product: ProductType,
}

/// Confirmed execution of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: u32,
    pub price: Decimal,
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Sends an order and returns the broker order id.
    async fn submit(&self, order: &OrderRequest) -> Result<String, GatewayError>;

    /// Waits for the order to fill, at most `timeout`.
    async fn await_fill(&self, order_id: &str, timeout: Duration) -> Result<Fill, GatewayError>;

    async fn cancel(&self, order_id: &str) -> Result<(), GatewayError>;

    /// Margin currently blocked by the broker, if it reports one synchronously.
    async fn blocked_margin(&self) -> Result<Option<Decimal>, GatewayError> {
        Ok(None)
    }
}

/// Best-effort event delivery. Implementations must not block or panic.
pub trait NotificationSink: Send + Sync {
    fn send(&self, event: StrategyEvent);
}
