//! In-memory quote feed with failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use ratio_spread_core::{FeedError, MarketDataFeed};
use rust_decimal::Decimal;
use tracing::debug;

/// Quote feed backed by settable prices.
///
/// `fail_next` makes the next N requests fail with a network error, and
/// `set_offline` fails every request until switched back.
#[derive(Debug, Default)]
pub struct SimulatedFeed {
    spots: RwLock<HashMap<String, Decimal>>,
    quotes: RwLock<HashMap<String, Decimal>>,
    /// Served for symbols without a quote of their own.
    default_quote: RwLock<Option<Decimal>>,
    pending_failures: AtomicU32,
    offline: AtomicBool,
}

impl SimulatedFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_spot(&self, instrument: &str, price: Decimal) {
        self.spots.write().insert(instrument.to_string(), price);
    }

    pub fn set_quote(&self, symbol: &str, price: Decimal) {
        self.quotes.write().insert(symbol.to_string(), price);
    }

    pub fn set_default_quote(&self, price: Option<Decimal>) {
        *self.default_quote.write() = price;
    }

    /// Current price for `symbol` (or the default quote), bypassing failure injection.
    #[must_use]
    pub fn peek_quote(&self, symbol: &str) -> Option<Decimal> {
        self.quotes
            .read()
            .get(symbol)
            .copied()
            .or(*self.default_quote.read())
    }

    pub fn fail_next(&self, requests: u32) {
        self.pending_failures.store(requests, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), FeedError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(FeedError::Network("feed offline".to_string()));
        }
        let consumed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(FeedError::Network("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataFeed for SimulatedFeed {
    async fn get_spot(&self, instrument: &str) -> Result<Decimal, FeedError> {
        self.check_available()?;
        let spot = self.spots.read().get(instrument).copied();
        debug!(instrument, ?spot, "Spot requested");
        spot.ok_or_else(|| FeedError::NoQuote(instrument.to_string()))
    }

    async fn get_quote(&self, symbol: &str) -> Result<Decimal, FeedError> {
        self.check_available()?;
        self.peek_quote(symbol)
            .ok_or_else(|| FeedError::NoQuote(symbol.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn serves_configured_prices() {
        let feed = SimulatedFeed::new();
        feed.set_spot("NIFTY", dec!(26015));
        feed.set_quote("NSE:A", dec!(120));

        assert_eq!(feed.get_spot("NIFTY").await.unwrap(), dec!(26015));
        assert_eq!(feed.get_quote("NSE:A").await.unwrap(), dec!(120));
        assert!(matches!(
            feed.get_quote("NSE:B").await,
            Err(FeedError::NoQuote(_))
        ));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let feed = SimulatedFeed::new();
        feed.set_quote("NSE:A", dec!(120));
        feed.fail_next(2);

        assert!(feed.get_quote("NSE:A").await.is_err());
        assert!(feed.get_quote("NSE:A").await.is_err());
        assert!(feed.get_quote("NSE:A").await.is_ok());
    }

    #[tokio::test]
    async fn default_quote_covers_unknown_symbols() {
        let feed = SimulatedFeed::new();
        feed.set_quote("NSE:A", dec!(120));
        feed.set_default_quote(Some(dec!(75)));

        assert_eq!(feed.get_quote("NSE:A").await.unwrap(), dec!(120));
        assert_eq!(feed.get_quote("NSE:Z").await.unwrap(), dec!(75));
    }

    #[tokio::test]
    async fn offline_feed_fails_until_restored() {
        let feed = SimulatedFeed::new();
        feed.set_spot("NIFTY", dec!(26000));
        feed.set_offline(true);
        assert!(feed.get_spot("NIFTY").await.is_err());
        feed.set_offline(false);
        assert!(feed.get_spot("NIFTY").await.is_ok());
    }
}
