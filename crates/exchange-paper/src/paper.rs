//! Paper order gateway.
//!
//! Fills every order locally, at the limit price if one was given, otherwise
//! at the configured per-symbol price, the linked feed's quote, or the default
//! price. Outcomes can be scripted per symbol to exercise rejections, margin
//! shortfalls, timeouts and failing closes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use ratio_spread_core::{Fill, GatewayError, OrderGateway, OrderRequest};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::market_data::SimulatedFeed;

/// Outcome forced onto the next order for a symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedOutcome {
    /// Fill at the normal paper price.
    Fill,
    /// Fill at this price.
    FillAt(Decimal),
    /// Refuse the order at submission.
    Reject(String),
    /// Refuse the order for lack of margin.
    InsufficientMargin,
    /// Accept the order but never fill it.
    Timeout,
    /// Accept the order, let the first wait time out, then fill it.
    LateFill,
    /// Accept the order, never fill it and refuse every cancel.
    Stuck,
    /// Fail the submission with a transport error.
    NetworkError,
}

#[derive(Debug, Clone)]
pub struct PaperGatewayConfig {
    /// Price used when nothing else prices the symbol.
    pub default_fill_price: Decimal,
    /// Simulated delay before a fill confirms.
    pub fill_latency_ms: u64,
    /// Margin reported through `blocked_margin`. `None` lets the caller estimate.
    pub blocked_margin: Option<Decimal>,
}

impl Default for PaperGatewayConfig {
    fn default() -> Self {
        Self {
            default_fill_price: dec!(100),
            fill_latency_ms: 0,
            blocked_margin: None,
        }
    }
}

#[derive(Debug, Clone)]
enum PaperOrderState {
    Filled(Decimal),
    Working,
    /// Fills on the first wait, which still reports a timeout.
    Late(Decimal),
    Stuck,
    Cancelled,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    state: PaperOrderState,
}

#[derive(Debug, Default)]
struct PaperState {
    orders: HashMap<String, PaperOrder>,
    /// Every submission, accepted or not, in arrival order.
    log: Vec<OrderRequest>,
    scripts: HashMap<String, VecDeque<ScriptedOutcome>>,
    prices: HashMap<String, Decimal>,
    /// Net signed filled quantity per symbol.
    net: HashMap<String, i64>,
    blocked_margin: Option<Decimal>,
}

pub struct PaperGateway {
    config: PaperGatewayConfig,
    state: RwLock<PaperState>,
    feed: Option<Arc<SimulatedFeed>>,
}

impl std::fmt::Debug for PaperGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PaperGateway {
    #[must_use]
    pub fn new(config: PaperGatewayConfig) -> Self {
        let state = PaperState {
            blocked_margin: config.blocked_margin,
            ..PaperState::default()
        };
        Self {
            config,
            state: RwLock::new(state),
            feed: None,
        }
    }

    /// Prices market orders from the feed's current quotes.
    #[must_use]
    pub fn with_feed(mut self, feed: Arc<SimulatedFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Queues outcomes for the next orders on `symbol`.
    pub fn script(&self, symbol: &str, outcomes: impl IntoIterator<Item = ScriptedOutcome>) {
        self.state
            .write()
            .scripts
            .entry(symbol.to_string())
            .or_default()
            .extend(outcomes);
    }

    pub fn set_fill_price(&self, symbol: &str, price: Decimal) {
        self.state.write().prices.insert(symbol.to_string(), price);
    }

    pub fn set_blocked_margin(&self, margin: Option<Decimal>) {
        self.state.write().blocked_margin = margin;
    }

    /// All submissions so far, including refused ones.
    #[must_use]
    pub fn order_log(&self) -> Vec<OrderRequest> {
        self.state.read().log.clone()
    }

    #[must_use]
    pub fn submitted_symbols(&self) -> Vec<String> {
        self.state.read().log.iter().map(|o| o.symbol.clone()).collect()
    }

    /// Net signed filled quantity held on `symbol`.
    #[must_use]
    pub fn net_position(&self, symbol: &str) -> i64 {
        self.state.read().net.get(symbol).copied().unwrap_or(0)
    }

    /// True when every symbol ever traded is flat.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.state.read().net.values().all(|q| *q == 0)
    }

    fn paper_price(&self, state: &PaperState, order: &OrderRequest) -> Decimal {
        if let Some(limit) = order.price {
            return limit;
        }
        if let Some(price) = state.prices.get(&order.symbol) {
            return *price;
        }
        self.feed
            .as_ref()
            .and_then(|feed| feed.peek_quote(&order.symbol))
            .unwrap_or(self.config.default_fill_price)
    }

    /// Turns a late order into a fill and books it.
    fn complete_late(state: &mut PaperState, order_id: &str) {
        let Some(order) = state.orders.get_mut(order_id) else {
            return;
        };
        let PaperOrderState::Late(price) = order.state else {
            return;
        };
        order.state = PaperOrderState::Filled(price);
        let signed = order.request.side.sign() * i64::from(order.request.quantity);
        let symbol = order.request.symbol.clone();
        *state.net.entry(symbol).or_insert(0) += signed;
        info!(order_id, %price, "Paper order filled late");
    }

    fn generate_order_id() -> String {
        format!("PAPER-{}", Uuid::new_v4())
    }
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new(PaperGatewayConfig::default())
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn submit(&self, order: &OrderRequest) -> Result<String, GatewayError> {
        let mut state = self.state.write();
        state.log.push(order.clone());

        let scripted = state
            .scripts
            .get_mut(&order.symbol)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedOutcome::Fill);

        let order_state = match scripted {
            ScriptedOutcome::Fill => PaperOrderState::Filled(self.paper_price(&state, order)),
            ScriptedOutcome::FillAt(price) => PaperOrderState::Filled(price),
            ScriptedOutcome::Timeout => PaperOrderState::Working,
            ScriptedOutcome::LateFill => PaperOrderState::Late(self.paper_price(&state, order)),
            ScriptedOutcome::Stuck => PaperOrderState::Stuck,
            ScriptedOutcome::Reject(reason) => {
                warn!(symbol = %order.symbol, %reason, "Paper order rejected");
                return Err(GatewayError::Rejected(reason));
            }
            ScriptedOutcome::InsufficientMargin => {
                warn!(symbol = %order.symbol, "Paper order rejected for margin");
                return Err(GatewayError::InsufficientMargin {
                    required: self.paper_price(&state, order) * Decimal::from(order.quantity),
                    available: Decimal::ZERO,
                });
            }
            ScriptedOutcome::NetworkError => {
                return Err(GatewayError::Network("simulated connection drop".to_string()));
            }
        };

        let order_id = Self::generate_order_id();
        if let PaperOrderState::Filled(price) = order_state {
            *state.net.entry(order.symbol.clone()).or_insert(0) +=
                order.side.sign() * i64::from(order.quantity);
            info!(
                order_id = %order_id,
                symbol = %order.symbol,
                side = %order.side,
                quantity = order.quantity,
                %price,
                "Paper fill simulated"
            );
        }
        state.orders.insert(
            order_id.clone(),
            PaperOrder {
                request: order.clone(),
                state: order_state,
            },
        );
        Ok(order_id)
    }

    async fn await_fill(&self, order_id: &str, timeout: Duration) -> Result<Fill, GatewayError> {
        let order = {
            let mut state = self.state.write();
            let order = state
                .orders
                .get(order_id)
                .cloned()
                .ok_or_else(|| GatewayError::NotFound(order_id.to_string()))?;
            if matches!(order.state, PaperOrderState::Late(_)) {
                Self::complete_late(&mut state, order_id);
            }
            order
        };

        match order.state {
            PaperOrderState::Filled(price) => {
                let latency = Duration::from_millis(self.config.fill_latency_ms);
                if latency >= timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(GatewayError::Timeout(order_id.to_string()));
                }
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                Ok(Fill {
                    order_id: order_id.to_string(),
                    symbol: order.request.symbol,
                    side: order.request.side,
                    quantity: order.request.quantity,
                    price,
                })
            }
            PaperOrderState::Working | PaperOrderState::Stuck | PaperOrderState::Late(_) => {
                debug!(order_id, "Paper order working, waiting out the timeout");
                tokio::time::sleep(timeout).await;
                Err(GatewayError::Timeout(order_id.to_string()))
            }
            PaperOrderState::Cancelled => Err(GatewayError::Rejected(format!(
                "order {order_id} was cancelled"
            ))),
        }
    }

    async fn cancel(&self, order_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.write();
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| GatewayError::NotFound(order_id.to_string()))?;
        match order.state {
            PaperOrderState::Working => {
                order.state = PaperOrderState::Cancelled;
                info!(order_id, "Paper order cancelled");
                Ok(())
            }
            PaperOrderState::Cancelled => Ok(()),
            PaperOrderState::Late(_) => {
                Self::complete_late(&mut state, order_id);
                Err(GatewayError::Rejected(format!("order {order_id} already filled")))
            }
            PaperOrderState::Filled(_) => Err(GatewayError::Rejected(format!(
                "order {order_id} already filled"
            ))),
            PaperOrderState::Stuck => Err(GatewayError::Network(format!(
                "cancel for {order_id} not acknowledged"
            ))),
        }
    }

    async fn blocked_margin(&self) -> Result<Option<Decimal>, GatewayError> {
        Ok(self.state.read().blocked_margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratio_spread_core::{ProductType, Side};

    fn order(symbol: &str, side: Side, quantity: u32) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            side,
            quantity,
            price: None,
            tag: "TEST".to_string(),
            product: ProductType::Intraday,
        }
    }

    #[tokio::test]
    async fn fills_at_configured_price_and_tracks_net() {
        let gateway = PaperGateway::default();
        gateway.set_fill_price("NSE:A", dec!(120));

        let id = gateway.submit(&order("NSE:A", Side::Sell, 150)).await.unwrap();
        let fill = gateway.await_fill(&id, Duration::from_secs(1)).await.unwrap();

        assert_eq!(fill.price, dec!(120));
        assert_eq!(fill.quantity, 150);
        assert_eq!(gateway.net_position("NSE:A"), -150);

        let id = gateway.submit(&order("NSE:A", Side::Buy, 150)).await.unwrap();
        gateway.await_fill(&id, Duration::from_secs(1)).await.unwrap();
        assert!(gateway.is_flat());
    }

    #[tokio::test]
    async fn limit_price_wins() {
        let gateway = PaperGateway::default();
        let mut request = order("NSE:A", Side::Buy, 50);
        request.price = Some(dec!(88.5));
        let id = gateway.submit(&request).await.unwrap();
        let fill = gateway.await_fill(&id, Duration::from_secs(1)).await.unwrap();
        assert_eq!(fill.price, dec!(88.5));
    }

    #[tokio::test]
    async fn market_orders_use_feed_quotes() {
        let feed = Arc::new(SimulatedFeed::new());
        feed.set_quote("NSE:A", dec!(42));
        let gateway = PaperGateway::default().with_feed(feed);

        let id = gateway.submit(&order("NSE:A", Side::Buy, 50)).await.unwrap();
        let fill = gateway.await_fill(&id, Duration::from_secs(1)).await.unwrap();
        assert_eq!(fill.price, dec!(42));
    }

    #[tokio::test]
    async fn scripted_outcomes_apply_in_order() {
        let gateway = PaperGateway::default();
        gateway.script(
            "NSE:A",
            [
                ScriptedOutcome::Reject("price band".to_string()),
                ScriptedOutcome::InsufficientMargin,
                ScriptedOutcome::NetworkError,
            ],
        );

        assert!(matches!(
            gateway.submit(&order("NSE:A", Side::Sell, 150)).await,
            Err(GatewayError::Rejected(_))
        ));
        assert!(matches!(
            gateway.submit(&order("NSE:A", Side::Sell, 150)).await,
            Err(GatewayError::InsufficientMargin { .. })
        ));
        assert!(matches!(
            gateway.submit(&order("NSE:A", Side::Sell, 150)).await,
            Err(GatewayError::Network(_))
        ));
        assert!(gateway.submit(&order("NSE:A", Side::Sell, 150)).await.is_ok());
        assert_eq!(gateway.order_log().len(), 4);
        assert_eq!(gateway.net_position("NSE:A"), -150);
    }

    #[tokio::test(start_paused = true)]
    async fn working_order_times_out_and_can_be_cancelled() {
        let gateway = PaperGateway::default();
        gateway.script("NSE:A", [ScriptedOutcome::Timeout]);

        let id = gateway.submit(&order("NSE:A", Side::Buy, 50)).await.unwrap();
        let result = gateway.await_fill(&id, Duration::from_secs(10)).await;
        assert!(matches!(result, Err(GatewayError::Timeout(ref o)) if *o == id));

        gateway.cancel(&id).await.unwrap();
        assert!(matches!(
            gateway.await_fill(&id, Duration::from_secs(10)).await,
            Err(GatewayError::Rejected(_))
        ));
        assert_eq!(gateway.net_position("NSE:A"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_fill_refuses_cancel_and_confirms_on_next_wait() {
        let gateway = PaperGateway::default();
        gateway.script("NSE:A", [ScriptedOutcome::LateFill]);

        let id = gateway.submit(&order("NSE:A", Side::Buy, 50)).await.unwrap();
        assert!(matches!(
            gateway.await_fill(&id, Duration::from_secs(10)).await,
            Err(GatewayError::Timeout(_))
        ));
        assert!(gateway.cancel(&id).await.is_err());
        let fill = gateway.await_fill(&id, Duration::from_secs(10)).await.unwrap();
        assert_eq!(fill.quantity, 50);
        assert_eq!(gateway.net_position("NSE:A"), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_order_never_fills_or_cancels() {
        let gateway = PaperGateway::default();
        gateway.script("NSE:A", [ScriptedOutcome::Stuck]);

        let id = gateway.submit(&order("NSE:A", Side::Buy, 50)).await.unwrap();
        assert!(gateway.await_fill(&id, Duration::from_secs(10)).await.is_err());
        assert!(matches!(gateway.cancel(&id).await, Err(GatewayError::Network(_))));
        assert_eq!(gateway.net_position("NSE:A"), 0);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let gateway = PaperGateway::default();
        assert!(matches!(
            gateway.cancel("nope").await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reports_configured_margin() {
        let gateway = PaperGateway::new(PaperGatewayConfig {
            blocked_margin: Some(dec!(90000)),
            ..PaperGatewayConfig::default()
        });
        assert_eq!(gateway.blocked_margin().await.unwrap(), Some(dec!(90000)));
        gateway.set_blocked_margin(None);
        assert_eq!(gateway.blocked_margin().await.unwrap(), None);
    }
}
