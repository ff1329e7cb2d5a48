//! Core types, configuration and collaborator traits for the ratio spread engine.

pub mod calendar;
pub mod clock;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;

pub use calendar::TradingCalendar;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ExitRetryConfig, ProductType, StrategyConfig, SubmissionOrder};
pub use config_loader::ConfigLoader;
pub use error::{FeedError, GatewayError, StrategyError};
pub use events::{Severity, StrategyEvent};
pub use traits::{
    BrokerSession, ExpiryCalendar, Fill, MarketDataFeed, NotificationSink, OrderGateway,
    OrderRequest, SessionHandle, SymbolResolver,
};
pub use types::{
    ClosedPosition, ExitFill, ExitReason, FillStatus, Leg, MarketState, OptionType, Position,
    Side, StrategyState,
};
