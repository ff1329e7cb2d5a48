//! Paper-trading collaborators for the ratio spread engine.
//!
//! Provides a simulated order gateway and quote feed, plus the NSE weekly
//! expiry and Fyers symbol rules. Used by the CLI for dry runs and by the
//! engine's integration tests.

pub mod expiry;
pub mod market_data;
pub mod paper;
pub mod session;
pub mod symbols;

pub use expiry::WeeklyExpiryCalendar;
pub use market_data::SimulatedFeed;
pub use paper::{PaperGateway, PaperGatewayConfig, ScriptedOutcome};
pub use session::StaticSession;
pub use symbols::FyersSymbolResolver;
