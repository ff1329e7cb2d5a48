#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use ratio_spread_core::{
    ManualClock, NotificationSink, Severity, StrategyConfig, StrategyEvent, StrategyState,
};
use ratio_spread_engine::{Collaborators, PositionLedger, StrategyHandle, StrategyRunner};
use ratio_spread_paper::{
    FyersSymbolResolver, PaperGateway, PaperGatewayConfig, SimulatedFeed, StaticSession,
    WeeklyExpiryCalendar,
};

pub const LEG1: &str = "NSE:NIFTY26O2026200CE";
pub const LEG2: &str = "NSE:NIFTY26O2026400CE";
pub const LEG3: &str = "NSE:NIFTY26O2026600CE";

/// Monday 2026-10-12 at `h:m`.
pub fn monday(h: u32, m: u32) -> NaiveDateTime {
    day(12, h, m)
}

pub fn day(d: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, d)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StrategyEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<StrategyEvent> {
        self.events.lock().clone()
    }

    pub fn alerts(&self, severity: Severity) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StrategyEvent::Alert {
                    severity: s,
                    message,
                    ..
                } if s == severity => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn visited(&self, state: StrategyState) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, StrategyEvent::StateChanged { to, .. } if *to == state))
    }
}

impl NotificationSink for RecordingSink {
    fn send(&self, event: StrategyEvent) {
        self.events.lock().push(event);
    }
}

pub struct Harness {
    pub config: Arc<StrategyConfig>,
    pub feed: Arc<SimulatedFeed>,
    pub gateway: Arc<PaperGateway>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
    pub ledger: Arc<PositionLedger>,
}

impl Harness {
    /// Entry fills at 120 / 60 / 25 with 116500 margin blocked:
    /// deployed capital = 6000 + 2500 long premium + 116500 = 125000.
    pub fn new(config: StrategyConfig) -> Self {
        Self::with_ledger(config, Arc::new(PositionLedger::new()))
    }

    pub fn with_ledger(config: StrategyConfig, ledger: Arc<PositionLedger>) -> Self {
        let feed = Arc::new(SimulatedFeed::new());
        feed.set_spot("NIFTY", dec!(26015));
        feed.set_quote(LEG1, dec!(120));
        feed.set_quote(LEG2, dec!(60));
        feed.set_quote(LEG3, dec!(25));

        let gateway = Arc::new(
            PaperGateway::new(PaperGatewayConfig {
                blocked_margin: Some(dec!(116500)),
                ..PaperGatewayConfig::default()
            })
            .with_feed(feed.clone()),
        );

        Self {
            config: Arc::new(config),
            feed,
            gateway,
            clock: Arc::new(ManualClock::new(monday(9, 45))),
            sink: Arc::new(RecordingSink::default()),
            ledger,
        }
    }

    pub fn runner(&self) -> (StrategyRunner, StrategyHandle) {
        let deps = Collaborators {
            session: Arc::new(StaticSession::default()),
            feed: self.feed.clone(),
            gateway: self.gateway.clone(),
            expiries: Arc::new(WeeklyExpiryCalendar::from_config(&self.config)),
            symbols: Arc::new(FyersSymbolResolver::new()),
            sink: self.sink.clone(),
            clock: self.clock.clone(),
        };
        StrategyRunner::new(self.config.clone(), deps, self.ledger.clone())
    }

    pub fn set_quotes(&self, leg1: Decimal, leg2: Decimal, leg3: Decimal) {
        self.feed.set_quote(LEG1, leg1);
        self.feed.set_quote(LEG2, leg2);
        self.feed.set_quote(LEG3, leg3);
    }

    /// Marks giving exactly +1250 (+1%): leg1 +1 x 50, leg2 -8 x 150 short.
    pub fn quotes_at_target(&self) {
        self.set_quotes(dec!(121), dec!(52), dec!(25));
    }

    pub fn orders_for(&self, symbol: &str) -> usize {
        self.gateway
            .order_log()
            .iter()
            .filter(|o| o.symbol == symbol)
            .count()
    }
}
