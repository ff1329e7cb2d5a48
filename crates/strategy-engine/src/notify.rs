//! Notification sinks.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use ratio_spread_core::{NotificationSink, Severity, StrategyEvent};

/// Writes every event to the tracing subscriber at a level matching its severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn send(&self, event: StrategyEvent) {
        match event.severity() {
            Severity::Info => info!(?event, "Strategy event"),
            Severity::Warning => warn!(?event, "Strategy event"),
            Severity::Critical => error!(?event, "Strategy alert"),
        }
    }
}

/// Publishes events on a broadcast channel. Events with no subscriber are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<StrategyEvent>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StrategyEvent> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn send(&self, event: StrategyEvent) {
        let _ = self.tx.send(event);
    }
}

/// Forwards each event to several sinks.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanoutSink {
    fn send(&self, event: StrategyEvent) {
        for sink in &self.sinks {
            sink.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn alert() -> StrategyEvent {
        StrategyEvent::Alert {
            instrument: "NIFTY".to_string(),
            severity: Severity::Critical,
            message: "feed outage".to_string(),
            at: NaiveDate::from_ymd_opt(2026, 10, 12)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn broadcast_without_subscribers_does_not_fail() {
        BroadcastSink::new(8).send(alert());
    }

    #[tokio::test]
    async fn fanout_reaches_every_subscriber() {
        let a = BroadcastSink::new(8);
        let b = BroadcastSink::new(8);
        let mut rx_a = a.subscribe();
        let mut rx_b = b.subscribe();
        let fanout = FanoutSink::new()
            .with(Arc::new(a))
            .with(Arc::new(b))
            .with(Arc::new(TracingSink));

        fanout.send(alert());

        assert_eq!(rx_a.recv().await.unwrap().severity(), Severity::Critical);
        assert_eq!(rx_b.recv().await.unwrap().severity(), Severity::Critical);
    }
}
