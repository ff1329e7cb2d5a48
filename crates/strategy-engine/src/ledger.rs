//! Position ledger: at most one open position per instrument.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use tracing::{error, info};

use ratio_spread_core::{ClosedPosition, ExitFill, ExitReason, Position, StrategyError, StrategyState};

use crate::journal::{LedgerJournal, LedgerSnapshot};

#[derive(Debug, Default)]
struct LedgerState {
    open: BTreeMap<String, Position>,
    archive: Vec<ClosedPosition>,
}

/// Store of open and archived positions.
///
/// Only the basket and exit executors mutate it. When a journal is attached
/// every mutation is written through to disk.
#[derive(Debug, Default)]
pub struct PositionLedger {
    state: RwLock<LedgerState>,
    journal: Option<LedgerJournal>,
}

impl PositionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger backed by `journal`, pre-loaded with whatever it holds.
    ///
    /// # Errors
    ///
    /// [`StrategyError::Journal`] if the journal exists but cannot be read.
    pub fn with_journal(journal: LedgerJournal) -> Result<Self, StrategyError> {
        let snapshot = journal.load()?;
        Ok(Self {
            state: RwLock::new(LedgerState {
                open: snapshot.open,
                archive: snapshot.archive,
            }),
            journal: Some(journal),
        })
    }

    /// Records a freshly opened position.
    ///
    /// # Errors
    ///
    /// [`StrategyError::PositionAlreadyOpen`] if the instrument's slot is taken.
    pub fn open(&self, position: Position) -> Result<(), StrategyError> {
        {
            let mut state = self.state.write();
            if state.open.contains_key(&position.instrument) {
                return Err(StrategyError::PositionAlreadyOpen(position.instrument));
            }
            info!(
                instrument = %position.instrument,
                capital = %position.deployed_capital(),
                "Position recorded"
            );
            state.open.insert(position.instrument.clone(), position);
        }
        self.persist(None);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, instrument: &str) -> Option<Position> {
        self.state.read().open.get(instrument).cloned()
    }

    /// Marks the open position EXITING for `reason` and returns it.
    ///
    /// A position already EXITING keeps the reason it was first closed for.
    ///
    /// # Errors
    ///
    /// [`StrategyError::NoOpenPosition`] if nothing is open for `instrument`.
    pub fn begin_exit(&self, instrument: &str, reason: ExitReason) -> Result<Position, StrategyError> {
        let position = {
            let mut state = self.state.write();
            let position = state
                .open
                .get_mut(instrument)
                .ok_or_else(|| StrategyError::NoOpenPosition(instrument.to_string()))?;
            position.status = StrategyState::Exiting;
            position.exit_reason.get_or_insert(reason);
            position.clone()
        };
        self.persist(None);
        Ok(position)
    }

    /// Records a confirmed closing fill against the open position.
    ///
    /// # Errors
    ///
    /// [`StrategyError::NoOpenPosition`] if nothing is open for `instrument`.
    pub fn record_exit_fill(&self, instrument: &str, fill: ExitFill) -> Result<(), StrategyError> {
        {
            let mut state = self.state.write();
            let position = state
                .open
                .get_mut(instrument)
                .ok_or_else(|| StrategyError::NoOpenPosition(instrument.to_string()))?;
            position.exit_fills.push(fill);
        }
        self.persist(None);
        Ok(())
    }

    /// Archives `closed` and frees the instrument's slot.
    ///
    /// # Errors
    ///
    /// [`StrategyError::NoOpenPosition`] if nothing is open for `instrument`.
    pub fn close(&self, instrument: &str, closed: ClosedPosition) -> Result<(), StrategyError> {
        let closed_at = closed.closed_at;
        {
            let mut state = self.state.write();
            if state.open.remove(instrument).is_none() {
                return Err(StrategyError::NoOpenPosition(instrument.to_string()));
            }
            info!(
                instrument,
                reason = ?closed.exit_reason(),
                realized_pnl = %closed.realized_pnl(),
                "Position archived"
            );
            state.archive.push(closed);
        }
        self.persist(Some(closed_at));
        Ok(())
    }

    #[must_use]
    pub fn archive(&self) -> Vec<ClosedPosition> {
        self.state.read().archive.clone()
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.read().open.len()
    }

    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read();
        LedgerSnapshot {
            open: state.open.clone(),
            archive: state.archive.clone(),
            saved_at: None,
        }
    }

    fn persist(&self, at: Option<NaiveDateTime>) {
        let Some(journal) = &self.journal else {
            return;
        };
        let mut snapshot = self.snapshot();
        snapshot.saved_at = at;
        // In-memory state stays authoritative.
        if let Err(e) = journal.save(&snapshot) {
            error!(path = %journal.path().display(), error = %e, "Failed to write ledger journal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ratio_spread_core::{FillStatus, Leg, OptionType, Side};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 12)
            .unwrap()
            .and_hms_opt(9, 45, 0)
            .unwrap()
    }

    fn position() -> Position {
        let leg = Leg {
            label: "LEG1_BUY_26200CE".to_string(),
            symbol: "NSE:NIFTY26O2026200CE".to_string(),
            side: Side::Buy,
            quantity: 50,
            strike: dec!(26200),
            option_type: OptionType::Ce,
            requested_price: None,
            filled_price: Some(dec!(120)),
            fill_status: FillStatus::Filled,
            order_id: Some("1".to_string()),
        };
        Position::open("NIFTY", vec![leg], now(), now().date(), dec!(6000))
    }

    #[test]
    fn one_open_position_per_instrument() {
        let ledger = PositionLedger::new();
        ledger.open(position()).unwrap();
        let err = ledger.open(position()).unwrap_err();
        assert!(matches!(err, StrategyError::PositionAlreadyOpen(ref i) if i == "NIFTY"));
        assert_eq!(ledger.open_count(), 1);
    }

    #[test]
    fn close_archives_and_frees_slot() {
        let ledger = PositionLedger::new();
        ledger.open(position()).unwrap();
        let closed = ClosedPosition::new(position(), vec![], ExitReason::Manual, now());
        ledger.close("NIFTY", closed).unwrap();

        assert!(ledger.get("NIFTY").is_none());
        assert_eq!(ledger.archive().len(), 1);
        ledger.open(position()).unwrap();
    }

    #[test]
    fn close_without_open_fails() {
        let ledger = PositionLedger::new();
        let closed = ClosedPosition::new(position(), vec![], ExitReason::Manual, now());
        assert!(matches!(
            ledger.close("NIFTY", closed),
            Err(StrategyError::NoOpenPosition(_))
        ));
        assert!(matches!(
            ledger.begin_exit("NIFTY", ExitReason::Manual),
            Err(StrategyError::NoOpenPosition(_))
        ));
    }

    #[test]
    fn journal_restores_exit_progress() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = PositionLedger::with_journal(LedgerJournal::new(&path)).unwrap();
        ledger.open(position()).unwrap();
        ledger.begin_exit("NIFTY", ExitReason::StopLoss).unwrap();
        ledger
            .record_exit_fill(
                "NIFTY",
                ExitFill {
                    leg: 0,
                    symbol: "NSE:NIFTY26O2026200CE".to_string(),
                    side: Side::Sell,
                    quantity: 20,
                    price: dec!(110),
                    order_id: "2".to_string(),
                },
            )
            .unwrap();
        drop(ledger);

        let recovered = PositionLedger::with_journal(LedgerJournal::new(&path)).unwrap();
        let position = recovered.get("NIFTY").unwrap();
        assert_eq!(position.status, StrategyState::Exiting);
        assert_eq!(position.exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(position.unclosed_quantity(0), 30);
        assert_eq!(position.deployed_capital(), dec!(6000));
    }

    #[test]
    fn second_exit_keeps_first_reason() {
        let ledger = PositionLedger::new();
        ledger.open(position()).unwrap();
        ledger.begin_exit("NIFTY", ExitReason::SessionClose).unwrap();
        let position = ledger.begin_exit("NIFTY", ExitReason::Manual).unwrap();
        assert_eq!(position.exit_reason, Some(ExitReason::SessionClose));
    }

    #[test]
    fn unreadable_journal_refuses_to_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{ \"open\": ").unwrap();

        let err = PositionLedger::with_journal(LedgerJournal::new(&path)).unwrap_err();
        assert!(matches!(err, StrategyError::Journal(_)));
    }
}
