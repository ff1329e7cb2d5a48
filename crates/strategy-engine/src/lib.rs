//! Weekly ratio call-spread engine.
//!
//! Decides when to enter, builds the strike ladder, opens it as an
//! all-or-nothing basket, watches P&L on a fixed cadence and squares off on
//! the first exit rule that fires.
//!
//! # Example
//!
//! ```ignore
//! let ledger = Arc::new(PositionLedger::new());
//! let (runner, handle) = StrategyRunner::new(config, collaborators, ledger);
//! tokio::spawn(runner.run());
//! let status = handle.status().await?;
//! ```

pub mod basket;
pub mod commands;
pub mod entry_gate;
pub mod exit;
pub mod journal;
pub mod ladder;
pub mod ledger;
pub mod monitor;
pub mod notify;
mod orders;
pub mod runner;
pub mod state_machine;

pub use basket::{submission_sequence, BasketExecutor, BasketTransaction};
pub use commands::{StrategyCommand, StrategyHandle, StrategyStatus};
pub use entry_gate::EntryGate;
pub use exit::ExitExecutor;
pub use journal::{JournalError, LedgerJournal, LedgerSnapshot};
pub use ladder::{atm_strike, build_ladder, Ladder};
pub use ledger::PositionLedger;
pub use monitor::{check_exit_rules, compute_pnl, PnlMonitor, PnlSnapshot, TickOutcome};
pub use notify::{BroadcastSink, FanoutSink, TracingSink};
pub use runner::{Collaborators, StrategyRunner};
pub use state_machine::{next_state, StrategyEventKind, StrategyStateMachine};
