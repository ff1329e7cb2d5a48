//! Commands accepted by a running strategy, and the handle that sends them.

use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use ratio_spread_core::{Position, StrategyError, StrategyState};

#[derive(Debug)]
pub enum StrategyCommand {
    /// Square off the open position now.
    ManualExit(oneshot::Sender<Result<(), StrategyError>>),
    GetStatus(oneshot::Sender<StrategyStatus>),
    Shutdown,
}

/// Point-in-time view of the strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStatus {
    pub instrument: String,
    pub state: StrategyState,
    pub position: Option<Position>,
    pub last_pnl: Option<Decimal>,
    pub last_pnl_percent: Option<Decimal>,
    pub consecutive_feed_failures: u32,
    pub last_error: Option<String>,
    pub closed_cycles: usize,
    pub total_realized_pnl: Decimal,
}

#[derive(Debug, Clone)]
pub struct StrategyHandle {
    tx: mpsc::Sender<StrategyCommand>,
}

impl StrategyHandle {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<StrategyCommand>) -> Self {
        Self { tx }
    }

    /// Requests a manual square-off and waits for it to complete.
    ///
    /// # Errors
    /// Returns an error if the runner is gone or refuses the exit
    /// (e.g. no position is open).
    pub async fn manual_exit(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(StrategyCommand::ManualExit(tx)).await?;
        rx.await??;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the command cannot be sent or the response cannot be received.
    pub async fn status(&self) -> Result<StrategyStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(StrategyCommand::GetStatus(tx)).await?;
        Ok(rx.await?)
    }

    /// # Errors
    /// Returns an error if the runner has already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(StrategyCommand::Shutdown).await?;
        Ok(())
    }
}
