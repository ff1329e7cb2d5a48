//! Domain types shared by the engine and its collaborators.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side that flattens a position opened on this side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// +1 for BUY, -1 for SELL.
    #[must_use]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Option contract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    /// Call.
    Ce,
    /// Put.
    Pe,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ce => write!(f, "CE"),
            Self::Pe => write!(f, "PE"),
        }
    }
}

/// Entry fill status of a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillStatus {
    Pending,
    Filled,
    Failed,
}

/// Exchange session state as seen by the entry gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketState {
    PreOpen,
    Open,
    Closed,
}

/// Why a position was (or was not) closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    Target,
    StopLoss,
    Duration,
    SessionClose,
    Manual,
    AbortedOnEntry,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target => write!(f, "TARGET"),
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::Duration => write!(f, "DURATION"),
            Self::SessionClose => write!(f, "SESSION_CLOSE"),
            Self::Manual => write!(f, "MANUAL"),
            Self::AbortedOnEntry => write!(f, "ABORTED_ON_ENTRY"),
        }
    }
}

/// Strategy lifecycle state. Also used as the status of a [`Position`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyState {
    Idle,
    Armed,
    Entering,
    Open,
    Exiting,
    Closed,
    Aborted,
}

impl std::fmt::Display for StrategyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Armed => "ARMED",
            Self::Entering => "ENTERING",
            Self::Open => "OPEN",
            Self::Exiting => "EXITING",
            Self::Closed => "CLOSED",
            Self::Aborted => "ABORTED",
        };
        write!(f, "{s}")
    }
}

/// One option contract within a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    /// Order tag, e.g. `LEG1_BUY_26200CE`.
    pub label: String,
    /// Broker symbol.
    pub symbol: String,
    pub side: Side,
    /// Contracts (ratio x lot size).
    pub quantity: u32,
    pub strike: Decimal,
    pub option_type: OptionType,
    /// Limit price; `None` for market orders.
    pub requested_price: Option<Decimal>,
    pub filled_price: Option<Decimal>,
    pub fill_status: FillStatus,
    /// Broker order id of the entry order.
    pub order_id: Option<String>,
}

impl Leg {
    /// Quantity signed by side (+ long, - short).
    #[must_use]
    pub fn signed_quantity(&self) -> i64 {
        self.side.sign() * i64::from(self.quantity)
    }

    /// Mark-to-market P&L of this leg at `mark`. Zero until filled.
    #[must_use]
    pub fn pnl_at(&self, mark: Decimal) -> Decimal {
        match self.filled_price {
            Some(filled) => (mark - filled) * Decimal::from(self.signed_quantity()),
            None => Decimal::ZERO,
        }
    }

    /// Premium moved by the entry fill (positive = paid).
    #[must_use]
    pub fn premium(&self) -> Decimal {
        self.filled_price.unwrap_or(Decimal::ZERO) * Decimal::from(self.quantity)
    }
}

/// A multi-leg position, open or closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub legs: Vec<Leg>,
    pub entry_time: NaiveDateTime,
    pub expiry: NaiveDate,
    deployed_capital: Decimal,
    pub status: StrategyState,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl: Option<Decimal>,
    /// Closing fills confirmed so far while EXITING.
    #[serde(default)]
    pub exit_fills: Vec<ExitFill>,
}

impl Position {
    /// Creates an OPEN position from fully filled legs.
    ///
    /// `deployed_capital` is fixed here and has no setter.
    #[must_use]
    pub fn open(
        instrument: impl Into<String>,
        legs: Vec<Leg>,
        entry_time: NaiveDateTime,
        expiry: NaiveDate,
        deployed_capital: Decimal,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            legs,
            entry_time,
            expiry,
            deployed_capital,
            status: StrategyState::Open,
            exit_reason: None,
            realized_pnl: None,
            exit_fills: Vec::new(),
        }
    }

    /// Capital committed at entry.
    #[must_use]
    pub const fn deployed_capital(&self) -> Decimal {
        self.deployed_capital
    }

    /// Sum of signed leg quantities.
    #[must_use]
    pub fn net_quantity(&self) -> i64 {
        self.legs.iter().map(Leg::signed_quantity).sum()
    }

    /// Quantity of leg `index` not yet covered by a closing fill.
    #[must_use]
    pub fn unclosed_quantity(&self, index: usize) -> u32 {
        let Some(leg) = self.legs.get(index) else {
            return 0;
        };
        let closed: u32 = self
            .exit_fills
            .iter()
            .filter(|f| f.leg == index)
            .map(|f| f.quantity)
            .sum();
        leg.quantity.saturating_sub(closed)
    }
}

/// Confirmed fill of a closing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitFill {
    /// Index of the closed leg in [`Position::legs`].
    pub leg: usize,
    pub symbol: String,
    pub side: Side,
    pub quantity: u32,
    pub price: Decimal,
    pub order_id: String,
}

impl ExitFill {
    #[must_use]
    pub fn signed_quantity(&self) -> i64 {
        self.side.sign() * i64::from(self.quantity)
    }
}

/// Archived record of a completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_fills: Vec<ExitFill>,
    pub closed_at: NaiveDateTime,
}

impl ClosedPosition {
    /// Builds the closed record, computing realized P&L from entry and exit fills.
    #[must_use]
    pub fn new(
        mut position: Position,
        exit_fills: Vec<ExitFill>,
        reason: ExitReason,
        closed_at: NaiveDateTime,
    ) -> Self {
        let realized: Decimal = position
            .legs
            .iter()
            .enumerate()
            .map(|(index, leg)| {
                exit_fills
                    .iter()
                    .filter(|f| f.leg == index)
                    .map(|f| leg.pnl_at(f.price) * Decimal::from(f.quantity) / Decimal::from(leg.quantity.max(1)))
                    .sum::<Decimal>()
            })
            .sum();

        position.status = StrategyState::Closed;
        position.exit_reason = Some(reason);
        position.realized_pnl = Some(realized);

        Self {
            position,
            exit_fills,
            closed_at,
        }
    }

    /// Entry plus exit signed quantities. Zero when fully flat.
    #[must_use]
    pub fn net_quantity(&self) -> i64 {
        self.position.net_quantity()
            + self
                .exit_fills
                .iter()
                .map(ExitFill::signed_quantity)
                .sum::<i64>()
    }

    #[must_use]
    pub fn realized_pnl(&self) -> Decimal {
        self.position.realized_pnl.unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.position.exit_reason
    }
}
