//! Strategy lifecycle as an explicit transition table.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ratio_spread_core::{StrategyError, StrategyState};

/// Inputs that move the lifecycle forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyEventKind {
    GatePassed,
    LadderBuilt,
    LadderFailed,
    EntryFilled,
    EntryFailed,
    ExitTriggered,
    ManualExit,
    ExitConfirmed,
    Reset,
}

impl std::fmt::Display for StrategyEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Allowed transitions. Anything not listed is illegal.
const TRANSITIONS: &[(StrategyState, StrategyEventKind, StrategyState)] = &[
    (StrategyState::Idle, StrategyEventKind::GatePassed, StrategyState::Armed),
    (StrategyState::Armed, StrategyEventKind::LadderBuilt, StrategyState::Entering),
    (StrategyState::Armed, StrategyEventKind::LadderFailed, StrategyState::Idle),
    (StrategyState::Entering, StrategyEventKind::EntryFilled, StrategyState::Open),
    (StrategyState::Entering, StrategyEventKind::EntryFailed, StrategyState::Aborted),
    (StrategyState::Open, StrategyEventKind::ExitTriggered, StrategyState::Exiting),
    (StrategyState::Open, StrategyEventKind::ManualExit, StrategyState::Exiting),
    (StrategyState::Exiting, StrategyEventKind::ExitConfirmed, StrategyState::Closed),
    (StrategyState::Closed, StrategyEventKind::Reset, StrategyState::Idle),
    (StrategyState::Aborted, StrategyEventKind::Reset, StrategyState::Idle),
];

/// Looks up the target state for `event` in `from`.
///
/// # Errors
///
/// [`StrategyError::IllegalTransition`] if the pair is not in the table.
pub fn next_state(from: StrategyState, event: StrategyEventKind) -> Result<StrategyState, StrategyError> {
    TRANSITIONS
        .iter()
        .find(|(f, e, _)| *f == from && *e == event)
        .map(|(_, _, to)| *to)
        .ok_or_else(|| StrategyError::IllegalTransition {
            from,
            event: event.to_string(),
        })
}

#[derive(Debug, Clone)]
pub struct StrategyStateMachine {
    state: StrategyState,
    /// Date an entry was last attempted; the gate is not re-armed on that date.
    last_entry_attempt: Option<NaiveDate>,
}

impl Default for StrategyStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyStateMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: StrategyState::Idle,
            last_entry_attempt: None,
        }
    }

    /// Machine resuming with a position recovered from the journal.
    ///
    /// A position journaled mid-exit resumes in EXITING, anything else in OPEN.
    #[must_use]
    pub fn recovered(status: StrategyState, entry_date: NaiveDate) -> Self {
        let state = match status {
            StrategyState::Exiting => StrategyState::Exiting,
            _ => StrategyState::Open,
        };
        Self {
            state,
            last_entry_attempt: Some(entry_date),
        }
    }

    #[must_use]
    pub const fn state(&self) -> StrategyState {
        self.state
    }

    /// True when an entry was already attempted on `date`.
    #[must_use]
    pub fn attempted_on(&self, date: NaiveDate) -> bool {
        self.last_entry_attempt == Some(date)
    }

    /// Marks `date` as used; no further entry is tried that day.
    pub fn mark_attempted(&mut self, date: NaiveDate) {
        self.last_entry_attempt = Some(date);
    }

    /// Applies `event`, returning the `(from, to)` pair.
    ///
    /// # Errors
    ///
    /// [`StrategyError::IllegalTransition`]; the state is left unchanged.
    pub fn apply(&mut self, event: StrategyEventKind) -> Result<(StrategyState, StrategyState), StrategyError> {
        let from = self.state;
        let to = next_state(from, event)?;
        self.state = to;
        tracing::info!(%from, %to, %event, "State transition");
        Ok((from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_cycle() {
        let mut sm = StrategyStateMachine::new();
        let date = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
        sm.apply(StrategyEventKind::GatePassed).unwrap();
        assert!(!sm.attempted_on(date));
        sm.mark_attempted(date);
        for event in [
            StrategyEventKind::LadderBuilt,
            StrategyEventKind::EntryFilled,
            StrategyEventKind::ExitTriggered,
            StrategyEventKind::ExitConfirmed,
            StrategyEventKind::Reset,
        ] {
            sm.apply(event).unwrap();
        }
        assert_eq!(sm.state(), StrategyState::Idle);
        assert!(sm.attempted_on(date));
    }

    #[test]
    fn aborted_entry_returns_to_idle() {
        let mut sm = StrategyStateMachine::new();
        sm.apply(StrategyEventKind::GatePassed).unwrap();
        sm.apply(StrategyEventKind::LadderBuilt).unwrap();
        assert_eq!(
            sm.apply(StrategyEventKind::EntryFailed).unwrap(),
            (StrategyState::Entering, StrategyState::Aborted)
        );
        sm.apply(StrategyEventKind::Reset).unwrap();
        assert_eq!(sm.state(), StrategyState::Idle);
    }

    #[test]
    fn ladder_failure_disarms_without_using_the_day() {
        let mut sm = StrategyStateMachine::new();
        let date = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
        sm.apply(StrategyEventKind::GatePassed).unwrap();
        sm.apply(StrategyEventKind::LadderFailed).unwrap();
        assert_eq!(sm.state(), StrategyState::Idle);
        assert!(!sm.attempted_on(date));
    }

    #[test]
    fn illegal_transitions_are_rejected_and_state_kept() {
        let mut sm = StrategyStateMachine::new();
        let err = sm.apply(StrategyEventKind::ManualExit).unwrap_err();
        assert!(matches!(
            err,
            StrategyError::IllegalTransition { from: StrategyState::Idle, .. }
        ));
        assert_eq!(sm.state(), StrategyState::Idle);

        assert!(next_state(StrategyState::Entering, StrategyEventKind::ManualExit).is_err());
        assert!(next_state(StrategyState::Open, StrategyEventKind::GatePassed).is_err());
        assert!(next_state(StrategyState::Exiting, StrategyEventKind::ManualExit).is_err());
    }

    #[test]
    fn manual_exit_only_from_open() {
        let allowed: Vec<_> = TRANSITIONS
            .iter()
            .filter(|(_, e, _)| *e == StrategyEventKind::ManualExit)
            .map(|(from, _, _)| *from)
            .collect();
        assert_eq!(allowed, vec![StrategyState::Open]);
    }

    #[test]
    fn recovered_machine_is_open() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
        let sm = StrategyStateMachine::recovered(StrategyState::Open, date);
        assert_eq!(sm.state(), StrategyState::Open);
        assert!(sm.attempted_on(date));
    }

    #[test]
    fn recovered_mid_exit_stays_exiting() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
        let mut sm = StrategyStateMachine::recovered(StrategyState::Exiting, date);
        assert_eq!(sm.state(), StrategyState::Exiting);
        assert_eq!(
            sm.apply(StrategyEventKind::ExitConfirmed).unwrap(),
            (StrategyState::Exiting, StrategyState::Closed)
        );
    }
}
