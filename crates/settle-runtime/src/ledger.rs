//! Turn lifecycle over a single owned [`LedgerState`].
//!
//! Inputs accumulate in the pending bucket until `close_turn` archives
//! them as a [`TurnRecord`], nets the profit into cash and starts the next
//! turn. `undo_last_turn` and `reset_all` walk the ledger back. Every
//! transition either completes or leaves the state untouched.

use crate::config::ValidationPolicy;
use chrono::Utc;
use rust_decimal::Decimal;
use settle_codec::{is_on_step, GRANULARITY_MESSAGE};
use settle_core::{initial_cash, max_balance, Category, DisplayUnit, LedgerState, Totals, TurnRecord};
use thiserror::Error;
use tracing::info;

/// Decision points that need the player's explicit go-ahead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prompt {
    /// Closing a turn with no income and no expense.
    EmptyTurn,
    UndoLastTurn,
    ResetAll,
}

impl Prompt {
    pub fn message(self) -> &'static str {
        match self {
            Prompt::EmptyTurn => "No income or expense recorded. End the turn anyway?",
            Prompt::UndoLastTurn => "Delete the last turn record and roll back?",
            Prompt::ResetAll => "Erase every record and start the game over?",
        }
    }
}

/// Synchronous yes/no answer to a [`Prompt`].
pub trait Confirm {
    fn confirm(&mut self, prompt: Prompt) -> bool;
}

impl<F: FnMut(Prompt) -> bool> Confirm for F {
    fn confirm(&mut self, prompt: Prompt) -> bool {
        self(prompt)
    }
}

/// Says yes to everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&mut self, _prompt: Prompt) -> bool {
        true
    }
}

/// Says no to everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysDecline;

impl Confirm for AlwaysDecline {
    fn confirm(&mut self, _prompt: Prompt) -> bool {
        false
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    /// Strict policy: some pending amounts are off the settlement step.
    #[error("{} (fields: {fields:?})", GRANULARITY_MESSAGE)]
    OffStep { fields: Vec<Category> },
    /// Closing would push cash past the carried range.
    #[error("closing this turn would put cash out of range")]
    BalanceOutOfRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    Closed(TurnRecord),
    /// Empty turn and the player declined.
    Declined,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UndoOutcome {
    Undone(TurnRecord),
    Declined,
    /// History was empty.
    NothingToUndo,
}

/// Settlement state machine.
#[derive(Debug, Clone)]
pub struct TurnLedger {
    state: LedgerState,
    policy: ValidationPolicy,
}

impl Default for TurnLedger {
    fn default() -> Self {
        Self::new(ValidationPolicy::default())
    }
}

impl TurnLedger {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self::from_state(LedgerState::fresh(), policy)
    }

    pub fn from_state(state: LedgerState, policy: ValidationPolicy) -> Self {
        Self { state, policy }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn into_state(self) -> LedgerState {
        self.state
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    pub fn totals(&self) -> Totals {
        self.state.totals()
    }

    pub fn set_field(&mut self, category: Category, amount: Decimal) {
        self.state.pending.set(category, amount);
    }

    /// Returns whether the unit actually changed.
    pub fn set_unit(&mut self, unit: DisplayUnit) -> bool {
        if self.state.unit == unit {
            return false;
        }
        info!(from = %self.state.unit, to = %unit, "display unit switched");
        self.state.unit = unit;
        true
    }

    pub fn set_team_name(&mut self, name: &str) {
        self.state.team_name = name.to_string();
    }

    pub fn clear_inputs(&mut self) {
        self.state.pending.clear();
    }

    /// Pending categories that would block a strict close.
    pub fn off_step_fields(&self) -> Vec<Category> {
        self.state
            .pending
            .iter()
            .filter(|(_, amount)| !is_on_step(*amount))
            .map(|(category, _)| category)
            .collect()
    }

    pub fn close_turn(&mut self, confirm: &mut impl Confirm) -> Result<CloseOutcome, LedgerError> {
        self.close_turn_at(confirm, Utc::now().timestamp_millis())
    }

    /// `close_turn` with an explicit clock reading for the record id.
    pub fn close_turn_at(
        &mut self,
        confirm: &mut impl Confirm,
        now_ms: i64,
    ) -> Result<CloseOutcome, LedgerError> {
        if self.policy == ValidationPolicy::Strict {
            let fields = self.off_step_fields();
            if !fields.is_empty() {
                return Err(LedgerError::OffStep { fields });
            }
        }

        let totals = self.totals();
        if totals.is_empty() && !confirm.confirm(Prompt::EmptyTurn) {
            return Ok(CloseOutcome::Declined);
        }

        let balance_after = self
            .state
            .cash
            .checked_add(totals.profit)
            .filter(|b| b.abs() <= max_balance())
            .ok_or(LedgerError::BalanceOutOfRange)?;
        let id = match self.state.history.first() {
            Some(newest) => now_ms.max(newest.id.saturating_add(1)),
            None => now_ms,
        };
        let record = TurnRecord {
            id,
            turn: self.state.turn,
            income: totals.income,
            expense: totals.expense,
            profit: totals.profit,
            balance_after,
            details: self.state.pending.clone(),
        };
        self.state.history.insert(0, record.clone());
        self.state.cash = balance_after;
        self.state.turn = self.state.turn.saturating_add(1);
        self.state.pending.clear();
        info!(
            turn = record.turn,
            profit = %record.profit,
            balance = %record.balance_after,
            "turn closed"
        );
        Ok(CloseOutcome::Closed(record))
    }

    /// Roll back the newest turn. Pending inputs are left as they are.
    pub fn undo_last_turn(&mut self, confirm: &mut impl Confirm) -> UndoOutcome {
        if self.state.history.is_empty() {
            return UndoOutcome::NothingToUndo;
        }
        if !confirm.confirm(Prompt::UndoLastTurn) {
            return UndoOutcome::Declined;
        }
        let record = self.state.history.remove(0);
        self.state.cash = record.balance_before();
        self.state.turn = record.turn.max(1);
        info!(turn = record.turn, cash = %self.state.cash, "turn undone");
        UndoOutcome::Undone(record)
    }

    /// Start the game over. The team name and display unit are kept.
    pub fn reset_all(&mut self, confirm: &mut impl Confirm) -> bool {
        if !confirm.confirm(Prompt::ResetAll) {
            return false;
        }
        self.state.cash = initial_cash();
        self.state.turn = 1;
        self.state.history.clear();
        self.state.pending.clear();
        info!("ledger reset");
        true
    }
}
