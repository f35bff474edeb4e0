//! Application root: owns the ledger, applies front-end intents, and
//! persists a snapshot after every mutation.

use crate::config::{SettleConfig, ValidationPolicy};
use crate::ledger::{CloseOutcome, Confirm, LedgerError, TurnLedger, UndoOutcome};
use persistence::{FileStore, KeyValueStore, SnapshotStore};
use rust_decimal::Decimal;
use settle_codec::{commit_and_normalize, field_text, sanitize_keystroke, to_canonical, CodecError};
use settle_core::{initial_cash, Category, DisplayUnit, LedgerState, Totals};
use tracing::{debug, info, warn};

/// Shortcut buttons: each sets its category to a fixed Major amount.
pub fn quick_presets() -> [(Category, Decimal); 2] {
    [
        (Category::Salary, Decimal::new(2, 0)),
        (Category::Donation, Decimal::new(1, 0)),
    ]
}

/// Result of feeding one keystroke into a field.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// Stored as this canonical amount.
    Applied(Decimal),
    /// Dropped; the field keeps its previous value.
    Rejected(CodecError),
}

pub struct Session<S: KeyValueStore> {
    ledger: TurnLedger,
    snapshots: SnapshotStore<S>,
}

impl Session<FileStore> {
    /// Open the file-backed session described by `cfg`.
    pub fn from_config(cfg: &SettleConfig) -> Self {
        let store = FileStore::new(&cfg.store_path);
        let snapshots = SnapshotStore::with_key(store, cfg.storage_key.clone(), cfg.ttl());
        Self::open(snapshots, cfg.validation)
    }
}

impl<S: KeyValueStore> Session<S> {
    /// Restore the stored ledger, or start fresh. Nothing is written here.
    pub fn open(snapshots: SnapshotStore<S>, policy: ValidationPolicy) -> Self {
        let state = match snapshots.load() {
            Some(state) => {
                if let Err(e) = state.check_invariants(initial_cash()) {
                    warn!(error = %e, "restored ledger is inconsistent");
                }
                info!(turn = state.turn, records = state.history.len(), "ledger restored");
                state
            }
            None => {
                info!("no stored ledger, starting fresh");
                LedgerState::fresh()
            }
        };
        Self {
            ledger: TurnLedger::from_state(state, policy),
            snapshots,
        }
    }

    pub fn state(&self) -> &LedgerState {
        self.ledger.state()
    }

    pub fn ledger(&self) -> &TurnLedger {
        &self.ledger
    }

    pub fn snapshots(&self) -> &SnapshotStore<S> {
        &self.snapshots
    }

    pub fn totals(&self) -> Totals {
        self.ledger.totals()
    }

    pub fn unit(&self) -> DisplayUnit {
        self.state().unit
    }

    /// Text the input field for `category` should show.
    pub fn field_text(&self, category: Category) -> String {
        field_text(self.state().pending.get(category), self.unit())
    }

    fn persist(&mut self) {
        if let Err(e) = self.snapshots.save(self.ledger.state()) {
            warn!(error = %e, "snapshot not saved");
        }
    }

    /// Apply one keystroke's worth of field text.
    pub fn edit_field(&mut self, category: Category, raw: &str) -> EditOutcome {
        let unit = self.unit();
        match sanitize_keystroke(raw, unit) {
            Ok(text) => {
                let amount = to_canonical(&text, unit);
                self.ledger.set_field(category, amount);
                self.persist();
                EditOutcome::Applied(amount)
            }
            Err(e) => {
                debug!(%category, raw, reason = %e, "keystroke rejected");
                EditOutcome::Rejected(e)
            }
        }
    }

    /// Normalise and store a field as the player leaves it.
    pub fn commit_field(&mut self, category: Category, raw: &str) -> Decimal {
        let amount = commit_and_normalize(raw, self.unit());
        self.ledger.set_field(category, amount);
        self.persist();
        amount
    }

    pub fn quick_adjust(&mut self, category: Category, amount: Decimal) {
        self.ledger.set_field(category, amount);
        self.persist();
    }

    pub fn set_unit(&mut self, unit: DisplayUnit) {
        if self.ledger.set_unit(unit) {
            self.persist();
        }
    }

    pub fn set_team_name(&mut self, name: &str) {
        self.ledger.set_team_name(name);
        self.persist();
    }

    pub fn clear_inputs(&mut self) {
        self.ledger.clear_inputs();
        self.persist();
    }

    pub fn close_turn(&mut self, confirm: &mut impl Confirm) -> Result<CloseOutcome, LedgerError> {
        let outcome = self.ledger.close_turn(confirm)?;
        if matches!(outcome, CloseOutcome::Closed(_)) {
            self.persist();
        }
        Ok(outcome)
    }

    pub fn undo_last_turn(&mut self, confirm: &mut impl Confirm) -> UndoOutcome {
        let outcome = self.ledger.undo_last_turn(confirm);
        if matches!(outcome, UndoOutcome::Undone(_)) {
            self.persist();
        }
        outcome
    }

    pub fn reset_all(&mut self, confirm: &mut impl Confirm) -> bool {
        let done = self.ledger.reset_all(confirm);
        if done {
            self.persist();
        }
        done
    }
}
