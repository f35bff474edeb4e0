#![deny(warnings)]

//! Settlement runtime: the turn ledger state machine, its confirmation
//! seam, configuration, and the session that persists every mutation.

pub mod config;
pub mod ledger;
pub mod session;

pub use config::{ConfigError, SettleConfig, ValidationPolicy};
pub use ledger::{
    AlwaysConfirm, AlwaysDecline, CloseOutcome, Confirm, LedgerError, Prompt, TurnLedger,
    UndoOutcome,
};
pub use session::{quick_presets, EditOutcome, Session};
