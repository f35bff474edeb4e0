#![deny(warnings)]

//! Persistence layer: ledger snapshots in an expiring key-value store.

pub mod snapshot;
pub mod store;

use settle_core::LedgerState;
use std::time::Duration;
use tracing::{debug, warn};

pub use store::{FileStore, JarEntry, KeyValueStore, MemoryStore, SameSite, StoreError};

/// Key the snapshot is stored under by default.
pub const DEFAULT_KEY: &str = "gaon_settlement_state";

/// Default snapshot lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 14);

/// Saves and restores one ledger snapshot under a fixed key.
#[derive(Debug, Clone)]
pub struct SnapshotStore<S> {
    store: S,
    key: String,
    ttl: Duration,
}

impl<S: KeyValueStore> SnapshotStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_key(store, DEFAULT_KEY, DEFAULT_TTL)
    }

    pub fn with_key(store: S, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Write the full snapshot, refreshing its expiry.
    pub fn save(&mut self, state: &LedgerState) -> Result<(), StoreError> {
        let encoded =
            snapshot::encode(state).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.store.save(&self.key, &encoded, self.ttl)?;
        debug!(key = %self.key, turn = state.turn, "snapshot saved");
        Ok(())
    }

    /// Restore the stored snapshot. Read and decode failures both read as
    /// "nothing stored".
    pub fn load(&self) -> Option<LedgerState> {
        let stored = match self.store.load(&self.key) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "snapshot store unreadable");
                return None;
            }
        };
        let state = snapshot::decode(&stored);
        if state.is_none() {
            warn!(key = %self.key, "discarding undecodable snapshot");
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use settle_core::{Category, DisplayUnit};

    #[test]
    fn defaults_match_cookie_contract() {
        assert_eq!(DEFAULT_KEY, "gaon_settlement_state");
        assert_eq!(DEFAULT_TTL.as_secs(), 1_209_600);
    }

    #[test]
    fn save_then_load() {
        let mut snaps = SnapshotStore::new(MemoryStore::new());
        assert_eq!(snaps.load(), None);
        let mut state = LedgerState::fresh();
        state.team_name = "Greens".into();
        state.unit = DisplayUnit::Minor;
        state.pending.set(Category::Salary, Decimal::new(2, 0));
        snaps.save(&state).unwrap();
        assert_eq!(snaps.load(), Some(state));
    }

    #[test]
    fn garbage_value_loads_as_nothing() {
        let mut snaps = SnapshotStore::new(MemoryStore::new());
        snaps
            .inner_mut()
            .save(DEFAULT_KEY, "%7Bnot-json", DEFAULT_TTL)
            .unwrap();
        assert_eq!(snaps.load(), None);
    }

    #[test]
    fn file_backed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saves/settlement.json");
        let mut snaps = SnapshotStore::new(FileStore::new(&path));
        let mut state = LedgerState::fresh();
        state.cash = Decimal::new(-35, 1);
        snaps.save(&state).unwrap();

        let reopened = SnapshotStore::new(FileStore::new(&path));
        assert_eq!(reopened.load().map(|s| s.cash), Some(Decimal::new(-35, 1)));

        std::fs::write(&path, "oops").unwrap();
        assert_eq!(reopened.load(), None);
    }
}
