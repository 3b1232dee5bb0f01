use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::models::ledger::{Ledger, UserId};
use crate::db::store::{LedgerStore, StoreErr, StoreResult, Version, VersionedLedger};

/// Process-local backend. The version compare happens under the write lock,
/// so commits have the same all-or-nothing CAS semantics as the redis
/// backend.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledgers: RwLock<HashMap<UserId, (Version, Ledger)>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self, user_id: &UserId) -> StoreResult<Option<VersionedLedger>> {
        let ledgers = self.ledgers.read().await;

        Ok(ledgers.get(user_id).map(|(version, ledger)| VersionedLedger {
            ledger: ledger.clone(),
            version: *version,
        }))
    }

    async fn commit(&self, ledger: &Ledger, expected: Option<Version>) -> StoreResult<Version> {
        let mut ledgers = self.ledgers.write().await;
        let current = ledgers.get(&ledger.user_id).map(|(version, _)| *version);

        if current != expected {
            return Err(StoreErr::VersionConflict(ledger.user_id.clone()));
        }

        let next = expected.unwrap_or(0) + 1;
        ledgers.insert(ledger.user_id.clone(), (next, ledger.clone()));

        Ok(next)
    }

    async fn scan(&self) -> StoreResult<Vec<Ledger>> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers.values().map(|(_, ledger)| ledger.clone()).collect())
    }
}
