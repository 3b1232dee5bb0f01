use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::ledger::{Ledger, UserId};
use crate::util::env::EnvErr;

pub mod memory;
pub mod redis;

pub type StoreResult<T> = core::result::Result<T, StoreErr>;

pub type Version = u64;

#[derive(Debug, Error)]
pub enum StoreErr {
    /// The ledger changed (or appeared) between load and commit. The engine
    /// retries these; everything else surfaces unchanged.
    #[error("version conflict committing ledger for user '{0}'")]
    VersionConflict(UserId),

    #[error(transparent)]
    RedisClientError(#[from] ::redis::RedisError),

    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),

    #[error(transparent)]
    EnvErr(#[from] EnvErr),
}

#[derive(Debug, Clone)]
pub struct VersionedLedger {
    pub ledger: Ledger,
    pub version: Version,
}

/// One versioned document per user. `commit` with `expected = None` creates
/// the document only if the key is still absent; `Some(v)` replaces it only
/// if the stored version is still `v`. Either way the whole ledger (badges
/// included) lands in a single atomic write, which is what makes badge and
/// voucher issuance exactly-once across crashes and retries.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load(&self, user_id: &UserId) -> StoreResult<Option<VersionedLedger>>;

    async fn commit(&self, ledger: &Ledger, expected: Option<Version>) -> StoreResult<Version>;

    /// Snapshot of every ledger for read-only projections. Never blocks
    /// writers; staleness with respect to in-flight commits is fine.
    async fn scan(&self) -> StoreResult<Vec<Ledger>>;
}
