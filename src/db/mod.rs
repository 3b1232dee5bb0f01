pub mod models;
pub mod store;

pub mod prelude {
    pub use crate::db::models::LeaderboardQuery;
    pub use crate::db::models::badge::{self, UnlockedBadge, UnlockedBadgeView, Voucher};
    pub use crate::db::models::leaderboard::{LeaderboardEntry, top_reviewers};
    pub use crate::db::models::ledger::{Ledger, Rank, ReviewedProduct, UserId};

    pub use crate::db::store::memory::MemoryLedgerStore;
    pub use crate::db::store::redis::RedisLedgerStore;
    pub use crate::db::store::{LedgerStore, StoreErr, StoreResult, Version, VersionedLedger};
}
