use std::sync::LazyLock;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::db::models::ledger::{Ledger, UserId};
use crate::db::store::{LedgerStore, StoreErr, StoreResult, Version, VersionedLedger};
use crate::util::env::Var;
use crate::var;

static REDIS_POOL: LazyLock<OnceCell<RedisPool>> = LazyLock::new(OnceCell::new);
pub async fn redis_pool() -> StoreResult<&'static RedisPool> {
    REDIS_POOL
        .get_or_try_init(|| async { RedisPool::new().await })
        .await
}

pub struct RedisPool {
    pub manager: ConnectionManager,
}

impl RedisPool {
    #[instrument]
    pub async fn new() -> StoreResult<Self> {
        let redis_url = var!(Var::RedisUrl).await?;
        tracing::debug!(redis_url, "connecting to redis server");

        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self { manager })
    }
}

#[derive(Debug)]
pub enum RedisKey<'a> {
    Ledger(&'a UserId),
}

impl RedisKey<'_> {
    pub fn key(&self) -> String {
        match self {
            RedisKey::Ledger(user_id) => format!("reviewer:{}:ledger", user_id),
        }
    }
}

pub const LEDGER_KEY_PATTERN: &str = "reviewer:*:ledger";

/// The stored shape: the whole aggregate wrapped with its commit version.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerDocument {
    version: Version,
    ledger: Ledger,
}

// Compare-version-and-set in one server-side step. ARGV[1] is the expected
// version ('0' means the key must not exist yet), ARGV[2] the replacement
// document; returns 1 on commit, 0 on conflict.
const COMMIT_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '0' then
    if current then return 0 end
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
if not current then return 0 end
local document = cjson.decode(current)
if tostring(document['version']) ~= ARGV[1] then return 0 end
redis.call('SET', KEYS[1], ARGV[2])
return 1
"#;

static COMMIT: LazyLock<Script> = LazyLock::new(|| Script::new(COMMIT_SCRIPT));

pub struct RedisLedgerStore {
    manager: ConnectionManager,
}

impl RedisLedgerStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub async fn from_pool() -> StoreResult<Self> {
        Ok(Self::new(redis_pool().await?.manager.clone()))
    }
}

#[async_trait]
impl LedgerStore for RedisLedgerStore {
    #[instrument(skip(self), fields(user = %user_id))]
    async fn load(&self, user_id: &UserId) -> StoreResult<Option<VersionedLedger>> {
        let mut conn = self.manager.clone();
        let key = RedisKey::Ledger(user_id).key();

        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            Some(json) => {
                let document: LedgerDocument = serde_json::from_str(&json)?;
                Ok(Some(VersionedLedger {
                    ledger: document.ledger,
                    version: document.version,
                }))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, ledger), fields(user = %ledger.user_id))]
    async fn commit(&self, ledger: &Ledger, expected: Option<Version>) -> StoreResult<Version> {
        let mut conn = self.manager.clone();
        let key = RedisKey::Ledger(&ledger.user_id).key();

        let next = expected.unwrap_or(0) + 1;
        let payload = serde_json::to_string(&LedgerDocument {
            version: next,
            ledger: ledger.clone(),
        })?;

        let committed: i64 = COMMIT
            .key(&key)
            .arg(expected.unwrap_or(0).to_string())
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;

        if committed == 1 {
            Ok(next)
        } else {
            tracing::trace!(user = %ledger.user_id, "ledger commit lost the version race");
            Err(StoreErr::VersionConflict(ledger.user_id.clone()))
        }
    }

    #[instrument(skip(self))]
    async fn scan(&self) -> StoreResult<Vec<Ledger>> {
        let mut conn = self.manager.clone();

        let keys: Vec<String> = conn.keys(LEDGER_KEY_PATTERN).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<Option<String>> = conn.mget(&keys).await?;
        let mut ledgers = Vec::with_capacity(raw.len());
        for json in raw.into_iter().flatten() {
            let document: LedgerDocument = serde_json::from_str(&json)?;
            ledgers.push(document.ledger);
        }

        Ok(ledgers)
    }
}
