use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use crate::db::prelude::{
    Ledger, LedgerStore, StoreErr, UnlockedBadge, UserId, badge, top_reviewers,
};
use crate::db::models::leaderboard::LeaderboardEntry;

pub mod backoff;

pub type EngineResult<T> = core::result::Result<T, EngineErr>;

/// Commit retries are bounded; conflicts only resolve this slowly when many
/// writers hammer one user, and the caller is better placed to decide whether
/// to try the whole operation again.
const MAX_COMMIT_ATTEMPTS: u32 = 8;

#[derive(Debug, Error)]
pub enum EngineErr {
    #[error("no progression ledger exists for user '{0}'")]
    NotFound(UserId),

    #[error("ledger commit contention for user '{user_id}' after {attempts} attempts")]
    Contention { user_id: UserId, attempts: u32 },

    #[error("{field} must not be empty")]
    Validation { field: &'static str },

    #[error(transparent)]
    Persistence(#[from] StoreErr),
}

#[derive(Debug, Clone)]
pub struct ContributionOutcome {
    pub ledger: Ledger,
    pub newly_unlocked: Vec<UnlockedBadge>,
}

/// The transactional boundary around one user's ledger. Every mutation loads
/// the versioned document, applies the in-memory transitions, and commits the
/// result with a single compare-and-swap; a conflict means another writer for
/// the same user got there first, so the transition is recomputed from the
/// fresh state and committed again. Different users never contend.
pub struct AggregationEngine {
    store: Arc<dyn LedgerStore>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(user = %user_id))]
    pub async fn contribute(
        &self,
        user_id: &UserId,
        product_id: &str,
        category: &str,
    ) -> EngineResult<ContributionOutcome> {
        self.contribute_at(user_id, product_id, category, Utc::now())
            .await
    }

    pub async fn contribute_at(
        &self,
        user_id: &UserId,
        product_id: &str,
        category: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<ContributionOutcome> {
        validate("user_id", &user_id.0)?;
        validate("product_id", product_id)?;
        validate("category", category)?;

        for attempt in 0..MAX_COMMIT_ATTEMPTS {
            if attempt > 0 {
                backoff::sleep_jittered(attempt - 1).await;
            }

            // Find-or-create inside the CAS boundary: a create commits with
            // expected = None and loses the race if the key appeared in the
            // meantime, so two concurrent first contributions can never
            // produce two ledgers.
            let (mut ledger, expected) = match self.store.load(user_id).await? {
                Some(versioned) => (versioned.ledger, Some(versioned.version)),
                None => (Ledger::new(user_id.clone()), None),
            };

            ledger.apply_contribution(product_id, category, now);
            let newly_unlocked = badge::evaluate(&mut ledger, now);

            match self.store.commit(&ledger, expected).await {
                Ok(version) => {
                    tracing::debug!(
                        user = %user_id,
                        version,
                        total = ledger.stats.total_reviews,
                        unlocked = newly_unlocked.len(),
                        "contribution committed"
                    );
                    return Ok(ContributionOutcome {
                        ledger,
                        newly_unlocked,
                    });
                }
                Err(StoreErr::VersionConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineErr::Contention {
            user_id: user_id.clone(),
            attempts: MAX_COMMIT_ATTEMPTS,
        })
    }

    /// Retraction is idempotent: a missing ledger or a product this user
    /// never reviewed is a successful no-op (`Ok(None)`), tolerating
    /// duplicate delete events. Nothing is committed in that case.
    #[instrument(skip(self), fields(user = %user_id))]
    pub async fn retract(
        &self,
        user_id: &UserId,
        product_id: &str,
        category: &str,
        was_last_review: bool,
    ) -> EngineResult<Option<Ledger>> {
        validate("user_id", &user_id.0)?;
        validate("product_id", product_id)?;
        validate("category", category)?;

        for attempt in 0..MAX_COMMIT_ATTEMPTS {
            if attempt > 0 {
                backoff::sleep_jittered(attempt - 1).await;
            }

            let Some(versioned) = self.store.load(user_id).await? else {
                return Ok(None);
            };

            let mut ledger = versioned.ledger;
            if !ledger.has_reviewed(product_id) {
                return Ok(None);
            }

            ledger.apply_retraction(product_id, category, was_last_review);

            match self.store.commit(&ledger, Some(versioned.version)).await {
                Ok(version) => {
                    tracing::debug!(
                        user = %user_id,
                        version,
                        total = ledger.stats.total_reviews,
                        "retraction committed"
                    );
                    return Ok(Some(ledger));
                }
                Err(StoreErr::VersionConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineErr::Contention {
            user_id: user_id.clone(),
            attempts: MAX_COMMIT_ATTEMPTS,
        })
    }

    #[instrument(skip(self), fields(user = %user_id))]
    pub async fn progression(&self, user_id: &UserId) -> EngineResult<Ledger> {
        self.store
            .load(user_id)
            .await?
            .map(|versioned| versioned.ledger)
            .ok_or_else(|| EngineErr::NotFound(user_id.clone()))
    }

    #[instrument(skip(self))]
    pub async fn top_reviewers(&self, limit: usize) -> EngineResult<Vec<LeaderboardEntry>> {
        let snapshot = self.store.scan().await?;
        Ok(top_reviewers(snapshot, limit))
    }
}

fn validate(field: &'static str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineErr::Validation { field });
    }

    Ok(())
}
