use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Json, debug_handler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::middleware::verify::VerifiedBody;
use crate::api::notify;
use crate::api::server::{AppState, JsonResult};
use crate::db::prelude::{
    LeaderboardEntry, LeaderboardQuery, Ledger, Rank, ReviewedProduct, UnlockedBadgeView, UserId,
};
use crate::engine::ContributionOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewCreatedPayload {
    pub user_id: String,
    pub product_id: String,
    pub category: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewDeletedPayload {
    pub user_id: String,
    pub product_id: String,
    pub category: String,
    /// Reviews of this product by this user still existing after the delete,
    /// supplied by the review-management collaborator (it owns the review
    /// documents). Absent means none remain.
    #[serde(default)]
    pub remaining_reviews: u64,
}

#[derive(Debug, Serialize)]
pub struct ContributionResponse {
    pub user_id: UserId,
    pub total_reviews: u64,
    pub current_streak: u32,
    pub rank: Rank,
    pub rank_title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub badges: Vec<UnlockedBadgeView>,
}

impl From<ContributionOutcome> for ContributionResponse {
    fn from(outcome: ContributionOutcome) -> Self {
        Self {
            user_id: outcome.ledger.user_id.clone(),
            total_reviews: outcome.ledger.stats.total_reviews,
            current_streak: outcome.ledger.stats.current_streak,
            rank: outcome.ledger.rank,
            rank_title: outcome.ledger.rank.title().to_string(),
            badges: outcome
                .newly_unlocked
                .iter()
                .map(UnlockedBadgeView::from)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RetractionResponse {
    pub user_id: UserId,
    pub applied: bool,
    pub total_reviews: u64,
}

#[derive(Debug, Serialize)]
pub struct ProgressionResponse {
    pub user_id: UserId,
    pub total_reviews: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_review_date: Option<DateTime<Utc>>,
    pub categories_explored: BTreeMap<String, u32>,
    pub reviewed_products: Vec<ReviewedProduct>,
    pub rank: Rank,
    pub rank_title: String,
    pub badges: Vec<UnlockedBadgeView>,
}

impl From<Ledger> for ProgressionResponse {
    fn from(ledger: Ledger) -> Self {
        Self {
            user_id: ledger.user_id,
            total_reviews: ledger.stats.total_reviews,
            current_streak: ledger.stats.current_streak,
            longest_streak: ledger.stats.longest_streak,
            last_review_date: ledger.stats.last_review_date,
            categories_explored: ledger.stats.categories_explored,
            reviewed_products: ledger.reviewed_products,
            rank: ledger.rank,
            rank_title: ledger.rank.title().to_string(),
            badges: ledger.badges.iter().map(UnlockedBadgeView::from).collect(),
        }
    }
}

#[instrument(skip(state, body))]
#[debug_handler]
pub async fn review_created(
    State(state): State<Arc<AppState>>,
    body: VerifiedBody,
) -> JsonResult<ContributionResponse> {
    let payload: ReviewCreatedPayload = body.as_json()?;
    let user_id = UserId::from(payload.user_id);

    let outcome = state
        .engine
        .contribute(&user_id, &payload.product_id, &payload.category)
        .await?;

    notify::spawn_dispatch(
        state.notifier.clone(),
        user_id,
        outcome.newly_unlocked.clone(),
    );

    Ok(Json(ContributionResponse::from(outcome)))
}

#[instrument(skip(state, body))]
pub async fn review_deleted(
    State(state): State<Arc<AppState>>,
    body: VerifiedBody,
) -> JsonResult<RetractionResponse> {
    let payload: ReviewDeletedPayload = body.as_json()?;
    let user_id = UserId::from(payload.user_id);
    let was_last_review = payload.remaining_reviews == 0;

    let retracted = state
        .engine
        .retract(
            &user_id,
            &payload.product_id,
            &payload.category,
            was_last_review,
        )
        .await?;

    Ok(Json(match retracted {
        Some(ledger) => RetractionResponse {
            user_id: ledger.user_id.clone(),
            applied: true,
            total_reviews: ledger.stats.total_reviews,
        },
        None => RetractionResponse {
            user_id,
            applied: false,
            total_reviews: 0,
        },
    }))
}

#[instrument(skip(state))]
pub async fn leaderboard(
    Query(query): Query<LeaderboardQuery>,
    State(state): State<Arc<AppState>>,
) -> JsonResult<Vec<LeaderboardEntry>> {
    let board = state.engine.top_reviewers(query.limit).await?;
    Ok(Json(board))
}

#[instrument(skip(state))]
pub async fn progress_by_id(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> JsonResult<ProgressionResponse> {
    let ledger = state.engine.progression(&UserId::from(user_id)).await?;
    Ok(Json(ProgressionResponse::from(ledger)))
}
