use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::db::prelude::{UnlockedBadge, UnlockedBadgeView, UserId};
use crate::util::env::Env;

pub type NotifyResult<T> = core::result::Result<T, NotifyErr>;

#[derive(Debug, Error)]
pub enum NotifyErr {
    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error("badge webhook responded with status {0}")]
    BadStatus(http::StatusCode),
}

#[derive(Debug, Serialize)]
struct BadgeUnlockEvent<'a> {
    user_id: &'a UserId,
    badges: Vec<UnlockedBadgeView>,
}

/// Pushes newly unlocked badges to the notification collaborator over a
/// webhook. Notification is best-effort: the ledger commit is the source of
/// truth, and a failed dispatch is logged without unwinding it.
pub struct BadgeNotifier {
    client: reqwest::Client,
    url: String,
}

impl BadgeNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn from_env(env: &Env) -> Option<Self> {
        env.badge_webhook_url.as_deref().map(Self::new)
    }

    #[instrument(skip(self, badges), fields(user = %user_id, count = badges.len()))]
    pub async fn dispatch(&self, user_id: &UserId, badges: &[UnlockedBadge]) -> NotifyResult<()> {
        let event = BadgeUnlockEvent {
            user_id,
            badges: badges.iter().map(UnlockedBadgeView::from).collect(),
        };

        let response = self.client.post(&self.url).json(&event).send().await?;
        if !response.status().is_success() {
            return Err(NotifyErr::BadStatus(response.status()));
        }

        Ok(())
    }
}

pub fn spawn_dispatch(
    notifier: Option<Arc<BadgeNotifier>>,
    user_id: UserId,
    badges: Vec<UnlockedBadge>,
) {
    let Some(notifier) = notifier else { return };
    if badges.is_empty() {
        return;
    }

    tokio::task::spawn(async move {
        if let Err(e) = notifier.dispatch(&user_id, &badges).await {
            tracing::warn!(error = ?e, user = %user_id, "badge unlock notification failed");
        }
    });
}
