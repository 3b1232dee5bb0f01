use core::fmt;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::badge::UnlockedBadge;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

/// A distinct product this user has reviewed at least once. Repeat reviews of
/// the same product do not add entries here, only to `ReviewStats::total_reviews`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewedProduct {
    pub product_id: String,
    pub category: String,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Newbie,
    Explorer,
    Expert,
    Legend,
    Supreme,
}

impl Rank {
    /// Threshold lookup over the lifetime review count; inclusive lower
    /// bounds, highest match wins.
    pub fn for_total(total_reviews: u64) -> Self {
        match total_reviews {
            0..=4 => Rank::Newbie,
            5..=9 => Rank::Explorer,
            10..=19 => Rank::Expert,
            20..=29 => Rank::Legend,
            _ => Rank::Supreme,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Rank::Newbie => "Coffee Newbie",
            Rank::Explorer => "Coffee Explorer",
            Rank::Expert => "Coffee Expert",
            Rank::Legend => "Coffee Legend",
            Rank::Supreme => "Coffee Supreme",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewStats {
    pub total_reviews: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_review_date: Option<DateTime<Utc>>,
    pub categories_explored: BTreeMap<String, u32>,
}

impl ReviewStats {
    /// Day-granularity streak bump. Same-day repeats are a no-op, a one-day
    /// gap extends the run, anything longer restarts it. A `now` behind the
    /// recorded date (clock skew between callers) never decrements.
    pub fn update_streak(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();

        match self.last_review_date.map(|last| {
            today
                .signed_duration_since(last.date_naive())
                .num_days()
        }) {
            None => self.current_streak = 1,
            Some(0) => {}
            Some(1) => self.current_streak += 1,
            Some(days) if days > 1 => self.current_streak = 1,
            Some(_) => {}
        }

        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.last_review_date = Some(now);
    }
}

/// The per-user progression aggregate. One exists per user, created lazily on
/// the first contribution and never deleted; retracting every review leaves a
/// zeroed ledger behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub user_id: UserId,
    pub reviewed_products: Vec<ReviewedProduct>,
    pub stats: ReviewStats,
    pub badges: Vec<UnlockedBadge>,
    pub rank: Rank,
}

impl Ledger {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            reviewed_products: Vec::new(),
            stats: ReviewStats::default(),
            badges: Vec::new(),
            rank: Rank::Newbie,
        }
    }

    pub fn has_reviewed(&self, product_id: &str) -> bool {
        self.reviewed_products
            .iter()
            .any(|p| p.product_id == product_id)
    }

    pub fn has_badge(&self, name: &str) -> bool {
        self.badges.iter().any(|b| b.name == name)
    }

    /// Folds one review-submission event into the aggregate. Badge unlocking
    /// is deliberately not part of this transition; the engine runs
    /// [`badge::evaluate`](crate::db::models::badge::evaluate) as a separate
    /// step so it stays idempotent and auditable on its own.
    pub fn apply_contribution(&mut self, product_id: &str, category: &str, now: DateTime<Utc>) {
        self.stats.total_reviews += 1;

        if !self.has_reviewed(product_id) {
            self.reviewed_products.push(ReviewedProduct {
                product_id: product_id.to_owned(),
                category: category.to_owned(),
                reviewed_at: now,
            });

            *self
                .stats
                .categories_explored
                .entry(category.to_owned())
                .or_insert(0) += 1;
        }

        self.stats.update_streak(now);
        self.rank = Rank::for_total(self.stats.total_reviews);
    }

    /// Folds one review-deletion event into the aggregate.
    /// `was_last_review` comes from the review-management collaborator, which
    /// owns the review documents and knows whether any other review of this
    /// product by this user still exists. Streaks and badges are not reverted
    /// here; only the counters and rank move.
    pub fn apply_retraction(&mut self, product_id: &str, category: &str, was_last_review: bool) {
        self.stats.total_reviews = self.stats.total_reviews.saturating_sub(1);

        if was_last_review {
            self.reviewed_products.retain(|p| p.product_id != product_id);

            if let Some(count) = self.stats.categories_explored.get_mut(category) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.stats.categories_explored.remove(category);
                }
            }
        }

        self.rank = Rank::for_total(self.stats.total_reviews);
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_rank_thresholds() {
        assert_eq!(Rank::for_total(0), Rank::Newbie);
        assert_eq!(Rank::for_total(4), Rank::Newbie);
        assert_eq!(Rank::for_total(5), Rank::Explorer);
        assert_eq!(Rank::for_total(9), Rank::Explorer);
        assert_eq!(Rank::for_total(10), Rank::Expert);
        assert_eq!(Rank::for_total(19), Rank::Expert);
        assert_eq!(Rank::for_total(20), Rank::Legend);
        assert_eq!(Rank::for_total(29), Rank::Legend);
        assert_eq!(Rank::for_total(30), Rank::Supreme);
        assert_eq!(Rank::for_total(500), Rank::Supreme);
    }

    #[test]
    fn test_rank_monotonic() {
        let mut prev = Rank::for_total(0);
        for total in 1..64 {
            let next = Rank::for_total(total);
            assert!(next >= prev, "rank regressed at total={total}");
            prev = next;
        }
    }

    #[test]
    fn test_contribution_counts_repeats_once_per_product() {
        let mut ledger = Ledger::new("u1".into());

        ledger.apply_contribution("p1", "HOT COFFEE", day(1));
        ledger.apply_contribution("p1", "HOT COFFEE", day(1));

        assert_eq!(ledger.stats.total_reviews, 2);
        assert_eq!(ledger.reviewed_products.len(), 1);
        assert_eq!(ledger.stats.categories_explored["HOT COFFEE"], 1);
    }

    #[test]
    fn test_streak_same_day_no_op() {
        let mut ledger = Ledger::new("u1".into());

        ledger.apply_contribution("p1", "HOT COFFEE", day(1));
        let first = ledger.stats.current_streak;
        ledger.apply_contribution("p2", "HOT COFFEE", day(1));

        assert_eq!(first, 1);
        assert_eq!(ledger.stats.current_streak, first);
    }

    #[test]
    fn test_streak_extends_on_consecutive_days() {
        let mut ledger = Ledger::new("u1".into());

        ledger.apply_contribution("p1", "HOT COFFEE", day(1));
        ledger.apply_contribution("p2", "HOT COFFEE", day(2));
        ledger.apply_contribution("p3", "COLD BREW", day(3));

        assert_eq!(ledger.stats.current_streak, 3);
        assert_eq!(ledger.stats.longest_streak, 3);
    }

    #[test]
    fn test_streak_breaks_after_gap() {
        let mut ledger = Ledger::new("u1".into());

        ledger.apply_contribution("p1", "HOT COFFEE", day(1));
        ledger.apply_contribution("p2", "HOT COFFEE", day(2));
        ledger.apply_contribution("p3", "HOT COFFEE", day(5));

        assert_eq!(ledger.stats.current_streak, 1);
        assert_eq!(ledger.stats.longest_streak, 2);
    }

    #[test]
    fn test_streak_never_decrements_on_clock_skew() {
        let mut ledger = Ledger::new("u1".into());

        ledger.apply_contribution("p1", "HOT COFFEE", day(3));
        ledger.apply_contribution("p2", "HOT COFFEE", day(4));
        ledger.apply_contribution("p3", "HOT COFFEE", day(2));

        assert_eq!(ledger.stats.current_streak, 2);
    }

    #[test]
    fn test_retraction_floor_at_zero() {
        let mut ledger = Ledger::new("u1".into());

        ledger.apply_retraction("p1", "HOT COFFEE", true);

        assert_eq!(ledger.stats.total_reviews, 0);
    }

    #[test]
    fn test_retraction_removes_last_review_of_product() {
        let mut ledger = Ledger::new("u1".into());
        ledger.apply_contribution("p1", "HOT COFFEE", day(1));
        ledger.apply_contribution("p2", "HOT COFFEE", day(1));

        ledger.apply_retraction("p1", "HOT COFFEE", true);

        assert!(!ledger.has_reviewed("p1"));
        assert_eq!(ledger.stats.total_reviews, 1);
        assert_eq!(ledger.stats.categories_explored["HOT COFFEE"], 1);
    }

    #[test]
    fn test_retraction_keeps_product_while_reviews_remain() {
        let mut ledger = Ledger::new("u1".into());
        ledger.apply_contribution("p1", "HOT COFFEE", day(1));
        ledger.apply_contribution("p1", "HOT COFFEE", day(1));

        ledger.apply_retraction("p1", "HOT COFFEE", false);

        assert!(ledger.has_reviewed("p1"));
        assert_eq!(ledger.stats.total_reviews, 1);
        assert_eq!(ledger.stats.categories_explored["HOT COFFEE"], 1);
    }

    #[test]
    fn test_category_key_removed_at_zero() {
        let mut ledger = Ledger::new("u1".into());
        ledger.apply_contribution("p1", "COLD BREW", day(1));

        ledger.apply_retraction("p1", "COLD BREW", true);

        assert!(!ledger.stats.categories_explored.contains_key("COLD BREW"));
    }

    #[test]
    fn test_category_counts_match_reviewed_products() {
        let mut ledger = Ledger::new("u1".into());

        ledger.apply_contribution("p1", "HOT COFFEE", day(1));
        ledger.apply_contribution("p2", "HOT COFFEE", day(1));
        ledger.apply_contribution("p3", "COLD BREW", day(2));
        ledger.apply_contribution("p3", "COLD BREW", day(2));
        ledger.apply_retraction("p2", "HOT COFFEE", true);
        ledger.apply_retraction("p3", "COLD BREW", false);

        for (category, count) in &ledger.stats.categories_explored {
            let actual = ledger
                .reviewed_products
                .iter()
                .filter(|p| &p.category == category)
                .count() as u32;
            assert_eq!(*count, actual, "category '{category}' out of sync");
        }
        assert_eq!(ledger.stats.categories_explored.len(), 2);
    }

    #[test]
    fn test_retraction_does_not_touch_streak() {
        let mut ledger = Ledger::new("u1".into());
        ledger.apply_contribution("p1", "HOT COFFEE", day(1));
        ledger.apply_contribution("p2", "HOT COFFEE", day(2));

        ledger.apply_retraction("p2", "HOT COFFEE", true);

        assert_eq!(ledger.stats.current_streak, 2);
        assert_eq!(ledger.stats.longest_streak, 2);
    }
}
