use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::db::models::ledger::{Ledger, Rank, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub position: u64,
    pub user_id: UserId,
    pub total_reviews: u64,
    pub rank: Rank,
    pub rank_title: String,
    pub current_streak: u32,
}

/// Pure projection over a ledger snapshot: review totals descending, ties to
/// whoever reviewed earliest (ledgers without a review date sort after those
/// with one), then user id for full determinism.
pub fn top_reviewers(mut ledgers: Vec<Ledger>, limit: usize) -> Vec<LeaderboardEntry> {
    ledgers.sort_by(|a, b| {
        b.stats
            .total_reviews
            .cmp(&a.stats.total_reviews)
            .then_with(
                || match (a.stats.last_review_date, b.stats.last_review_date) {
                    (Some(left), Some(right)) => left.cmp(&right),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                },
            )
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    ledgers
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(idx, ledger)| LeaderboardEntry {
            position: idx as u64 + 1,
            user_id: ledger.user_id,
            total_reviews: ledger.stats.total_reviews,
            rank: ledger.rank,
            rank_title: ledger.rank.title().to_string(),
            current_streak: ledger.stats.current_streak,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn ledger_with(user: &str, total: u64, day: Option<u32>) -> Ledger {
        let mut ledger = Ledger::new(user.into());
        ledger.stats.total_reviews = total;
        ledger.stats.last_review_date =
            day.map(|d| Utc.with_ymd_and_hms(2026, 3, d, 9, 0, 0).unwrap());
        ledger.rank = Rank::for_total(total);
        ledger
    }

    #[test]
    fn test_empty_snapshot_is_empty_board() {
        assert!(top_reviewers(Vec::new(), 10).is_empty());
    }

    #[test]
    fn test_orders_by_total_descending() {
        let board = top_reviewers(
            vec![
                ledger_with("low", 2, Some(1)),
                ledger_with("high", 9, Some(1)),
                ledger_with("mid", 5, Some(1)),
            ],
            10,
        );

        let users: Vec<&str> = board.iter().map(|e| e.user_id.0.as_str()).collect();
        assert_eq!(users, ["high", "mid", "low"]);
        assert_eq!(board[0].position, 1);
        assert_eq!(board[2].position, 3);
    }

    #[test]
    fn test_tie_broken_by_earliest_review_then_user_id() {
        let board = top_reviewers(
            vec![
                ledger_with("later", 5, Some(10)),
                ledger_with("earlier", 5, Some(2)),
                ledger_with("b-same-day", 5, Some(4)),
                ledger_with("a-same-day", 5, Some(4)),
            ],
            10,
        );

        let users: Vec<&str> = board.iter().map(|e| e.user_id.0.as_str()).collect();
        assert_eq!(users, ["earlier", "a-same-day", "b-same-day", "later"]);
    }

    #[test]
    fn test_limit_truncates() {
        let board = top_reviewers(
            vec![
                ledger_with("a", 3, Some(1)),
                ledger_with("b", 2, Some(1)),
                ledger_with("c", 1, Some(1)),
            ],
            2,
        );

        assert_eq!(board.len(), 2);
    }

    #[test]
    fn test_entry_carries_rank_title() {
        let board = top_reviewers(vec![ledger_with("u", 6, Some(1))], 10);
        assert_eq!(board[0].rank, Rank::Explorer);
        assert_eq!(board[0].rank_title, "Coffee Explorer");
    }
}
