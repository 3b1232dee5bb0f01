use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::ledger::Ledger;

pub const VOUCHER_TTL_DAYS: i64 = 90;

/// A single badge rule: a monotone threshold over the lifetime review count,
/// plus display metadata and an optional voucher reward. Rules are data, not
/// code, so the catalog stays declarative and the evaluator pure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BadgeDefinition {
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    pub review_threshold: u64,
    pub discount_percent: Option<u8>,
}

// Ordered by threshold ascending; the evaluator relies on this.
const BADGE_CATALOG: &[BadgeDefinition] = &[
    BadgeDefinition {
        name: "First Sip",
        icon: "☕",
        description: "Posted a first review",
        review_threshold: 1,
        discount_percent: None,
    },
    BadgeDefinition {
        name: "5 Review Streak",
        icon: "🔥",
        description: "Reached 5 lifetime reviews",
        review_threshold: 5,
        discount_percent: Some(10),
    },
    BadgeDefinition {
        name: "10 Review Streak",
        icon: "⭐",
        description: "Reached 10 lifetime reviews",
        review_threshold: 10,
        discount_percent: Some(15),
    },
    BadgeDefinition {
        name: "20 Review Streak",
        icon: "🏆",
        description: "Reached 20 lifetime reviews",
        review_threshold: 20,
        discount_percent: Some(20),
    },
    BadgeDefinition {
        name: "Coffee Connoisseur",
        icon: "👑",
        description: "Reached 30 lifetime reviews",
        review_threshold: 30,
        discount_percent: Some(25),
    },
];

pub fn catalog() -> &'static [BadgeDefinition] {
    BADGE_CATALOG
}

pub fn definition_by_name(name: &str) -> Option<&'static BadgeDefinition> {
    BADGE_CATALOG.iter().find(|d| d.name == name)
}

/// A redeemable discount issued alongside certain badges. Codes are redeemed
/// independently of the owning ledger, so their uniqueness domain is the whole
/// store; a v4 uuid covers that without a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub code: String,
    pub discount_percent: u8,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl Voucher {
    pub fn issue(discount_percent: u8, now: DateTime<Utc>) -> Self {
        Self {
            code: Uuid::new_v4().simple().to_string(),
            discount_percent,
            expires_at: now + Duration::days(VOUCHER_TTL_DAYS),
            is_used: false,
            used_at: None,
        }
    }
}

/// One unlocked badge on a ledger; `name` references the static catalog
/// definition. Unlocks are one-time and survive retraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockedBadge {
    pub name: String,
    pub unlocked_at: DateTime<Utc>,
    pub voucher: Option<Voucher>,
}

/// Wire/notification view of an unlock, resolved against the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockedBadgeView {
    pub name: String,
    pub icon: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_code: Option<String>,
}

impl From<&UnlockedBadge> for UnlockedBadgeView {
    fn from(badge: &UnlockedBadge) -> Self {
        let definition = definition_by_name(&badge.name);
        Self {
            name: badge.name.clone(),
            icon: definition.map(|d| d.icon).unwrap_or_default().to_string(),
            description: definition
                .map(|d| d.description)
                .unwrap_or_default()
                .to_string(),
            voucher_code: badge.voucher.as_ref().map(|v| v.code.clone()),
        }
    }
}

/// Appends every catalog definition whose threshold the ledger has crossed
/// and does not hold yet, issuing vouchers where the definition carries a
/// discount. Returns only the badges unlocked by *this* call; evaluating
/// again without a counter change returns an empty vec.
pub fn evaluate(ledger: &mut Ledger, now: DateTime<Utc>) -> Vec<UnlockedBadge> {
    let mut newly_unlocked = Vec::new();

    for definition in BADGE_CATALOG {
        if ledger.has_badge(definition.name) {
            continue;
        }

        if ledger.stats.total_reviews >= definition.review_threshold {
            let unlocked = UnlockedBadge {
                name: definition.name.to_string(),
                unlocked_at: now,
                voucher: definition
                    .discount_percent
                    .map(|percent| Voucher::issue(percent, now)),
            };

            ledger.badges.push(unlocked.clone());
            newly_unlocked.push(unlocked);
        }
    }

    newly_unlocked
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_catalog_ordered_by_threshold() {
        let thresholds: Vec<u64> = catalog().iter().map(|d| d.review_threshold).collect();
        let mut sorted = thresholds.clone();
        sorted.sort_unstable();
        assert_eq!(thresholds, sorted);
    }

    #[test]
    fn test_definition_lookup() {
        assert!(definition_by_name("5 Review Streak").is_some());
        assert!(definition_by_name("No Such Badge").is_none());
    }

    #[test]
    fn test_evaluate_unlocks_all_crossed_thresholds() {
        let mut ledger = Ledger::new("u1".into());
        ledger.stats.total_reviews = 10;

        let unlocked = evaluate(&mut ledger, now());

        let names: Vec<&str> = unlocked.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["First Sip", "5 Review Streak", "10 Review Streak"]);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let mut ledger = Ledger::new("u1".into());
        ledger.stats.total_reviews = 6;

        let first = evaluate(&mut ledger, now());
        let second = evaluate(&mut ledger, now());

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(ledger.badges.len(), 2);
    }

    #[test]
    fn test_evaluate_never_duplicates_a_definition() {
        let mut ledger = Ledger::new("u1".into());
        ledger.stats.total_reviews = 5;
        evaluate(&mut ledger, now());

        ledger.stats.total_reviews = 30;
        evaluate(&mut ledger, now());

        let streak_count = ledger
            .badges
            .iter()
            .filter(|b| b.name == "5 Review Streak")
            .count();
        assert_eq!(streak_count, 1);
        assert_eq!(ledger.badges.len(), catalog().len());
    }

    #[test]
    fn test_voucher_issued_with_discounted_definitions_only() {
        let mut ledger = Ledger::new("u1".into());
        ledger.stats.total_reviews = 5;

        let unlocked = evaluate(&mut ledger, now());

        let first_sip = unlocked.iter().find(|b| b.name == "First Sip").unwrap();
        let streak = unlocked
            .iter()
            .find(|b| b.name == "5 Review Streak")
            .unwrap();

        assert!(first_sip.voucher.is_none());
        let voucher = streak.voucher.as_ref().unwrap();
        assert_eq!(voucher.discount_percent, 10);
        assert!(!voucher.is_used);
        assert_eq!(voucher.expires_at, now() + Duration::days(VOUCHER_TTL_DAYS));
        assert_eq!(voucher.code.len(), 32);
    }

    #[test]
    fn test_voucher_codes_are_distinct() {
        let a = Voucher::issue(10, now());
        let b = Voucher::issue(10, now());
        assert_ne!(a.code, b.code);
    }
}
