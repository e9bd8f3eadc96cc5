//! Badge catalog models and achievement grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Predicate a badge places on a user's aggregated stats.
///
/// Closed enumeration: evaluation is an exhaustive match, so a new rule
/// kind cannot be half-wired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum BadgeRule {
    MinCheckins { count: u32 },
    MinStreak { weeks: u32 },
    MinLevel { level: u32 },
    MinFeedbackGiven { count: u32 },
    MinReviewsReceived { count: u32 },
    MinTribesJoined { count: u32 },
    MinMatchesFormed { count: u32 },
}

/// A named badge in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Badge {
    /// Stable identifier, unique within the catalog
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(flatten)]
    pub rule: BadgeRule,
}

/// Aggregated stats a badge predicate is evaluated against.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAggregates {
    pub checkins_completed: u32,
    pub feedback_given: u32,
    pub reviews_received: u32,
    pub tribes_joined: u32,
    pub matches_formed: u32,
    pub streak: u32,
    pub level: u32,
}

impl BadgeRule {
    /// Whether the predicate holds for the given aggregates.
    pub fn is_satisfied(self, stats: &UserAggregates) -> bool {
        match self {
            BadgeRule::MinCheckins { count } => stats.checkins_completed >= count,
            BadgeRule::MinStreak { weeks } => stats.streak >= weeks,
            BadgeRule::MinLevel { level } => stats.level >= level,
            BadgeRule::MinFeedbackGiven { count } => stats.feedback_given >= count,
            BadgeRule::MinReviewsReceived { count } => stats.reviews_received >= count,
            BadgeRule::MinTribesJoined { count } => stats.tribes_joined >= count,
            BadgeRule::MinMatchesFormed { count } => stats.matches_formed >= count,
        }
    }
}

/// A granted badge. Unique per `(user_id, badge_id)`; created at most once
/// no matter how often the predicate re-evaluates as satisfied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievement {
    pub user_id: u64,
    pub badge_id: String,
    pub granted_at: DateTime<Utc>,
}
