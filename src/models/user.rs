//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Guest,
    Trial,
    Active,
    GracePeriod,
    Expired,
    Cancelled,
}

/// Profile tier. Creator accounts bypass subscription gating entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileTier {
    Starter,
    Engaged,
    Creator,
}

/// A trial or grace window. Invariant: `end >= start`; a user holds at
/// most one active window of each kind at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SubscriptionWindow {
    /// Window of `days` length starting at `start`.
    pub fn from_days(start: DateTime<Utc>, days: i64) -> Self {
        Self {
            start,
            end: start + chrono::Duration::days(days.max(0)),
        }
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        now < self.end
    }
}

/// User profile and ledger aggregate.
///
/// `current_xp` is the spendable/display balance and may go negative from
/// penalties. `lifetime_xp` only ever grows (positive deltas) and is the
/// sole input to leveling, so `level` never decreases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// User ID (also used as the storage key)
    pub id: u64,
    /// Email address (may be None if not shared)
    pub email: Option<String>,
    /// Display name
    pub display_name: String,
    /// Subscription lifecycle state
    pub status: SubscriptionStatus,
    /// Profile tier
    pub profile_tier: ProfileTier,
    /// Trial window, if one was ever started
    pub trial_window: Option<SubscriptionWindow>,
    /// Grace window opened on cancellation or payment failure
    pub grace_window: Option<SubscriptionWindow>,
    /// Signed XP balance
    pub current_xp: i64,
    /// Monotonic sum of positive XP deltas; drives leveling
    pub lifetime_xp: i64,
    /// Derived level (non-decreasing)
    pub level: u32,
    /// Arithmetic mean of peer review scores
    pub reputation_score: f64,
    /// Consecutive successful weekly check-ins
    pub streak: u32,
    /// Most recent successful check-in
    pub last_checkin_at: Option<DateTime<Utc>>,
    /// When the user was created
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Fresh registered user with an empty ledger.
    pub fn new(id: u64, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email: None,
            display_name: display_name.into(),
            status: SubscriptionStatus::Guest,
            profile_tier: ProfileTier::Starter,
            trial_window: None,
            grace_window: None,
            current_xp: 0,
            lifetime_xp: 0,
            level: 1,
            reputation_score: 0.0,
            streak: 0,
            last_checkin_at: None,
            created_at: now,
        }
    }

    /// Whether the scheduled sweep tracks this user's weekly ritual.
    pub fn is_ritual_eligible(&self) -> bool {
        !matches!(
            self.status,
            SubscriptionStatus::Guest | SubscriptionStatus::Expired
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_from_days() {
        let start = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let window = SubscriptionWindow::from_days(start, 14);
        assert_eq!(window.end - window.start, chrono::Duration::days(14));
        assert!(window.contains(start + chrono::Duration::days(13)));
        assert!(!window.contains(window.end));
    }

    #[test]
    fn test_ritual_eligibility() {
        let now = Utc::now();
        let mut user = User::new(1, "Test", now);
        assert!(!user.is_ritual_eligible());

        user.status = SubscriptionStatus::Trial;
        assert!(user.is_ritual_eligible());

        user.status = SubscriptionStatus::Expired;
        assert!(!user.is_ritual_eligible());
    }
}
