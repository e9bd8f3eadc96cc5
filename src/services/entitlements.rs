// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Entitlement resolution and subscription state transitions.
//!
//! `resolve` is a pure mapping from subscription/profile state to a
//! capability set. Every state-gated handler calls it before performing a
//! side effect; denials carry a human-readable reason, not a generic
//! error. Subscription state only changes through the transition
//! functions at the bottom of this module (trial start, billing webhook,
//! grace expiry).

use crate::config::EngineTuning;
use crate::error::AppError;
use crate::models::{ProfileTier, SubscriptionStatus, SubscriptionWindow, User};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Boolean capability set derived from subscription state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySet {
    pub can_access_matching_directory: bool,
    pub can_join_tribes: bool,
    pub can_create_tribes: bool,
    pub can_monetize_tribe: bool,
}

impl CapabilitySet {
    const FULL: Self = Self {
        can_access_matching_directory: true,
        can_join_tribes: true,
        can_create_tribes: true,
        can_monetize_tribe: true,
    };

    /// Everything except monetization.
    const TRIAL: Self = Self {
        can_access_matching_directory: true,
        can_join_tribes: true,
        can_create_tribes: true,
        can_monetize_tribe: false,
    };

    /// Read-only matching, no tribe participation.
    const GRACE: Self = Self {
        can_access_matching_directory: true,
        can_join_tribes: false,
        can_create_tribes: false,
        can_monetize_tribe: false,
    };

    const NONE: Self = Self {
        can_access_matching_directory: false,
        can_join_tribes: false,
        can_create_tribes: false,
        can_monetize_tribe: false,
    };
}

/// Resolved entitlements plus derived countdowns.
#[derive(Debug, Clone, Serialize)]
pub struct Entitlements {
    #[serde(flatten)]
    pub capabilities: CapabilitySet,
    /// `None` when no trial window applies
    pub trial_days_remaining: Option<i64>,
    /// `None` when no grace window applies
    pub grace_days_remaining: Option<i64>,
    pub is_in_trial: bool,
    pub is_in_grace_period: bool,
}

/// Days remaining in a window: `ceil((end - now) / 1 day)`, floored at 0.
fn days_remaining(window: SubscriptionWindow, now: DateTime<Utc>) -> i64 {
    let remaining = window.end.signed_duration_since(now);
    let seconds = remaining.num_seconds();
    if seconds <= 0 {
        return 0;
    }
    (seconds + 86_399) / 86_400
}

/// Pure capability resolution. Rules are evaluated in fixed priority
/// order; the first match wins.
pub fn resolve(
    tier: ProfileTier,
    status: SubscriptionStatus,
    trial_window: Option<SubscriptionWindow>,
    grace_window: Option<SubscriptionWindow>,
    now: DateTime<Utc>,
) -> Entitlements {
    let in_trial = trial_window.is_some_and(|w| w.contains(now));
    let in_grace = grace_window.is_some_and(|w| w.contains(now));

    let capabilities = if tier == ProfileTier::Creator {
        CapabilitySet::FULL
    } else if status == SubscriptionStatus::Active {
        CapabilitySet::FULL
    } else if in_trial {
        CapabilitySet::TRIAL
    } else if in_grace {
        CapabilitySet::GRACE
    } else {
        CapabilitySet::NONE
    };

    Entitlements {
        capabilities,
        trial_days_remaining: trial_window.map(|w| days_remaining(w, now)),
        grace_days_remaining: grace_window.map(|w| days_remaining(w, now)),
        is_in_trial: in_trial,
        is_in_grace_period: in_grace,
    }
}

/// Resolve entitlements for a stored user.
pub fn resolve_for(user: &User, now: DateTime<Utc>) -> Entitlements {
    resolve(
        user.profile_tier,
        user.status,
        user.trial_window,
        user.grace_window,
        now,
    )
}

/// Gate helper: `Forbidden` with the given reason unless the capability
/// holds.
pub fn require(capability: bool, reason: &str) -> Result<(), AppError> {
    if capability {
        Ok(())
    } else {
        Err(AppError::Forbidden(reason.to_string()))
    }
}

// ─── Subscription Transitions ────────────────────────────────

/// Start the one allowed trial for a user.
pub fn start_trial(user: &mut User, now: DateTime<Utc>, tuning: &EngineTuning) -> Result<(), AppError> {
    if user.trial_window.is_some() {
        return Err(AppError::Conflict("trial already used".to_string()));
    }
    if user.status == SubscriptionStatus::Active {
        return Err(AppError::Conflict(
            "subscription already active".to_string(),
        ));
    }
    user.trial_window = Some(SubscriptionWindow::from_days(now, tuning.trial_days));
    user.status = SubscriptionStatus::Trial;
    tracing::info!(user_id = user.id, days = tuning.trial_days, "Trial started");
    Ok(())
}

/// Payment webhook: subscription activated or renewed.
pub fn activate_subscription(user: &mut User) {
    user.status = SubscriptionStatus::Active;
    user.grace_window = None;
    tracing::info!(user_id = user.id, "Subscription activated");
}

/// Payment webhook: subscription cancelled. Opens the grace window; access
/// degrades rather than dropping instantly.
pub fn cancel_subscription(user: &mut User, now: DateTime<Utc>, tuning: &EngineTuning) {
    user.status = SubscriptionStatus::Cancelled;
    user.grace_window = Some(SubscriptionWindow::from_days(now, tuning.grace_days));
    tracing::info!(user_id = user.id, grace_days = tuning.grace_days, "Subscription cancelled");
}

/// Payment webhook: charge failed. Same grace window, different status so
/// the UI can distinguish "fix your card" from "you cancelled".
pub fn payment_failed(user: &mut User, now: DateTime<Utc>, tuning: &EngineTuning) {
    user.status = SubscriptionStatus::GracePeriod;
    user.grace_window = Some(SubscriptionWindow::from_days(now, tuning.grace_days));
    tracing::warn!(user_id = user.id, "Payment failed, grace window opened");
}

/// Cron trigger: expire users whose grace window has lapsed.
/// Returns true when the user transitioned.
pub fn expire_grace(user: &mut User, now: DateTime<Utc>) -> bool {
    let lapsed = matches!(
        user.status,
        SubscriptionStatus::Cancelled | SubscriptionStatus::GracePeriod
    ) && user.grace_window.is_some_and(|w| !w.contains(now));

    if lapsed {
        user.status = SubscriptionStatus::Expired;
        user.grace_window = None;
        tracing::info!(user_id = user.id, "Grace window lapsed, subscription expired");
    }
    lapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_creator_tier_wins_unconditionally() {
        let ents = resolve(
            ProfileTier::Creator,
            SubscriptionStatus::Expired,
            None,
            None,
            at(2026, 8, 7),
        );
        assert_eq!(ents.capabilities, CapabilitySet::FULL);
    }

    #[test]
    fn test_active_subscription_full_set() {
        let ents = resolve(
            ProfileTier::Starter,
            SubscriptionStatus::Active,
            None,
            None,
            at(2026, 8, 7),
        );
        assert_eq!(ents.capabilities, CapabilitySet::FULL);
        assert!(ents.capabilities.can_monetize_tribe);
    }

    #[test]
    fn test_trial_set_excludes_monetization() {
        let now = at(2026, 8, 7);
        let trial = SubscriptionWindow::from_days(now - chrono::Duration::days(3), 14);
        let ents = resolve(
            ProfileTier::Starter,
            SubscriptionStatus::Trial,
            Some(trial),
            None,
            now,
        );
        assert!(ents.is_in_trial);
        assert!(ents.capabilities.can_create_tribes);
        assert!(!ents.capabilities.can_monetize_tribe);
        assert_eq!(ents.trial_days_remaining, Some(11));
    }

    #[test]
    fn test_grace_set_is_read_only_matching() {
        let now = at(2026, 8, 7);
        let grace = SubscriptionWindow::from_days(now - chrono::Duration::days(1), 7);
        let ents = resolve(
            ProfileTier::Engaged,
            SubscriptionStatus::Cancelled,
            None,
            Some(grace),
            now,
        );
        assert!(ents.is_in_grace_period);
        assert!(ents.capabilities.can_access_matching_directory);
        assert!(!ents.capabilities.can_join_tribes);
        assert!(!ents.capabilities.can_create_tribes);
        assert_eq!(ents.grace_days_remaining, Some(6));
    }

    #[test]
    fn test_expired_trial_no_grace_empty_set() {
        // Trial ended yesterday, no grace window, tier not Creator,
        // status not Active: nothing left.
        let now = at(2026, 8, 7);
        let trial = SubscriptionWindow {
            start: now - chrono::Duration::days(15),
            end: now - chrono::Duration::days(1),
        };
        let ents = resolve(
            ProfileTier::Starter,
            SubscriptionStatus::Trial,
            Some(trial),
            None,
            now,
        );
        assert_eq!(ents.capabilities, CapabilitySet::NONE);
        assert_eq!(ents.trial_days_remaining, Some(0));
        assert!(!ents.is_in_trial);
    }

    #[test]
    fn test_days_remaining_rounds_up() {
        let now = at(2026, 8, 7);
        let window = SubscriptionWindow {
            start: now,
            end: now + chrono::Duration::hours(25),
        };
        assert_eq!(days_remaining(window, now), 2);

        let window = SubscriptionWindow {
            start: now,
            end: now + chrono::Duration::hours(24),
        };
        assert_eq!(days_remaining(window, now), 1);
    }

    #[test]
    fn test_start_trial_only_once() {
        let now = at(2026, 8, 7);
        let tuning = EngineTuning::default();
        let mut user = User::new(1, "Trialer", now);

        start_trial(&mut user, now, &tuning).unwrap();
        assert_eq!(user.status, SubscriptionStatus::Trial);

        let err = start_trial(&mut user, now + chrono::Duration::days(30), &tuning).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_cancellation_then_grace_expiry() {
        let now = at(2026, 8, 7);
        let tuning = EngineTuning::default();
        let mut user = User::new(1, "Leaver", now);
        user.status = SubscriptionStatus::Active;

        cancel_subscription(&mut user, now, &tuning);
        assert_eq!(user.status, SubscriptionStatus::Cancelled);
        assert!(resolve_for(&user, now).is_in_grace_period);

        // Not yet lapsed
        assert!(!expire_grace(&mut user, now + chrono::Duration::days(3)));
        assert_eq!(user.status, SubscriptionStatus::Cancelled);

        // Lapsed
        assert!(expire_grace(&mut user, now + chrono::Duration::days(8)));
        assert_eq!(user.status, SubscriptionStatus::Expired);
        assert_eq!(resolve_for(&user, now + chrono::Duration::days(8)).capabilities, CapabilitySet::NONE);
    }
}
