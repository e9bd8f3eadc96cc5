// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ledger events: immutable, idempotent-by-key records of XP-affecting
//! occurrences.
//!
//! `EventKind` is a closed enumeration with an exhaustive delta table, so
//! adding a kind is a compile-time-checked extension rather than a string
//! match somewhere in a handler.

use crate::config::EngineTuning;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of XP-affecting occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CheckinCompleted,
    CheckinMissed,
    FeedbackGiven,
    PeerReviewed,
    TribeJoined,
    MatchFormed,
}

/// Fixed `(delta, counts_toward_lifetime)` row for an event kind.
#[derive(Debug, Clone, Copy)]
pub struct EventSpec {
    pub delta: i64,
    pub counts_toward_lifetime: bool,
}

impl EventKind {
    /// Exhaustive delta table, magnitudes sourced from tuning.
    pub fn spec(self, tuning: &EngineTuning) -> EventSpec {
        let delta = match self {
            EventKind::CheckinCompleted => tuning.checkin_completed_xp,
            EventKind::CheckinMissed => tuning.checkin_missed_xp,
            EventKind::FeedbackGiven => tuning.feedback_given_xp,
            EventKind::PeerReviewed => tuning.peer_reviewed_xp,
            EventKind::TribeJoined => tuning.tribe_joined_xp,
            EventKind::MatchFormed => tuning.match_formed_xp,
        };
        EventSpec {
            delta,
            counts_toward_lifetime: delta > 0,
        }
    }
}

/// Immutable, append-only ledger record. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub user_id: u64,
    pub kind: EventKind,
    pub delta: i64,
    /// Uniqueness key: `(kind, ISO week)` for periodic events, triggering
    /// entity id for one-shot events
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// Weekly ritual record status. `Missed` rows are sentinels written by the
/// scheduled sweep so a re-run inside the same period stays a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinStatus {
    Completed,
    Missed,
}

/// One check-in slot, unique per `(user_id, period_key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub user_id: u64,
    /// ISO week key, e.g. `"2026-W32"`
    pub period_key: String,
    pub status: CheckinStatus,
    pub created_at: DateTime<Utc>,
}

/// A peer review of another user. Review scores feed the target's
/// reputation mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerReview {
    pub id: u64,
    pub reviewer_id: u64,
    pub target_id: u64,
    /// Score in 1..=5
    pub score: u32,
    pub created_at: DateTime<Utc>,
}

/// A feedback submission. Its id keys the author's one-shot XP award.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: u64,
    pub author_id: u64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of applying (or re-applying) a ledger event.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerResult {
    /// False when the idempotency key was already present (benign no-op)
    pub applied: bool,
    pub delta: i64,
    pub new_current_xp: i64,
    pub new_level: u32,
    pub newly_granted_badges: Vec<String>,
}

/// Level reached at `lifetime_xp` under a monotonic threshold table.
///
/// Returns the number of thresholds at or below the total, so with a table
/// starting at 0 every user is at least level 1. Monotonic in both the
/// total and the table, which is what keeps levels non-decreasing.
pub fn level_for(lifetime_xp: i64, thresholds: &[i64]) -> u32 {
    thresholds.iter().filter(|t| lifetime_xp >= **t).count() as u32
}
