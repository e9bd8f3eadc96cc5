// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Engagement ledger service.
//!
//! Owns the reward economy wiring: the tuning table and badge catalog are
//! threaded into every store call so event application and achievement
//! evaluation happen inside one storage transaction.

use crate::config::EngineTuning;
use crate::db::{LedgerCtx, Store};
use crate::error::Result;
use crate::models::{
    EventKind, FeedbackEntry, LedgerEvent, LedgerResult, PeerReview, UserAchievement,
};
use crate::services::BadgeCatalog;
use crate::time_utils::iso_week_key;
use chrono::{DateTime, Utc};

/// Service applying idempotent ledger events and derived side effects.
#[derive(Clone)]
pub struct LedgerService {
    db: Store,
    tuning: EngineTuning,
    badges: BadgeCatalog,
}

impl LedgerService {
    pub fn new(db: Store, tuning: EngineTuning, badges: BadgeCatalog) -> Self {
        Self { db, tuning, badges }
    }

    pub(crate) fn ctx(&self) -> LedgerCtx<'_> {
        LedgerCtx {
            tuning: &self.tuning,
            catalog: self.badges.badges(),
        }
    }

    /// Apply one event under an explicit idempotency key.
    pub async fn apply_event(
        &self,
        user_id: u64,
        kind: EventKind,
        idempotency_key: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerResult> {
        self.db
            .apply_event(user_id, kind, idempotency_key, now, self.ctx())
            .await
    }

    /// Record the weekly check-in for the period containing `now`.
    /// A repeat within the same ISO week is a benign no-op.
    pub async fn record_checkin(&self, user_id: u64, now: DateTime<Utc>) -> Result<LedgerResult> {
        let period_key = iso_week_key(now);
        let result = self.db.record_checkin(user_id, &period_key, now, self.ctx()).await?;
        if result.applied {
            tracing::info!(user_id, period = %period_key, "Check-in recorded");
        } else {
            tracing::debug!(user_id, period = %period_key, "Check-in already recorded (idempotent skip)");
        }
        Ok(result)
    }

    /// Store feedback and award the author, keyed by the new entry id.
    pub async fn record_feedback(
        &self,
        author_id: u64,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<(FeedbackEntry, LedgerResult)> {
        self.db.record_feedback(author_id, body, now, self.ctx()).await
    }

    /// Store a peer review, refresh the target's reputation mean, and
    /// award the target, keyed by the new review id.
    pub async fn record_peer_review(
        &self,
        reviewer_id: u64,
        target_id: u64,
        score: u32,
        now: DateTime<Utc>,
    ) -> Result<(PeerReview, LedgerResult)> {
        self.db
            .record_peer_review(reviewer_id, target_id, score, now, self.ctx())
            .await
    }

    pub async fn achievements(&self, user_id: u64) -> Result<Vec<UserAchievement>> {
        self.db.get_achievements(user_id).await
    }

    pub async fn events(&self, user_id: u64) -> Result<Vec<LedgerEvent>> {
        self.db.get_events_for_user(user_id).await
    }
}
