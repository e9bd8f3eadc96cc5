// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reciprocal match coordination service.
//!
//! Decisions are serialized per unordered user pair: a dashmap of async
//! mutexes guarantees that the two sides of a near-simultaneous mutual
//! like are processed one after the other, and the store then performs the
//! read-reverse/write-both step in a single critical section. One call
//! lands the Pending edge, the other upgrades both edges to Accepted.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::matching::pair_key;
use crate::models::{MatchDecision, MatchOutcome, MatchRecord, User};
use crate::services::{entitlements, LedgerService};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-pair mutexes, shared across all clones of the service.
pub type PairLocks = Arc<DashMap<(u64, u64), Arc<Mutex<()>>>>;

/// Service implementing the two-party like/pass protocol.
#[derive(Clone)]
pub struct MatchService {
    db: Store,
    ledger: LedgerService,
    pair_locks: PairLocks,
}

impl MatchService {
    pub fn new(db: Store, ledger: LedgerService) -> Self {
        Self {
            db,
            ledger,
            pair_locks: Arc::new(DashMap::new()),
        }
    }

    /// Record a like/pass decision toward another user.
    ///
    /// Acting requires full matching participation; during a grace period
    /// the directory stays readable but decisions are refused.
    pub async fn record_decision(
        &self,
        acting_user_id: u64,
        target_user_id: u64,
        decision: MatchDecision,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome> {
        let acting = self
            .db
            .get_user(acting_user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", acting_user_id)))?;

        let ents = entitlements::resolve_for(&acting, now);
        entitlements::require(
            ents.capabilities.can_access_matching_directory,
            "the matching directory requires an active subscription or trial",
        )?;
        entitlements::require(
            !ents.is_in_grace_period || ents.capabilities.can_join_tribes,
            "matching is read-only during your grace period",
        )?;

        // Serialize both directions of this pair.
        let lock = self
            .pair_locks
            .entry(pair_key(acting_user_id, target_user_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let outcome = self
            .db
            .record_match_decision(acting_user_id, target_user_id, decision, now, self.ledger.ctx())
            .await?;

        if !outcome.applied {
            tracing::debug!(
                acting_user_id,
                target_user_id,
                "Match decision already recorded (idempotent skip)"
            );
        }
        Ok(outcome)
    }

    /// Candidate users for the directory view, excluding the viewer.
    /// Read-only: allowed for grace-period users.
    pub async fn directory(&self, viewer_id: u64, now: DateTime<Utc>) -> Result<Vec<User>> {
        let viewer = self
            .db
            .get_user(viewer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", viewer_id)))?;

        let ents = entitlements::resolve_for(&viewer, now);
        entitlements::require(
            ents.capabilities.can_access_matching_directory,
            "the matching directory requires an active subscription or trial",
        )?;

        let users = self.db.list_users().await?;
        Ok(users.into_iter().filter(|u| u.id != viewer_id).collect())
    }

    /// Directed records initiated by the user.
    pub async fn decisions_for(&self, user_id: u64) -> Result<Vec<MatchRecord>> {
        self.db.list_matches_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineTuning;
    use crate::models::{MatchStatus, SubscriptionStatus};
    use crate::services::BadgeCatalog;

    fn service() -> (Store, MatchService) {
        let db = Store::new();
        let ledger = LedgerService::new(db.clone(), EngineTuning::default(), BadgeCatalog::default());
        (db.clone(), MatchService::new(db, ledger))
    }

    async fn seed_active(db: &Store, id: u64) {
        let mut user = User::new(id, format!("user-{}", id), Utc::now());
        user.status = SubscriptionStatus::Active;
        db.upsert_user(&user).await.unwrap();
    }

    #[tokio::test]
    async fn test_grace_period_matching_is_read_only() {
        let (db, svc) = service();
        let now = Utc::now();
        seed_active(&db, 2).await;

        let mut user = User::new(1, "Fading", now);
        user.status = SubscriptionStatus::Active;
        crate::services::entitlements::cancel_subscription(&mut user, now, &EngineTuning::default());
        db.upsert_user(&user).await.unwrap();

        // Directory stays readable.
        let directory = svc.directory(1, now).await.unwrap();
        assert_eq!(directory.len(), 1);

        // Decisions are refused.
        let err = svc
            .record_decision(1, 2, MatchDecision::Like, now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_concurrent_reciprocal_likes_form_one_match() {
        let (db, svc) = service();
        let now = Utc::now();
        seed_active(&db, 1).await;
        seed_active(&db, 2).await;

        let m1 = svc.clone();
        let m2 = svc.clone();
        let a = tokio::spawn(async move { m1.record_decision(1, 2, MatchDecision::Like, now).await });
        let b = tokio::spawn(async move { m2.record_decision(2, 1, MatchDecision::Like, now).await });

        let first = a.await.unwrap().unwrap();
        let second = b.await.unwrap().unwrap();

        // Exactly one side observes the formation; both directed records
        // end Accepted regardless of interleaving.
        assert!(first.is_match ^ second.is_match);
        let forward = db.get_match(1, 2).await.unwrap().unwrap();
        let reverse = db.get_match(2, 1).await.unwrap().unwrap();
        assert_eq!(forward.status, MatchStatus::Accepted);
        assert_eq!(reverse.status, MatchStatus::Accepted);
    }
}
