// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Concurrency tests for the store's compound operations.
//!
//! These attempt to reproduce the races the engine must be immune to:
//! lost-update XP application, double-filling the last tribe slot, and
//! missed mutual matches under simultaneous reciprocal likes.

use tribewell::config::EngineTuning;
use tribewell::db::{LedgerCtx, Store};
use tribewell::models::{AdmissionCriteria, EventKind, MatchDecision, SubscriptionStatus, User};
use tribewell::services::{BadgeCatalog, LedgerService, MatchService};

const NUM_CONCURRENT_EVENTS: u64 = 50;

async fn seed(db: &Store, id: u64) {
    let mut user = User::new(id, format!("user-{}", id), chrono::Utc::now());
    user.status = SubscriptionStatus::Active;
    db.upsert_user(&user).await.expect("Failed to seed user");
}

#[tokio::test]
async fn test_concurrent_ledger_events_lose_no_updates() {
    let db = Store::new();
    seed(&db, 1).await;
    let tuning = EngineTuning::default();
    let now = chrono::Utc::now();

    let mut handles = vec![];
    for i in 0..NUM_CONCURRENT_EVENTS {
        let db_clone = db.clone();
        let tuning_clone = tuning.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("feedback:{}", i);
            db_clone
                .apply_event(
                    1,
                    EventKind::FeedbackGiven,
                    &key,
                    now,
                    LedgerCtx {
                        tuning: &tuning_clone,
                        catalog: &[],
                    },
                )
                .await
        }));
    }

    for handle in handles {
        handle
            .await
            .expect("Task join failed")
            .expect("Event application failed");
    }

    let user = db.get_user(1).await.unwrap().unwrap();
    assert_eq!(
        user.current_xp,
        NUM_CONCURRENT_EVENTS as i64 * tuning.feedback_given_xp,
        "XP lost under concurrent event application"
    );
}

#[tokio::test]
async fn test_concurrent_duplicate_keys_apply_once() {
    let db = Store::new();
    seed(&db, 1).await;
    let tuning = EngineTuning::default();
    let now = chrono::Utc::now();

    let mut handles = vec![];
    for _ in 0..NUM_CONCURRENT_EVENTS {
        let db_clone = db.clone();
        let tuning_clone = tuning.clone();
        handles.push(tokio::spawn(async move {
            db_clone
                .apply_event(
                    1,
                    EventKind::FeedbackGiven,
                    "feedback:dup",
                    now,
                    LedgerCtx {
                        tuning: &tuning_clone,
                        catalog: &[],
                    },
                )
                .await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        let result = handle.await.expect("Task join failed").expect("Event failed");
        if result.applied {
            applied += 1;
        }
    }

    assert_eq!(applied, 1, "duplicate idempotency key applied more than once");
    let user = db.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.current_xp, tuning.feedback_given_xp);
}

#[tokio::test]
async fn test_concurrent_joins_respect_capacity() {
    let db = Store::new();
    let tuning = EngineTuning::default();
    let now = chrono::Utc::now();
    for id in 1..=6 {
        seed(&db, id).await;
    }

    // Capacity 3: creator plus two open slots, four contenders.
    let tribe = db
        .create_tribe(1, "Last Slot", 3, AdmissionCriteria::default(), false, true, now)
        .await
        .unwrap();

    let mut handles = vec![];
    for id in 2..=5 {
        let db_clone = db.clone();
        let tuning_clone = tuning.clone();
        let tribe_id = tribe.id;
        handles.push(tokio::spawn(async move {
            db_clone
                .join_tribe_direct(
                    id,
                    tribe_id,
                    now,
                    LedgerCtx {
                        tuning: &tuning_clone,
                        catalog: &[],
                    },
                )
                .await
        }));
    }

    let mut joined = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("Task join failed") {
            Ok(_) => joined += 1,
            Err(tribewell::error::AppError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(joined, 2, "exactly the open slots should fill");
    assert_eq!(conflicts, 2, "losers must see Conflict");
    let members = db.list_tribe_members(tribe.id).await.unwrap();
    assert_eq!(members.len(), 3, "capacity exceeded under concurrent joins");
}

#[tokio::test]
async fn test_concurrent_reciprocal_likes_never_miss_the_match() {
    // Run several rounds to give the interleaving a chance to vary.
    for round in 0..10u64 {
        let db = Store::new();
        let a = round * 2 + 1;
        let b = round * 2 + 2;
        seed(&db, a).await;
        seed(&db, b).await;

        let ledger = LedgerService::new(db.clone(), EngineTuning::default(), BadgeCatalog::default());
        let svc = MatchService::new(db.clone(), ledger);
        let now = chrono::Utc::now();

        let s1 = svc.clone();
        let s2 = svc.clone();
        let h1 = tokio::spawn(async move { s1.record_decision(a, b, MatchDecision::Like, now).await });
        let h2 = tokio::spawn(async move { s2.record_decision(b, a, MatchDecision::Like, now).await });

        let r1 = h1.await.unwrap().unwrap();
        let r2 = h2.await.unwrap().unwrap();

        assert!(
            r1.is_match ^ r2.is_match,
            "exactly one side must observe the match formation"
        );
        let forward = db.get_match(a, b).await.unwrap().unwrap();
        let reverse = db.get_match(b, a).await.unwrap().unwrap();
        assert_eq!(forward.status, tribewell::models::MatchStatus::Accepted);
        assert_eq!(reverse.status, tribewell::models::MatchStatus::Accepted);
    }
}
