// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scheduled sweep: the periodic pass that penalizes missed weekly
//! check-ins and expires lapsed grace windows.
//!
//! Safe under at-least-once invocation: the store's `(user, period)`
//! check-in slot and the ledger idempotency key make a re-run inside the
//! same period a no-op, and partial completion never re-penalizes the
//! users already processed. One user's failure is captured and counted,
//! never fatal for the batch.

use crate::db::{Store, SweepAction};
use crate::error::Result;
use crate::models::User;
use crate::services::{entitlements, LedgerService};
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;

const MAX_CONCURRENT_SWEEP_OPS: usize = 16;

/// Aggregate outcome of one sweep run.
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    /// Users evaluated for the period
    pub processed: u32,
    /// Missed-check-in penalties applied
    pub penalized: u32,
    /// Users with an existing check-in record for the period
    pub skipped: u32,
    /// Grace windows expired during this pass
    pub expired: u32,
    /// Per-user failures (captured, not fatal)
    pub errors: u32,
}

/// Service driving the weekly ritual sweep.
#[derive(Clone)]
pub struct SweepService {
    db: Store,
    ledger: LedgerService,
}

impl SweepService {
    pub fn new(db: Store, ledger: LedgerService) -> Self {
        Self { db, ledger }
    }

    /// Run the sweep for one period.
    ///
    /// `period_key` is normally the current ISO week; the scheduler passes
    /// it explicitly so a delayed delivery still penalizes the intended
    /// period.
    pub async fn run(&self, period_key: &str, now: DateTime<Utc>) -> Result<SweepReport> {
        let users = self.db.list_users().await?;
        let mut report = SweepReport::default();

        // Expire lapsed grace windows first so expired users drop out of
        // ritual eligibility below.
        let mut eligible: Vec<User> = Vec::new();
        for user in users {
            let user_id = user.id;
            if user.grace_window.is_some() {
                match self
                    .db
                    .update_user(user_id, |u| Ok(entitlements::expire_grace(u, now)))
                    .await
                {
                    Ok(true) => {
                        report.expired += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(user_id, error = %e, "Grace expiry failed, skipping user");
                        report.errors += 1;
                        continue;
                    }
                }
            }
            if user.is_ritual_eligible() {
                eligible.push(user);
            }
        }

        let outcomes: Vec<std::result::Result<SweepAction, crate::error::AppError>> =
            stream::iter(eligible)
                .map(|user| {
                    let db = self.db.clone();
                    let ctx_owner = self.ledger.clone();
                    let period = period_key.to_string();
                    async move {
                        db.penalize_missed_checkin(user.id, &period, now, ctx_owner.ctx())
                            .await
                    }
                })
                .buffer_unordered(MAX_CONCURRENT_SWEEP_OPS)
                .collect()
                .await;

        for outcome in outcomes {
            report.processed += 1;
            match outcome {
                Ok(SweepAction::Penalized(_)) => report.penalized += 1,
                Ok(SweepAction::AlreadyRecorded) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Sweep failed for one user, continuing");
                    report.errors += 1;
                }
            }
        }

        tracing::info!(
            period = %period_key,
            processed = report.processed,
            penalized = report.penalized,
            skipped = report.skipped,
            expired = report.expired,
            errors = report.errors,
            "Sweep complete"
        );
        Ok(report)
    }
}
