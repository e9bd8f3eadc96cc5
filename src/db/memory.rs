// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Embedded transactional store with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile + ledger aggregate storage)
//! - Ledger events, achievements, reviews, feedback, check-ins
//! - Tribes (membership, applications)
//! - Matches (directed decision records)
//!
//! The store is the sole synchronization point between request handlers
//! and the scheduled sweep. Compound operations (ledger apply + badge
//! grant, application accept, capacity-checked join, reciprocal match
//! accept, sweep penalty) run under one write-lock acquisition and
//! validate before mutating, so an error leaves no partial state.
//! Uniqueness constraints are enforced by the key structure of each
//! collection, which closes the race between a duplicate check and the
//! insert: ledger events are keyed `(user_id, idempotency_key)`, achievements
//! `(user_id, badge_id)`, members `(tribe_id, user_id)`, matches
//! `(initiator_id, target_id)`, check-ins `(user_id, period_key)`.

use crate::config::EngineTuning;
use crate::error::AppError;
use crate::models::ledger::level_for;
use crate::models::{
    AdmissionCriteria, ApplicationDecision, ApplicationStatus, Badge, CheckinRecord,
    CheckinStatus, EventKind, FeedbackEntry, LedgerEvent, LedgerResult, MatchDecision,
    MatchOutcome, MatchRecord, MatchStatus, PeerReview, Tribe, TribeApplication, TribeMember,
    TribeRole, User, UserAchievement, UserAggregates,
};
use crate::services::entitlements;
use crate::time_utils::is_previous_iso_week;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Ledger context threaded into every XP-affecting store call: the tuning
/// table and the badge catalog to re-evaluate after each event.
#[derive(Clone, Copy)]
pub struct LedgerCtx<'a> {
    pub tuning: &'a EngineTuning,
    pub catalog: &'a [Badge],
}

/// What the sweep did for one user in one period.
#[derive(Debug)]
pub enum SweepAction {
    /// Missed sentinel written and penalty applied
    Penalized(LedgerResult),
    /// A check-in record (completed or missed) already exists for the period
    AlreadyRecorded,
}

#[derive(Default)]
struct StoreInner {
    users: HashMap<u64, User>,
    /// Append-only; keyed by `(user_id, idempotency_key)`
    ledger_events: HashMap<(u64, String), LedgerEvent>,
    /// Keyed by `(user_id, badge_id)`
    achievements: HashMap<(u64, String), UserAchievement>,
    /// Review history per target user
    reviews: HashMap<u64, Vec<PeerReview>>,
    feedback: HashMap<u64, FeedbackEntry>,
    /// Keyed by `(user_id, period_key)`
    checkins: HashMap<(u64, String), CheckinRecord>,
    tribes: HashMap<u64, Tribe>,
    /// Keyed by `(tribe_id, user_id)`
    members: HashMap<(u64, u64), TribeMember>,
    applications: HashMap<u64, TribeApplication>,
    /// Keyed by ordered `(initiator_id, target_id)`
    matches: HashMap<(u64, u64), MatchRecord>,
    next_tribe_id: u64,
    next_application_id: u64,
    next_review_id: u64,
    next_feedback_id: u64,
}

/// Shared store handle.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<StoreInner>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreInner>, AppError> {
        self.inner
            .read()
            .map_err(|_| AppError::Dependency("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreInner>, AppError> {
        self.inner
            .write()
            .map_err(|_| AppError::Dependency("store lock poisoned".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by ID.
    pub async fn get_user(&self, user_id: u64) -> Result<Option<User>, AppError> {
        Ok(self.read()?.users.get(&user_id).cloned())
    }

    /// Create or update a user.
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.write()?.users.insert(user.id, user.clone());
        Ok(())
    }

    /// All users, ordered by ID.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let mut users: Vec<User> = self.read()?.users.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    /// Atomic read-modify-write on a single user.
    ///
    /// Subscription transitions go through this so a concurrent webhook
    /// and sweep cannot interleave a stale fetch-then-store.
    pub async fn update_user<T, F>(&self, user_id: u64, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut User) -> Result<T, AppError>,
    {
        let mut inner = self.write()?;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        f(user)
    }

    // ─── Ledger Operations ───────────────────────────────────────

    /// Apply a ledger event, badge evaluation included, all-or-nothing.
    ///
    /// Duplicate `(user_id, idempotency_key)` is a benign no-op that
    /// reports the prior state with `applied: false`.
    pub async fn apply_event(
        &self,
        user_id: u64,
        kind: EventKind,
        idempotency_key: &str,
        now: DateTime<Utc>,
        ctx: LedgerCtx<'_>,
    ) -> Result<LedgerResult, AppError> {
        let mut inner = self.write()?;
        apply_event_locked(&mut inner, user_id, kind, idempotency_key, now, ctx)
    }

    /// Ledger events for a user, oldest first.
    pub async fn get_events_for_user(&self, user_id: u64) -> Result<Vec<LedgerEvent>, AppError> {
        let inner = self.read()?;
        let mut events: Vec<LedgerEvent> = inner
            .ledger_events
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    /// Achievements granted to a user, oldest first.
    pub async fn get_achievements(&self, user_id: u64) -> Result<Vec<UserAchievement>, AppError> {
        let inner = self.read()?;
        let mut grants: Vec<UserAchievement> = inner
            .achievements
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        grants.sort_by_key(|a| a.granted_at);
        Ok(grants)
    }

    /// Record a successful weekly check-in for the given period.
    ///
    /// Writes the check-in record and the `CheckinCompleted` event in one
    /// critical section. A repeat within the period is a benign no-op.
    pub async fn record_checkin(
        &self,
        user_id: u64,
        period_key: &str,
        now: DateTime<Utc>,
        ctx: LedgerCtx<'_>,
    ) -> Result<LedgerResult, AppError> {
        let mut inner = self.write()?;
        let user = inner
            .users
            .get(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        let slot = (user_id, period_key.to_string());
        if inner.checkins.contains_key(&slot) {
            return Ok(noop_result(user));
        }

        inner.checkins.insert(
            slot,
            CheckinRecord {
                user_id,
                period_key: period_key.to_string(),
                status: CheckinStatus::Completed,
                created_at: now,
            },
        );

        let key = format!("checkin:{}", period_key);
        apply_event_locked(&mut inner, user_id, EventKind::CheckinCompleted, &key, now, ctx)
    }

    /// Sweep path: write the missed sentinel and apply the penalty, unless
    /// any check-in record already exists for the period.
    ///
    /// The existence read and the penalty write share one critical
    /// section, so a user completing a check-in at the same moment the
    /// sweep evaluates them cannot collect both a success event and a
    /// missed penalty for the same period.
    pub async fn penalize_missed_checkin(
        &self,
        user_id: u64,
        period_key: &str,
        now: DateTime<Utc>,
        ctx: LedgerCtx<'_>,
    ) -> Result<SweepAction, AppError> {
        let mut inner = self.write()?;
        if !inner.users.contains_key(&user_id) {
            return Err(AppError::NotFound(format!("User {}", user_id)));
        }

        let slot = (user_id, period_key.to_string());
        if inner.checkins.contains_key(&slot) {
            return Ok(SweepAction::AlreadyRecorded);
        }

        inner.checkins.insert(
            slot,
            CheckinRecord {
                user_id,
                period_key: period_key.to_string(),
                status: CheckinStatus::Missed,
                created_at: now,
            },
        );

        let key = format!("checkin_missed:{}", period_key);
        let result =
            apply_event_locked(&mut inner, user_id, EventKind::CheckinMissed, &key, now, ctx)?;
        Ok(SweepAction::Penalized(result))
    }

    /// Store a peer review and fold its score into the target's
    /// reputation mean.
    ///
    /// The mean is recomputed over the full history on every review; O(n)
    /// per review is fine at the expected volume.
    pub async fn record_peer_review(
        &self,
        reviewer_id: u64,
        target_id: u64,
        score: u32,
        now: DateTime<Utc>,
        ctx: LedgerCtx<'_>,
    ) -> Result<(PeerReview, LedgerResult), AppError> {
        if reviewer_id == target_id {
            return Err(AppError::Conflict("cannot review yourself".to_string()));
        }

        let mut inner = self.write()?;
        if !inner.users.contains_key(&reviewer_id) {
            return Err(AppError::NotFound(format!("User {}", reviewer_id)));
        }
        if !inner.users.contains_key(&target_id) {
            return Err(AppError::NotFound(format!("User {}", target_id)));
        }

        inner.next_review_id += 1;
        let review = PeerReview {
            id: inner.next_review_id,
            reviewer_id,
            target_id,
            score,
            created_at: now,
        };

        let history = inner.reviews.entry(target_id).or_default();
        history.push(review.clone());
        let mean = history.iter().map(|r| r.score as f64).sum::<f64>() / history.len() as f64;

        if let Some(target) = inner.users.get_mut(&target_id) {
            target.reputation_score = mean;
        }

        let key = format!("review:{}", review.id);
        let result =
            apply_event_locked(&mut inner, target_id, EventKind::PeerReviewed, &key, now, ctx)?;
        Ok((review, result))
    }

    /// Store a feedback submission and award the author.
    pub async fn record_feedback(
        &self,
        author_id: u64,
        body: &str,
        now: DateTime<Utc>,
        ctx: LedgerCtx<'_>,
    ) -> Result<(FeedbackEntry, LedgerResult), AppError> {
        let mut inner = self.write()?;
        if !inner.users.contains_key(&author_id) {
            return Err(AppError::NotFound(format!("User {}", author_id)));
        }

        inner.next_feedback_id += 1;
        let entry = FeedbackEntry {
            id: inner.next_feedback_id,
            author_id,
            body: body.to_string(),
            created_at: now,
        };
        inner.feedback.insert(entry.id, entry.clone());

        let key = format!("feedback:{}", entry.id);
        let result =
            apply_event_locked(&mut inner, author_id, EventKind::FeedbackGiven, &key, now, ctx)?;
        Ok((entry, result))
    }

    // ─── Tribe Operations ────────────────────────────────────────

    /// Create a tribe; the creator becomes its first member with role
    /// Admin and counts against capacity.
    pub async fn create_tribe(
        &self,
        creator_id: u64,
        name: &str,
        max_members: u32,
        criteria: AdmissionCriteria,
        is_paid: bool,
        allows_open_join: bool,
        now: DateTime<Utc>,
    ) -> Result<Tribe, AppError> {
        if max_members < 1 {
            return Err(AppError::Validation(
                "max_members must be at least 1".to_string(),
            ));
        }

        let mut inner = self.write()?;
        if !inner.users.contains_key(&creator_id) {
            return Err(AppError::NotFound(format!("User {}", creator_id)));
        }

        inner.next_tribe_id += 1;
        let tribe = Tribe {
            id: inner.next_tribe_id,
            name: name.to_string(),
            creator_id,
            max_members,
            criteria,
            is_paid,
            allows_open_join,
            created_at: now,
        };
        inner.tribes.insert(tribe.id, tribe.clone());
        inner.members.insert(
            (tribe.id, creator_id),
            TribeMember::new(tribe.id, creator_id, TribeRole::Admin, now),
        );

        tracing::info!(tribe_id = tribe.id, creator_id, "Tribe created");
        Ok(tribe)
    }

    pub async fn get_tribe(&self, tribe_id: u64) -> Result<Option<Tribe>, AppError> {
        Ok(self.read()?.tribes.get(&tribe_id).cloned())
    }

    /// Members of a tribe, ordered by join time.
    pub async fn list_tribe_members(&self, tribe_id: u64) -> Result<Vec<TribeMember>, AppError> {
        let inner = self.read()?;
        let mut members: Vec<TribeMember> = inner
            .members
            .values()
            .filter(|m| m.tribe_id == tribe_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.joined_at);
        Ok(members)
    }

    pub async fn get_application(
        &self,
        application_id: u64,
    ) -> Result<Option<TribeApplication>, AppError> {
        Ok(self.read()?.applications.get(&application_id).cloned())
    }

    /// Pending applications for a tribe, oldest first.
    pub async fn list_pending_applications(
        &self,
        tribe_id: u64,
    ) -> Result<Vec<TribeApplication>, AppError> {
        let inner = self.read()?;
        let mut apps: Vec<TribeApplication> = inner
            .applications
            .values()
            .filter(|a| a.tribe_id == tribe_id && a.status == ApplicationStatus::Pending)
            .cloned()
            .collect();
        apps.sort_by_key(|a| a.created_at);
        Ok(apps)
    }

    /// Unrelated → Applied. Guards: entitlement, no membership row, no
    /// pending application, admission criteria.
    pub async fn apply_to_tribe(
        &self,
        user_id: u64,
        tribe_id: u64,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<TribeApplication, AppError> {
        let mut inner = self.write()?;
        let tribe = inner
            .tribes
            .get(&tribe_id)
            .ok_or_else(|| AppError::NotFound(format!("Tribe {}", tribe_id)))?
            .clone();
        let user = inner
            .users
            .get(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?
            .clone();

        check_can_enter(&inner, &tribe, &user, now)?;

        if inner
            .applications
            .values()
            .any(|a| {
                a.tribe_id == tribe_id
                    && a.user_id == user_id
                    && a.status == ApplicationStatus::Pending
            })
        {
            return Err(AppError::Conflict(
                "an application for this tribe is already pending".to_string(),
            ));
        }

        inner.next_application_id += 1;
        let application = TribeApplication {
            id: inner.next_application_id,
            tribe_id,
            user_id,
            message: message.to_string(),
            status: ApplicationStatus::Pending,
            created_at: now,
            decided_at: None,
            decided_by: None,
        };
        inner.applications.insert(application.id, application.clone());

        tracing::info!(user_id, tribe_id, application_id = application.id, "Tribe application created");
        Ok(application)
    }

    /// Applied → Member / Declined, exactly once.
    ///
    /// Acceptance creates the member row and flips the application in the
    /// same critical section; capacity and reviewer authorization are
    /// re-verified here, not only at an earlier read.
    pub async fn decide_application(
        &self,
        acting_user_id: u64,
        application_id: u64,
        decision: ApplicationDecision,
        now: DateTime<Utc>,
        ctx: LedgerCtx<'_>,
    ) -> Result<(TribeApplication, Option<LedgerResult>), AppError> {
        let mut inner = self.write()?;
        let application = inner
            .applications
            .get(&application_id)
            .ok_or_else(|| AppError::NotFound(format!("Application {}", application_id)))?
            .clone();

        if application.status != ApplicationStatus::Pending {
            return Err(AppError::Conflict(
                "application already resolved".to_string(),
            ));
        }

        let tribe = inner
            .tribes
            .get(&application.tribe_id)
            .ok_or_else(|| AppError::NotFound(format!("Tribe {}", application.tribe_id)))?
            .clone();

        check_can_manage(&inner, &tribe, acting_user_id)?;

        let mut ledger_result = None;
        let status = match decision {
            ApplicationDecision::Accept => {
                let member_key = (tribe.id, application.user_id);
                if inner.members.contains_key(&member_key) {
                    return Err(AppError::Conflict("applicant is already a member".to_string()));
                }
                if member_count(&inner, tribe.id) >= tribe.max_members as usize {
                    return Err(AppError::Conflict("tribe is at capacity".to_string()));
                }
                inner.members.insert(
                    member_key,
                    TribeMember::new(tribe.id, application.user_id, TribeRole::Player, now),
                );
                let key = format!("tribe_joined:{}", tribe.id);
                ledger_result = Some(apply_event_locked(
                    &mut inner,
                    application.user_id,
                    EventKind::TribeJoined,
                    &key,
                    now,
                    ctx,
                )?);
                ApplicationStatus::Approved
            }
            ApplicationDecision::Decline => ApplicationStatus::Declined,
        };

        let stored = inner
            .applications
            .get_mut(&application_id)
            .ok_or_else(|| AppError::NotFound(format!("Application {}", application_id)))?;
        stored.status = status;
        stored.decided_at = Some(now);
        stored.decided_by = Some(acting_user_id);
        let resolved = stored.clone();

        tracing::info!(
            application_id,
            tribe_id = tribe.id,
            applicant_id = resolved.user_id,
            reviewer_id = acting_user_id,
            status = ?status,
            "Application decided"
        );
        Ok((resolved, ledger_result))
    }

    /// Unrelated → Member without an application, for open-join tribes.
    ///
    /// Capacity is evaluated and enforced in the same critical section as
    /// the member insert, so two joins racing for the last slot cannot
    /// both succeed.
    pub async fn join_tribe_direct(
        &self,
        user_id: u64,
        tribe_id: u64,
        now: DateTime<Utc>,
        ctx: LedgerCtx<'_>,
    ) -> Result<(TribeMember, LedgerResult), AppError> {
        let mut inner = self.write()?;
        let tribe = inner
            .tribes
            .get(&tribe_id)
            .ok_or_else(|| AppError::NotFound(format!("Tribe {}", tribe_id)))?
            .clone();
        let user = inner
            .users
            .get(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?
            .clone();

        if !tribe.allows_open_join {
            return Err(AppError::Forbidden(
                "this tribe requires an application to join".to_string(),
            ));
        }

        check_can_enter(&inner, &tribe, &user, now)?;

        if member_count(&inner, tribe_id) >= tribe.max_members as usize {
            return Err(AppError::Conflict("tribe is at capacity".to_string()));
        }

        let member = TribeMember::new(tribe_id, user_id, TribeRole::Player, now);
        inner.members.insert((tribe_id, user_id), member.clone());

        let key = format!("tribe_joined:{}", tribe_id);
        let result =
            apply_event_locked(&mut inner, user_id, EventKind::TribeJoined, &key, now, ctx)?;

        tracing::info!(user_id, tribe_id, "Direct tribe join");
        Ok((member, result))
    }

    /// Change a member's role. Creator-or-Admin only; the creator's own
    /// role is immutable.
    pub async fn set_member_role(
        &self,
        acting_user_id: u64,
        tribe_id: u64,
        member_user_id: u64,
        role: TribeRole,
    ) -> Result<TribeMember, AppError> {
        let mut inner = self.write()?;
        let tribe = inner
            .tribes
            .get(&tribe_id)
            .ok_or_else(|| AppError::NotFound(format!("Tribe {}", tribe_id)))?
            .clone();

        check_can_manage(&inner, &tribe, acting_user_id)?;

        if member_user_id == tribe.creator_id {
            return Err(AppError::Conflict(
                "the creator's role cannot be changed".to_string(),
            ));
        }

        let member = inner
            .members
            .get_mut(&(tribe_id, member_user_id))
            .ok_or_else(|| {
                AppError::NotFound(format!("Member {} in tribe {}", member_user_id, tribe_id))
            })?;
        member.role = role;
        let updated = member.clone();

        tracing::info!(tribe_id, member_user_id, role = ?role, acting_user_id, "Member role changed");
        Ok(updated)
    }

    /// Ban or unban a member. The row is retained for audit; a banned
    /// member loses all role-gated capabilities.
    pub async fn set_member_ban(
        &self,
        acting_user_id: u64,
        tribe_id: u64,
        member_user_id: u64,
        banned: bool,
        now: DateTime<Utc>,
    ) -> Result<TribeMember, AppError> {
        let mut inner = self.write()?;
        let tribe = inner
            .tribes
            .get(&tribe_id)
            .ok_or_else(|| AppError::NotFound(format!("Tribe {}", tribe_id)))?
            .clone();

        check_can_manage(&inner, &tribe, acting_user_id)?;

        if member_user_id == tribe.creator_id {
            return Err(AppError::Conflict("the creator cannot be banned".to_string()));
        }

        let member = inner
            .members
            .get_mut(&(tribe_id, member_user_id))
            .ok_or_else(|| {
                AppError::NotFound(format!("Member {} in tribe {}", member_user_id, tribe_id))
            })?;
        member.is_banned = banned;
        member.banned_at = banned.then_some(now);
        let updated = member.clone();

        tracing::info!(tribe_id, member_user_id, banned, acting_user_id, "Member ban state changed");
        Ok(updated)
    }

    /// Member → Removed, self-initiated. Refused for the creator, who must
    /// transfer ownership or delete the tribe instead (separate
    /// operations, not handled here).
    pub async fn leave_tribe(&self, user_id: u64, tribe_id: u64) -> Result<(), AppError> {
        let mut inner = self.write()?;
        let tribe = inner
            .tribes
            .get(&tribe_id)
            .ok_or_else(|| AppError::NotFound(format!("Tribe {}", tribe_id)))?;

        if user_id == tribe.creator_id {
            return Err(AppError::Conflict(
                "the tribe creator cannot leave; transfer ownership or delete the tribe".to_string(),
            ));
        }

        inner
            .members
            .remove(&(tribe_id, user_id))
            .ok_or_else(|| AppError::NotFound(format!("Member {} in tribe {}", user_id, tribe_id)))?;

        tracing::info!(user_id, tribe_id, "Member left tribe");
        Ok(())
    }

    // ─── Match Operations ────────────────────────────────────────

    /// Directed-edge decision protocol.
    ///
    /// The reverse-record read and both writes of a reciprocal accept
    /// share one critical section, so two users liking each other
    /// near-simultaneously resolve to exactly one mutual match: one call
    /// creates the Pending edge, the other upgrades both to Accepted.
    pub async fn record_match_decision(
        &self,
        acting_user_id: u64,
        target_user_id: u64,
        decision: MatchDecision,
        now: DateTime<Utc>,
        ctx: LedgerCtx<'_>,
    ) -> Result<MatchOutcome, AppError> {
        if acting_user_id == target_user_id {
            return Err(AppError::Conflict("cannot match with yourself".to_string()));
        }

        let mut inner = self.write()?;
        if !inner.users.contains_key(&acting_user_id) {
            return Err(AppError::NotFound(format!("User {}", acting_user_id)));
        }
        if !inner.users.contains_key(&target_user_id) {
            return Err(AppError::NotFound(format!("User {}", target_user_id)));
        }

        let forward_key = (acting_user_id, target_user_id);
        let reverse_key = (target_user_id, acting_user_id);

        // Each ordered pair is decided exactly once; a repeat is a benign
        // no-op reporting the existing state.
        if let Some(existing) = inner.matches.get(&forward_key) {
            let reverse_accepted = inner
                .matches
                .get(&reverse_key)
                .is_some_and(|r| r.status == MatchStatus::Accepted);
            return Ok(MatchOutcome {
                status: existing.status,
                is_match: existing.status == MatchStatus::Accepted && reverse_accepted,
                applied: false,
            });
        }

        let (status, is_match) = match decision {
            MatchDecision::Pass => (MatchStatus::Rejected, false),
            MatchDecision::Like => match inner.matches.get_mut(&reverse_key) {
                None => (MatchStatus::Pending, false),
                Some(reverse) if reverse.status == MatchStatus::Rejected => {
                    (MatchStatus::Pending, false)
                }
                Some(reverse) if reverse.status == MatchStatus::Pending => {
                    // Reciprocal event: both directions reach Accepted in
                    // the same critical section, never one without the
                    // other.
                    reverse.status = MatchStatus::Accepted;
                    reverse.updated_at = now;
                    (MatchStatus::Accepted, true)
                }
                // Reverse already Accepted: create the forward record as
                // Accepted for symmetry. Should not recur under correct
                // sequencing, but stays idempotent.
                Some(_) => (MatchStatus::Accepted, true),
            },
        };

        inner.matches.insert(
            forward_key,
            MatchRecord {
                initiator_id: acting_user_id,
                target_id: target_user_id,
                status,
                created_at: now,
                updated_at: now,
            },
        );

        if is_match {
            let (a, b) = crate::models::matching::pair_key(acting_user_id, target_user_id);
            let key = format!("match:{}:{}", a, b);
            apply_event_locked(&mut inner, acting_user_id, EventKind::MatchFormed, &key, now, ctx)?;
            apply_event_locked(&mut inner, target_user_id, EventKind::MatchFormed, &key, now, ctx)?;
            tracing::info!(acting_user_id, target_user_id, "Mutual match formed");
        }

        Ok(MatchOutcome {
            status,
            is_match,
            applied: true,
        })
    }

    pub async fn get_match(
        &self,
        initiator_id: u64,
        target_id: u64,
    ) -> Result<Option<MatchRecord>, AppError> {
        Ok(self.read()?.matches.get(&(initiator_id, target_id)).cloned())
    }

    /// Directed records initiated by the user, newest first.
    pub async fn list_matches_for_user(&self, user_id: u64) -> Result<Vec<MatchRecord>, AppError> {
        let inner = self.read()?;
        let mut records: Vec<MatchRecord> = inner
            .matches
            .values()
            .filter(|m| m.initiator_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

/// Current member count for capacity checks. Banned members keep their
/// rows and keep occupying a slot.
fn member_count(inner: &StoreInner, tribe_id: u64) -> usize {
    inner.members.values().filter(|m| m.tribe_id == tribe_id).count()
}

/// Self-service admission guards shared by apply and direct join:
/// membership/ban state, entitlement, paid-tribe access, criteria
/// thresholds. Runs inside the caller's critical section.
fn check_can_enter(
    inner: &StoreInner,
    tribe: &Tribe,
    user: &User,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if let Some(member) = inner.members.get(&(tribe.id, user.id)) {
        if member.is_banned {
            return Err(AppError::Forbidden("banned from this tribe".to_string()));
        }
        return Err(AppError::Conflict("already a member of this tribe".to_string()));
    }

    let ents = entitlements::resolve_for(user, now);
    entitlements::require(
        ents.capabilities.can_join_tribes,
        "joining tribes requires an active subscription or trial",
    )?;

    if tribe.is_paid
        && user.status != crate::models::SubscriptionStatus::Active
        && user.profile_tier != crate::models::ProfileTier::Creator
    {
        return Err(AppError::Forbidden(
            "this tribe is paid and requires an active subscription".to_string(),
        ));
    }

    if user.level < tribe.criteria.min_level {
        return Err(AppError::Forbidden(format!(
            "tribe requires level {} (you are level {})",
            tribe.criteria.min_level, user.level
        )));
    }
    if user.reputation_score < tribe.criteria.min_reputation {
        return Err(AppError::Forbidden(format!(
            "tribe requires reputation {:.1} (yours is {:.1})",
            tribe.criteria.min_reputation, user.reputation_score
        )));
    }
    if user.streak < tribe.criteria.min_streak {
        return Err(AppError::Forbidden(format!(
            "tribe requires a {}-week streak (yours is {})",
            tribe.criteria.min_streak, user.streak
        )));
    }

    Ok(())
}

/// Reviewer authorization: the tribe creator, or a non-banned member whose
/// role carries member management. Runs inside the caller's critical
/// section so it cannot go stale before the write.
fn check_can_manage(
    inner: &StoreInner,
    tribe: &Tribe,
    acting_user_id: u64,
) -> Result<(), AppError> {
    if acting_user_id == tribe.creator_id {
        return Ok(());
    }
    let authorized = inner
        .members
        .get(&(tribe.id, acting_user_id))
        .is_some_and(|m| !m.is_banned && m.role.can_manage_members());
    if authorized {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "only the tribe creator or an admin can manage members".to_string(),
        ))
    }
}

/// Benign-duplicate result: the prior state, nothing applied.
fn noop_result(user: &User) -> LedgerResult {
    LedgerResult {
        applied: false,
        delta: 0,
        new_current_xp: user.current_xp,
        new_level: user.level,
        newly_granted_badges: Vec::new(),
    }
}

/// Core ledger application, shared by every XP-affecting compound
/// operation. Caller holds the write lock.
fn apply_event_locked(
    inner: &mut StoreInner,
    user_id: u64,
    kind: EventKind,
    idempotency_key: &str,
    now: DateTime<Utc>,
    ctx: LedgerCtx<'_>,
) -> Result<LedgerResult, AppError> {
    let event_key = (user_id, idempotency_key.to_string());

    {
        let user = inner
            .users
            .get(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        if inner.ledger_events.contains_key(&event_key) {
            tracing::debug!(user_id, idempotency_key, "Ledger event already applied (idempotent skip)");
            return Ok(noop_result(user));
        }
    }

    let spec = kind.spec(ctx.tuning);
    inner.ledger_events.insert(
        event_key,
        LedgerEvent {
            user_id,
            kind,
            delta: spec.delta,
            idempotency_key: idempotency_key.to_string(),
            created_at: now,
        },
    );

    let (new_current_xp, new_level) = {
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        user.current_xp += spec.delta;
        if spec.counts_toward_lifetime {
            user.lifetime_xp += spec.delta;
        }
        // Lifetime XP is monotonic and the threshold table is fixed, so
        // the recomputed level can only grow; the max keeps that true even
        // across a tuning change.
        user.level = user.level.max(level_for(user.lifetime_xp, &ctx.tuning.level_thresholds));

        match kind {
            EventKind::CheckinCompleted => {
                user.streak = match user.last_checkin_at {
                    Some(prev) if is_previous_iso_week(prev, now) => user.streak + 1,
                    _ => 1,
                };
                user.last_checkin_at = Some(now);
            }
            EventKind::CheckinMissed => user.streak = 0,
            _ => {}
        }

        (user.current_xp, user.level)
    };

    let aggregates = aggregates_locked(inner, user_id);
    let mut newly_granted = Vec::new();
    for badge in ctx.catalog {
        let grant_key = (user_id, badge.id.clone());
        if badge.rule.is_satisfied(&aggregates) && !inner.achievements.contains_key(&grant_key) {
            inner.achievements.insert(
                grant_key,
                UserAchievement {
                    user_id,
                    badge_id: badge.id.clone(),
                    granted_at: now,
                },
            );
            tracing::info!(user_id, badge_id = %badge.id, "Badge granted");
            newly_granted.push(badge.id.clone());
        }
    }

    Ok(LedgerResult {
        applied: true,
        delta: spec.delta,
        new_current_xp,
        new_level,
        newly_granted_badges: newly_granted,
    })
}

/// Aggregated stats for badge predicates, computed from the event log and
/// the user row. Caller holds the lock.
fn aggregates_locked(inner: &StoreInner, user_id: u64) -> UserAggregates {
    let mut aggregates = UserAggregates::default();
    for event in inner.ledger_events.values() {
        if event.user_id != user_id {
            continue;
        }
        match event.kind {
            EventKind::CheckinCompleted => aggregates.checkins_completed += 1,
            EventKind::FeedbackGiven => aggregates.feedback_given += 1,
            EventKind::TribeJoined => aggregates.tribes_joined += 1,
            EventKind::MatchFormed => aggregates.matches_formed += 1,
            EventKind::CheckinMissed | EventKind::PeerReviewed => {}
        }
    }
    aggregates.reviews_received = inner
        .reviews
        .get(&user_id)
        .map(|r| r.len() as u32)
        .unwrap_or(0);
    if let Some(user) = inner.users.get(&user_id) {
        aggregates.streak = user.streak;
        aggregates.level = user.level;
    }
    aggregates
}
