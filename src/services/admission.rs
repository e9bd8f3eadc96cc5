// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tribe admission control service.
//!
//! Membership lifecycle: apply, accept/decline, direct join with capacity
//! check, role assignment, ban/unban, leave. Every guard that matters
//! (capacity, reviewer authorization, duplicate state) is re-verified by
//! the store inside the same critical section as the write; this service
//! adds the entitlement gating that belongs in front of the transition.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{
    AdmissionCriteria, ApplicationDecision, LedgerResult, Tribe, TribeApplication, TribeMember,
    TribeRole,
};
use crate::services::{entitlements, LedgerService};
use chrono::{DateTime, Utc};

/// Parameters for creating a tribe.
#[derive(Debug, Clone)]
pub struct NewTribe {
    pub name: String,
    pub max_members: u32,
    pub criteria: AdmissionCriteria,
    pub is_paid: bool,
    pub allows_open_join: bool,
}

/// Service for the group membership state machine.
#[derive(Clone)]
pub struct AdmissionService {
    db: Store,
    ledger: LedgerService,
}

impl AdmissionService {
    pub fn new(db: Store, ledger: LedgerService) -> Self {
        Self { db, ledger }
    }

    /// Create a tribe. Requires the tribe-creation entitlement; a paid
    /// tribe additionally requires the monetization entitlement.
    pub async fn create_tribe(
        &self,
        creator_id: u64,
        spec: NewTribe,
        now: DateTime<Utc>,
    ) -> Result<Tribe> {
        let creator = self
            .db
            .get_user(creator_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", creator_id)))?;

        let ents = entitlements::resolve_for(&creator, now);
        entitlements::require(
            ents.capabilities.can_create_tribes,
            "creating tribes requires an active subscription or trial",
        )?;
        if spec.is_paid {
            entitlements::require(
                ents.capabilities.can_monetize_tribe,
                "paid tribes require a full subscription or creator profile",
            )?;
        }

        self.db
            .create_tribe(
                creator_id,
                &spec.name,
                spec.max_members,
                spec.criteria,
                spec.is_paid,
                spec.allows_open_join,
                now,
            )
            .await
    }

    /// Unrelated → Applied.
    pub async fn apply_to_tribe(
        &self,
        user_id: u64,
        tribe_id: u64,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<TribeApplication> {
        self.db.apply_to_tribe(user_id, tribe_id, message, now).await
    }

    /// Applied → Member or Declined, decided by the creator or an Admin.
    /// Acceptance also awards the applicant's join XP.
    pub async fn decide_application(
        &self,
        acting_user_id: u64,
        application_id: u64,
        decision: ApplicationDecision,
        now: DateTime<Utc>,
    ) -> Result<(TribeApplication, Option<LedgerResult>)> {
        self.db
            .decide_application(acting_user_id, application_id, decision, now, self.ledger.ctx())
            .await
    }

    /// Unrelated → Member for open-join tribes.
    pub async fn join_tribe_direct(
        &self,
        user_id: u64,
        tribe_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(TribeMember, LedgerResult)> {
        self.db
            .join_tribe_direct(user_id, tribe_id, now, self.ledger.ctx())
            .await
    }

    pub async fn set_member_role(
        &self,
        acting_user_id: u64,
        tribe_id: u64,
        member_user_id: u64,
        role: TribeRole,
    ) -> Result<TribeMember> {
        self.db
            .set_member_role(acting_user_id, tribe_id, member_user_id, role)
            .await
    }

    pub async fn set_member_ban(
        &self,
        acting_user_id: u64,
        tribe_id: u64,
        member_user_id: u64,
        banned: bool,
        now: DateTime<Utc>,
    ) -> Result<TribeMember> {
        self.db
            .set_member_ban(acting_user_id, tribe_id, member_user_id, banned, now)
            .await
    }

    pub async fn leave_tribe(&self, user_id: u64, tribe_id: u64) -> Result<()> {
        self.db.leave_tribe(user_id, tribe_id).await
    }

    pub async fn get_tribe(&self, tribe_id: u64) -> Result<Option<Tribe>> {
        self.db.get_tribe(tribe_id).await
    }

    pub async fn list_members(&self, tribe_id: u64) -> Result<Vec<TribeMember>> {
        self.db.list_tribe_members(tribe_id).await
    }

    pub async fn list_pending_applications(&self, tribe_id: u64) -> Result<Vec<TribeApplication>> {
        self.db.list_pending_applications(tribe_id).await
    }

    pub async fn get_application(&self, application_id: u64) -> Result<Option<TribeApplication>> {
        self.db.get_application(application_id).await
    }
}
