// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tribe, membership, and application models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Member role within a tribe.
///
/// Authorization is an explicit capability table per role rather than
/// string comparison at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TribeRole {
    Admin,
    Moderator,
    TimeKeeper,
    Player,
}

impl TribeRole {
    /// May this role accept/decline applications, change roles, ban and
    /// unban members? Mutating another member's standing is reserved for
    /// Admin (the tribe creator qualifies regardless of role).
    pub fn can_manage_members(self) -> bool {
        match self {
            TribeRole::Admin => true,
            TribeRole::Moderator | TribeRole::TimeKeeper | TribeRole::Player => false,
        }
    }
}

/// Thresholds an applicant's ledger standing must meet.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AdmissionCriteria {
    #[serde(default)]
    pub min_level: u32,
    #[serde(default)]
    pub min_reputation: f64,
    #[serde(default)]
    pub min_streak: u32,
}

/// A capacity-bounded group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tribe {
    /// Tribe ID (also used as the storage key)
    pub id: u64,
    pub name: String,
    pub creator_id: u64,
    /// Hard member cap, creator included
    pub max_members: u32,
    pub criteria: AdmissionCriteria,
    /// Paid tribes require an active subscription (or Creator tier) to join
    pub is_paid: bool,
    /// Whether users may join directly without an application
    pub allows_open_join: bool,
    pub created_at: DateTime<Utc>,
}

/// Membership row, unique per `(tribe_id, user_id)`.
///
/// Banned members keep their row for audit but lose all role-gated
/// capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TribeMember {
    pub tribe_id: u64,
    pub user_id: u64,
    pub role: TribeRole,
    pub is_banned: bool,
    pub banned_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

impl TribeMember {
    pub fn new(tribe_id: u64, user_id: u64, role: TribeRole, now: DateTime<Utc>) -> Self {
        Self {
            tribe_id,
            user_id,
            role,
            is_banned: false,
            banned_at: None,
            joined_at: now,
        }
    }
}

/// Application lifecycle state. Terminal once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Declined,
}

/// A pending or resolved membership application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TribeApplication {
    pub id: u64,
    pub tribe_id: u64,
    pub user_id: u64,
    pub message: String,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, when the application leaves Pending
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<u64>,
}

/// Reviewer decision on an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationDecision {
    Accept,
    Decline,
}
