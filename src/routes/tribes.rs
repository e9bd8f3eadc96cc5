// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tribe admission routes: creation, applications, joins, roles, bans.
//!
//! Handlers stay thin; every guard that matters runs inside the store's
//! critical section via the admission service.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{
    AdmissionCriteria, ApplicationDecision, LedgerResult, Tribe, TribeApplication, TribeMember,
    TribeRole,
};
use crate::services::NewTribe;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Tribe routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tribes", post(create_tribe))
        .route("/api/tribes/{id}", get(get_tribe))
        .route("/api/tribes/{id}/apply", post(apply_to_tribe))
        .route("/api/tribes/{id}/join", post(join_tribe))
        .route("/api/tribes/{id}/leave", post(leave_tribe))
        .route("/api/tribes/{id}/applications", get(list_applications))
        .route("/api/applications/{id}/decide", post(decide_application))
        .route("/api/tribes/{id}/members/{user_id}/role", put(set_role))
        .route("/api/tribes/{id}/members/{user_id}/ban", put(set_ban))
}

// ─── Creation ────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct CreateTribeRequest {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    #[validate(range(min = 1, max = 500))]
    pub max_members: u32,
    #[serde(default)]
    pub min_level: u32,
    #[serde(default)]
    pub min_reputation: f64,
    #[serde(default)]
    pub min_streak: u32,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub allows_open_join: bool,
}

async fn create_tribe(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateTribeRequest>,
) -> Result<Json<Tribe>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let tribe = state
        .admission
        .create_tribe(
            user.user_id,
            NewTribe {
                name: payload.name,
                max_members: payload.max_members,
                criteria: AdmissionCriteria {
                    min_level: payload.min_level,
                    min_reputation: payload.min_reputation,
                    min_streak: payload.min_streak,
                },
                is_paid: payload.is_paid,
                allows_open_join: payload.allows_open_join,
            },
            chrono::Utc::now(),
        )
        .await?;

    Ok(Json(tribe))
}

// ─── Reads ───────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TribeResponse {
    #[serde(flatten)]
    pub tribe: Tribe,
    pub member_count: u32,
    pub members: Vec<TribeMember>,
}

async fn get_tribe(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<AuthUser>,
    Path(tribe_id): Path<u64>,
) -> Result<Json<TribeResponse>> {
    let tribe = state
        .admission
        .get_tribe(tribe_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tribe {}", tribe_id)))?;
    let members = state.admission.list_members(tribe_id).await?;

    Ok(Json(TribeResponse {
        member_count: members.len() as u32,
        tribe,
        members,
    }))
}

/// Pending applications; visible to the creator and admins only.
async fn list_applications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(tribe_id): Path<u64>,
) -> Result<Json<Vec<TribeApplication>>> {
    let tribe = state
        .admission
        .get_tribe(tribe_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tribe {}", tribe_id)))?;

    let is_reviewer = user.user_id == tribe.creator_id
        || state
            .admission
            .list_members(tribe_id)
            .await?
            .iter()
            .any(|m| m.user_id == user.user_id && !m.is_banned && m.role.can_manage_members());
    if !is_reviewer {
        return Err(AppError::Forbidden(
            "only the tribe creator or an admin can view applications".to_string(),
        ));
    }

    Ok(Json(state.admission.list_pending_applications(tribe_id).await?))
}

// ─── Membership Transitions ──────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct ApplyRequest {
    #[serde(default)]
    #[validate(length(max = 500))]
    pub message: String,
}

async fn apply_to_tribe(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(tribe_id): Path<u64>,
    Json(payload): Json<ApplyRequest>,
) -> Result<Json<TribeApplication>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let application = state
        .admission
        .apply_to_tribe(user.user_id, tribe_id, &payload.message, chrono::Utc::now())
        .await?;
    Ok(Json(application))
}

#[derive(Serialize)]
pub struct JoinResponse {
    pub member: TribeMember,
    pub ledger: LedgerResult,
}

async fn join_tribe(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(tribe_id): Path<u64>,
) -> Result<Json<JoinResponse>> {
    let (member, ledger) = state
        .admission
        .join_tribe_direct(user.user_id, tribe_id, chrono::Utc::now())
        .await?;
    Ok(Json(JoinResponse { member, ledger }))
}

#[derive(Serialize)]
pub struct LeaveResponse {
    pub left: bool,
}

async fn leave_tribe(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(tribe_id): Path<u64>,
) -> Result<Json<LeaveResponse>> {
    state.admission.leave_tribe(user.user_id, tribe_id).await?;
    Ok(Json(LeaveResponse { left: true }))
}

#[derive(Deserialize)]
pub struct DecideRequest {
    pub decision: ApplicationDecision,
}

#[derive(Serialize)]
pub struct DecideResponse {
    pub application: TribeApplication,
    pub ledger: Option<LedgerResult>,
}

async fn decide_application(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(application_id): Path<u64>,
    Json(payload): Json<DecideRequest>,
) -> Result<Json<DecideResponse>> {
    let (application, ledger) = state
        .admission
        .decide_application(user.user_id, application_id, payload.decision, chrono::Utc::now())
        .await?;
    Ok(Json(DecideResponse { application, ledger }))
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: TribeRole,
}

async fn set_role(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((tribe_id, member_user_id)): Path<(u64, u64)>,
    Json(payload): Json<RoleRequest>,
) -> Result<Json<TribeMember>> {
    let member = state
        .admission
        .set_member_role(user.user_id, tribe_id, member_user_id, payload.role)
        .await?;
    Ok(Json(member))
}

#[derive(Deserialize)]
pub struct BanRequest {
    pub banned: bool,
}

async fn set_ban(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((tribe_id, member_user_id)): Path<(u64, u64)>,
    Json(payload): Json<BanRequest>,
) -> Result<Json<TribeMember>> {
    let member = state
        .admission
        .set_member_ban(
            user.user_id,
            tribe_id,
            member_user_id,
            payload.banned,
            chrono::Utc::now(),
        )
        .await?;
    Ok(Json(member))
}
