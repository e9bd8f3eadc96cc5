// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for the authenticated user: profile, entitlements,
//! subscription trial, check-ins, feedback, and peer reviews.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{LedgerResult, ProfileTier, SubscriptionStatus};
use crate::services::entitlements;
use crate::services::Entitlements;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/entitlements", get(get_entitlements))
        .route("/api/subscription/trial", post(start_trial))
        .route("/api/checkin", post(checkin))
        .route("/api/feedback", post(submit_feedback))
        .route("/api/reviews", post(submit_review))
}

// ─── Profile ─────────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
pub struct MeResponse {
    pub id: u64,
    pub display_name: String,
    pub status: SubscriptionStatus,
    pub profile_tier: ProfileTier,
    pub current_xp: i64,
    pub lifetime_xp: i64,
    pub level: u32,
    pub reputation_score: f64,
    pub streak: u32,
    pub badges: Vec<String>,
    pub entitlements: Entitlements,
    pub created_at: String,
}

/// Get current user profile with ledger standing and entitlements.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let profile = state
        .db
        .get_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    let now = chrono::Utc::now();
    let badges = state
        .ledger
        .achievements(user.user_id)
        .await?
        .into_iter()
        .map(|a| a.badge_id)
        .collect();

    Ok(Json(MeResponse {
        id: profile.id,
        display_name: profile.display_name.clone(),
        status: profile.status,
        profile_tier: profile.profile_tier,
        current_xp: profile.current_xp,
        lifetime_xp: profile.lifetime_xp,
        level: profile.level,
        reputation_score: profile.reputation_score,
        streak: profile.streak,
        badges,
        entitlements: entitlements::resolve_for(&profile, now),
        created_at: format_utc_rfc3339(profile.created_at),
    }))
}

/// Resolve the caller's capability set.
async fn get_entitlements(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Entitlements>> {
    let profile = state
        .db
        .get_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    Ok(Json(entitlements::resolve_for(&profile, chrono::Utc::now())))
}

// ─── Subscription Trial ──────────────────────────────────────

#[derive(Serialize)]
pub struct TrialResponse {
    pub status: SubscriptionStatus,
    pub trial_days_remaining: Option<i64>,
}

/// Start the one allowed trial for the caller.
async fn start_trial(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TrialResponse>> {
    let now = chrono::Utc::now();
    let tuning = state.config.tuning.clone();

    let profile = state
        .db
        .update_user(user.user_id, move |u| {
            entitlements::start_trial(u, now, &tuning)?;
            Ok(u.clone())
        })
        .await?;

    let ents = entitlements::resolve_for(&profile, now);
    Ok(Json(TrialResponse {
        status: profile.status,
        trial_days_remaining: ents.trial_days_remaining,
    }))
}

// ─── Weekly Check-in ─────────────────────────────────────────

/// Record this week's check-in. A repeat within the same ISO week is
/// reported as success with `applied: false`.
async fn checkin(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<LedgerResult>> {
    let profile = state
        .db
        .get_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    if !profile.is_ritual_eligible() {
        return Err(AppError::Forbidden(
            "check-ins require a registered, non-expired subscription".to_string(),
        ));
    }

    let result = state.ledger.record_checkin(user.user_id, chrono::Utc::now()).await?;
    Ok(Json(result))
}

// ─── Feedback ────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct FeedbackRequest {
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
}

#[derive(Serialize)]
pub struct FeedbackResponse {
    pub feedback_id: u64,
    pub ledger: LedgerResult,
}

/// Submit feedback; the author's XP award is keyed by the new entry id.
async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let (entry, ledger) = state
        .ledger
        .record_feedback(user.user_id, &payload.body, chrono::Utc::now())
        .await?;

    Ok(Json(FeedbackResponse {
        feedback_id: entry.id,
        ledger,
    }))
}

// ─── Peer Reviews ────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct ReviewRequest {
    pub target_user_id: u64,
    #[validate(range(min = 1, max = 5))]
    pub score: u32,
}

#[derive(Serialize)]
pub struct ReviewResponse {
    pub review_id: u64,
    pub target_reputation: f64,
}

/// Review another user. Recomputes the target's reputation mean and
/// awards the target's review XP.
async fn submit_review(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let (review, _) = state
        .ledger
        .record_peer_review(
            user.user_id,
            payload.target_user_id,
            payload.score,
            chrono::Utc::now(),
        )
        .await?;

    let target = state
        .db
        .get_user(payload.target_user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", payload.target_user_id)))?;

    Ok(Json(ReviewResponse {
        review_id: review.id,
        target_reputation: target.reputation_score,
    }))
}
