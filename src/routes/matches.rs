// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Matching routes: directory view and like/pass decisions.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{MatchDecision, MatchOutcome, MatchRecord};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Match routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/matches/directory", get(directory))
        .route("/api/matches", get(list_decisions))
        .route("/api/matches/{target_id}", post(decide))
}

/// Public-facing candidate summary; no subscription internals leak here.
#[derive(Serialize)]
pub struct DirectoryEntry {
    pub id: u64,
    pub display_name: String,
    pub level: u32,
    pub reputation_score: f64,
    pub streak: u32,
}

/// Browse matching candidates. Read-only, so grace-period users keep it.
async fn directory(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<DirectoryEntry>>> {
    let candidates = state.matches.directory(user.user_id, chrono::Utc::now()).await?;
    Ok(Json(
        candidates
            .into_iter()
            .map(|u| DirectoryEntry {
                id: u.id,
                display_name: u.display_name,
                level: u.level,
                reputation_score: u.reputation_score,
                streak: u.streak,
            })
            .collect(),
    ))
}

/// The caller's directed decisions, newest first.
async fn list_decisions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<MatchRecord>>> {
    Ok(Json(state.matches.decisions_for(user.user_id).await?))
}

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub decision: MatchDecision,
}

/// Like or pass on a directory candidate. A repeated decision on the same
/// target is reported as success with `applied: false`.
async fn decide(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(target_id): Path<u64>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<MatchOutcome>> {
    let outcome = state
        .matches
        .record_decision(user.user_id, target_id, payload.decision, chrono::Utc::now())
        .await?;
    Ok(Json(outcome))
}
