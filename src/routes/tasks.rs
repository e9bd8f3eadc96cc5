// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Task handler routes for scheduler callbacks.
//!
//! These endpoints are called by the external cron scheduler, not
//! directly by users, and are guarded by a shared-secret header.

use crate::services::SweepReport;
use crate::time_utils::iso_week_key;
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Header carrying the scheduler's shared secret.
const SWEEP_TOKEN_HEADER: &str = "x-sweep-token";

/// Task handler routes (called by the scheduler).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/run-sweep", post(run_sweep))
}

#[derive(Deserialize, Default)]
pub struct SweepRequest {
    /// ISO week to sweep; defaults to the week containing now
    #[serde(default)]
    pub period_key: Option<String>,
}

/// Run the weekly ritual sweep (called by the scheduler).
async fn run_sweep(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<SweepRequest>>,
) -> Result<Json<SweepReport>, StatusCode> {
    // Security check: the scheduler presents a shared secret. Anything
    // else gets a 403 without touching the store.
    let token_ok = headers
        .get(SWEEP_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|token| token == state.config.sweep_auth_token)
        .unwrap_or(false);

    if !token_ok {
        tracing::warn!("Security Alert: Blocked unauthorized access to run_sweep");
        return Err(StatusCode::FORBIDDEN);
    }

    let now = chrono::Utc::now();
    let period_key = payload
        .and_then(|Json(p)| p.period_key)
        .unwrap_or_else(|| iso_week_key(now));

    tracing::info!(period = %period_key, "Running scheduled sweep");

    match state.sweep.run(&period_key, now).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            tracing::error!(error = %e, "Sweep run failed");
            // 500 lets the scheduler retry; the sweep is idempotent.
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
